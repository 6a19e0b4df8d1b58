use crate::http::HttpClient;
use crate::runtime::Runtime;
use anyhow::{Context, Result};
use log::info;
use std::path::Path;

/// Downloads a URL to `dest` through the runtime. A single attempt.
#[tracing::instrument(skip(runtime, dest, http_client))]
pub async fn download_file<R: Runtime>(
    runtime: &R,
    url: &str,
    dest: &Path,
    http_client: &HttpClient,
) -> Result<u64> {
    info!("Downloading {}...", url);

    let bytes = http_client
        .download_file(url, || {
            runtime
                .create_file(dest)
                .with_context(|| format!("Failed to create download file at {:?}", dest))
        })
        .await?;

    info!("Downloaded {} bytes to {:?}", bytes, dest);
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::InstallError;
    use crate::runtime::MockRuntime;
    use mockall::predicate::eq;
    use reqwest::Client;

    #[tokio::test]
    async fn test_download_file() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/cli/release/amd64/kuzco-linux-amd64-1.2.3")
            .with_status(200)
            .with_body("test content")
            .create_async()
            .await;

        let mut runtime = MockRuntime::new();
        runtime
            .expect_create_file()
            .with(eq(Path::new("/tmp/work/kuzco").to_path_buf()))
            .returning(|_| Ok(Box::new(std::io::sink())));

        let bytes = download_file(
            &runtime,
            &format!("{}/cli/release/amd64/kuzco-linux-amd64-1.2.3", server.url()),
            Path::new("/tmp/work/kuzco"),
            &HttpClient::new(Client::new()),
        )
        .await
        .unwrap();

        mock.assert_async().await;
        assert_eq!(bytes, 12);
    }

    #[tokio::test]
    async fn test_download_file_not_found() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/kuzco")
            .with_status(404)
            .create_async()
            .await;

        // No expectations: the file must not be created
        let runtime = MockRuntime::new();

        let err = download_file(
            &runtime,
            &format!("{}/kuzco", server.url()),
            Path::new("/tmp/work/kuzco"),
            &HttpClient::new(Client::new()),
        )
        .await
        .unwrap_err();

        mock.assert_async().await;
        assert!(matches!(
            err.downcast_ref::<InstallError>(),
            Some(InstallError::DownloadFailure { .. })
        ));
    }
}
