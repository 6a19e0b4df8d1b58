use anyhow::{Context, Result};
use log::debug;
use reqwest::{Client, Response};
use std::io::Write;

use crate::error::InstallError;

const USER_AGENT: &str = concat!("kuzco-install/", env!("KUZCO_INSTALL_VERSION"));

#[derive(Clone)]
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    /// Creates a new HTTP client wrapping the given reqwest Client.
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Client with the installer's user agent.
    pub fn with_defaults() -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self::new(client))
    }

    /// GET a URL and return the body as text.
    #[tracing::instrument(skip(self))]
    pub async fn get_text(&self, url: &str) -> Result<String> {
        debug!("GET {}", url);
        let response = self.send(url).await?;
        let body = response.text().await.map_err(|e| download_failure(url, &e))?;
        Ok(body)
    }

    /// GET a URL with query parameters and return the body as text.
    #[tracing::instrument(skip(self, query))]
    pub async fn get_text_with_query(&self, url: &str, query: &[(&str, &str)]) -> Result<String> {
        debug!("GET {} with query {:?}", url, query);
        let response = self
            .client
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|e| download_failure(url, &e))?;
        let response = check_status(url, response)?;
        let body = response.text().await.map_err(|e| download_failure(url, &e))?;
        Ok(body)
    }

    /// Streams a URL into the writer returned by `create_writer`.
    /// The writer is only created once the server answered with success.
    #[tracing::instrument(skip(self, create_writer))]
    pub async fn download_file<W, F>(&self, url: &str, create_writer: F) -> Result<u64>
    where
        W: Write,
        F: FnOnce() -> Result<W>,
    {
        debug!("Downloading file from {}...", url);

        let mut response = self.send(url).await?;
        let mut writer = create_writer()?;
        let mut downloaded_bytes: u64 = 0;

        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| download_failure(url, &e))?
        {
            writer
                .write_all(&chunk)
                .context("Failed to write chunk to file")?;
            downloaded_bytes += chunk.len() as u64;
        }
        writer.flush().context("Failed to flush downloaded file")?;

        debug!(
            "Downloaded {:.2} MB",
            downloaded_bytes as f64 / (1024.0 * 1024.0)
        );

        Ok(downloaded_bytes)
    }

    async fn send(&self, url: &str) -> Result<Response> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| download_failure(url, &e))?;
        check_status(url, response)
    }
}

fn check_status(url: &str, response: Response) -> Result<Response> {
    let status = response.status();
    if !status.is_success() {
        return Err(InstallError::DownloadFailure {
            url: url.to_string(),
            reason: format!("HTTP {}", status),
        }
        .into());
    }
    Ok(response)
}

fn download_failure(url: &str, error: &reqwest::Error) -> anyhow::Error {
    InstallError::DownloadFailure {
        url: url.to_string(),
        reason: error.to_string(),
    }
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_get_text_success() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/cli-versions.json")
            .with_status(200)
            .with_body(r#"{"cli-latest":"2.0.0"}"#)
            .create_async()
            .await;

        let client = HttpClient::new(Client::new());
        let body = client
            .get_text(&format!("{}/cli-versions.json", server.url()))
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(body, r#"{"cli-latest":"2.0.0"}"#);
    }

    #[tokio::test]
    async fn test_get_text_with_query() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/cli-versions.json?t=42")
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;

        let client = HttpClient::new(Client::new());
        let body = client
            .get_text_with_query(&format!("{}/cli-versions.json", server.url()), &[("t", "42")])
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(body, "{}");
    }

    #[tokio::test]
    async fn test_not_found_is_download_failure_without_retry() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/missing")
            .with_status(404)
            .expect(1)
            .create_async()
            .await;

        let client = HttpClient::new(Client::new());
        let url = format!("{}/missing", server.url());
        let err = client.get_text(&url).await.unwrap_err();

        mock.assert_async().await;
        match err.downcast_ref::<InstallError>() {
            Some(InstallError::DownloadFailure { url: failed, reason }) => {
                assert_eq!(failed, &url);
                assert!(reason.contains("404"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_download_file_success() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/kuzco")
            .with_status(200)
            .with_body("binary content")
            .create_async()
            .await;

        let client = HttpClient::new(Client::new());
        let bytes = client
            .download_file(&format!("{}/kuzco", server.url()), || Ok(std::io::sink()))
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(bytes, 14);
    }

    #[tokio::test]
    async fn test_download_file_error_does_not_create_writer() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/kuzco")
            .with_status(500)
            .create_async()
            .await;

        let client = HttpClient::new(Client::new());
        let result = client
            .download_file(&format!("{}/kuzco", server.url()), || -> Result<std::io::Sink> {
                panic!("writer must not be created for a failed response")
            })
            .await;

        mock.assert_async().await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_transport_failure() {
        let client = HttpClient::new(Client::new());
        let err = client
            .get_text("http://127.0.0.1:9/unreachable")
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<InstallError>(),
            Some(InstallError::DownloadFailure { .. })
        ));
    }
}
