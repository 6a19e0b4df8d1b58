use anyhow::Result;
use clap::Parser;
use kuzco_install::config::Config;
use kuzco_install::install::{InstallOptions, PlanRequest, install, plan};
use kuzco_install::runtime::RealRuntime;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// kuzco-install - installer for the kuzco CLI
///
/// Detects the platform, downloads the matching kuzco binaries and, on
/// Linux, the shared libraries and optional GPU drivers.
///
/// Endpoints come from KUZCO_BASE_URL, BUCKET_URL, WEB_URL and API_URL.
/// Set DEBUG_MODE=1 for verbose output.
///
/// Examples:
///   sudo kuzco-install install     # Install into /usr/local/bin
///   kuzco-install install --user   # Install into ~/.local/bin
#[derive(Parser, Debug)]
#[command(author, version = env!("KUZCO_INSTALL_VERSION"), about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Install this version instead of the latest (also via CLI_VERSION)
    #[arg(long = "cli-version", value_name = "VERSION", global = true)]
    cli_version: Option<String>,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Download and install kuzco
    Install(InstallArgs),

    /// Print the resolved install plan as JSON without installing anything
    Plan(PlanArgs),
}

#[derive(clap::Args, Debug)]
pub struct InstallArgs {
    /// Install into this directory instead of searching PATH
    #[arg(long = "bin-dir", value_name = "PATH", conflicts_with = "user")]
    pub bin_dir: Option<PathBuf>,

    /// Install into ~/.local/bin or ~/bin, no root required
    #[arg(long)]
    pub user: bool,

    /// Do not detect or install GPU drivers
    #[arg(long = "skip-drivers")]
    pub skip_drivers: bool,

    /// Install GPU drivers without asking
    #[arg(long, short = 'y')]
    pub yes: bool,
}

#[derive(clap::Args, Debug)]
pub struct PlanArgs {
    /// Kernel name as printed by `uname -s` (default: this host)
    #[arg(long, value_name = "NAME")]
    pub os: Option<String>,

    /// Machine architecture as printed by `uname -m` (default: this host)
    #[arg(long, value_name = "ARCH")]
    pub arch: Option<String>,

    /// Kernel release as printed by `uname -r` (default: this host)
    #[arg(long = "kernel-release", value_name = "RELEASE")]
    pub kernel_release: Option<String>,

    /// Include GPU detection and the driver plan
    #[arg(long)]
    pub drivers: bool,
}

impl From<InstallArgs> for InstallOptions {
    fn from(args: InstallArgs) -> Self {
        Self {
            bin_dir: args.bin_dir,
            user: args.user,
            skip_drivers: args.skip_drivers,
            yes: args.yes,
        }
    }
}

impl From<PlanArgs> for PlanRequest {
    fn from(args: PlanArgs) -> Self {
        Self {
            os: args.os,
            arch: args.arch,
            kernel_release: args.kernel_release,
            drivers: args.drivers,
        }
    }
}

/// `RUST_LOG` wins. Otherwise warnings only, or debug with span output
/// when DEBUG_MODE is set.
fn init_logging(debug: bool) {
    if debug {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")),
            )
            .with_writer(std::io::stderr)
            .try_init();
    } else {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let runtime = RealRuntime;
    let config = Config::from_env(&runtime).with_cli_version(cli.cli_version);
    init_logging(config.debug);

    match cli.command {
        Commands::Install(args) => install(runtime, config, args.into()).await?,
        Commands::Plan(args) => plan(runtime, config, args.into()).await?,
    }
    Ok(())
}
