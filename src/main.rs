use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use datalab_provisioning::app::{handle_fatal_error, init_logging, AppConfig};
use datalab_provisioning::command::{redact_command, CommandParser};
use datalab_provisioning::config::{ConfigLoader, ProvisioningConfig};
use datalab_provisioning::listener::RegistrationState;
use datalab_provisioning::Error;
use datalab_provisioning::service::{
    BackupRequest, ProvisioningRequest, ProvisioningService, Submission,
};

/// Run DataLab provisioning containers and report their results
#[derive(Parser)]
#[command(name = "datalab-provisioning", version)]
#[command(about = "Run DataLab provisioning containers and report their results", long_about = None)]
struct Cli {
    /// Enable verbose output (-v for debug, -vv for trace, -vvv for all)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Path to provisioning.toml
    #[arg(short = 'c', long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit a request, wait for its response file and report the status
    Run {
        /// Request JSON file
        request: PathBuf,

        /// Fake the container instead of running docker
        #[arg(long)]
        mock: bool,

        /// Seconds to wait for the response file
        #[arg(long)]
        timeout: Option<u64>,
    },
    /// Run a backup and report its result
    Backup {
        /// Backup request JSON file
        request: PathBuf,

        #[arg(long)]
        mock: bool,
    },
    /// Print the command a request would run, credentials masked
    Build {
        /// Request JSON file
        request: PathBuf,

        #[arg(long, default_value = "00000000-0000-0000-0000-000000000000")]
        request_id: String,
    },
    /// Parse a provisioning command line and print what it contains as JSON
    Parse {
        /// Full command line, quoted as one argument
        command: String,

        /// Request id used when the command carries none
        #[arg(long, default_value = "")]
        request_id: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let app = AppConfig::new(cli.verbose).with_config_path(cli.config.clone());
    init_logging(&app);

    let result = match cli.command {
        Commands::Run {
            request,
            mock,
            timeout,
        } => run_request(&app, &request, mock, timeout).await,
        Commands::Backup { request, mock } => run_backup(&app, &request, mock).await,
        Commands::Build {
            request,
            request_id,
        } => build_command(&app, &request, &request_id).await,
        Commands::Parse {
            command,
            request_id,
        } => parse_command(&command, &request_id),
    };

    if let Err(e) = result {
        handle_fatal_error(e, cli.verbose);
    }
}

async fn load_config(app: &AppConfig, mock: bool) -> anyhow::Result<ProvisioningConfig> {
    let loader = ConfigLoader::new(app.config_path.as_deref());
    let mut config = loader.load().await.map_err(Error::from)?;
    if mock {
        config.mock.enabled = true;
    }
    Ok(config)
}

async fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let value = serde_json::from_str(&content)
        .with_context(|| format!("Invalid request in {}", path.display()))?;
    Ok(value)
}

async fn run_request(
    app: &AppConfig,
    path: &Path,
    mock: bool,
    timeout: Option<u64>,
) -> anyhow::Result<()> {
    let config = load_config(app, mock).await?;
    let mut request: ProvisioningRequest = read_json(path).await?;
    if let Some(secs) = timeout {
        request.timeout = Some(Duration::from_secs(secs));
    }

    let service = ProvisioningService::from_config(config)?;
    let submission = service.submit(&request)?;
    println!("{}", submission.request_id);

    wait_for(&service, submission).await
}

async fn run_backup(app: &AppConfig, path: &Path, mock: bool) -> anyhow::Result<()> {
    let config = load_config(app, mock).await?;
    let request: BackupRequest = read_json(path).await?;

    let service = ProvisioningService::from_config(config)?;
    let submission = service.submit_backup(&request)?;
    println!("{}", submission.request_id);

    wait_for(&service, submission).await
}

async fn wait_for(service: &ProvisioningService, mut submission: Submission) -> anyhow::Result<()> {
    let state = tokio::select! {
        state = submission.handle.wait() => state,
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted, cancelling request {}", submission.request_id);
            service.cancel_and_wait(&mut submission).await
        }
    };
    service.shutdown();

    info!("Request {} finished: {:?}", submission.request_id, state);
    match state {
        RegistrationState::Delivered => Ok(()),
        other => anyhow::bail!("Request {} ended as {:?}", submission.request_id, other),
    }
}

async fn build_command(app: &AppConfig, path: &Path, request_id: &str) -> anyhow::Result<()> {
    let config = load_config(app, false).await?;
    let request: ProvisioningRequest = read_json(path).await?;

    let service = ProvisioningService::from_config(config)?;
    let command = service
        .build_command(&request, request_id)
        .map_err(Error::from)?;
    println!("{}", redact_command(&command));
    Ok(())
}

fn parse_command(command: &str, request_id: &str) -> anyhow::Result<()> {
    let parsed = CommandParser::parse(command, request_id).map_err(Error::from)?;
    println!("{}", serde_json::to_string_pretty(&parsed)?);
    Ok(())
}
