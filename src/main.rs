use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use chirp_gateway::{Config, GatewayServer};

/// Chirp - real-time audio relay gateway for conversational voice toys
#[derive(Parser)]
#[command(name = "chirp", version, about)]
struct Cli {
    /// Address to listen on
    #[arg(long, env = "CHIRP_HOST")]
    host: Option<String>,

    /// Port to listen on
    #[arg(short, long, env = "CHIRP_PORT")]
    port: Option<u16>,

    /// Directory for utterance capture files
    #[arg(long, env = "CHIRP_CAPTURE_DIR")]
    capture_dir: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,chirp_gateway=info",
        1 => "info,chirp_gateway=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = Config::load()?;

    if let Some(host) = cli.host {
        config.server.host = host;
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if let Some(dir) = cli.capture_dir {
        config.capture_dir = dir;
    }

    GatewayServer::new(config)?.run().await?;
    Ok(())
}
