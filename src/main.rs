use clap::{Parser, Subcommand};
use std::error::Error;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "lantunnel")]
#[command(about = "Encrypted point-to-point file transfer over the local network", long_about = None)]
#[command(version)]
struct Cli {
    /// Enable per-chunk transfer logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Shared secret used to derive the session key
    #[arg(short, long, global = true, default_value = "lantunnel-dev-secret")]
    secret: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Send a file to a peer on the local network
    Send {
        /// Path to the file to send
        file_path: String,
    },
    /// Discover a sender and receive its file
    Receive,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    // Configure logging based on verbose flag
    if cli.verbose {
        env_logger::Builder::from_default_env()
            .filter_level(log::LevelFilter::Debug)
            .init();
        log::info!("Verbose logging enabled");
    } else {
        env_logger::Builder::from_default_env()
            .filter_level(log::LevelFilter::Info)
            .init();
    }

    // One process-wide cancellation token, fired by Ctrl-C. Every blocking
    // step of the active session races against it.
    let cancel = CancellationToken::new();
    let signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            signal.cancel();
        }
    });

    match cli.command {
        Commands::Send { file_path } => {
            lantunnel::commands::send::run(&file_path, &cli.secret, cancel).await?;
        }
        Commands::Receive => {
            lantunnel::commands::receive::run(&cli.secret, cancel).await?;
        }
    }

    Ok(())
}
