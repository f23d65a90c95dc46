use std::error::Error;
use std::path::Path;

use log::{debug, info};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::cryptography::derive_key;
use crate::discovery;
use crate::transfer::{send_file, TransferConfig};
use crate::DEFAULT_PORT;

/// Function handler to kick off sender logic:
///     - Validate the input path
///     - Advertise this peer over mDNS
///     - Accept one receiver connection (raced against Ctrl-C)
///     - Hand the connection to the transfer engine
pub async fn run(
    file_path: &str,
    secret: &str,
    cancel: CancellationToken,
) -> Result<(), Box<dyn Error>> {
    let path = Path::new(file_path);
    if !path.is_file() {
        return Err(format!("File does not exist at given path: {}", file_path).into());
    }

    let config = TransferConfig::new(derive_key(secret));

    // The advertisement stays registered until the daemon shuts down, so
    // receivers can find us for as long as we are willing to wait.
    let daemon = discovery::advertise(DEFAULT_PORT)?;
    let listener = TcpListener::bind(("0.0.0.0", DEFAULT_PORT)).await?;
    println!(
        "📦 Peer discovery active. Waiting for a receiver on port {}...",
        DEFAULT_PORT
    );

    let stream = tokio::select! {
        _ = cancel.cancelled() => {
            let _ = daemon.shutdown();
            println!("Cancelled while waiting for a receiver.");
            return Ok(());
        }
        accepted = listener.accept() => {
            let (stream, peer) = accepted?;
            info!("receiver connected from {}", peer);
            stream
        }
    };
    let _ = daemon.shutdown();

    debug!("starting transfer of {}", file_path);
    send_file(stream, path, &config, cancel).await?;

    println!("✅ Receiver confirmed receipt.");
    Ok(())
}
