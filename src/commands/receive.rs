use std::error::Error;
use std::path::Path;

use log::debug;
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;

use crate::cryptography::derive_key;
use crate::discovery;
use crate::transfer::{receive_file, TransferConfig};

/// Function handler to kick off receiver logic:
///     - Discover an advertised sender over mDNS (raced against Ctrl-C)
///     - Dial the sender
///     - Hand the connection to the transfer engine
///     - The destination file name comes from the session header
pub async fn run(secret: &str, cancel: CancellationToken) -> Result<(), Box<dyn Error>> {
    let config = TransferConfig::new(derive_key(secret));

    println!("🔍 Searching for a sender on the local network...");
    let peer = tokio::select! {
        _ = cancel.cancelled() => {
            println!("Cancelled while searching for a sender.");
            return Ok(());
        }
        found = discovery::discover(discovery::DISCOVERY_TIMEOUT) => found?,
    };
    println!("✅ Sender found at {}", peer);

    let stream = TcpStream::connect(peer).await?;
    debug!("connected to {}", peer);

    let meta = receive_file(stream, Path::new("."), &config, cancel).await?;

    println!(
        "✅ File received and verified: {} ({} bytes)",
        meta.file_name, meta.size
    );
    Ok(())
}
