use std::path::Path;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info};
use sha2::{Digest, Sha256};
use tokio::fs::{File, OpenOptions};
use tokio::io::{
    AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufWriter, ReadHalf, WriteHalf,
};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use crate::cancel::join_with_cancel;
use crate::cryptography::{generate_iv, CipherStream};
use crate::error::{HeaderError, IntegrityError, TransferError};
use crate::header::{self, Metadata};
use crate::{CHUNK_SIZE, IV_SIZE, KEY_SIZE};

/// Control byte the receiver sends after a verified transfer.
pub const ACK_OK: u8 = 1;
/// Control byte the receiver sends when size or digest do not match.
pub const ACK_CORRUPT: u8 = 0;

pub const DEFAULT_ACK_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_MAX_SIZE: u64 = 64 * 1024 * 1024 * 1024;

/// Per-session engine configuration. Key material arrives here as opaque
/// bytes; how it was derived or exchanged is the caller's concern.
#[derive(Debug, Clone)]
pub struct TransferConfig {
    pub key: [u8; KEY_SIZE],
    /// How long the sender waits for the receiver's verdict after the data
    /// frame. Verification of very large files may need extra headroom.
    pub ack_timeout: Duration,
    /// Largest declared size the receiver will accept in a header.
    pub max_size: u64,
}

impl TransferConfig {
    pub fn new(key: [u8; KEY_SIZE]) -> Self {
        Self {
            key,
            ack_timeout: DEFAULT_ACK_TIMEOUT,
            max_size: DEFAULT_MAX_SIZE,
        }
    }
}

/// Sender driver: hash the source file, send the header, stream ciphertext
/// on a worker raced against cancellation, then wait for the receiver's
/// single-byte verdict.
pub async fn send_file<S>(
    stream: S,
    path: &Path,
    config: &TransferConfig,
    cancel: CancellationToken,
) -> Result<(), TransferError>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let size = tokio::fs::metadata(path)
        .await
        .map_err(TransferError::Io)?
        .len();
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| HeaderError::InvalidFileName(path.display().to_string()))?
        .to_string();

    info!("hashing {} ({} bytes)", file_name, size);
    let checksum = header::hash_file(path, &cancel).await?;

    let iv = generate_iv();
    let meta = Metadata {
        file_name,
        size,
        checksum,
        iv: hex::encode(iv),
    };
    let frame = header::encode(&meta)?;

    let (mut read_half, mut write_half) = tokio::io::split(stream);

    // The header always goes out in full before any ciphertext.
    write_half
        .write_all(&frame)
        .await
        .map_err(TransferError::Network)?;
    debug!("header sent: {} bytes", frame.len());

    let file = File::open(path).await.map_err(TransferError::Io)?;
    let key = config.key;
    let worker = tokio::spawn(stream_ciphertext(file, write_half, key, iv, size));
    join_with_cancel(&cancel, worker).await?;

    // Block on the receiver's verdict so we never exit successfully while
    // it is still flushing and verifying. Bounded by the configured
    // timeout and raced against cancellation.
    let mut ack = [0u8; 1];
    tokio::select! {
        _ = cancel.cancelled() => Err(TransferError::Cancelled),
        read = timeout(config.ack_timeout, read_half.read_exact(&mut ack)) => match read {
            Err(_) => Err(TransferError::AckTimeout(config.ack_timeout)),
            Ok(Err(e)) => Err(TransferError::Network(e)),
            Ok(Ok(_)) if ack[0] == ACK_OK => {
                info!("receiver confirmed receipt");
                Ok(())
            }
            Ok(Ok(_)) => Err(IntegrityError::Nack(ack[0]).into()),
        },
    }
}

/// Receiver driver: decode the header, create the destination file, then
/// stream-decrypt and hash in one pass on a worker raced against
/// cancellation. The worker replies with the ACK/NACK byte itself, so a
/// cancelled session never reaches the verification path.
pub async fn receive_file<S>(
    stream: S,
    out_dir: &Path,
    config: &TransferConfig,
    cancel: CancellationToken,
) -> Result<Metadata, TransferError>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (mut read_half, write_half) = tokio::io::split(stream);

    let meta = header::decode(&mut read_half, config.max_size).await?;
    let iv = meta.iv_bytes()?;
    info!("receiving {} ({} bytes)", meta.file_name, meta.size);

    let dest = out_dir.join(&meta.file_name);
    let file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&dest)
        .await
        .map_err(TransferError::Io)?;

    let key = config.key;
    let worker = tokio::spawn(receive_ciphertext(
        read_half,
        write_half,
        file,
        key,
        iv,
        meta.clone(),
    ));
    join_with_cancel(&cancel, worker).await?;

    Ok(meta)
}

/// Read plaintext chunks, apply the keystream, and push ciphertext through
/// a buffered writer, flushing once the file is exhausted.
async fn stream_ciphertext<S>(
    mut file: File,
    write_half: WriteHalf<S>,
    key: [u8; KEY_SIZE],
    iv: [u8; IV_SIZE],
    size: u64,
) -> Result<(), TransferError>
where
    S: AsyncWrite,
{
    let mut cipher = CipherStream::new(&key, &iv);
    let mut writer = BufWriter::new(write_half);
    let bar = transfer_bar(size, "Sending");
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut sent: u64 = 0;

    loop {
        let n = file.read(&mut buf).await.map_err(TransferError::Io)?;
        if n == 0 {
            break;
        }
        cipher.apply(&mut buf[..n]);
        writer
            .write_all(&buf[..n])
            .await
            .map_err(TransferError::Network)?;
        sent += n as u64;
        debug!("sent chunk: {:<6} bytes | cumulative: {}", n, sent);
        bar.inc(n as u64);
    }

    writer.flush().await.map_err(TransferError::Network)?;
    bar.finish_with_message("Upload complete");
    debug!("bytes sent: {}", sent);
    Ok(())
}

/// Single read pass serving both destinations: every decrypted chunk goes
/// to the file and into the running hash, so verification needs no second
/// disk read. Ends with the durable flush, the verdict, and the control
/// byte.
async fn receive_ciphertext<S>(
    mut read_half: ReadHalf<S>,
    mut write_half: WriteHalf<S>,
    file: File,
    key: [u8; KEY_SIZE],
    iv: [u8; IV_SIZE],
    meta: Metadata,
) -> Result<(), TransferError>
where
    S: AsyncRead + AsyncWrite,
{
    let mut cipher = CipherStream::new(&key, &iv);
    let mut hasher = Sha256::new();
    let mut out = BufWriter::new(file);
    let bar = transfer_bar(meta.size, "Receiving");
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut written: u64 = 0;

    // Read exactly the declared ciphertext length and never past it, even
    // if the peer keeps sending.
    while written < meta.size {
        let want = CHUNK_SIZE.min((meta.size - written) as usize);
        let n = read_half
            .read(&mut buf[..want])
            .await
            .map_err(TransferError::Network)?;
        if n == 0 {
            // Peer closed early; verification below reports the deficit.
            break;
        }
        cipher.apply(&mut buf[..n]);
        hasher.update(&buf[..n]);
        out.write_all(&buf[..n]).await.map_err(TransferError::Io)?;
        written += n as u64;
        debug!("received chunk: {:<6} bytes | cumulative: {}", n, written);
        bar.inc(n as u64);
    }
    bar.finish();

    // Force the plaintext to physical storage before computing the verdict.
    out.flush().await.map_err(TransferError::Io)?;
    let file = out.into_inner();
    file.sync_all().await.map_err(TransferError::Io)?;

    let digest = hex::encode(hasher.finalize());
    if written == meta.size && digest == meta.checksum {
        write_half
            .write_all(&[ACK_OK])
            .await
            .map_err(TransferError::Network)?;
        info!("integrity verified: {} bytes", written);
        Ok(())
    } else {
        // Best-effort NACK; the mismatch is what we report even if the
        // peer is already gone. The partial file stays on disk.
        let _ = write_half.write_all(&[ACK_CORRUPT]).await;
        Err(IntegrityError::Mismatch {
            expected_size: meta.size,
            actual_size: written,
            expected_checksum: meta.checksum,
            actual_checksum: digest,
        }
        .into())
    }
}

fn transfer_bar(total: u64, msg: &'static str) -> ProgressBar {
    let bar = ProgressBar::new(total);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta}) {msg}")
            .unwrap(),
    );
    bar.set_message(msg);
    bar
}
