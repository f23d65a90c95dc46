use std::io;
use std::time::Duration;

use thiserror::Error;

/// Errors produced while parsing or validating the session header frame.
#[derive(Debug, Error)]
pub enum HeaderError {
    #[error("file name may not contain the header delimiter byte")]
    DelimiterInName,

    #[error("no header delimiter within the bounded read window")]
    Undelimited,

    #[error("connection closed before the header completed")]
    Truncated,

    #[error("malformed header record: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("declared size {size} bytes exceeds the configured maximum of {max}")]
    Oversized { size: u64, max: u64 },

    #[error("unusable file name in header: {0:?}")]
    InvalidFileName(String),

    #[error("initialization vector is not 16 hex-encoded bytes")]
    BadIv,
}

/// Integrity failures detected after the data frame has been consumed.
#[derive(Debug, Error)]
pub enum IntegrityError {
    #[error(
        "expected {expected_size} bytes (sha256 {expected_checksum}), \
         got {actual_size} bytes (sha256 {actual_checksum})"
    )]
    Mismatch {
        expected_size: u64,
        actual_size: u64,
        expected_checksum: String,
        actual_checksum: String,
    },

    #[error("receiver reported an integrity failure (control byte {0:#04x})")]
    Nack(u8),
}

/// Top-level error type for a transfer session. Every failure is terminal
/// for the session; nothing is retried.
#[derive(Debug, Error)]
pub enum TransferError {
    #[error("invalid header: {0}")]
    Header(#[from] HeaderError),

    #[error("file i/o error: {0}")]
    Io(#[source] io::Error),

    #[error("network error: {0}")]
    Network(#[source] io::Error),

    #[error("receiver did not acknowledge within {0:?}")]
    AckTimeout(Duration),

    #[error("integrity check failed: {0}")]
    Integrity(#[from] IntegrityError),

    #[error("transfer cancelled before completion")]
    Cancelled,
}

/// Errors from the mDNS discovery layer. These propagate back to the
/// owning command instead of terminating the process from a background
/// task.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("mdns failure: {0}")]
    Mdns(#[from] mdns_sd::Error),

    #[error("no sender found on the local network within {0:?}")]
    NoPeerFound(Duration),
}
