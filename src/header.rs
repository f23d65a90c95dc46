use std::path::Path;

use log::debug;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::sync::CancellationToken;

use crate::error::{HeaderError, TransferError};
use crate::{CHUNK_SIZE, IV_SIZE};

/// Byte terminating the header frame. Not permitted inside `file_name`.
pub const DELIMITER: u8 = b'\n';

/// Upper bound on the header frame; decoding gives up past this point so a
/// peer cannot make us buffer an unbounded "header".
pub const MAX_HEADER_LEN: usize = 4096;

/// Session metadata exchanged before any ciphertext.
///
/// The sender fills every field; the receiver treats all of them as
/// untrusted input until validated by [`decode`].
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Metadata {
    pub file_name: String,
    pub size: u64,
    pub checksum: String,
    pub iv: String,
}

impl Metadata {
    /// Decode the hex IV field into raw bytes.
    pub fn iv_bytes(&self) -> Result<[u8; IV_SIZE], HeaderError> {
        let raw = hex::decode(&self.iv).map_err(|_| HeaderError::BadIv)?;
        raw.try_into().map_err(|_| HeaderError::BadIv)
    }
}

/// Serialize metadata into one self-delimited header frame.
pub fn encode(meta: &Metadata) -> Result<Vec<u8>, HeaderError> {
    if meta.file_name.as_bytes().contains(&DELIMITER) {
        return Err(HeaderError::DelimiterInName);
    }
    let mut frame = serde_json::to_vec(meta)?;
    frame.push(DELIMITER);
    Ok(frame)
}

/// Read and validate one header frame from the stream.
///
/// Reads a byte at a time so that no ciphertext past the delimiter is ever
/// consumed. This is the only place the receiver trusts peer-controlled
/// record length, and the read is bounded at [`MAX_HEADER_LEN`].
pub async fn decode<R>(reader: &mut R, max_size: u64) -> Result<Metadata, TransferError>
where
    R: AsyncRead + Unpin,
{
    let mut record = Vec::with_capacity(256);
    loop {
        let byte = match reader.read_u8().await {
            Ok(byte) => byte,
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                return Err(HeaderError::Truncated.into());
            }
            Err(e) => return Err(TransferError::Network(e)),
        };
        if byte == DELIMITER {
            break;
        }
        record.push(byte);
        if record.len() >= MAX_HEADER_LEN {
            return Err(HeaderError::Undelimited.into());
        }
    }

    let meta: Metadata = serde_json::from_slice(&record).map_err(HeaderError::Malformed)?;
    debug!(
        "decoded header: {} ({} bytes declared)",
        meta.file_name, meta.size
    );

    if meta.size > max_size {
        return Err(HeaderError::Oversized {
            size: meta.size,
            max: max_size,
        }
        .into());
    }
    validate_file_name(&meta.file_name)?;
    meta.iv_bytes()?;

    Ok(meta)
}

/// The destination name comes straight off the wire, so it must be a bare
/// file name that cannot escape the output directory.
fn validate_file_name(name: &str) -> Result<(), HeaderError> {
    let reject = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains('/')
        || name.contains('\\')
        || name.contains('\0')
        || name.as_bytes().contains(&DELIMITER);
    if reject {
        return Err(HeaderError::InvalidFileName(name.to_string()));
    }
    Ok(())
}

/// Pre-calculate the plaintext hash so it can be sent in the header.
///
/// One chunked read pass; the cancellation token is checked between chunks
/// so a Ctrl-C does not have to wait for a large file to finish hashing.
pub async fn hash_file(path: &Path, cancel: &CancellationToken) -> Result<String, TransferError> {
    let mut file = File::open(path).await.map_err(TransferError::Io)?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; CHUNK_SIZE];

    loop {
        if cancel.is_cancelled() {
            return Err(TransferError::Cancelled);
        }
        let n = file.read(&mut buf).await.map_err(TransferError::Io)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HeaderError;

    fn sample_metadata() -> Metadata {
        Metadata {
            file_name: "report.pdf".to_string(),
            size: 4096,
            checksum: hex::encode([0xAB; 32]),
            iv: hex::encode([0x01; IV_SIZE]),
        }
    }

    #[tokio::test]
    async fn test_encode_decode_roundtrip() {
        let meta = sample_metadata();
        let frame = encode(&meta).expect("Should encode");
        assert_eq!(*frame.last().unwrap(), DELIMITER);

        let mut reader = frame.as_slice();
        let decoded = decode(&mut reader, u64::MAX).await.expect("Should decode");
        assert_eq!(decoded, meta);
    }

    #[tokio::test]
    async fn test_decode_leaves_trailing_bytes_unread() {
        let meta = sample_metadata();
        let mut frame = encode(&meta).unwrap();
        frame.extend_from_slice(b"ciphertext follows");

        let mut reader = frame.as_slice();
        decode(&mut reader, u64::MAX).await.expect("Should decode");
        // Everything after the delimiter must still be available
        assert_eq!(reader, b"ciphertext follows");
    }

    #[test]
    fn test_encode_rejects_delimiter_in_file_name() {
        let mut meta = sample_metadata();
        meta.file_name = "two\nlines".to_string();
        let err = encode(&meta).unwrap_err();
        assert!(matches!(err, HeaderError::DelimiterInName));
    }

    #[tokio::test]
    async fn test_decode_rejects_undelimited_header() {
        let junk = vec![b'{'; MAX_HEADER_LEN + 100];
        let mut reader = junk.as_slice();
        let err = decode(&mut reader, u64::MAX).await.unwrap_err();
        assert!(matches!(
            err,
            TransferError::Header(HeaderError::Undelimited)
        ));
    }

    #[tokio::test]
    async fn test_decode_rejects_truncated_header() {
        let mut reader = &b"{\"file_name\":\"x\""[..];
        let err = decode(&mut reader, u64::MAX).await.unwrap_err();
        assert!(matches!(err, TransferError::Header(HeaderError::Truncated)));
    }

    #[tokio::test]
    async fn test_decode_rejects_malformed_record() {
        let mut reader = &b"not json at all\n"[..];
        let err = decode(&mut reader, u64::MAX).await.unwrap_err();
        assert!(matches!(
            err,
            TransferError::Header(HeaderError::Malformed(_))
        ));
    }

    #[tokio::test]
    async fn test_decode_rejects_oversized_declaration() {
        let mut meta = sample_metadata();
        meta.size = 1_000_000;
        let frame = encode(&meta).unwrap();

        let mut reader = frame.as_slice();
        let err = decode(&mut reader, 1024).await.unwrap_err();
        assert!(matches!(
            err,
            TransferError::Header(HeaderError::Oversized {
                size: 1_000_000,
                max: 1024
            })
        ));
    }

    #[tokio::test]
    async fn test_decode_rejects_path_traversal_names() {
        for name in ["../escape", "dir/inner.txt", "..", "", "nul\0byte"] {
            let mut meta = sample_metadata();
            meta.file_name = name.to_string();
            let frame = serde_json::to_vec(&meta)
                .map(|mut f| {
                    f.push(DELIMITER);
                    f
                })
                .unwrap();

            let mut reader = frame.as_slice();
            let err = decode(&mut reader, u64::MAX).await.unwrap_err();
            assert!(
                matches!(
                    err,
                    TransferError::Header(HeaderError::InvalidFileName(_))
                ),
                "name {:?} should be rejected",
                name
            );
        }
    }

    #[tokio::test]
    async fn test_decode_rejects_bad_iv() {
        let mut meta = sample_metadata();
        meta.iv = "deadbeef".to_string(); // too short
        let frame = encode(&meta).unwrap();

        let mut reader = frame.as_slice();
        let err = decode(&mut reader, u64::MAX).await.unwrap_err();
        assert!(matches!(err, TransferError::Header(HeaderError::BadIv)));
    }

    #[tokio::test]
    async fn test_hash_file_matches_known_digest() {
        use std::io::Write;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hashed.bin");
        std::fs::File::create(&path)
            .unwrap()
            .write_all(b"hello world")
            .unwrap();

        let digest = hash_file(&path, &CancellationToken::new())
            .await
            .expect("Should hash");
        assert_eq!(
            digest,
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[tokio::test]
    async fn test_hash_file_honors_cancellation() {
        use std::io::Write;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cancelled.bin");
        std::fs::File::create(&path)
            .unwrap()
            .write_all(&[0u8; 1024])
            .unwrap();

        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = hash_file(&path, &cancel).await.unwrap_err();
        assert!(matches!(err, TransferError::Cancelled));
    }
}
