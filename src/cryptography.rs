use aes::Aes256;
use ctr::cipher::{KeyIvInit, StreamCipher};
use ctr::Ctr128BE;
use hkdf::Hkdf;
use rand::Rng;
use sha2::Sha256;

use crate::{IV_SIZE, KEY_SIZE};

type Aes256Ctr = Ctr128BE<Aes256>;

/// Incremental keystream transform over AES-256-CTR.
///
/// Encryption and decryption are the same XOR operation, so sender and
/// receiver both construct one of these from the shared key and the
/// session IV carried in the header. The counter state advances with every
/// call, which means callers can feed chunks of any size in any split and
/// still produce a byte-identical keystream on both ends.
pub struct CipherStream {
    inner: Aes256Ctr,
}

impl CipherStream {
    pub fn new(key: &[u8; KEY_SIZE], iv: &[u8; IV_SIZE]) -> Self {
        Self {
            inner: Aes256Ctr::new(key.into(), iv.into()),
        }
    }

    /// XOR the next stretch of keystream into `buf` in place.
    pub fn apply(&mut self, buf: &mut [u8]) {
        self.inner.apply_keystream(buf);
    }
}

/// Generate a fresh random IV for one session. The IV travels to the peer
/// inside the header, so no two sessions ever share a keystream.
pub fn generate_iv() -> [u8; IV_SIZE] {
    rand::rng().random()
}

/// Derive the 32-byte session key from the shared secret.
pub fn derive_key(secret: &str) -> [u8; KEY_SIZE] {
    let hkdf = Hkdf::<Sha256>::new(None, secret.as_bytes());
    let mut key = [0u8; KEY_SIZE];
    hkdf.expand(b"lantunnel-session-key", &mut key)
        .expect("32 bytes is a valid length for HKDF");
    key
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_roundtrip() {
        let key = derive_key("test secret");
        let iv = generate_iv();
        let plaintext = b"some bytes worth protecting".to_vec();

        let mut buf = plaintext.clone();
        CipherStream::new(&key, &iv).apply(&mut buf);
        assert_ne!(buf, plaintext);

        // Decryption is the identical operation
        CipherStream::new(&key, &iv).apply(&mut buf);
        assert_eq!(buf, plaintext);
    }

    #[test]
    fn test_chunk_boundaries_do_not_matter() {
        let key = derive_key("boundary test");
        let iv = [7u8; IV_SIZE];
        let data = vec![0x5Au8; 10_000];

        // Whole-buffer transform
        let mut whole = data.clone();
        CipherStream::new(&key, &iv).apply(&mut whole);

        // Same transform fed in deliberately awkward chunk sizes
        let mut pieces = data.clone();
        let mut stream = CipherStream::new(&key, &iv);
        let mut offset = 0;
        for chunk_len in [1usize, 15, 16, 17, 1000, 4096].iter().cycle() {
            if offset >= pieces.len() {
                break;
            }
            let end = (offset + chunk_len).min(pieces.len());
            stream.apply(&mut pieces[offset..end]);
            offset = end;
        }

        assert_eq!(whole, pieces);
    }

    #[test]
    fn test_distinct_ivs_produce_distinct_keystreams() {
        let key = derive_key("iv test");
        let data = vec![0u8; 64];

        let mut first = data.clone();
        CipherStream::new(&key, &[1u8; IV_SIZE]).apply(&mut first);

        let mut second = data.clone();
        CipherStream::new(&key, &[2u8; IV_SIZE]).apply(&mut second);

        assert_ne!(first, second);
    }

    #[test]
    fn test_derive_key_is_deterministic() {
        assert_eq!(derive_key("passphrase"), derive_key("passphrase"));
        assert_ne!(derive_key("passphrase"), derive_key("other"));
    }

    #[test]
    fn test_generate_iv_varies() {
        // Two fresh IVs colliding would mean a broken RNG
        assert_ne!(generate_iv(), generate_iv());
    }
}
