//! Crypto primitives (C1): key derivation, content/path hashing, and the
//! compress-then-authenticated-encrypt `seal`/`open` pair.
//!
//! The AEAD construction is ChaCha20-Poly1305 with a fresh random 96-bit
//! nonce prepended to the ciphertext.

use std::io::{Read, Write};

use chacha20poly1305::aead::{Aead, AeadCore, KeyInit, OsRng};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use sha2::{Digest, Sha224, Sha256};

use crate::error::{CoreError, CoreResult};

const NONCE_LEN: usize = 12;

/// 256-bit symmetric key used for both shard-member and catalog-snapshot
/// sealing. Zeroized on drop since it is derived from the user's passphrase.
#[derive(Clone)]
pub struct VaultKey(pub [u8; 32]);

impl Drop for VaultKey {
    fn drop(&mut self) {
        use zeroize::Zeroize;
        self.0.zeroize();
    }
}

/// How the AEAD key is derived from the user's passphrase.
///
/// `Legacy` matches the original unsalted, single-round derivation
/// byte-for-byte, so data already sealed under it keeps opening. New
/// configurations should prefer `Argon2idSalted`; existing ones are never
/// silently migrated.
pub enum KeyDerivation {
    Legacy,
    Argon2idSalted { salt: [u8; 16] },
}

impl KeyDerivation {
    pub fn derive(&self, passphrase: &str) -> VaultKey {
        match self {
            KeyDerivation::Legacy => derive_key_legacy(passphrase),
            KeyDerivation::Argon2idSalted { salt } => derive_key_argon2id(passphrase, salt),
        }
    }
}

/// `key = SHA-256(passphrase)`. Deterministic, unsalted, no work factor —
/// kept only for compatibility with data already sealed under it.
fn derive_key_legacy(passphrase: &str) -> VaultKey {
    let mut hasher = Sha256::new();
    hasher.update(passphrase.as_bytes());
    let digest = hasher.finalize();
    let mut key = [0u8; 32];
    key.copy_from_slice(&digest);
    VaultKey(key)
}

fn derive_key_argon2id(passphrase: &str, salt: &[u8; 16]) -> VaultKey {
    use argon2::{Algorithm, Argon2, Params, Version};

    let params = Params::new(19_456, 2, 1, Some(32)).expect("valid argon2id params");
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);
    let mut key = [0u8; 32];
    argon2
        .hash_password_into(passphrase.as_bytes(), salt, &mut key)
        .expect("argon2id key derivation cannot fail for fixed-size output");
    VaultKey(key)
}

/// SHA-224 hex digest of a path, used as the opaque server-visible object
/// name (filename obfuscation). Deterministic: `hash_path(p)` is a pure
/// function of `p`.
pub fn hash_path(path: &str) -> String {
    let mut hasher = Sha224::new();
    hasher.update(path.as_bytes());
    hex::encode(hasher.finalize())
}

/// SHA-256 hex digest of a byte stream, used for change detection and
/// version identity.
pub fn hash_content(mut reader: impl Read) -> CoreResult<String> {
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = reader
            .read(&mut buf)
            .map_err(|e| CoreError::Crypto(format!("failed to read content for hashing: {e}")))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Gzip-compresses `plaintext`, then authenticated-encrypts it under `key`
/// with a fresh random 96-bit nonce prepended to the returned bytes.
pub fn seal(plaintext: &[u8], key: &VaultKey) -> CoreResult<Vec<u8>> {
    let compressed = gzip_compress(plaintext)?;

    let cipher = ChaCha20Poly1305::new(Key::from_slice(&key.0));
    let nonce = ChaCha20Poly1305::generate_nonce(&mut OsRng);
    let ciphertext = cipher
        .encrypt(&nonce, compressed.as_ref())
        .map_err(|e| CoreError::Crypto(format!("seal failed: {e}")))?;

    let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    sealed.extend_from_slice(&nonce);
    sealed.extend_from_slice(&ciphertext);
    Ok(sealed)
}

/// Inverse of [`seal`]: authenticated-decrypt then gunzip. Fails with
/// [`CoreError::Integrity`] on tag mismatch, truncated input, or key
/// mismatch.
pub fn open(sealed: &[u8], key: &VaultKey) -> CoreResult<Vec<u8>> {
    if sealed.len() < NONCE_LEN {
        return Err(CoreError::Integrity(format!(
            "sealed blob too short for nonce: {} bytes",
            sealed.len()
        )));
    }
    let (nonce_bytes, ciphertext) = sealed.split_at(NONCE_LEN);
    let nonce = Nonce::from_slice(nonce_bytes);

    let cipher = ChaCha20Poly1305::new(Key::from_slice(&key.0));
    let compressed = cipher
        .decrypt(nonce, ciphertext)
        .map_err(|_| CoreError::Integrity("authenticated decryption failed".to_string()))?;

    gzip_decompress(&compressed)
}

fn gzip_compress(data: &[u8]) -> CoreResult<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(data)
        .map_err(|e| CoreError::Crypto(format!("gzip compression failed: {e}")))?;
    encoder
        .finish()
        .map_err(|e| CoreError::Crypto(format!("gzip compression failed: {e}")))
}

fn gzip_decompress(data: &[u8]) -> CoreResult<Vec<u8>> {
    let mut decoder = GzDecoder::new(data);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|_| CoreError::Integrity("gzip decompression failed".to_string()))?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_arbitrary_bytes() {
        let key = KeyDerivation::Legacy.derive("pw");
        for sample in [&b""[..], b"hello", &vec![7u8; 10_000]] {
            let sealed = seal(sample, &key).unwrap();
            let opened = open(&sealed, &key).unwrap();
            assert_eq!(opened, sample);
        }
    }

    #[test]
    fn open_fails_on_wrong_key() {
        let key_a = KeyDerivation::Legacy.derive("pw-a");
        let key_b = KeyDerivation::Legacy.derive("pw-b");
        let sealed = seal(b"secret", &key_a).unwrap();
        assert!(open(&sealed, &key_b).is_err());
    }

    #[test]
    fn open_fails_on_truncated_input() {
        let key = KeyDerivation::Legacy.derive("pw");
        assert!(open(&[0u8; 4], &key).is_err());
    }

    #[test]
    fn derive_key_is_deterministic() {
        let k1 = KeyDerivation::Legacy.derive("same passphrase");
        let k2 = KeyDerivation::Legacy.derive("same passphrase");
        assert_eq!(k1.0, k2.0);
    }

    #[test]
    fn hash_path_is_a_pure_function() {
        assert_eq!(hash_path("/data/a.txt"), hash_path("/data/a.txt"));
        assert_eq!(hash_path("/data/a.txt").len(), 56);
    }

    #[test]
    fn hash_content_matches_known_digest() {
        let digest = hash_content(&b"hello"[..]).unwrap();
        assert_eq!(
            digest,
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }
}
