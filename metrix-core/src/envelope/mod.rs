// Copyright 2025 Sushanth (https://github.com/sushanthpy)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Transport envelope.
//!
//! Sender side: `plaintext -> hash(plaintext) -> gzip -> RSA`.
//! Receiver side: `RSA^-1 -> gunzip -> verify(plaintext)`.
//!
//! The hash always covers the uncompressed, unencrypted body. Every stage is
//! optional and enabled only by its key being configured.

pub mod compress;
pub mod crypto;
pub mod hash;

use serde::Serialize;

use crate::error::Result;
pub use crypto::{DecryptionKey, EncryptionKey};
pub use hash::HASH_HEADER;

fn non_empty(key: Option<String>) -> Option<String> {
    key.filter(|k| !k.is_empty())
}

/// A payload ready to go on the wire.
#[derive(Debug, Clone)]
pub struct SealedPayload {
    pub body: Vec<u8>,
    /// Value for the `HashSHA256` header, when a key is configured.
    pub hash: Option<String>,
}

/// Agent-side envelope configuration.
#[derive(Debug, Clone, Default)]
pub struct Sealer {
    hash_key: Option<String>,
    public_key: Option<EncryptionKey>,
}

impl Sealer {
    pub fn new(hash_key: Option<String>, public_key: Option<EncryptionKey>) -> Self {
        Self {
            hash_key: non_empty(hash_key),
            public_key,
        }
    }

    pub fn encrypts(&self) -> bool {
        self.public_key.is_some()
    }

    pub fn sign(&self, plaintext: &[u8]) -> Result<Option<String>> {
        self.hash_key
            .as_deref()
            .map(|key| hash::sign(key, plaintext))
            .transpose()
    }

    pub fn seal(&self, plaintext: &[u8]) -> Result<SealedPayload> {
        let hash = self.sign(plaintext)?;
        let mut body = compress::compress(plaintext)?;
        if let Some(key) = &self.public_key {
            body = key.encrypt(&body)?;
        }
        Ok(SealedPayload { body, hash })
    }

    pub fn seal_json<T: Serialize + ?Sized>(&self, value: &T) -> Result<SealedPayload> {
        self.seal(&serde_json::to_vec(value)?)
    }
}

/// Largest plaintext a gzip body may expand to, unless overridden.
pub const DEFAULT_MAX_PLAINTEXT: usize = 32 * 1024 * 1024;

/// Server-side envelope configuration.
#[derive(Debug, Clone)]
pub struct Opener {
    hash_key: Option<String>,
    private_key: Option<DecryptionKey>,
    max_plaintext: usize,
}

impl Default for Opener {
    fn default() -> Self {
        Self::new(None, None)
    }
}

impl Opener {
    pub fn new(hash_key: Option<String>, private_key: Option<DecryptionKey>) -> Self {
        Self {
            hash_key: non_empty(hash_key),
            private_key,
            max_plaintext: DEFAULT_MAX_PLAINTEXT,
        }
    }

    pub fn with_max_plaintext(mut self, limit: usize) -> Self {
        self.max_plaintext = limit;
        self
    }

    pub fn decrypts(&self) -> bool {
        self.private_key.is_some()
    }

    pub fn signs(&self) -> bool {
        self.hash_key.is_some()
    }

    pub fn decrypt(&self, body: &[u8]) -> Result<Vec<u8>> {
        match &self.private_key {
            Some(key) if !body.is_empty() => key.decrypt(body),
            _ => Ok(body.to_vec()),
        }
    }

    /// Checks `hash` against `plaintext`. Passes when either the key or the
    /// hash is absent.
    pub fn verify(&self, plaintext: &[u8], hash: Option<&str>) -> Result<()> {
        match (&self.hash_key, hash) {
            (Some(key), Some(expected)) => hash::verify(key, plaintext, expected),
            _ => Ok(()),
        }
    }

    pub fn sign(&self, payload: &[u8]) -> Result<Option<String>> {
        self.hash_key
            .as_deref()
            .map(|key| hash::sign(key, payload))
            .transpose()
    }

    /// Full receive path for a body that may be gzip encoded.
    pub fn open(&self, body: &[u8], gzipped: bool, hash: Option<&str>) -> Result<Vec<u8>> {
        let decrypted = self.decrypt(body)?;
        let plaintext = if gzipped {
            compress::decompress(&decrypted, self.max_plaintext)?
        } else {
            decrypted
        };
        self.verify(&plaintext, hash)?;
        Ok(plaintext)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MetrixError;
    use crate::metric::{Metric, MetricRecord};

    fn batch() -> Vec<MetricRecord> {
        vec![
            MetricRecord::from(Metric::gauge("Alloc", 123.0)),
            MetricRecord::from(Metric::counter("PollCount", 5)),
        ]
    }

    #[test]
    fn test_full_envelope_roundtrip() {
        let private = DecryptionKey::generate(1024).unwrap();
        let sealer = Sealer::new(Some("key1".into()), Some(private.public_key()));
        let opener = Opener::new(Some("key1".into()), Some(private));

        let sealed = sealer.seal_json(&batch()).unwrap();
        let plaintext = opener
            .open(&sealed.body, true, sealed.hash.as_deref())
            .unwrap();
        let decoded: Vec<MetricRecord> = serde_json::from_slice(&plaintext).unwrap();
        assert_eq!(decoded, batch());
    }

    #[test]
    fn test_hash_covers_plaintext() {
        let sealer = Sealer::new(Some("key1".into()), None);
        let plaintext = serde_json::to_vec(&batch()).unwrap();
        let sealed = sealer.seal(&plaintext).unwrap();
        assert_eq!(
            sealed.hash.unwrap(),
            hash::sign("key1", &plaintext).unwrap()
        );
    }

    #[test]
    fn test_tampered_body_fails_verification() {
        let sealer = Sealer::new(Some("key1".into()), None);
        let opener = Opener::new(Some("key1".into()), None);
        let sealed = sealer.seal(b"[]").unwrap();
        let forged = compress::compress(b"[{}]").unwrap();
        let err = opener
            .open(&forged, true, sealed.hash.as_deref())
            .unwrap_err();
        assert!(err.is_integrity());
    }

    #[test]
    fn test_missing_hash_or_key_passes() {
        let opener = Opener::new(Some("key1".into()), None);
        assert!(opener.verify(b"payload", None).is_ok());

        let unkeyed = Opener::new(Some(String::new()), None);
        assert!(!unkeyed.signs());
        assert!(unkeyed.verify(b"payload", Some("deadbeef")).is_ok());
    }

    #[test]
    fn test_plain_sealer_only_compresses() {
        let sealed = Sealer::default().seal(b"hello").unwrap();
        assert!(sealed.hash.is_none());
        assert_eq!(compress::decompress(&sealed.body, 1024).unwrap(), b"hello");
    }

    #[test]
    fn test_open_rejects_oversized_expansion() {
        let body = compress::compress(&vec![b' '; 2 * 1024 * 1024]).unwrap();
        let opener = Opener::default().with_max_plaintext(1024 * 1024);

        let err = opener.open(&body, true, None).unwrap_err();
        assert!(matches!(err, MetrixError::Codec(_)));
        assert!(Opener::default().open(&body, true, None).is_ok());
    }
}
