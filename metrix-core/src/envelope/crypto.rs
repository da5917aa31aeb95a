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

//! Chunked RSA PKCS#1 v1.5 encryption.
//!
//! Payloads larger than a single RSA block are split into chunks of
//! `key_size - 11` bytes; each chunk encrypts to exactly `key_size` bytes and
//! the ciphertexts are concatenated in order.

use rsa::pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey, EncodeRsaPrivateKey};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePublicKey, LineEnding};
use rsa::traits::PublicKeyParts;
use rsa::{Pkcs1v15Encrypt, RsaPrivateKey, RsaPublicKey};
use std::fmt;
use std::path::Path;

use crate::error::{MetrixError, Result};

const PKCS1_V15_OVERHEAD: usize = 11;

/// Public half, held by the agent.
#[derive(Clone, Debug)]
pub struct EncryptionKey {
    key: RsaPublicKey,
}

impl EncryptionKey {
    /// Accepts SPKI (`PUBLIC KEY`) and PKCS#1 (`RSA PUBLIC KEY`) PEM.
    pub fn from_pem(pem: &str) -> Result<Self> {
        let key = RsaPublicKey::from_public_key_pem(pem)
            .or_else(|_| RsaPublicKey::from_pkcs1_pem(pem))
            .map_err(|e| MetrixError::Codec(format!("invalid RSA public key: {e}")))?;
        Ok(Self { key })
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_pem(&std::fs::read_to_string(path)?)
    }

    pub fn size(&self) -> usize {
        self.key.size()
    }

    /// SPKI PEM.
    pub fn to_pem(&self) -> Result<String> {
        self.key
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| MetrixError::Codec(format!("failed to encode RSA public key: {e}")))
    }

    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let step = self.key.size().saturating_sub(PKCS1_V15_OVERHEAD);
        if step == 0 {
            return Err(MetrixError::Codec("RSA key too small".to_string()));
        }

        let mut rng = rand::thread_rng();
        let chunks = plaintext.len().div_ceil(step);
        let mut out = Vec::with_capacity(chunks * self.key.size());
        for chunk in plaintext.chunks(step) {
            let sealed = self
                .key
                .encrypt(&mut rng, Pkcs1v15Encrypt, chunk)
                .map_err(|e| MetrixError::Codec(format!("RSA encryption failed: {e}")))?;
            out.extend_from_slice(&sealed);
        }
        Ok(out)
    }
}

impl From<RsaPublicKey> for EncryptionKey {
    fn from(key: RsaPublicKey) -> Self {
        Self { key }
    }
}

/// Private half, held by the server.
#[derive(Clone)]
pub struct DecryptionKey {
    key: RsaPrivateKey,
}

impl DecryptionKey {
    /// Accepts PKCS#1 (`RSA PRIVATE KEY`) and PKCS#8 (`PRIVATE KEY`) PEM.
    pub fn from_pem(pem: &str) -> Result<Self> {
        let key = RsaPrivateKey::from_pkcs1_pem(pem)
            .or_else(|_| RsaPrivateKey::from_pkcs8_pem(pem))
            .map_err(|e| MetrixError::Codec(format!("invalid RSA private key: {e}")))?;
        Ok(Self { key })
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_pem(&std::fs::read_to_string(path)?)
    }

    pub fn generate(bits: usize) -> Result<Self> {
        let key = RsaPrivateKey::new(&mut rand::thread_rng(), bits)
            .map_err(|e| MetrixError::Codec(format!("RSA key generation failed: {e}")))?;
        Ok(Self { key })
    }

    pub fn public_key(&self) -> EncryptionKey {
        EncryptionKey {
            key: self.key.to_public_key(),
        }
    }

    /// PKCS#1 PEM.
    pub fn to_pem(&self) -> Result<String> {
        self.key
            .to_pkcs1_pem(LineEnding::LF)
            .map(|pem| pem.to_string())
            .map_err(|e| MetrixError::Codec(format!("failed to encode RSA private key: {e}")))
    }

    pub fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>> {
        let step = self.key.size();
        if ciphertext.len() % step != 0 {
            return Err(MetrixError::Integrity(format!(
                "ciphertext length {} is not a multiple of {step}",
                ciphertext.len()
            )));
        }

        let mut out = Vec::with_capacity(ciphertext.len());
        for chunk in ciphertext.chunks(step) {
            let opened = self
                .key
                .decrypt(Pkcs1v15Encrypt, chunk)
                .map_err(|e| MetrixError::Integrity(format!("RSA decryption failed: {e}")))?;
            out.extend_from_slice(&opened);
        }
        Ok(out)
    }
}

impl fmt::Debug for DecryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecryptionKey")
            .field("bits", &(self.key.size() * 8))
            .finish_non_exhaustive()
    }
}
