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

//! Keyed payload hashing (HMAC-SHA256, hex encoded).

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::{MetrixError, Result};

/// Header (and gRPC metadata key, lowercased) carrying the payload hash.
pub const HASH_HEADER: &str = "HashSHA256";

type HmacSha256 = Hmac<Sha256>;

fn keyed(key: &str) -> Result<HmacSha256> {
    HmacSha256::new_from_slice(key.as_bytes())
        .map_err(|e| MetrixError::Codec(format!("invalid HMAC key: {e}")))
}

/// Hex HMAC-SHA256 of `payload` under `key`.
pub fn sign(key: &str, payload: &[u8]) -> Result<String> {
    let mut mac = keyed(key)?;
    mac.update(payload);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Constant-time comparison of `expected` against the HMAC of `payload`.
pub fn verify(key: &str, payload: &[u8], expected: &str) -> Result<()> {
    let expected = hex::decode(expected.trim())
        .map_err(|_| MetrixError::Integrity("hash is not valid hex".to_string()))?;
    let mut mac = keyed(key)?;
    mac.update(payload);
    mac.verify_slice(&expected)
        .map_err(|_| MetrixError::Integrity("payload hash mismatch".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAYLOAD: &[u8] = br#"{"id":"Alloc","type":"gauge","value":123}"#;

    #[test]
    fn test_sign_then_verify() {
        let hash = sign("key1", PAYLOAD).unwrap();
        assert_eq!(hash.len(), 64);
        assert!(verify("key1", PAYLOAD, &hash).is_ok());
    }

    #[test]
    fn test_flipped_byte_is_rejected() {
        let hash = sign("key1", PAYLOAD).unwrap();
        let mut tampered = PAYLOAD.to_vec();
        tampered[10] ^= 0x01;
        assert!(matches!(
            verify("key1", &tampered, &hash),
            Err(MetrixError::Integrity(_))
        ));
    }

    #[test]
    fn test_wrong_key_is_rejected() {
        let hash = sign("key1", PAYLOAD).unwrap();
        assert!(verify("key2", PAYLOAD, &hash).is_err());
        assert!(verify("key1", PAYLOAD, "zz-not-hex").is_err());
    }
}
