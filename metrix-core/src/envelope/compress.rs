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

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::{Read, Write};

use crate::error::{MetrixError, Result};

/// Gzip at the fastest level.
pub fn compress(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::with_capacity(data.len() / 2 + 32), Compression::fast());
    encoder
        .write_all(data)
        .map_err(|e| MetrixError::Codec(format!("gzip compression failed: {e}")))?;
    encoder
        .finish()
        .map_err(|e| MetrixError::Codec(format!("gzip compression failed: {e}")))
}

/// Gunzip, refusing output larger than `limit` bytes.
pub fn decompress(data: &[u8], limit: usize) -> Result<Vec<u8>> {
    let cap = u64::try_from(limit).unwrap_or(u64::MAX).saturating_add(1);
    let mut decoder = GzDecoder::new(data).take(cap);
    let mut decompressed = Vec::with_capacity(data.len().saturating_mul(4).min(limit));
    decoder
        .read_to_end(&mut decompressed)
        .map_err(|e| MetrixError::Codec(format!("malformed gzip body: {e}")))?;
    if decompressed.len() > limit {
        return Err(MetrixError::Codec(format!(
            "gzip body expands beyond {limit} bytes"
        )));
    }
    Ok(decompressed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gzip_roundtrip() {
        let payload = br#"[{"id":"Alloc","type":"gauge","value":123}]"#.repeat(20);
        let compressed = compress(&payload).unwrap();
        assert!(compressed.len() < payload.len());
        assert_eq!(decompress(&compressed, payload.len()).unwrap(), payload);
    }

    #[test]
    fn test_garbage_is_rejected() {
        let err = decompress(b"definitely not gzip", 1024).unwrap_err();
        assert!(matches!(err, MetrixError::Codec(_)));
    }

    #[test]
    fn test_expansion_beyond_limit_is_rejected() {
        let payload = vec![b' '; 4 * 1024 * 1024];
        let compressed = compress(&payload).unwrap();
        assert!(compressed.len() < 64 * 1024);

        let err = decompress(&compressed, 1024 * 1024).unwrap_err();
        assert!(matches!(err, MetrixError::Codec(_)));
        assert_eq!(decompress(&compressed, payload.len()).unwrap().len(), payload.len());
    }
}
