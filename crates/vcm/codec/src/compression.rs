//! zlib body compression.

use std::io::{Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;

use crate::error::CodecError;

pub fn compress(data: &[u8], level: u32) -> Result<Vec<u8>, CodecError> {
    let mut encoder = ZlibEncoder::new(Vec::with_capacity(data.len() / 2), Compression::new(level.min(9)));
    encoder
        .write_all(data)
        .map_err(|e| CodecError::Compression(e.to_string()))?;
    encoder
        .finish()
        .map_err(|e| CodecError::Compression(e.to_string()))
}

/// Inflate `data`, refusing to produce more than `limit` bytes.
pub fn decompress(data: &[u8], limit: usize) -> Result<Vec<u8>, CodecError> {
    let mut out = Vec::new();
    let cap = (limit as u64).saturating_add(1);
    ZlibDecoder::new(data)
        .take(cap)
        .read_to_end(&mut out)
        .map_err(|e| CodecError::Decompression(e.to_string()))?;
    if out.len() > limit {
        return Err(CodecError::FrameTooLarge {
            size: out.len(),
            max: limit,
        });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compress_then_inflate() {
        let data = vec![7u8; 10_000];
        let packed = compress(&data, 6).unwrap();
        assert!(packed.len() < data.len());
        assert_eq!(decompress(&packed, 1 << 20).unwrap(), data);
    }

    #[test]
    fn inflate_respects_limit() {
        let packed = compress(&vec![0u8; 4096], 9).unwrap();
        let err = decompress(&packed, 1024).unwrap_err();
        assert!(matches!(err, CodecError::FrameTooLarge { max: 1024, .. }));
    }

    #[test]
    fn garbage_is_a_decompression_error() {
        let err = decompress(b"definitely not zlib", 1024).unwrap_err();
        assert!(matches!(err, CodecError::Decompression(_)));
    }
}
