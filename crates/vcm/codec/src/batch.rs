//! Batch framing: N uncompressed frames under one header, compressed once.
//!
//! `[magic "VCMB":4][version:2][flags:1][count:4][body_len:4][body]` where the
//! body is `count × [len:4][frame]`.

use bytes::{BufMut, BytesMut};
use tracing::debug;
use vcm_types::VectorCommMessage;

use crate::compression;
use crate::error::CodecError;
use crate::frame::{decode_frame, encode_frame, FRAME_PREFIX_LEN};
use crate::wire::{len_u32, WireReader};
use crate::{CodecConfig, BATCH_MAGIC, FLAG_COMPRESSED, WIRE_VERSION};

pub fn serialize_batch(
    messages: &[VectorCommMessage],
    compress: bool,
) -> Result<Vec<u8>, CodecError> {
    encode_batch(messages, compress, &CodecConfig::default())
}

pub fn deserialize_batch(bytes: &[u8]) -> Result<Vec<VectorCommMessage>, CodecError> {
    decode_batch(bytes, &CodecConfig::default())
}

pub(crate) fn encode_batch(
    messages: &[VectorCommMessage],
    compress: bool,
    config: &CodecConfig,
) -> Result<Vec<u8>, CodecError> {
    let mut body = BytesMut::new();
    for message in messages {
        let frame = encode_frame(message, false, config)?;
        body.put_u32_le(len_u32(frame.len(), "batch entry")?);
        body.put_slice(&frame);
    }
    if body.len() > config.max_frame_bytes {
        return Err(CodecError::FrameTooLarge {
            size: body.len(),
            max: config.max_frame_bytes,
        });
    }

    let (flags, body) = if compress {
        (FLAG_COMPRESSED, compression::compress(&body, config.compression_level)?)
    } else {
        (0, body.to_vec())
    };

    let mut out = BytesMut::with_capacity(15 + body.len());
    out.put_slice(&BATCH_MAGIC);
    out.put_u16_le(WIRE_VERSION);
    out.put_u8(flags);
    out.put_u32_le(len_u32(messages.len(), "batch count")?);
    out.put_u32_le(len_u32(body.len(), "batch body")?);
    out.put_slice(&body);

    debug!(count = messages.len(), bytes = out.len(), compressed = compress, "Encoded batch");
    Ok(out.to_vec())
}

pub(crate) fn decode_batch(
    bytes: &[u8],
    config: &CodecConfig,
) -> Result<Vec<VectorCommMessage>, CodecError> {
    let mut reader = WireReader::new(bytes);

    let magic = reader.take(4, "batch magic")?;
    if magic != BATCH_MAGIC {
        return Err(CodecError::BadMagic {
            expected: BATCH_MAGIC,
            found: magic.to_vec(),
        });
    }
    let version = reader.u16("batch version")?;
    if version == 0 || version > WIRE_VERSION {
        return Err(CodecError::UnsupportedVersion(version));
    }
    let flags = reader.u8("batch flags")?;
    let count = reader.u32("batch count")? as usize;
    let body_len = reader.u32("batch body length")? as usize;
    let body = reader.take(body_len, "batch body")?;
    reader.finish()?;

    let inflated;
    let body = if flags & FLAG_COMPRESSED != 0 {
        inflated = compression::decompress(body, config.max_frame_bytes)?;
        inflated.as_slice()
    } else {
        body
    };

    let mut reader = WireReader::new(body);
    // every entry needs at least a length prefix and a frame prefix
    if count > reader.remaining() / (4 + FRAME_PREFIX_LEN) {
        return Err(CodecError::Truncated {
            section: "batch entries",
            needed: count.saturating_mul(4 + FRAME_PREFIX_LEN),
            available: reader.remaining(),
        });
    }
    let mut messages = Vec::with_capacity(count);
    for _ in 0..count {
        let len = reader.u32("batch entry")? as usize;
        let frame = reader.take(len, "batch entry")?;
        messages.push(decode_frame(frame, config)?);
    }
    reader.finish()?;

    debug!(count, "Decoded batch");
    Ok(messages)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::serialize;
    use vcm_types::{Dimension, MessageBuilder};

    fn message(i: usize) -> VectorCommMessage {
        MessageBuilder::new(format!("agent-{i}"), Dimension::D384)
            .primary_vector(vec![i as f32 / 10.0; 384])
            .build()
            .unwrap()
    }

    #[test]
    fn batch_preserves_order_and_content() {
        let messages: Vec<_> = (0..5).map(message).collect();
        for compress in [false, true] {
            let bytes = serialize_batch(&messages, compress).unwrap();
            assert_eq!(&bytes[..4], b"VCMB");
            assert_eq!(deserialize_batch(&bytes).unwrap(), messages);
        }
    }

    #[test]
    fn empty_batch() {
        let bytes = serialize_batch(&[], false).unwrap();
        assert!(deserialize_batch(&bytes).unwrap().is_empty());
    }

    #[test]
    fn single_frame_is_not_a_batch() {
        let frame = serialize(&message(1), false).unwrap();
        assert!(matches!(
            deserialize_batch(&frame),
            Err(CodecError::BadMagic { expected, .. }) if expected == BATCH_MAGIC
        ));
    }

    #[test]
    fn inflated_count_is_rejected() {
        let messages: Vec<_> = (0..2).map(message).collect();
        let mut bytes = serialize_batch(&messages, false).unwrap();
        bytes[7..11].copy_from_slice(&3u32.to_le_bytes());
        assert!(deserialize_batch(&bytes).is_err());
    }

    #[test]
    fn deflated_count_leaves_trailing_bytes() {
        let messages: Vec<_> = (0..2).map(message).collect();
        let mut bytes = serialize_batch(&messages, false).unwrap();
        bytes[7..11].copy_from_slice(&1u32.to_le_bytes());
        assert!(matches!(
            deserialize_batch(&bytes),
            Err(CodecError::TrailingBytes(_))
        ));
    }
}
