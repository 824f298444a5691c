//! Single-message frame encoding.

use std::collections::BTreeMap;

use bytes::{BufMut, BytesMut};
use tracing::debug;
use vcm_types::{
    Dimension, MessageHeader, MessageMetadata, VectorCommMessage, VectorEncoding, VectorPayload,
};

use crate::compression;
use crate::error::CodecError;
use crate::wire::{len_u16, len_u32, put_values, WireReader};
use crate::{CodecConfig, FLAG_COMPRESSED, FRAME_MAGIC, WIRE_VERSION};

/// magic(4) + version(2) + flags(1) + body_len(4)
pub const FRAME_PREFIX_LEN: usize = 11;

/// Serialize a message into a frame using the default codec limits.
pub fn serialize(message: &VectorCommMessage, compress: bool) -> Result<Vec<u8>, CodecError> {
    encode_frame(message, compress, &CodecConfig::default())
}

/// Decode a frame produced by [`serialize`] (or any conformant encoder).
pub fn deserialize(bytes: &[u8]) -> Result<VectorCommMessage, CodecError> {
    decode_frame(bytes, &CodecConfig::default())
}

pub(crate) fn encode_frame(
    message: &VectorCommMessage,
    compress: bool,
    config: &CodecConfig,
) -> Result<Vec<u8>, CodecError> {
    let body = encode_body(message)?;
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

    let mut frame = BytesMut::with_capacity(FRAME_PREFIX_LEN + body.len());
    frame.put_slice(&FRAME_MAGIC);
    frame.put_u16_le(WIRE_VERSION);
    frame.put_u8(flags);
    frame.put_u32_le(len_u32(body.len(), "frame body")?);
    frame.put_slice(&body);

    debug!(
        message_id = %message.message_id(),
        bytes = frame.len(),
        compressed = compress,
        "Encoded frame"
    );
    Ok(frame.to_vec())
}

pub(crate) fn decode_frame(
    bytes: &[u8],
    config: &CodecConfig,
) -> Result<VectorCommMessage, CodecError> {
    let mut reader = WireReader::new(bytes);

    let magic = reader.take(4, "magic")?;
    if magic != FRAME_MAGIC {
        return Err(CodecError::BadMagic {
            expected: FRAME_MAGIC,
            found: magic.to_vec(),
        });
    }
    let version = reader.u16("version")?;
    if version == 0 || version > WIRE_VERSION {
        return Err(CodecError::UnsupportedVersion(version));
    }
    let flags = reader.u8("flags")?;
    let body_len = reader.u32("body length")? as usize;
    let body = reader.take(body_len, "body")?;
    reader.finish()?;

    let message = if flags & FLAG_COMPRESSED != 0 {
        let inflated = compression::decompress(body, config.max_frame_bytes)?;
        decode_body(&inflated)?
    } else {
        if body.len() > config.max_frame_bytes {
            return Err(CodecError::FrameTooLarge {
                size: body.len(),
                max: config.max_frame_bytes,
            });
        }
        decode_body(body)?
    };

    debug!(
        message_id = %message.message_id(),
        bytes = bytes.len(),
        "Decoded frame"
    );
    Ok(message)
}

fn encode_body(message: &VectorCommMessage) -> Result<BytesMut, CodecError> {
    check_dimensions(message)?;

    let header = &message.header;
    let payload = &message.payload;
    let encoding = header.encoding;
    let mut buf = BytesMut::with_capacity(vcm_types::estimate_size(message));

    // header
    let space = header.semantic_space.as_bytes();
    let header_len = 4 + 1 + 8 + 2 + 2 + space.len();
    buf.put_u32_le(len_u32(header_len, "header")?);
    buf.put_u32_le(header.dimension.as_u32());
    buf.put_u8(encoding.tag());
    buf.put_f64_le(header.confidence);
    buf.put_u16_le(header.protocol_version);
    buf.put_u16_le(len_u16(space.len(), "semantic_space")?);
    buf.put_slice(space);

    // primary
    buf.put_u32_le(len_u32(payload.primary_vector.len(), "primary_vector")?);
    put_values(&mut buf, &payload.primary_vector, encoding);

    // context
    buf.put_u32_le(len_u32(payload.context_vectors.len(), "context_vectors")?);
    for ctx in &payload.context_vectors {
        buf.put_u32_le(len_u32(ctx.len(), "context_vector")?);
        put_values(&mut buf, ctx, encoding);
    }

    // attention weights are always f32
    match &payload.attention_weights {
        Some(weights) => {
            buf.put_u8(1);
            buf.put_u32_le(len_u32(weights.len(), "attention_weights")?);
            put_values(&mut buf, weights, VectorEncoding::Float32);
        }
        None => buf.put_u8(0),
    }

    match &payload.uncertainty_vector {
        Some(uncertainty) => {
            buf.put_u8(1);
            buf.put_u32_le(len_u32(uncertainty.len(), "uncertainty_vector")?);
            put_values(&mut buf, uncertainty, encoding);
        }
        None => buf.put_u8(0),
    }

    let payload_meta = serde_json::to_vec(&payload.metadata)?;
    buf.put_u32_le(len_u32(payload_meta.len(), "payload metadata")?);
    buf.put_slice(&payload_meta);

    let message_meta = serde_json::to_vec(&message.metadata)?;
    buf.put_u32_le(len_u32(message_meta.len(), "message metadata")?);
    buf.put_slice(&message_meta);

    match &message.checksum {
        Some(checksum) => {
            if !checksum.is_ascii() {
                return Err(CodecError::InvalidField("checksum is not ASCII".into()));
            }
            buf.put_u8(1);
            buf.put_u16_le(len_u16(checksum.len(), "checksum")?);
            buf.put_slice(checksum.as_bytes());
        }
        None => buf.put_u8(0),
    }

    Ok(buf)
}

fn decode_body(body: &[u8]) -> Result<VectorCommMessage, CodecError> {
    let mut reader = WireReader::new(body);

    let header_len = reader.u32("header")? as usize;
    let header_bytes = reader.take(header_len, "header")?;
    let header = decode_header(header_bytes)?;
    let dim = header.dimension.as_usize();
    let encoding = header.encoding;

    let primary_len = reader.u32("primary_vector")? as usize;
    expect_dimension("primary_vector", dim, primary_len)?;
    let primary_vector = reader.values(primary_len, encoding, "primary_vector")?;

    let context_count = reader.u32("context_vectors")? as usize;
    // each context vector carries at least its own length prefix
    if context_count > reader.remaining() / 4 {
        return Err(CodecError::Truncated {
            section: "context_vectors",
            needed: context_count.saturating_mul(4),
            available: reader.remaining(),
        });
    }
    let mut context_vectors = Vec::with_capacity(context_count);
    for i in 0..context_count {
        let len = reader.u32("context_vectors")? as usize;
        if len != dim {
            return Err(CodecError::DimensionMismatch {
                section: format!("context_vectors[{i}]"),
                expected: dim,
                actual: len,
            });
        }
        context_vectors.push(reader.values(len, encoding, "context_vectors")?);
    }

    let attention_weights = if reader.flag("attention_weights")? {
        let len = reader.u32("attention_weights")? as usize;
        expect_dimension("attention_weights", context_count, len)?;
        Some(reader.values(len, VectorEncoding::Float32, "attention_weights")?)
    } else {
        None
    };

    let uncertainty_vector = if reader.flag("uncertainty_vector")? {
        let len = reader.u32("uncertainty_vector")? as usize;
        expect_dimension("uncertainty_vector", dim, len)?;
        Some(reader.values(len, encoding, "uncertainty_vector")?)
    } else {
        None
    };

    let payload_meta_len = reader.u32("payload metadata")? as usize;
    let payload_meta: BTreeMap<String, serde_json::Value> =
        serde_json::from_slice(reader.take(payload_meta_len, "payload metadata")?)?;

    let message_meta_len = reader.u32("message metadata")? as usize;
    let metadata: MessageMetadata =
        serde_json::from_slice(reader.take(message_meta_len, "message metadata")?)?;

    let checksum = if reader.flag("checksum")? {
        let len = reader.u16("checksum")? as usize;
        let raw = reader.take(len, "checksum")?;
        if !raw.is_ascii() {
            return Err(CodecError::InvalidField("checksum is not ASCII".into()));
        }
        Some(String::from_utf8_lossy(raw).into_owned())
    } else {
        None
    };

    reader.finish()?;

    Ok(VectorCommMessage {
        header,
        payload: VectorPayload {
            primary_vector,
            context_vectors,
            attention_weights,
            uncertainty_vector,
            metadata: payload_meta,
        },
        metadata,
        checksum,
    })
}

fn decode_header(bytes: &[u8]) -> Result<MessageHeader, CodecError> {
    let mut reader = WireReader::new(bytes);
    let dimension = Dimension::try_from(reader.u32("header")?)?;
    let encoding = VectorEncoding::from_tag(reader.u8("header")?)?;
    let confidence = reader.f64("header")?;
    let protocol_version = reader.u16("header")?;
    let space_len = reader.u16("header")? as usize;
    let space = reader.take(space_len, "header")?;
    let semantic_space = std::str::from_utf8(space)
        .map_err(|e| CodecError::InvalidField(format!("semantic_space: {e}")))?
        .to_string();
    reader.finish()?;

    Ok(MessageHeader {
        dimension,
        encoding,
        semantic_space,
        confidence,
        protocol_version,
    })
}

fn expect_dimension(section: &str, expected: usize, actual: usize) -> Result<(), CodecError> {
    if expected != actual {
        return Err(CodecError::DimensionMismatch {
            section: section.to_string(),
            expected,
            actual,
        });
    }
    Ok(())
}

fn check_dimensions(message: &VectorCommMessage) -> Result<(), CodecError> {
    let dim = message.header.dimension.as_usize();
    let payload = &message.payload;
    expect_dimension("primary_vector", dim, payload.primary_vector.len())?;
    for (i, ctx) in payload.context_vectors.iter().enumerate() {
        expect_dimension(&format!("context_vectors[{i}]"), dim, ctx.len())?;
    }
    if let Some(weights) = &payload.attention_weights {
        expect_dimension("attention_weights", payload.context_vectors.len(), weights.len())?;
    }
    if let Some(uncertainty) = &payload.uncertainty_vector {
        expect_dimension("uncertainty_vector", dim, uncertainty.len())?;
    }
    Ok(())
}
