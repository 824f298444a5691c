//! # vcm-codec
//!
//! Binary wire format for [`VectorCommMessage`]. This is the one byte-exact
//! surface of the substrate: any conformant implementation must decode a frame
//! produced by another at the same version.
//!
//! Frame: `[magic "VCMF":4][version:2][flags:1][body_len:4][body]`
//!
//! Body sections, in order (integers little-endian, vector lengths are
//! component counts):
//!
//! 1. header `[len:4][dimension:4][encoding:1][confidence:f64][protocol_version:2][space_len:2][space]`
//! 2. primary vector `[count:4][values]`
//! 3. context vectors `[n:4]` then `n × [count:4][values]`
//! 4. attention weights `[present:1]([count:4][f32 values])?`
//! 5. uncertainty vector `[present:1]([count:4][values])?`
//! 6. payload metadata `[len:4][JSON]`
//! 7. message metadata `[len:4][JSON]`
//! 8. checksum `[present:1]([len:2][ASCII hex])?`
//!
//! When flag bit 0 is set the body is zlib-compressed as a whole. Batches wrap
//! N uncompressed frames under their own magic and compress once.
//!
//! Decoding is all-or-nothing: any malformed section rejects the whole frame.

#![deny(unsafe_code)]

pub mod batch;
pub mod compression;
pub mod error;
pub mod frame;
mod wire;

pub use batch::{deserialize_batch, serialize_batch};
pub use error::CodecError;
pub use frame::{deserialize, serialize};

use serde::{Deserialize, Serialize};
use vcm_types::VectorCommMessage;

/// Frame magic: "VCMF" (Vector Comm Message Frame)
pub const FRAME_MAGIC: [u8; 4] = *b"VCMF";
/// Batch magic: "VCMB" (Vector Comm Message Batch)
pub const BATCH_MAGIC: [u8; 4] = *b"VCMB";
/// Current wire format version
pub const WIRE_VERSION: u16 = 1;
/// Flag bit: body is zlib-compressed
pub const FLAG_COMPRESSED: u8 = 0b0000_0001;

/// Codec configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CodecConfig {
    /// Compress frame bodies by default
    pub compress: bool,
    /// zlib level, 0 to 9
    pub compression_level: u32,
    /// Upper bound on a decoded (decompressed) body
    pub max_frame_bytes: usize,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            compress: false,
            compression_level: 6,
            max_frame_bytes: 64 * 1024 * 1024, // 64MB
        }
    }
}

/// Configured codec. The free functions [`serialize`] and [`deserialize`] use
/// the default configuration.
#[derive(Clone, Debug, Default)]
pub struct FrameCodec {
    config: CodecConfig,
}

impl FrameCodec {
    pub fn new(config: CodecConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CodecConfig {
        &self.config
    }

    pub fn encode(&self, message: &VectorCommMessage) -> Result<Vec<u8>, CodecError> {
        frame::encode_frame(message, self.config.compress, &self.config)
    }

    pub fn encode_with(
        &self,
        message: &VectorCommMessage,
        compress: bool,
    ) -> Result<Vec<u8>, CodecError> {
        frame::encode_frame(message, compress, &self.config)
    }

    pub fn decode(&self, bytes: &[u8]) -> Result<VectorCommMessage, CodecError> {
        frame::decode_frame(bytes, &self.config)
    }

    pub fn encode_batch(&self, messages: &[VectorCommMessage]) -> Result<Vec<u8>, CodecError> {
        batch::encode_batch(messages, self.config.compress, &self.config)
    }

    pub fn decode_batch(&self, bytes: &[u8]) -> Result<Vec<VectorCommMessage>, CodecError> {
        batch::decode_batch(bytes, &self.config)
    }
}
