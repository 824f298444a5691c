//! # vcm-types
//!
//! Wire-independent model of a vector communication message.
//!
//! A [`VectorCommMessage`] carries semantic intent as dense vectors instead of
//! text. It is made of four parts:
//!
//! - **Header**: dimension, numeric encoding, the semantic space (model name)
//!   that produced the vectors, sender confidence and protocol version
//! - **Payload**: the primary intent vector, optional context vectors with
//!   attention weights, an optional per-component uncertainty vector and
//!   free-form metadata
//! - **Metadata**: routing and lifecycle information (source, destination,
//!   intent, priority, conversation linkage, expiry)
//! - **Checksum**: digest over the other three parts, attached once the
//!   message is final
//!
//! A message is immutable once checksummed: changing any covered field
//! requires computing a new checksum.

#![deny(unsafe_code)]

pub mod builder;
pub mod error;
pub mod message;
pub mod validation;

pub use builder::MessageBuilder;
pub use error::MessageError;
pub use message::{
    AgentId, Dimension, MessageHeader, MessageId, MessageIntent, MessageMetadata,
    VectorCommMessage, VectorEncoding, VectorPayload, DEFAULT_PRIORITY, MAX_PRIORITY,
    PROTOCOL_VERSION,
};
pub use validation::{estimate_size, validate, validate_at, validation_errors, validation_errors_at};
