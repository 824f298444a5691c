use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::MessageError;

/// Current wire/protocol version carried in every header.
pub const PROTOCOL_VERSION: u16 = 1;

/// Highest message priority.
pub const MAX_PRIORITY: u8 = 10;

/// Priority assigned when the sender does not choose one.
pub const DEFAULT_PRIORITY: u8 = 5;

/// Supported embedding dimensions.
///
/// Serialized as the plain integer so documents and frames stay readable.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum Dimension {
    D384,
    D768,
    D1536,
    D4096,
}

impl Dimension {
    pub const ALL: [Dimension; 4] = [
        Dimension::D384,
        Dimension::D768,
        Dimension::D1536,
        Dimension::D4096,
    ];

    pub fn as_u32(self) -> u32 {
        match self {
            Dimension::D384 => 384,
            Dimension::D768 => 768,
            Dimension::D1536 => 1536,
            Dimension::D4096 => 4096,
        }
    }

    pub fn as_usize(self) -> usize {
        self.as_u32() as usize
    }
}

impl TryFrom<u32> for Dimension {
    type Error = MessageError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            384 => Ok(Dimension::D384),
            768 => Ok(Dimension::D768),
            1536 => Ok(Dimension::D1536),
            4096 => Ok(Dimension::D4096),
            other => Err(MessageError::UnsupportedDimension(other)),
        }
    }
}

impl From<Dimension> for u32 {
    fn from(d: Dimension) -> Self {
        d.as_u32()
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_u32())
    }
}

/// Numeric precision of vectors on the wire.
///
/// Vectors are held as `f32` in memory. `Float64` widens every component on
/// encode and narrows on decode, which is lossless for values that started
/// out as `f32`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VectorEncoding {
    #[default]
    Float32,
    Float64,
}

impl VectorEncoding {
    pub fn tag(self) -> u8 {
        match self {
            VectorEncoding::Float32 => 1,
            VectorEncoding::Float64 => 2,
        }
    }

    pub fn from_tag(tag: u8) -> Result<Self, MessageError> {
        match tag {
            1 => Ok(VectorEncoding::Float32),
            2 => Ok(VectorEncoding::Float64),
            other => Err(MessageError::UnknownEncoding(other)),
        }
    }

    /// Bytes used by one vector component on the wire.
    pub fn bytes_per_value(self) -> usize {
        match self {
            VectorEncoding::Float32 => 4,
            VectorEncoding::Float64 => 8,
        }
    }
}

/// What the sender wants the receiver to do with a message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageIntent {
    Query,
    Response,
    Command,
    Notification,
    Update,
    Error,
    Heartbeat,
}

impl MessageIntent {
    pub const ALL: [MessageIntent; 7] = [
        MessageIntent::Query,
        MessageIntent::Response,
        MessageIntent::Command,
        MessageIntent::Notification,
        MessageIntent::Update,
        MessageIntent::Error,
        MessageIntent::Heartbeat,
    ];

    pub fn tag(self) -> u8 {
        match self {
            MessageIntent::Query => 1,
            MessageIntent::Response => 2,
            MessageIntent::Command => 3,
            MessageIntent::Notification => 4,
            MessageIntent::Update => 5,
            MessageIntent::Error => 6,
            MessageIntent::Heartbeat => 7,
        }
    }

    pub fn from_tag(tag: u8) -> Result<Self, MessageError> {
        Self::ALL
            .iter()
            .copied()
            .find(|i| i.tag() == tag)
            .ok_or(MessageError::UnknownIntent(tag))
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MessageIntent::Query => "query",
            MessageIntent::Response => "response",
            MessageIntent::Command => "command",
            MessageIntent::Notification => "notification",
            MessageIntent::Update => "update",
            MessageIntent::Error => "error",
            MessageIntent::Heartbeat => "heartbeat",
        }
    }
}

impl fmt::Display for MessageIntent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of a communicating agent.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentId(pub String);

impl AgentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AgentId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for AgentId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Unique message identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub uuid::Uuid);

impl MessageId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::generate()
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Message header: describes how to interpret the payload vectors.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MessageHeader {
    pub dimension: Dimension,
    pub encoding: VectorEncoding,
    /// Name of the embedding model whose space the vectors live in
    pub semantic_space: String,
    /// Sender confidence in the primary vector (0.0 to 1.0)
    pub confidence: f64,
    pub protocol_version: u16,
}

/// Message payload: the vectors themselves.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct VectorPayload {
    /// Primary intent vector, length == header.dimension
    pub primary_vector: Vec<f32>,
    /// Supporting context, each of length header.dimension
    #[serde(default)]
    pub context_vectors: Vec<Vec<f32>>,
    /// One weight per context vector, summing to ~1.0 when present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attention_weights: Option<Vec<f32>>,
    /// Per-component uncertainty in [0, 1], length == header.dimension
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uncertainty_vector: Option<Vec<f32>>,
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

/// Routing and lifecycle metadata.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MessageMetadata {
    pub source_agent: AgentId,
    /// `None` means broadcast
    #[serde(default)]
    pub destination_agent: Option<AgentId>,
    pub timestamp: DateTime<Utc>,
    pub intent: MessageIntent,
    pub priority: u8,
    pub message_id: MessageId,
    #[serde(default)]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub reply_to: Option<MessageId>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

/// A complete vector communication message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VectorCommMessage {
    pub header: MessageHeader,
    pub payload: VectorPayload,
    pub metadata: MessageMetadata,
    /// Hex digest over header + payload + metadata, absent until finalized
    #[serde(default)]
    pub checksum: Option<String>,
}

impl VectorCommMessage {
    pub fn message_id(&self) -> MessageId {
        self.metadata.message_id
    }

    pub fn source(&self) -> &AgentId {
        &self.metadata.source_agent
    }

    pub fn destination(&self) -> Option<&AgentId> {
        self.metadata.destination_agent.as_ref()
    }

    /// A message without a destination is delivered to every broadcast subscriber.
    pub fn is_broadcast(&self) -> bool {
        self.metadata.destination_agent.is_none()
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        matches!(self.metadata.expires_at, Some(expiry) if now >= expiry)
    }

    /// Replace the primary vector. Drops any checksum, since it no longer covers
    /// the payload.
    pub fn replace_primary_vector(&mut self, vector: Vec<f32>) {
        self.payload.primary_vector = vector;
        self.checksum = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dimension_try_from() {
        assert_eq!(Dimension::try_from(768).unwrap(), Dimension::D768);
        assert_eq!(
            Dimension::try_from(512),
            Err(MessageError::UnsupportedDimension(512))
        );
        for d in Dimension::ALL {
            assert_eq!(Dimension::try_from(d.as_u32()).unwrap(), d);
        }
    }

    #[test]
    fn dimension_serializes_as_integer() {
        let json = serde_json::to_string(&Dimension::D1536).unwrap();
        assert_eq!(json, "1536");
        let err = serde_json::from_str::<Dimension>("100");
        assert!(err.is_err());
    }

    #[test]
    fn intent_tags_are_unique_and_roundtrip() {
        for intent in MessageIntent::ALL {
            assert_eq!(MessageIntent::from_tag(intent.tag()).unwrap(), intent);
        }
        assert_eq!(
            MessageIntent::from_tag(0),
            Err(MessageError::UnknownIntent(0))
        );
    }

    #[test]
    fn encoding_widths() {
        assert_eq!(VectorEncoding::Float32.bytes_per_value(), 4);
        assert_eq!(VectorEncoding::Float64.bytes_per_value(), 8);
        assert!(VectorEncoding::from_tag(9).is_err());
        assert_eq!(
            serde_json::to_string(&VectorEncoding::Float64).unwrap(),
            "\"float64\""
        );
    }

    #[test]
    fn agent_id_display() {
        let id = AgentId::from("planner");
        assert_eq!(id.to_string(), "planner");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"planner\"");
    }
}
