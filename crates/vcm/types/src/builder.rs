use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::MessageError;
use crate::message::{
    AgentId, Dimension, MessageHeader, MessageId, MessageIntent, MessageMetadata,
    VectorCommMessage, VectorEncoding, VectorPayload, DEFAULT_PRIORITY, PROTOCOL_VERSION,
};
use crate::validation::validation_errors;

const DEFAULT_SEMANTIC_SPACE: &str = "unspecified";

/// Builder for [`VectorCommMessage`].
///
/// `build()` runs the full structural validation, so a built message always
/// satisfies the dimension invariants. The checksum is left empty.
pub struct MessageBuilder {
    source: AgentId,
    dimension: Dimension,
    encoding: VectorEncoding,
    semantic_space: String,
    confidence: f64,
    primary_vector: Option<Vec<f32>>,
    context_vectors: Vec<Vec<f32>>,
    attention_weights: Option<Vec<f32>>,
    uncertainty_vector: Option<Vec<f32>>,
    payload_metadata: BTreeMap<String, serde_json::Value>,
    destination: Option<AgentId>,
    intent: MessageIntent,
    priority: u8,
    conversation_id: Option<String>,
    reply_to: Option<MessageId>,
    expires_at: Option<DateTime<Utc>>,
}

impl MessageBuilder {
    pub fn new(source: impl Into<AgentId>, dimension: Dimension) -> Self {
        Self {
            source: source.into(),
            dimension,
            encoding: VectorEncoding::default(),
            semantic_space: DEFAULT_SEMANTIC_SPACE.to_string(),
            confidence: 1.0,
            primary_vector: None,
            context_vectors: Vec::new(),
            attention_weights: None,
            uncertainty_vector: None,
            payload_metadata: BTreeMap::new(),
            destination: None,
            intent: MessageIntent::Notification,
            priority: DEFAULT_PRIORITY,
            conversation_id: None,
            reply_to: None,
            expires_at: None,
        }
    }

    /// Start a reply: addressed to the original sender, linked to its
    /// conversation, same dimension and semantic space.
    pub fn reply_to(source: impl Into<AgentId>, original: &VectorCommMessage) -> Self {
        let mut builder = Self::new(source, original.header.dimension)
            .encoding(original.header.encoding)
            .semantic_space(original.header.semantic_space.clone())
            .destination(original.metadata.source_agent.clone())
            .intent(MessageIntent::Response);
        builder.reply_to = Some(original.metadata.message_id);
        builder.conversation_id = original
            .metadata
            .conversation_id
            .clone()
            .or_else(|| Some(original.metadata.message_id.to_string()));
        builder
    }

    pub fn primary_vector(mut self, vector: Vec<f32>) -> Self {
        self.primary_vector = Some(vector);
        self
    }

    pub fn context_vector(mut self, vector: Vec<f32>) -> Self {
        self.context_vectors.push(vector);
        self
    }

    pub fn context_vectors(mut self, vectors: Vec<Vec<f32>>) -> Self {
        self.context_vectors = vectors;
        self
    }

    pub fn attention_weights(mut self, weights: Vec<f32>) -> Self {
        self.attention_weights = Some(weights);
        self
    }

    pub fn uncertainty(mut self, uncertainty: Vec<f32>) -> Self {
        self.uncertainty_vector = Some(uncertainty);
        self
    }

    pub fn encoding(mut self, encoding: VectorEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn semantic_space(mut self, model: impl Into<String>) -> Self {
        self.semantic_space = model.into();
        self
    }

    pub fn confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn destination(mut self, destination: impl Into<AgentId>) -> Self {
        self.destination = Some(destination.into());
        self
    }

    /// Clear the destination so the message is broadcast.
    pub fn broadcast(mut self) -> Self {
        self.destination = None;
        self
    }

    pub fn intent(mut self, intent: MessageIntent) -> Self {
        self.intent = intent;
        self
    }

    pub fn priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    pub fn conversation_id(mut self, id: impl Into<String>) -> Self {
        self.conversation_id = Some(id.into());
        self
    }

    pub fn expires_at(mut self, at: DateTime<Utc>) -> Self {
        self.expires_at = Some(at);
        self
    }

    /// Expire the message `ttl` after now.
    pub fn ttl(mut self, ttl: chrono::Duration) -> Self {
        self.expires_at = Some(Utc::now() + ttl);
        self
    }

    /// Attach a free-form payload metadata value. Values that fail to
    /// serialize are skipped.
    pub fn payload_metadata(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.payload_metadata.insert(key.into(), v);
        }
        self
    }

    pub fn build(self) -> Result<VectorCommMessage, MessageError> {
        let primary_vector = self
            .primary_vector
            .ok_or_else(|| MessageError::MissingField("primary_vector".into()))?;

        let message = VectorCommMessage {
            header: MessageHeader {
                dimension: self.dimension,
                encoding: self.encoding,
                semantic_space: self.semantic_space,
                confidence: self.confidence,
                protocol_version: PROTOCOL_VERSION,
            },
            payload: VectorPayload {
                primary_vector,
                context_vectors: self.context_vectors,
                attention_weights: self.attention_weights,
                uncertainty_vector: self.uncertainty_vector,
                metadata: self.payload_metadata,
            },
            metadata: MessageMetadata {
                source_agent: self.source,
                destination_agent: self.destination,
                timestamp: Utc::now(),
                intent: self.intent,
                priority: self.priority,
                message_id: MessageId::generate(),
                conversation_id: self.conversation_id,
                reply_to: self.reply_to,
                expires_at: self.expires_at,
            },
            checksum: None,
        };

        let errors = validation_errors(&message);
        if !errors.is_empty() {
            return Err(MessageError::Invalid(errors));
        }
        Ok(message)
    }
}
