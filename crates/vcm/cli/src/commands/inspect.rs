//! Decode frames from disk and summarize them

use std::path::Path;

use serde::Serialize;
use vcm_codec::{deserialize, deserialize_batch};
use vcm_types::{VectorCommMessage, VectorEncoding};
use vcm_verifier::{detect_anomalies, verify_checksum, Anomaly, AnomalyThresholds};

use crate::error::CliResult;
use crate::output::{print_single, OutputFormat};

#[derive(Debug, Serialize)]
pub struct FrameSummary {
    pub message_id: String,
    pub source: String,
    pub destination: Option<String>,
    pub intent: String,
    pub priority: u8,
    pub dimension: u32,
    pub encoding: VectorEncoding,
    pub semantic_space: String,
    pub confidence: f64,
    pub protocol_version: u16,
    pub context_vectors: usize,
    pub has_attention: bool,
    pub has_uncertainty: bool,
    pub primary_norm: f64,
    pub checksum: Option<String>,
    /// `None` when the frame carries no checksum
    pub checksum_valid: Option<bool>,
    pub anomalies: Vec<Anomaly>,
}

impl FrameSummary {
    fn new(message: &VectorCommMessage, frame_len: Option<usize>, key: Option<&[u8]>) -> Self {
        let primary_norm = message
            .payload
            .primary_vector
            .iter()
            .map(|x| f64::from(*x).powi(2))
            .sum::<f64>()
            .sqrt();

        Self {
            message_id: message.message_id().to_string(),
            source: message.source().to_string(),
            destination: message.destination().map(|d| d.to_string()),
            intent: message.metadata.intent.to_string(),
            priority: message.metadata.priority,
            dimension: message.header.dimension.as_u32(),
            encoding: message.header.encoding,
            semantic_space: message.header.semantic_space.clone(),
            confidence: message.header.confidence,
            protocol_version: message.header.protocol_version,
            context_vectors: message.payload.context_vectors.len(),
            has_attention: message.payload.attention_weights.is_some(),
            has_uncertainty: message.payload.uncertainty_vector.is_some(),
            primary_norm,
            checksum: message.checksum.clone(),
            checksum_valid: message.checksum.as_ref().map(|_| verify_checksum(message, key)),
            anomalies: detect_anomalies(message, frame_len, &AnomalyThresholds::default()),
        }
    }
}

/// Summaries for a single frame or every frame of a batch.
pub fn inspect_file(path: &Path, batch: bool, key: Option<&str>) -> CliResult<Vec<FrameSummary>> {
    let bytes = std::fs::read(path)?;
    let key = key.map(str::as_bytes);

    if batch {
        let messages = deserialize_batch(&bytes)?;
        Ok(messages
            .iter()
            .map(|m| FrameSummary::new(m, None, key))
            .collect())
    } else {
        let message = deserialize(&bytes)?;
        Ok(vec![FrameSummary::new(&message, Some(bytes.len()), key)])
    }
}

pub fn execute(path: &Path, batch: bool, key: Option<&str>, format: OutputFormat) -> CliResult<()> {
    let summaries = inspect_file(path, batch, key)?;
    if batch {
        print_single(&summaries, format)
    } else {
        print_single(&summaries[0], format)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vcm_codec::{serialize, serialize_batch};
    use vcm_types::{Dimension, MessageBuilder, MessageIntent};
    use vcm_verifier::attach_checksum;

    fn message() -> VectorCommMessage {
        let mut msg = MessageBuilder::new("planner", Dimension::D384)
            .primary_vector((0..384).map(|i| (i as f32).cos() / 20.0).collect())
            .destination("executor")
            .intent(MessageIntent::Query)
            .build()
            .unwrap();
        attach_checksum(&mut msg, None).unwrap();
        msg
    }

    #[test]
    fn summarizes_single_frame() {
        let msg = message();
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), serialize(&msg, true).unwrap()).unwrap();

        let summaries = inspect_file(file.path(), false, None).unwrap();
        assert_eq!(summaries.len(), 1);
        let s = &summaries[0];
        assert_eq!(s.message_id, msg.message_id().to_string());
        assert_eq!(s.destination.as_deref(), Some("executor"));
        assert_eq!(s.intent, "query");
        assert_eq!(s.dimension, 384);
        assert_eq!(s.checksum_valid, Some(true));

        // wrong key
        let summaries = inspect_file(file.path(), false, Some("other")).unwrap();
        assert_eq!(summaries[0].checksum_valid, Some(false));
    }

    #[test]
    fn summarizes_batch() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let frames = serialize_batch(&[message(), message(), message()], false).unwrap();
        std::fs::write(file.path(), frames).unwrap();

        assert_eq!(inspect_file(file.path(), true, None).unwrap().len(), 3);
        // a batch is not a frame
        assert!(inspect_file(file.path(), false, None).is_err());
    }
}
