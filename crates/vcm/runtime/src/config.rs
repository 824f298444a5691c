//! Runtime configuration

use std::path::Path;

use serde::{Deserialize, Serialize};
use vcm_audit::AuditConfig;
use vcm_codec::CodecConfig;
use vcm_safety::SafetyConfig;
use vcm_transport::TransportConfig;
use vcm_verifier::VerificationConfig;

use crate::error::Result;
use crate::telemetry::TracingConfig;

/// Settings for every component, loadable from one YAML file.
///
/// Each section falls back to its defaults when absent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VcmConfig {
    #[serde(default)]
    pub transport: TransportConfig,

    #[serde(default)]
    pub safety: SafetyConfig,

    #[serde(default)]
    pub verification: VerificationConfig,

    #[serde(default)]
    pub codec: CodecConfig,

    #[serde(default)]
    pub audit: AuditConfig,

    #[serde(default)]
    pub tracing: TracingConfig,
}

impl VcmConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config = Self::from_yaml_str(&content)?;
        tracing::debug!(path = %path.as_ref().display(), "Configuration loaded");
        Ok(config)
    }

    pub fn to_yaml_string(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_document_gives_defaults() {
        let config = VcmConfig::from_yaml_str("").unwrap();
        assert_eq!(config.transport.max_retries, 3);
        assert!(config.verification.strict);
        assert!(!config.codec.compress);
        assert_eq!(config.audit.metrics_prefix, "vcm_audit");
        assert_eq!(config.tracing.log_level, "info");
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let yaml = r#"
transport:
  max_retries: 5
  inbound_capacity: 16
safety:
  steering_enabled: false
verification:
  strict: false
  checksum_key: "team-secret"
codec:
  compress: true
tracing:
  log_level: debug
  json_format: true
"#;
        let config = VcmConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.transport.max_retries, 5);
        assert_eq!(config.transport.inbound_capacity, 16);
        assert_eq!(config.transport.outbound_capacity, 1024);
        assert!(!config.safety.steering_enabled);
        assert_eq!(config.safety.max_iterations, 100);
        assert!(!config.verification.strict);
        assert_eq!(config.verification.checksum_key.as_deref(), Some("team-secret"));
        assert!(config.codec.compress);
        assert!(config.tracing.json_format);
    }

    #[test]
    fn load_from_file_roundtrips() {
        let config = VcmConfig {
            transport: TransportConfig {
                max_retries: 7,
                ..TransportConfig::default()
            },
            ..VcmConfig::default()
        };
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(config.to_yaml_string().unwrap().as_bytes())
            .unwrap();

        let loaded = VcmConfig::load(file.path()).unwrap();
        assert_eq!(loaded.transport.max_retries, 7);
    }

    #[test]
    fn malformed_yaml_is_an_error() {
        assert!(VcmConfig::from_yaml_str("transport: [1, 2").is_err());
        assert!(VcmConfig::load("/nonexistent/vcm.yaml").is_err());
    }
}
