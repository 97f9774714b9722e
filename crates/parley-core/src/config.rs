use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{ParleyError, Result};
use crate::types::{ReferenceDescriptor, ReferenceType};

/// Environment variable that overrides `ai.api_key` when the file leaves it empty.
pub const API_KEY_ENV: &str = "PARLEY_API_KEY";

/// Top-level configuration for Parley.
///
/// Loaded from `parley.toml` by default. The `reference_data` and
/// `connection_strings` tables form the subject registry; the remaining
/// sections configure the model client, caches and front ends.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParleyConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub ai: AiConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub connection_strings: BTreeMap<String, String>,
    #[serde(default)]
    pub reference_data: Vec<ReferenceDescriptor>,
}

impl ParleyConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read, parsed, or fails validation.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: ParleyConfig = toml::from_str(&content)?;
        config.validate()?;
        info!(
            path = %path.display(),
            subjects = config.reference_data.len(),
            "Configuration loaded"
        );
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }

    /// Check registry invariants: unique subjects, well-formed relational references.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for descriptor in &self.reference_data {
            let subject = descriptor.subject.trim();
            if subject.is_empty() {
                return Err(ParleyError::Config(
                    "reference_data entry has an empty subject".to_string(),
                ));
            }
            if !seen.insert(subject.to_lowercase()) {
                return Err(ParleyError::Config(format!(
                    "duplicate subject '{}' in reference_data",
                    subject
                )));
            }
            if descriptor.kind == ReferenceType::Relational
                && descriptor.schema_and_table().is_none()
            {
                return Err(ParleyError::Config(format!(
                    "subject '{}' must reference a table as schema.table, got '{}'",
                    subject, descriptor.reference
                )));
            }
        }
        Ok(())
    }
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
    /// Directory holding `prompts.json` and `responses.json`.
    pub templates_dir: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            templates_dir: "crates/parley-chat/templates".to_string(),
        }
    }
}

/// HTTP front-end settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3030,
        }
    }
}

/// Hosted model provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AiPlatform {
    #[serde(rename = "openai", alias = "OpenAI")]
    OpenAi,
    #[serde(rename = "azure_openai", alias = "AzureOpenAI")]
    AzureOpenAi,
    #[serde(rename = "deepseek", alias = "DeepSeek")]
    DeepSeek,
}

impl AiPlatform {
    /// Base URL used when `ai.endpoint` is not set.
    pub fn default_endpoint(&self) -> &'static str {
        match self {
            AiPlatform::OpenAi => "https://api.openai.com/v1",
            AiPlatform::AzureOpenAi => "",
            AiPlatform::DeepSeek => "https://api.deepseek.com/v1",
        }
    }
}

/// Language-model client settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AiConfig {
    pub platform: AiPlatform,
    /// Model name, or deployment name on Azure.
    pub model: String,
    /// API key. Left empty in files; read from `PARLEY_API_KEY` instead.
    pub api_key: String,
    /// Base URL override (required for Azure).
    pub endpoint: Option<String>,
    /// Azure `api-version` query parameter.
    pub api_version: String,
    /// Completion token limit per call.
    pub max_tokens: u32,
    /// Remote embedding model. When unset a local hashing embedder is used.
    pub embedding_model: Option<String>,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            platform: AiPlatform::OpenAi,
            model: "gpt-4o-mini".to_string(),
            api_key: String::new(),
            endpoint: None,
            api_version: "2024-06-01".to_string(),
            max_tokens: 200,
            embedding_model: None,
            timeout_secs: 120,
        }
    }
}

impl AiConfig {
    /// API key from the file, or from `PARLEY_API_KEY` when the file has none.
    pub fn resolved_api_key(&self) -> String {
        if !self.api_key.is_empty() {
            return self.api_key.clone();
        }
        std::env::var(API_KEY_ENV).unwrap_or_default()
    }

    /// Configured endpoint, or the platform default.
    pub fn resolved_endpoint(&self) -> String {
        self.endpoint
            .clone()
            .unwrap_or_else(|| self.platform.default_endpoint().to_string())
            .trim_end_matches('/')
            .to_string()
    }
}

/// Expiry settings for the session and field-metadata caches.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Conversation history lifetime after the last write.
    pub session_ttl_hours: u32,
    /// Column metadata lifetime after it was computed.
    pub field_metadata_ttl_hours: u32,
    /// Minutes between background purges of expired entries (0 disables).
    pub sweep_interval_minutes: u32,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            session_ttl_hours: 12,
            field_metadata_ttl_hours: 24,
            sweep_interval_minutes: 30,
        }
    }
}

impl CacheConfig {
    /// Period of the background purge, or `None` when it is disabled.
    pub fn sweep_interval(&self) -> Option<std::time::Duration> {
        (self.sweep_interval_minutes > 0)
            .then(|| std::time::Duration::from_secs(u64::from(self.sweep_interval_minutes) * 60))
    }
}

/// Document indexing and recall settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Characters per indexed passage.
    pub chunk_size: usize,
    /// Characters shared between consecutive passages.
    pub chunk_overlap: usize,
    /// Passages recalled per question.
    pub limit: usize,
    /// Minimum cosine similarity for a recalled passage.
    pub min_relevance: f64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 100,
            limit: 5,
            min_relevance: 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_default_config() {
        let config = ParleyConfig::default();
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.general.templates_dir, "crates/parley-chat/templates");
        assert_eq!(config.server.port, 3030);
        assert_eq!(config.ai.platform, AiPlatform::OpenAi);
        assert_eq!(config.ai.max_tokens, 200);
        assert_eq!(config.cache.session_ttl_hours, 12);
        assert_eq!(config.cache.field_metadata_ttl_hours, 24);
        assert_eq!(config.retrieval.chunk_size, 1000);
        assert!(config.reference_data.is_empty());
        assert!(config.connection_strings.is_empty());
    }

    #[test]
    fn test_load_valid_config() {
        let content = r#"
[general]
log_level = "debug"
templates_dir = "/etc/parley"

[ai]
platform = "azure_openai"
model = "gpt-4o"
endpoint = "https://example.openai.azure.com/"

[connection_strings]
sales = "data/sales.db"

[[reference_data]]
subject = "invoices"
type = "sql"
reference = "dbo.invoices"
connection_string_name = "sales"

[[reference_data]]
subject = "handbook"
type = "pdf"
reference = "docs/handbook.pdf"
"#;
        let file = create_temp_config(content);
        let config = ParleyConfig::load(file.path()).unwrap();
        assert_eq!(config.general.log_level, "debug");
        assert_eq!(config.ai.platform, AiPlatform::AzureOpenAi);
        assert_eq!(
            config.ai.resolved_endpoint(),
            "https://example.openai.azure.com"
        );
        assert_eq!(config.reference_data.len(), 2);
        assert_eq!(config.reference_data[0].kind, ReferenceType::Relational);
        assert_eq!(
            config.reference_data[0].connection_string_name.as_deref(),
            Some("sales")
        );
        assert_eq!(config.reference_data[1].kind, ReferenceType::Document);
        assert_eq!(config.connection_strings["sales"], "data/sales.db");
    }

    #[test]
    fn test_load_partial_config_uses_defaults() {
        let file = create_temp_config("[server]\nport = 8080\n");
        let config = ParleyConfig::load(file.path()).unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.cache.session_ttl_hours, 12);
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let config = ParleyConfig::load_or_default(Path::new("/nonexistent/parley.toml"));
        assert_eq!(config.general.log_level, "info");
    }

    #[test]
    fn test_load_invalid_toml() {
        let file = create_temp_config("this is {{ not valid TOML");
        assert!(ParleyConfig::load(file.path()).is_err());
    }

    #[test]
    fn test_duplicate_subject_rejected() {
        let content = r#"
[[reference_data]]
subject = "Invoices"
type = "sql"
reference = "dbo.invoices"

[[reference_data]]
subject = "invoices"
type = "pdf"
reference = "x.pdf"
"#;
        let file = create_temp_config(content);
        let err = ParleyConfig::load(file.path()).unwrap_err();
        assert!(matches!(err, ParleyError::Config(_)));
        assert!(err.to_string().contains("duplicate subject"));
    }

    #[test]
    fn test_relational_reference_requires_table() {
        let content = r#"
[[reference_data]]
subject = "invoices"
type = "sql"
reference = "invoices"
"#;
        let file = create_temp_config(content);
        let err = ParleyConfig::load(file.path()).unwrap_err();
        assert!(err.to_string().contains("schema.table"));
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("parley.toml");

        let mut config = ParleyConfig::default();
        config
            .connection_strings
            .insert("sales".to_string(), "sales.db".to_string());
        config.reference_data.push(ReferenceDescriptor {
            subject: "invoices".to_string(),
            kind: ReferenceType::Relational,
            reference: "main.invoices".to_string(),
            connection_string_name: Some("sales".to_string()),
        });
        config.save(&path).unwrap();

        let reloaded = ParleyConfig::load(&path).unwrap();
        assert_eq!(reloaded.reference_data, config.reference_data);
        assert_eq!(reloaded.connection_strings, config.connection_strings);
    }

    #[test]
    fn test_sweep_interval_zero_disables() {
        let mut cache = CacheConfig::default();
        assert_eq!(cache.sweep_interval(), Some(std::time::Duration::from_secs(30 * 60)));
        cache.sweep_interval_minutes = 0;
        assert_eq!(cache.sweep_interval(), None);
    }

    #[test]
    fn test_platform_default_endpoints() {
        assert_eq!(
            AiPlatform::OpenAi.default_endpoint(),
            "https://api.openai.com/v1"
        );
        assert_eq!(
            AiPlatform::DeepSeek.default_endpoint(),
            "https://api.deepseek.com/v1"
        );
    }

    #[test]
    fn test_resolved_api_key_prefers_file() {
        let ai = AiConfig {
            api_key: "from-file".to_string(),
            ..AiConfig::default()
        };
        assert_eq!(ai.resolved_api_key(), "from-file");
    }
}
