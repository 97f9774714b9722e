//! Prompt and response templates.
//!
//! Templates live in two JSON objects, `prompts.json` and `responses.json`,
//! mapping a message key to a template string with positional `{0}`, `{1}`
//! placeholders.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::error::ChatError;

pub const PROMPTS_FILE: &str = "prompts.json";
pub const RESPONSES_FILE: &str = "responses.json";

/// Prompt keys. Placeholders noted per key.
pub mod prompt {
    /// `{0}` subject list.
    pub const CONTEXT: &str = "context";
    /// `{0}` subject list, `{1}` query.
    pub const IS_CLASSIFIED: &str = "is_classified";
    /// `{0}` query.
    pub const NOT_CLASSIFIED: &str = "not_classified";
    /// `{0}` field list, `{1}` query.
    pub const GENERATE_SQL: &str = "generate_sql";
    /// `{0}` query result rows, `{1}` field list.
    pub const MAKE_DATA_READABLE: &str = "make_data_readable";
    /// `{0}` recalled passages, `{1}` query.
    pub const MEMORY_CONTENT: &str = "memory_content";
}

/// Response keys.
pub mod response {
    pub const NO_RESULT: &str = "no_result";
}

/// Key → template lookup.
#[async_trait]
pub trait TemplateStore: Send + Sync {
    /// Template `message_key` from `file_key`. Absent or empty keys are `NotFound`.
    async fn get(&self, file_key: &str, message_key: &str) -> Result<String, ChatError>;

    async fn prompt(&self, key: &str) -> Result<String, ChatError> {
        self.get(PROMPTS_FILE, key).await
    }

    async fn response(&self, key: &str) -> Result<String, ChatError> {
        self.get(RESPONSES_FILE, key).await
    }
}

/// Substitute positional `{n}` placeholders.
///
/// `{{` and `}}` produce literal braces. Placeholders with no matching
/// argument are left as written.
pub fn render_template(template: &str, args: &[&str]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(pos) = rest.find(['{', '}']) {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];

        if tail.starts_with("{{") || tail.starts_with("}}") {
            out.push_str(&tail[..1]);
            rest = &tail[2..];
            continue;
        }

        if tail.starts_with('{') {
            if let Some(close) = tail.find('}') {
                if let Ok(index) = tail[1..close].parse::<usize>() {
                    if let Some(arg) = args.get(index) {
                        out.push_str(arg);
                        rest = &tail[close + 1..];
                        continue;
                    }
                }
            }
        }

        out.push_str(&tail[..1]);
        rest = &tail[1..];
    }
    out.push_str(rest);
    out
}

// ---------------------------------------------------------------------------
// JsonTemplateStore
// ---------------------------------------------------------------------------

/// Reads template files from a directory on every lookup, so edits apply
/// without a restart.
#[derive(Debug, Clone)]
pub struct JsonTemplateStore {
    dir: PathBuf,
}

impl JsonTemplateStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl TemplateStore for JsonTemplateStore {
    async fn get(&self, file_key: &str, message_key: &str) -> Result<String, ChatError> {
        let path = self.dir.join(file_key);
        let content = tokio::fs::read_to_string(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ChatError::Template(format!("The {} file was not found.", file_key))
            } else {
                ChatError::Template(format!("Failed to read {}: {}", path.display(), e))
            }
        })?;

        let root: Value = serde_json::from_str(&content)
            .map_err(|e| ChatError::Template(format!("Invalid JSON in {}: {}", file_key, e)))?;

        debug!(file = file_key, key = message_key, "Template lookup");
        lookup(&root, file_key, message_key)
    }
}

fn lookup(root: &Value, file_key: &str, message_key: &str) -> Result<String, ChatError> {
    let value = match root.get(message_key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    };
    if value.is_empty() {
        return Err(ChatError::NotFound(format!(
            "Key '{}' not found in {}.",
            message_key, file_key
        )));
    }
    Ok(value)
}

// ---------------------------------------------------------------------------
// StaticTemplateStore
// ---------------------------------------------------------------------------

/// In-memory template store.
#[derive(Debug, Clone, Default)]
pub struct StaticTemplateStore {
    files: HashMap<String, Value>,
}

impl StaticTemplateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The default templates shipped in the crate's `templates/`.
    pub fn builtin() -> Result<Self, ChatError> {
        let mut store = Self::new();
        for (file, content) in [
            (PROMPTS_FILE, include_str!("../templates/prompts.json")),
            (RESPONSES_FILE, include_str!("../templates/responses.json")),
        ] {
            let value = serde_json::from_str(content)
                .map_err(|e| ChatError::Template(format!("Invalid JSON in {}: {}", file, e)))?;
            store.files.insert(file.to_string(), value);
        }
        Ok(store)
    }

    pub fn insert(&mut self, file_key: &str, message_key: &str, template: impl Into<String>) {
        let file = self
            .files
            .entry(file_key.to_string())
            .or_insert_with(|| Value::Object(Default::default()));
        if let Value::Object(map) = file {
            map.insert(message_key.to_string(), Value::String(template.into()));
        }
    }

    pub fn with(mut self, file_key: &str, message_key: &str, template: impl Into<String>) -> Self {
        self.insert(file_key, message_key, template);
        self
    }
}

#[async_trait]
impl TemplateStore for StaticTemplateStore {
    async fn get(&self, file_key: &str, message_key: &str) -> Result<String, ChatError> {
        let root = self
            .files
            .get(file_key)
            .ok_or_else(|| ChatError::Template(format!("The {} file was not found.", file_key)))?;
        lookup(root, file_key, message_key)
    }
}
