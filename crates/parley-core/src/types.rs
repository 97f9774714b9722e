//! Shared domain types: reference descriptors and conversation history.

use std::fmt;

use serde::{Deserialize, Serialize};

// =============================================================================
// Reference data
// =============================================================================

/// Kind of backend a subject is served from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReferenceType {
    /// A table in a relational store, answered by generated SQL.
    #[serde(alias = "sql", alias = "Sql", alias = "Relational")]
    Relational,
    /// A document on disk, answered by retrieval-augmented generation.
    #[serde(alias = "pdf", alias = "Pdf", alias = "Document")]
    Document,
}

impl fmt::Display for ReferenceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReferenceType::Relational => write!(f, "relational"),
            ReferenceType::Document => write!(f, "document"),
        }
    }
}

/// Static description of the backend serving one subject.
///
/// Loaded once from configuration and never mutated at runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceDescriptor {
    /// Subject name, unique across the catalog (compared case-insensitively).
    pub subject: String,
    /// Backend type.
    #[serde(rename = "type")]
    pub kind: ReferenceType,
    /// `schema.table` for relational subjects, a file path for documents.
    pub reference: String,
    /// Key into the `[connection_strings]` table.
    #[serde(
        default,
        alias = "connection_identifier",
        skip_serializing_if = "Option::is_none"
    )]
    pub connection_string_name: Option<String>,
}

impl ReferenceDescriptor {
    /// Whether `subject` names this descriptor, ignoring case and surrounding whitespace.
    pub fn matches(&self, subject: &str) -> bool {
        self.subject.eq_ignore_ascii_case(subject.trim())
    }

    /// Split a `schema.table` reference into its first two dot-delimited parts.
    ///
    /// Returns `None` when the reference has no table component.
    pub fn schema_and_table(&self) -> Option<(&str, &str)> {
        let mut parts = self.reference.split('.');
        let schema = parts.next()?.trim();
        let table = parts.next()?.trim();
        if schema.is_empty() || table.is_empty() {
            return None;
        }
        Some((schema, table))
    }
}

// =============================================================================
// Conversation history
// =============================================================================

/// Author of a message in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

impl ChatRole {
    /// Wire name used by OpenAI-compatible chat APIs.
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatRole::System => "system",
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
        }
    }
}

impl fmt::Display for ChatRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single message in a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

/// Ordered, append-only message log owned by one requestor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationHistory {
    messages: Vec<ChatMessage>,
}

impl ConversationHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_message(&mut self, role: ChatRole, content: impl Into<String>) {
        self.messages.push(ChatMessage {
            role,
            content: content.into(),
        });
    }

    pub fn add_system_message(&mut self, content: impl Into<String>) {
        self.add_message(ChatRole::System, content);
    }

    pub fn add_user_message(&mut self, content: impl Into<String>) {
        self.add_message(ChatRole::User, content);
    }

    pub fn add_assistant_message(&mut self, content: impl Into<String>) {
        self.add_message(ChatRole::Assistant, content);
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn last(&self) -> Option<&ChatMessage> {
        self.messages.last()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    /// True when every message of `self` appears, in order, at the start of `other`.
    pub fn is_prefix_of(&self, other: &ConversationHistory) -> bool {
        other.messages.starts_with(&self.messages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(reference: &str) -> ReferenceDescriptor {
        ReferenceDescriptor {
            subject: "Invoices".to_string(),
            kind: ReferenceType::Relational,
            reference: reference.to_string(),
            connection_string_name: None,
        }
    }

    #[test]
    fn test_reference_type_aliases() {
        let sql: ReferenceType = serde_json::from_str("\"sql\"").unwrap();
        let pdf: ReferenceType = serde_json::from_str("\"pdf\"").unwrap();
        let relational: ReferenceType = serde_json::from_str("\"relational\"").unwrap();
        let document: ReferenceType = serde_json::from_str("\"Document\"").unwrap();
        assert_eq!(sql, ReferenceType::Relational);
        assert_eq!(relational, ReferenceType::Relational);
        assert_eq!(pdf, ReferenceType::Document);
        assert_eq!(document, ReferenceType::Document);
    }

    #[test]
    fn test_reference_type_display() {
        assert_eq!(ReferenceType::Relational.to_string(), "relational");
        assert_eq!(ReferenceType::Document.to_string(), "document");
    }

    #[test]
    fn test_descriptor_matches_case_insensitive() {
        let d = descriptor("dbo.invoices");
        assert!(d.matches("invoices"));
        assert!(d.matches("INVOICES"));
        assert!(d.matches("  Invoices \n"));
        assert!(!d.matches("invoice"));
    }

    #[test]
    fn test_schema_and_table() {
        assert_eq!(descriptor("dbo.invoices").schema_and_table(), Some(("dbo", "invoices")));
        assert_eq!(descriptor("a.b.c").schema_and_table(), Some(("a", "b")));
        assert_eq!(descriptor("invoices").schema_and_table(), None);
        assert_eq!(descriptor("dbo.").schema_and_table(), None);
    }

    #[test]
    fn test_descriptor_deserializes_type_field() {
        let json = r#"{"subject":"manual","type":"pdf","reference":"docs/manual.pdf"}"#;
        let d: ReferenceDescriptor = serde_json::from_str(json).unwrap();
        assert_eq!(d.kind, ReferenceType::Document);
        assert!(d.connection_string_name.is_none());
    }

    #[test]
    fn test_history_append_order() {
        let mut history = ConversationHistory::new();
        history.add_system_message("sys");
        history.add_user_message("hi");
        history.add_assistant_message("hello");

        assert_eq!(history.len(), 3);
        assert_eq!(history.messages()[0].role, ChatRole::System);
        assert_eq!(history.messages()[1].role, ChatRole::User);
        assert_eq!(history.last().unwrap().content, "hello");
    }

    #[test]
    fn test_history_clear() {
        let mut history = ConversationHistory::new();
        history.add_user_message("hi");
        history.clear();
        assert!(history.is_empty());
    }

    #[test]
    fn test_history_prefix() {
        let mut before = ConversationHistory::new();
        before.add_user_message("one");
        let mut after = before.clone();
        after.add_assistant_message("two");

        assert!(before.is_prefix_of(&after));
        assert!(!after.is_prefix_of(&before));
        assert!(ConversationHistory::new().is_prefix_of(&before));
    }

    #[test]
    fn test_role_wire_names() {
        assert_eq!(ChatRole::System.as_str(), "system");
        assert_eq!(ChatRole::User.to_string(), "user");
        assert_eq!(ChatRole::Assistant.as_str(), "assistant");
    }
}
