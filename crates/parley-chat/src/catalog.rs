//! Reference catalog: subject name → backend descriptor.

use std::collections::BTreeMap;

use tracing::warn;

use parley_core::config::ParleyConfig;
use parley_core::types::ReferenceDescriptor;

use crate::error::ChatError;

/// A descriptor together with the connection string it resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedReference {
    pub descriptor: ReferenceDescriptor,
    pub connection: String,
}

/// Read-only registry of subjects, loaded once from configuration.
#[derive(Debug, Clone, Default)]
pub struct ReferenceCatalog {
    descriptors: Vec<ReferenceDescriptor>,
    connection_strings: BTreeMap<String, String>,
}

impl ReferenceCatalog {
    pub fn new(
        descriptors: Vec<ReferenceDescriptor>,
        connection_strings: BTreeMap<String, String>,
    ) -> Self {
        Self {
            descriptors,
            connection_strings,
        }
    }

    pub fn from_config(config: &ParleyConfig) -> Self {
        Self::new(
            config.reference_data.clone(),
            config.connection_strings.clone(),
        )
    }

    /// Find the descriptor for `subject` (case-insensitive) and its connection string.
    ///
    /// The connection string is looked up by the descriptor's
    /// `connection_string_name`; without one, or when the name is not
    /// configured, the descriptor's `reference` is used.
    pub fn resolve(&self, subject: &str) -> Result<ResolvedReference, ChatError> {
        let descriptor = self
            .descriptors
            .iter()
            .find(|d| d.matches(subject))
            .ok_or_else(|| ChatError::NotFound(format!("subject '{}'", subject.trim())))?;

        let connection = match &descriptor.connection_string_name {
            Some(name) => match self.connection_strings.get(name) {
                Some(conn) => conn.clone(),
                None => {
                    warn!(
                        subject = %descriptor.subject,
                        connection_string_name = %name,
                        "Connection string not configured, falling back to reference"
                    );
                    descriptor.reference.clone()
                }
            },
            None => descriptor.reference.clone(),
        };

        Ok(ResolvedReference {
            descriptor: descriptor.clone(),
            connection,
        })
    }

    /// Every registered descriptor, in configuration order.
    pub fn list_all(&self) -> &[ReferenceDescriptor] {
        &self.descriptors
    }

    /// Subject names, in configuration order.
    pub fn subjects(&self) -> Vec<String> {
        self.descriptors.iter().map(|d| d.subject.clone()).collect()
    }

    pub fn connection_strings(&self) -> &BTreeMap<String, String> {
        &self.connection_strings
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}
