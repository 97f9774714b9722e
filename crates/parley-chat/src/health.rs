//! Reachability report over every configured backend.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use parley_core::types::ReferenceType;
use parley_storage::{DocumentDriver, RelationalDriver};

use crate::catalog::ReferenceCatalog;

/// Result of probing every data source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    /// `healthy` when every source answered, `degraded` otherwise.
    pub status: String,
    pub version: String,
    pub timestamp: DateTime<Utc>,
    pub model: String,
    /// Connection string names and document subjects, mapped to reachability.
    pub sources: BTreeMap<String, bool>,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        self.sources.values().all(|ok| *ok)
    }
}

/// Probe each connection string with `relational` and each document
/// subject's reference with `document`.
pub async fn check_health(
    catalog: &ReferenceCatalog,
    relational: &dyn RelationalDriver,
    document: &dyn DocumentDriver,
    model: &str,
) -> HealthReport {
    let mut sources = BTreeMap::new();

    for (name, connection) in catalog.connection_strings() {
        sources.insert(name.clone(), relational.can_connect(connection).await);
    }

    for descriptor in catalog
        .list_all()
        .iter()
        .filter(|d| d.kind == ReferenceType::Document)
    {
        let ok = document.can_connect(&descriptor.reference).await;
        sources.insert(descriptor.subject.clone(), ok);
    }

    for (name, ok) in &sources {
        if !ok {
            warn!(source = %name, "Health probe failed");
        }
    }

    let mut report = HealthReport {
        status: String::new(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now(),
        model: model.to_string(),
        sources,
    };
    report.status = if report.is_healthy() { "healthy" } else { "degraded" }.to_string();
    report
}
