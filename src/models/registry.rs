//! `RegistryEntry` (spec §3): the two forms the ID Registry (§4.2) stores,
//! each with its own TTL.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RegistryEntry {
    Missing {
        catalog_id: String,
        marked_at: DateTime<Utc>,
        reason: String,
    },
    Validated {
        catalog_id: String,
        features_id: String,
        validated_at: DateTime<Utc>,
    },
}

impl RegistryEntry {
    pub fn missing(catalog_id: impl Into<String>, reason: impl Into<String>) -> Self {
        RegistryEntry::Missing {
            catalog_id: catalog_id.into(),
            marked_at: Utc::now(),
            reason: reason.into(),
        }
    }

    pub fn validated(catalog_id: impl Into<String>, features_id: impl Into<String>) -> Self {
        RegistryEntry::Validated {
            catalog_id: catalog_id.into(),
            features_id: features_id.into(),
            validated_at: Utc::now(),
        }
    }

    pub fn catalog_id(&self) -> &str {
        match self {
            RegistryEntry::Missing { catalog_id, .. } => catalog_id,
            RegistryEntry::Validated { catalog_id, .. } => catalog_id,
        }
    }
}
