use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{FieldAttributes, FieldDefinition, FieldId, FormId, UserId, Version};
use crate::errors::{DomainError, DomainResult};

/// Bumped whenever the persisted payload layout changes incompatibly.
pub const SNAPSHOT_SCHEMA_VERSION: u32 = 1;

/// A field as frozen inside a snapshot. Options are embedded, not referenced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotField {
    pub id: FieldId,
    #[serde(flatten)]
    pub attrs: FieldAttributes,
}

/// Self-contained copy of a form's definition at one version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotPayload {
    pub schema_version: u32,
    pub name: String,
    pub description: Option<String>,
    pub fields: Vec<SnapshotField>,
}

impl SnapshotPayload {
    /// Encodes the payload for storage. This is the only place the JSON
    /// text form is produced.
    pub fn encode(&self) -> DomainResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn decode(raw: &str) -> DomainResult<Self> {
        let payload: SnapshotPayload = serde_json::from_str(raw)?;
        if payload.schema_version > SNAPSHOT_SCHEMA_VERSION {
            return Err(DomainError::Serialization(format!(
                "snapshot schema version {} is newer than supported {}",
                payload.schema_version, SNAPSHOT_SCHEMA_VERSION
            )));
        }
        Ok(payload)
    }

    /// Rehydrates the frozen fields as definitions of `version`.
    pub fn to_definitions(&self, form_id: FormId, version: Version) -> Vec<FieldDefinition> {
        self.fields
            .iter()
            .map(|field| FieldDefinition {
                id: field.id,
                form_id,
                version,
                attrs: field.attrs.clone(),
            })
            .collect()
    }
}

/// Write-once record of a version that has been superseded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormVersionSnapshot {
    pub form_id: FormId,
    pub version: Version,
    pub payload: SnapshotPayload,
    pub created_by: UserId,
    pub created_at: DateTime<Utc>,
}

impl FormVersionSnapshot {
    pub fn summary(&self) -> SnapshotSummary {
        SnapshotSummary {
            version: self.version,
            name: self.payload.name.clone(),
            field_count: self.payload.fields.len(),
            created_by: self.created_by,
            created_at: self.created_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotSummary {
    pub version: Version,
    pub name: String,
    pub field_count: usize,
    pub created_by: UserId,
    pub created_at: DateTime<Utc>,
}
