//! # Snapshot Serializer
//!
//! Freezes a form's definition so historical responses can be interpreted
//! after the live fields move on or disappear.

use chrono::{DateTime, Utc};
use domains::{
    FieldDefinition, Form, FormVersionSnapshot, SnapshotField, SnapshotPayload, UserId,
    SNAPSHOT_SCHEMA_VERSION,
};

/// Copies name, description and every field attribute, keeping field order.
pub fn create_form_snapshot(form: &Form, fields: &[FieldDefinition]) -> SnapshotPayload {
    SnapshotPayload {
        schema_version: SNAPSHOT_SCHEMA_VERSION,
        name: form.name.clone(),
        description: form.description.clone(),
        fields: fields
            .iter()
            .map(|field| SnapshotField {
                id: field.id,
                attrs: field.attrs.clone(),
            })
            .collect(),
    }
}

/// Snapshot of the live state, keyed by the form's current version.
pub fn snapshot_current_version(
    form: &Form,
    fields: &[FieldDefinition],
    created_by: UserId,
    created_at: DateTime<Utc>,
) -> FormVersionSnapshot {
    FormVersionSnapshot {
        form_id: form.id,
        version: form.current_version,
        payload: create_form_snapshot(form, fields),
        created_by,
        created_at,
    }
}
