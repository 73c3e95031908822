//! # Batch Field Editor
//!
//! Replaces a form's whole field list in one step, opening a new form version
//! first when the edit could corrupt previously collected answers.
//!
//! # Developer Note
//! The editor never writes piecemeal. Everything it decides is packed into a
//! [`FieldBatchPlan`] and handed to the store, which applies it under a
//! form-scoped lock after checking the revision the plan was computed from.
//! A concurrent edit therefore surfaces as `ConcurrencyConflict`, and the
//! caller retries the whole call with fresh state.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use domains::{
    DomainError, DomainResult, FieldBatchPlan, FieldDefinition, FieldId, FormId,
    FormRepository, ProposedField, ScheduleWindow, UserId, Version,
};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::forms::{load_owned_form, validate_schedule};
use crate::metrics::EditorMetrics;
use crate::snapshot::snapshot_current_version;
use crate::validation::{validate_field_batch, FieldLimits};
use crate::version_break::{find_version_break, BreakReason};

/// Result of a committed batch save.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchSaveOutcome {
    pub version_changed: bool,
    pub new_version: Version,
    pub fields: Vec<FieldDefinition>,
    #[serde(skip)]
    pub break_reason: Option<BreakReason>,
}

pub struct BatchFieldEditor {
    forms: Arc<dyn FormRepository>,
    limits: FieldLimits,
    metrics: EditorMetrics,
}

impl BatchFieldEditor {
    pub fn new(forms: Arc<dyn FormRepository>, limits: FieldLimits, metrics: EditorMetrics) -> Self {
        Self {
            forms,
            limits,
            metrics,
        }
    }

    /// Replaces the live fields of `form_id` with `proposed`.
    ///
    /// `schedule`, when given, replaces the form's open/deadline window; it
    /// never influences versioning.
    #[tracing::instrument(skip_all, fields(form_id = %form_id, actor = %actor))]
    pub async fn batch_save_fields(
        &self,
        actor: UserId,
        form_id: FormId,
        proposed: Vec<ProposedField>,
        schedule: Option<ScheduleWindow>,
    ) -> DomainResult<BatchSaveOutcome> {
        let proposed = validate_field_batch(proposed, &self.limits)?;
        if let Some(window) = &schedule {
            validate_schedule(window)?;
        }

        let form = load_owned_form(&*self.forms, form_id, actor).await?;
        let live = self.forms.list_fields(form_id).await?;

        let live_ids: HashSet<FieldId> = live.iter().map(|field| field.id).collect();
        if let Some(foreign) = proposed
            .iter()
            .filter_map(ProposedField::persisted_id)
            .find(|id| !live_ids.contains(id))
        {
            return Err(DomainError::Validation(format!(
                "field {foreign} does not belong to form {form_id}"
            )));
        }

        let break_reason = find_version_break(&live, &proposed);
        let now = Utc::now();
        let (snapshot, resulting_version) = match break_reason {
            Some(reason) => {
                debug!(%reason, "edit breaks compatibility");
                let next = form.current_version.checked_add(1).ok_or_else(|| {
                    DomainError::Consistency(format!("form {form_id} version counter overflow"))
                })?;
                (
                    Some(snapshot_current_version(&form, &live, actor, now)),
                    next,
                )
            }
            None => (None, form.current_version),
        };

        let kept: HashSet<FieldId> = proposed
            .iter()
            .filter_map(ProposedField::persisted_id)
            .collect();
        let delete_ids: Vec<FieldId> = live
            .iter()
            .map(|field| field.id)
            .filter(|id| !kept.contains(id))
            .collect();

        let mut updates = Vec::new();
        let mut inserts = Vec::new();
        for field in proposed {
            match field.persisted_id() {
                Some(id) => updates.push(FieldDefinition {
                    id,
                    form_id,
                    version: resulting_version,
                    attrs: field.attrs,
                }),
                None => inserts.push(field.attrs),
            }
        }
        let (deleted, updated, created) = (delete_ids.len(), updates.len(), inserts.len());

        let plan = FieldBatchPlan {
            form_id,
            expected_revision: form.revision,
            resulting_version,
            snapshot,
            delete_ids,
            updates,
            inserts,
            schedule,
            applied_at: now,
        };

        let applied = match self.forms.apply_field_batch(plan).await {
            Ok(applied) => applied,
            Err(err @ DomainError::ConcurrencyConflict { .. }) => {
                self.metrics.edit_conflicts.inc();
                warn!(error = %err, "batch save lost a race with another edit");
                return Err(err);
            }
            Err(err) => return Err(err),
        };

        self.metrics.batch_saves.inc();
        let version_changed = break_reason.is_some();
        if version_changed {
            self.metrics.version_bumps.inc();
            info!(
                from_version = form.current_version,
                to_version = applied.form.current_version,
                "form version bumped"
            );
        }
        info!(
            version = applied.form.current_version,
            deleted, updated, created, "field batch saved"
        );

        Ok(BatchSaveOutcome {
            version_changed,
            new_version: applied.form.current_version,
            fields: applied.fields,
            break_reason,
        })
    }

    /// Runs [`Self::batch_save_fields`] up to `attempts` times, retrying only
    /// edit conflicts. Each attempt re-reads the live form.
    pub async fn save_with_retry(
        &self,
        actor: UserId,
        form_id: FormId,
        proposed: Vec<ProposedField>,
        schedule: Option<ScheduleWindow>,
        attempts: u32,
    ) -> DomainResult<BatchSaveOutcome> {
        let attempts = attempts.max(1);
        let mut attempt = 1;
        loop {
            match self
                .batch_save_fields(actor, form_id, proposed.clone(), schedule)
                .await
            {
                Err(err) if err.is_retryable() && attempt < attempts => {
                    debug!(attempt, %form_id, "retrying batch save");
                    attempt += 1;
                }
                result => return result,
            }
        }
    }
}
