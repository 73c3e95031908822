//! # In-memory store
//!
//! `dashmap`-backed implementation of both ports. Each form's live fields,
//! version counter and snapshots sit in one map entry, so holding that entry's
//! write guard serializes every batch save on the form while other forms
//! proceed independently.
//!
//! Snapshots are kept encoded, exactly as a database would hold them, and are
//! decoded on every read.

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use domains::{
    AppliedBatch, DomainError, DomainResult, FieldBatchPlan, FieldDefinition, FieldId, Form,
    FormId, FormRepository, FormResponse, FormResponseHistoryEntry, FormStatus,
    FormVersionSnapshot, LiveForm, NewForm, NewResponse, ResponseId, ResponseRepository,
    ResponseUpdate, SnapshotPayload, UserId, Version, INITIAL_VERSION,
};
use tracing::debug;
use uuid::Uuid;

use crate::plan::check_plan;

struct StoredSnapshot {
    payload: String,
    created_by: UserId,
    created_at: DateTime<Utc>,
}

struct FormEntry {
    form: Form,
    fields: Vec<FieldDefinition>,
    snapshots: BTreeMap<Version, StoredSnapshot>,
}

impl FormEntry {
    fn decode_snapshot(&self, version: Version) -> DomainResult<Option<FormVersionSnapshot>> {
        self.snapshots
            .get(&version)
            .map(|stored| {
                Ok(FormVersionSnapshot {
                    form_id: self.form.id,
                    version,
                    payload: SnapshotPayload::decode(&stored.payload)?,
                    created_by: stored.created_by,
                    created_at: stored.created_at,
                })
            })
            .transpose()
    }
}

fn sort_fields(fields: &mut [FieldDefinition]) {
    fields.sort_by_key(|field| (field.attrs.order, field.id));
}

pub struct InMemoryFormStore {
    forms: DashMap<FormId, FormEntry>,
    responses: DashMap<ResponseId, FormResponse>,
    history: DashMap<ResponseId, Vec<FormResponseHistoryEntry>>,
    next_field_id: AtomicI64,
}

impl InMemoryFormStore {
    pub fn new() -> Self {
        Self {
            forms: DashMap::new(),
            responses: DashMap::new(),
            history: DashMap::new(),
            next_field_id: AtomicI64::new(1),
        }
    }

    fn form_not_found(form_id: FormId) -> DomainError {
        DomainError::not_found("form", form_id)
    }
}

impl Default for InMemoryFormStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FormRepository for InMemoryFormStore {
    async fn create_form(&self, form: NewForm) -> DomainResult<Form> {
        let now = Utc::now();
        let form = Form {
            id: FormId::new(),
            owner_id: form.owner_id,
            name: form.name,
            description: form.description,
            status: FormStatus::Draft,
            policy: form.policy,
            schedule: form.schedule,
            current_version: INITIAL_VERSION,
            revision: 0,
            created_at: now,
            updated_at: now,
        };
        self.forms.insert(
            form.id,
            FormEntry {
                form: form.clone(),
                fields: Vec::new(),
                snapshots: BTreeMap::new(),
            },
        );
        Ok(form)
    }

    async fn get_form(&self, form_id: FormId) -> DomainResult<Option<Form>> {
        Ok(self.forms.get(&form_id).map(|entry| entry.form.clone()))
    }

    async fn set_status(&self, form_id: FormId, status: FormStatus) -> DomainResult<Form> {
        let mut entry = self
            .forms
            .get_mut(&form_id)
            .ok_or_else(|| Self::form_not_found(form_id))?;
        entry.form.status = status;
        entry.form.updated_at = Utc::now();
        Ok(entry.form.clone())
    }

    async fn list_fields(&self, form_id: FormId) -> DomainResult<Vec<FieldDefinition>> {
        self.forms
            .get(&form_id)
            .map(|entry| entry.fields.clone())
            .ok_or_else(|| Self::form_not_found(form_id))
    }

    async fn get_live_form(&self, form_id: FormId) -> DomainResult<Option<LiveForm>> {
        Ok(self.forms.get(&form_id).map(|entry| LiveForm {
            form: entry.form.clone(),
            fields: entry.fields.clone(),
        }))
    }

    async fn apply_field_batch(&self, plan: FieldBatchPlan) -> DomainResult<AppliedBatch> {
        let mut guard = self
            .forms
            .get_mut(&plan.form_id)
            .ok_or_else(|| Self::form_not_found(plan.form_id))?;
        let entry = guard.value_mut();

        let live_ids: HashSet<FieldId> = entry.fields.iter().map(|field| field.id).collect();
        check_plan(&plan, entry.form.current_version, entry.form.revision, &live_ids)?;

        // Everything fallible happens before the entry is touched.
        let snapshot = match &plan.snapshot {
            Some(snapshot) if entry.snapshots.contains_key(&snapshot.version) => {
                return Err(DomainError::Consistency(format!(
                    "snapshot {} of form {} already exists",
                    snapshot.version, plan.form_id
                )));
            }
            Some(snapshot) => Some((
                snapshot.version,
                StoredSnapshot {
                    payload: snapshot.payload.encode()?,
                    created_by: snapshot.created_by,
                    created_at: snapshot.created_at,
                },
            )),
            None => None,
        };

        let version = plan.resulting_version;
        let mut fields: Vec<FieldDefinition> = plan
            .updates
            .into_iter()
            .map(|field| FieldDefinition {
                form_id: plan.form_id,
                version,
                ..field
            })
            .collect();
        fields.extend(plan.inserts.into_iter().map(|attrs| FieldDefinition {
            id: FieldId(self.next_field_id.fetch_add(1, Ordering::Relaxed)),
            form_id: plan.form_id,
            version,
            attrs,
        }));
        sort_fields(&mut fields);

        if let Some((left_version, stored)) = snapshot {
            entry.snapshots.insert(left_version, stored);
        }
        entry.fields = fields;
        entry.form.current_version = version;
        entry.form.revision += 1;
        entry.form.updated_at = plan.applied_at;
        if let Some(schedule) = plan.schedule {
            entry.form.schedule = schedule;
        }
        debug!(form_id = %plan.form_id, revision = entry.form.revision, "field batch committed");

        Ok(AppliedBatch {
            form: entry.form.clone(),
            fields: entry.fields.clone(),
        })
    }

    async fn get_snapshot(
        &self,
        form_id: FormId,
        version: Version,
    ) -> DomainResult<Option<FormVersionSnapshot>> {
        match self.forms.get(&form_id) {
            Some(entry) => entry.decode_snapshot(version),
            None => Ok(None),
        }
    }

    async fn list_snapshots(&self, form_id: FormId) -> DomainResult<Vec<FormVersionSnapshot>> {
        let entry = self
            .forms
            .get(&form_id)
            .ok_or_else(|| Self::form_not_found(form_id))?;
        entry
            .snapshots
            .keys()
            .filter_map(|version| entry.decode_snapshot(*version).transpose())
            .collect()
    }
}

#[async_trait]
impl ResponseRepository for InMemoryFormStore {
    async fn insert_response(&self, response: NewResponse) -> DomainResult<FormResponse> {
        // Holding the form guard keeps a batch save from bumping the version mid-insert.
        let entry = self
            .forms
            .get(&response.form_id)
            .ok_or_else(|| Self::form_not_found(response.form_id))?;
        let stored = FormResponse {
            id: ResponseId::new(),
            form_id: response.form_id,
            form_version: entry.form.current_version,
            answers: response.answers,
            rating: response.rating,
            comments: response.comments,
            submitter: response.submitter,
            submitted_at: response.submitted_at,
            updated_at: response.submitted_at,
        };
        self.responses.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn get_response(&self, response_id: ResponseId) -> DomainResult<Option<FormResponse>> {
        Ok(self.responses.get(&response_id).map(|r| r.value().clone()))
    }

    async fn list_responses(&self, form_id: FormId) -> DomainResult<Vec<FormResponse>> {
        let mut responses: Vec<FormResponse> = self
            .responses
            .iter()
            .filter(|r| r.form_id == form_id)
            .map(|r| r.value().clone())
            .collect();
        responses.sort_by_key(|r| (r.submitted_at, r.id));
        Ok(responses)
    }

    async fn count_responses_by(&self, form_id: FormId, user_id: UserId) -> DomainResult<u64> {
        let count = self
            .responses
            .iter()
            .filter(|r| r.form_id == form_id && r.submitter.user_id() == Some(user_id))
            .count();
        Ok(count as u64)
    }

    async fn update_response(&self, update: ResponseUpdate) -> DomainResult<FormResponse> {
        let mut response = self
            .responses
            .get_mut(&update.response_id)
            .ok_or_else(|| DomainError::not_found("response", update.response_id))?;

        let entry = FormResponseHistoryEntry {
            id: Uuid::now_v7(),
            response_id: update.response_id,
            answers: std::mem::replace(&mut response.answers, update.answers),
            rating: std::mem::replace(&mut response.rating, update.rating),
            comments: std::mem::replace(&mut response.comments, update.comments),
            edited_by: update.editor,
            edited_at: update.edited_at,
        };
        response.updated_at = update.edited_at;
        self.history
            .entry(update.response_id)
            .or_default()
            .push(entry);
        Ok(response.clone())
    }

    async fn list_response_history(
        &self,
        response_id: ResponseId,
    ) -> DomainResult<Vec<FormResponseHistoryEntry>> {
        Ok(self
            .history
            .get(&response_id)
            .map(|entries| entries.value().clone())
            .unwrap_or_default())
    }
}
