//! # Core Traits (Ports)
//!
//! Any storage adapter must implement these traits to be used by the services.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::errors::DomainResult;
use crate::models::{
    FieldAttributes, FieldDefinition, FieldId, Form, FormId, FormResponse,
    FormResponseHistoryEntry, FormStatus, FormVersionSnapshot, NewForm, NewResponse, ResponseId,
    ResponseUpdate, ScheduleWindow, UserId, Version,
};

/// Everything one batch save writes, applied by the store as a single unit.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldBatchPlan {
    pub form_id: FormId,
    /// The form revision observed when the plan was computed.
    pub expected_revision: u64,
    /// Version every surviving and created field is stamped with.
    pub resulting_version: Version,
    /// Present only for a version-breaking edit; keyed by the version being left.
    pub snapshot: Option<FormVersionSnapshot>,
    pub delete_ids: Vec<FieldId>,
    /// Existing fields rewritten in place, already stamped with `resulting_version`.
    pub updates: Vec<FieldDefinition>,
    /// New fields; the store assigns ids and stamps `resulting_version`.
    pub inserts: Vec<FieldAttributes>,
    pub schedule: Option<ScheduleWindow>,
    pub applied_at: DateTime<Utc>,
}

/// State visible after a plan committed.
#[derive(Debug, Clone, PartialEq)]
pub struct AppliedBatch {
    pub form: Form,
    pub fields: Vec<FieldDefinition>,
}

/// A form and its live fields as of one instant.
#[derive(Debug, Clone, PartialEq)]
pub struct LiveForm {
    pub form: Form,
    pub fields: Vec<FieldDefinition>,
}

/// Persistence contract for forms, their live fields and their snapshots.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait FormRepository: Send + Sync {
    // Form Operations
    async fn create_form(&self, form: NewForm) -> DomainResult<Form>;
    async fn get_form(&self, form_id: FormId) -> DomainResult<Option<Form>>;
    async fn set_status(&self, form_id: FormId, status: FormStatus) -> DomainResult<Form>;

    // Field Operations
    /// Live fields ordered by `order`, then id.
    async fn list_fields(&self, form_id: FormId) -> DomainResult<Vec<FieldDefinition>>;

    /// The form with its live fields, read together so the fields always
    /// belong to the returned `current_version`.
    async fn get_live_form(&self, form_id: FormId) -> DomainResult<Option<LiveForm>>;

    /// Applies the whole plan or nothing.
    ///
    /// Fails with `ConcurrencyConflict` when the form's revision no longer
    /// equals `plan.expected_revision`.
    async fn apply_field_batch(&self, plan: FieldBatchPlan) -> DomainResult<AppliedBatch>;

    // Snapshot Operations
    async fn get_snapshot(
        &self,
        form_id: FormId,
        version: Version,
    ) -> DomainResult<Option<FormVersionSnapshot>>;

    /// All snapshots of a form in ascending version order.
    async fn list_snapshots(&self, form_id: FormId) -> DomainResult<Vec<FormVersionSnapshot>>;
}

/// Persistence contract for submissions and their edit history.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait ResponseRepository: Send + Sync {
    /// Stamps `form_version` with the version current when the insert commits.
    async fn insert_response(&self, response: NewResponse) -> DomainResult<FormResponse>;
    async fn get_response(&self, response_id: ResponseId) -> DomainResult<Option<FormResponse>>;
    async fn list_responses(&self, form_id: FormId) -> DomainResult<Vec<FormResponse>>;
    async fn count_responses_by(&self, form_id: FormId, user_id: UserId) -> DomainResult<u64>;

    /// Records the pre-edit content as a history entry and applies the update atomically.
    async fn update_response(&self, update: ResponseUpdate) -> DomainResult<FormResponse>;

    /// History entries in ascending edit time.
    async fn list_response_history(
        &self,
        response_id: ResponseId,
    ) -> DomainResult<Vec<FormResponseHistoryEntry>>;
}
