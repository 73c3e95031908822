//! Shared fixtures for the integration suites.
//!
//! Every suite runs the real services over [`InMemoryFormStore`]; nothing
//! here is mocked.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use domains::{
    AppliedBatch, DomainResult, FieldAttributes, FieldBatchPlan, FieldDefinition, FieldId,
    FieldOption, FieldType, Form, FormId, FormRepository, FormStatus, FormVersionSnapshot,
    LiveForm, NewForm, ProposedField, ResponseRepository, ScheduleWindow, SubmissionPolicy, UserId,
    Version,
};
use services::{
    BatchFieldEditor, EditorMetrics, FieldLimits, FormService, ResponseBinder, ResponseService,
    VersionHistoryService,
};
use storage_adapters::InMemoryFormStore;
use tokio::sync::Barrier;

/// All services wired over one store, plus the counters they share.
pub struct Harness {
    pub repo: Arc<dyn FormRepository>,
    pub metrics: EditorMetrics,
    pub forms: FormService,
    pub editor: BatchFieldEditor,
    pub binder: Arc<ResponseBinder>,
    pub responses: ResponseService,
    pub history: VersionHistoryService,
}

impl Harness {
    pub fn new() -> Self {
        let store = Arc::new(InMemoryFormStore::new());
        Self::with_repos(store.clone(), store)
    }

    pub fn with_repos(
        repo: Arc<dyn FormRepository>,
        responses: Arc<dyn ResponseRepository>,
    ) -> Self {
        let metrics = EditorMetrics::default();
        let binder = Arc::new(ResponseBinder::new(repo.clone(), metrics.clone()));
        Self {
            forms: FormService::new(repo.clone()),
            editor: BatchFieldEditor::new(repo.clone(), FieldLimits::default(), metrics.clone()),
            responses: ResponseService::new(repo.clone(), responses, binder.clone()),
            history: VersionHistoryService::new(repo.clone()),
            binder,
            metrics,
            repo,
        }
    }

    /// Creates a form with `fields`, saves them as version 1 and publishes it.
    pub async fn published_form(
        &self,
        owner: UserId,
        policy: SubmissionPolicy,
        fields: Vec<FieldAttributes>,
    ) -> (Form, Vec<FieldDefinition>) {
        let form = self
            .forms
            .create_form(owner, "Event signup", None, policy, ScheduleWindow::default())
            .await
            .expect("create form");
        let saved = self
            .editor
            .batch_save_fields(
                owner,
                form.id,
                fields.into_iter().map(ProposedField::new).collect(),
                None,
            )
            .await
            .expect("initial field save");
        let form = self.forms.publish(form.id, owner).await.expect("publish");
        (form, saved.fields)
    }

    pub async fn live_fields(&self, form_id: FormId) -> Vec<FieldDefinition> {
        self.repo.list_fields(form_id).await.expect("list fields")
    }

    pub async fn current_version(&self, form_id: FormId) -> Version {
        self.repo
            .get_form(form_id)
            .await
            .expect("get form")
            .expect("form exists")
            .current_version
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}

pub fn open_policy() -> SubmissionPolicy {
    SubmissionPolicy {
        allow_anonymous: true,
        allow_multiple_submissions: true,
        allow_editing: true,
    }
}

pub fn text(label: &str, order: i32) -> FieldAttributes {
    let mut attrs = FieldAttributes::new(label, FieldType::Text);
    attrs.order = order;
    attrs
}

pub fn required(mut attrs: FieldAttributes) -> FieldAttributes {
    attrs.required = true;
    attrs
}

pub fn number(label: &str, order: i32, min: f64, max: f64) -> FieldAttributes {
    let mut attrs = FieldAttributes::new(label, FieldType::Number);
    attrs.order = order;
    attrs.min_value = Some(min);
    attrs.max_value = Some(max);
    attrs
}

pub fn select(label: &str, order: i32, options: &[&str]) -> FieldAttributes {
    let mut attrs = FieldAttributes::new(label, FieldType::Select);
    attrs.order = order;
    attrs.options = options.iter().map(|label| FieldOption::new(*label)).collect();
    attrs
}

pub fn field_id(fields: &[FieldDefinition], label: &str) -> FieldId {
    fields
        .iter()
        .find(|field| field.attrs.label == label)
        .map(|field| field.id)
        .unwrap_or_else(|| panic!("no field labelled {label:?}"))
}

/// The live list as an unchanged proposal.
pub fn keep_all(fields: &[FieldDefinition]) -> Vec<ProposedField> {
    fields.iter().map(ProposedField::from).collect()
}

/// Delegates to an inner store but holds the first `gated` batch applies
/// until all of them have arrived, so their reads are guaranteed to overlap.
pub struct GatedFormStore {
    inner: Arc<InMemoryFormStore>,
    barrier: Barrier,
    gated: usize,
    arrivals: AtomicUsize,
}

impl GatedFormStore {
    pub fn new(inner: Arc<InMemoryFormStore>, gated: usize) -> Self {
        Self {
            inner,
            barrier: Barrier::new(gated),
            gated,
            arrivals: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl FormRepository for GatedFormStore {
    async fn create_form(&self, form: NewForm) -> DomainResult<Form> {
        self.inner.create_form(form).await
    }

    async fn get_form(&self, form_id: FormId) -> DomainResult<Option<Form>> {
        self.inner.get_form(form_id).await
    }

    async fn set_status(&self, form_id: FormId, status: FormStatus) -> DomainResult<Form> {
        self.inner.set_status(form_id, status).await
    }

    async fn list_fields(&self, form_id: FormId) -> DomainResult<Vec<FieldDefinition>> {
        self.inner.list_fields(form_id).await
    }

    async fn get_live_form(&self, form_id: FormId) -> DomainResult<Option<LiveForm>> {
        self.inner.get_live_form(form_id).await
    }

    async fn apply_field_batch(&self, plan: FieldBatchPlan) -> DomainResult<AppliedBatch> {
        if self.arrivals.fetch_add(1, Ordering::SeqCst) < self.gated {
            self.barrier.wait().await;
        }
        self.inner.apply_field_batch(plan).await
    }

    async fn get_snapshot(
        &self,
        form_id: FormId,
        version: Version,
    ) -> DomainResult<Option<FormVersionSnapshot>> {
        self.inner.get_snapshot(form_id, version).await
    }

    async fn list_snapshots(&self, form_id: FormId) -> DomainResult<Vec<FormVersionSnapshot>> {
        self.inner.list_snapshots(form_id).await
    }
}
