//! # Response Binder
//!
//! Resolves the field definitions that governed a response when it was
//! submitted: the live fields for the current version, the stored snapshot
//! for any earlier one.

use std::collections::HashSet;
use std::sync::Arc;

use domains::{
    AnswerValue, DomainError, DomainResult, FieldDefinition, FieldId, Form, FormId,
    FormRepository, FormResponse, ResponseId, Version,
};
use serde::Serialize;
use tracing::{debug, error};

use crate::metrics::EditorMetrics;

/// One line of a response as it should be displayed.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum BoundAnswer {
    Answered {
        field: FieldDefinition,
        value: AnswerValue,
    },
    /// The field existed for this version but the response holds no value.
    NotCollected { field: FieldDefinition },
    /// The answer references a field absent from the resolved definitions.
    FieldMissing { field_id: FieldId, value: AnswerValue },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResponseView {
    pub response_id: ResponseId,
    pub form_version: Version,
    pub entries: Vec<BoundAnswer>,
}

pub struct ResponseBinder {
    forms: Arc<dyn FormRepository>,
    metrics: EditorMetrics,
}

impl ResponseBinder {
    pub fn new(forms: Arc<dyn FormRepository>, metrics: EditorMetrics) -> Self {
        Self { forms, metrics }
    }

    pub async fn resolve_fields_for_response(
        &self,
        form_id: FormId,
        response_version: Version,
    ) -> DomainResult<Vec<FieldDefinition>> {
        let form = self
            .forms
            .get_form(form_id)
            .await?
            .ok_or_else(|| DomainError::not_found("form", form_id))?;
        self.resolve_for_form(&form, response_version).await
    }

    /// Never falls back to the live fields for a past version.
    ///
    /// `form` may be stale. The live fields are only used when a fresh read
    /// still shows `response_version` as current; a form that moved on in the
    /// meantime has snapshotted that version, and the snapshot is used.
    pub async fn resolve_for_form(
        &self,
        form: &Form,
        response_version: Version,
    ) -> DomainResult<Vec<FieldDefinition>> {
        if response_version > form.current_version {
            return Err(self.inconsistent(
                form.id,
                response_version,
                format!(
                    "response version {response_version} is ahead of form {} at version {}",
                    form.id, form.current_version
                ),
            ));
        }
        if response_version == form.current_version {
            let live = self
                .forms
                .get_live_form(form.id)
                .await?
                .ok_or_else(|| DomainError::not_found("form", form.id))?;
            if live.form.current_version == response_version {
                return Ok(live.fields);
            }
            debug!(
                form_id = %form.id,
                from_version = response_version,
                to_version = live.form.current_version,
                "form version moved while resolving"
            );
        }
        match self.forms.get_snapshot(form.id, response_version).await? {
            Some(snapshot) => Ok(snapshot.payload.to_definitions(form.id, response_version)),
            None => Err(self.inconsistent(
                form.id,
                response_version,
                format!(
                    "form {} has no snapshot for past version {response_version}",
                    form.id
                ),
            )),
        }
    }

    fn inconsistent(&self, form_id: FormId, version: Version, message: String) -> DomainError {
        self.metrics.consistency_errors.inc();
        error!(form_id = %form_id, version, "{message}");
        DomainError::Consistency(message)
    }

    /// Pairs every answer of `response` with the definition it was given under.
    pub async fn bind_response(&self, response: &FormResponse) -> DomainResult<ResponseView> {
        let fields = self
            .resolve_fields_for_response(response.form_id, response.form_version)
            .await?;
        Ok(bind_answers(response, fields))
    }
}

/// Resolved fields come first in display order; orphaned answers follow.
pub fn bind_answers(response: &FormResponse, fields: Vec<FieldDefinition>) -> ResponseView {
    let known: HashSet<FieldId> = fields.iter().map(|field| field.id).collect();
    let mut entries: Vec<BoundAnswer> = fields
        .into_iter()
        .map(|field| match response.answer_for(field.id) {
            Some(value) => BoundAnswer::Answered {
                value: value.clone(),
                field,
            },
            None => BoundAnswer::NotCollected { field },
        })
        .collect();
    entries.extend(
        response
            .answers
            .iter()
            .filter(|answer| !known.contains(&answer.field_id))
            .map(|answer| BoundAnswer::FieldMissing {
                field_id: answer.field_id,
                value: answer.value.clone(),
            }),
    );
    ResponseView {
        response_id: response.id,
        form_version: response.form_version,
        entries,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use domains::{
        FieldAnswer, FieldAttributes, FieldType, FormStatus, FormVersionSnapshot, LiveForm,
        MockFormRepository, ScheduleWindow, SnapshotField, SnapshotPayload, Submitter,
        SubmissionPolicy, UserId, SNAPSHOT_SCHEMA_VERSION,
    };
    use mockall::predicate::eq;

    fn form(version: Version) -> Form {
        let now = Utc::now();
        Form {
            id: FormId::new(),
            owner_id: UserId::new(),
            name: "Poll".into(),
            description: None,
            status: FormStatus::Published,
            policy: SubmissionPolicy::default(),
            schedule: ScheduleWindow::default(),
            current_version: version,
            revision: 7,
            created_at: now,
            updated_at: now,
        }
    }

    fn field(form_id: FormId, id: i64, version: Version, label: &str) -> FieldDefinition {
        FieldDefinition {
            id: FieldId(id),
            form_id,
            version,
            attrs: FieldAttributes::new(label, FieldType::Text),
        }
    }

    #[tokio::test]
    async fn current_version_uses_live_fields() {
        let form = form(2);
        let live = LiveForm {
            form: form.clone(),
            fields: vec![field(form.id, 1, 2, "Live")],
        };
        let expected = live.fields.clone();
        let mut repo = MockFormRepository::new();
        repo.expect_get_live_form()
            .returning(move |_| Ok(Some(live.clone())));
        repo.expect_get_snapshot().never();

        let binder = ResponseBinder::new(Arc::new(repo), EditorMetrics::default());
        assert_eq!(binder.resolve_for_form(&form, 2).await.unwrap(), expected);
    }

    #[tokio::test]
    async fn past_version_uses_snapshot() {
        let form = form(3);
        let form_id = form.id;
        let snapshot = FormVersionSnapshot {
            form_id,
            version: 1,
            payload: SnapshotPayload {
                schema_version: SNAPSHOT_SCHEMA_VERSION,
                name: "Poll".into(),
                description: None,
                fields: vec![SnapshotField {
                    id: FieldId(4),
                    attrs: FieldAttributes::new("Old", FieldType::Text),
                }],
            },
            created_by: form.owner_id,
            created_at: Utc::now(),
        };
        let mut repo = MockFormRepository::new();
        repo.expect_get_live_form().never();
        repo.expect_get_snapshot()
            .with(eq(form_id), eq(1))
            .returning(move |_, _| Ok(Some(snapshot.clone())));

        let binder = ResponseBinder::new(Arc::new(repo), EditorMetrics::default());
        let fields = binder.resolve_for_form(&form, 1).await.unwrap();
        assert_eq!(fields, vec![field(form_id, 4, 1, "Old")]);
    }

    #[tokio::test]
    async fn stale_form_resolves_through_the_snapshot() {
        let stale = form(2);
        let form_id = stale.id;
        let moved = LiveForm {
            form: Form {
                current_version: 3,
                ..stale.clone()
            },
            fields: vec![field(form_id, 1, 3, "Renamed")],
        };
        let snapshot = FormVersionSnapshot {
            form_id,
            version: 2,
            payload: SnapshotPayload {
                schema_version: SNAPSHOT_SCHEMA_VERSION,
                name: "Poll".into(),
                description: None,
                fields: vec![SnapshotField {
                    id: FieldId(1),
                    attrs: FieldAttributes::new("Original", FieldType::Text),
                }],
            },
            created_by: stale.owner_id,
            created_at: Utc::now(),
        };
        let mut repo = MockFormRepository::new();
        repo.expect_get_live_form()
            .times(1)
            .returning(move |_| Ok(Some(moved.clone())));
        repo.expect_get_snapshot()
            .with(eq(form_id), eq(2))
            .times(1)
            .returning(move |_, _| Ok(Some(snapshot.clone())));

        let binder = ResponseBinder::new(Arc::new(repo), EditorMetrics::default());
        let fields = binder.resolve_for_form(&stale, 2).await.unwrap();
        assert_eq!(fields, vec![field(form_id, 1, 2, "Original")]);
    }

    #[tokio::test]
    async fn missing_snapshot_is_a_loud_consistency_error() {
        let form = form(3);
        let mut repo = MockFormRepository::new();
        repo.expect_get_live_form().never();
        repo.expect_get_snapshot().returning(|_, _| Ok(None));

        let metrics = EditorMetrics::default();
        let binder = ResponseBinder::new(Arc::new(repo), metrics.clone());
        let err = binder.resolve_for_form(&form, 2).await.unwrap_err();
        assert!(matches!(err, DomainError::Consistency(_)));
        assert_eq!(metrics.consistency_errors.get(), 1);
    }

    #[tokio::test]
    async fn future_version_is_inconsistent() {
        let form = form(1);
        let repo = MockFormRepository::new();
        let binder = ResponseBinder::new(Arc::new(repo), EditorMetrics::default());
        assert!(matches!(
            binder.resolve_for_form(&form, 2).await,
            Err(DomainError::Consistency(_))
        ));
    }

    #[test]
    fn binding_marks_missing_and_uncollected_fields() {
        let form_id = FormId::new();
        let now = Utc::now();
        let response = FormResponse {
            id: ResponseId::new(),
            form_id,
            form_version: 1,
            answers: vec![
                FieldAnswer::single(FieldId(1), "Ada"),
                FieldAnswer::single(FieldId(9), "gone"),
            ],
            rating: None,
            comments: None,
            submitter: Submitter::Anonymous { email: None },
            submitted_at: now,
            updated_at: now,
        };
        let fields = vec![field(form_id, 1, 1, "Name"), field(form_id, 2, 1, "Added later")];
        let view = bind_answers(&response, fields);
        assert_eq!(view.entries.len(), 3);
        assert!(matches!(&view.entries[0], BoundAnswer::Answered { field, .. } if field.id == FieldId(1)));
        assert!(matches!(&view.entries[1], BoundAnswer::NotCollected { field } if field.id == FieldId(2)));
        assert!(matches!(
            &view.entries[2],
            BoundAnswer::FieldMissing { field_id: FieldId(9), .. }
        ));
    }
}
