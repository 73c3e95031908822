//! Response submission and editing.
//!
//! Submissions are validated against the live fields and stamped with the
//! form's current version by the store. Edits are validated against the
//! fields of the version the response was stamped with, never the live set.

use std::sync::Arc;

use chrono::Utc;
use domains::{
    DomainError, DomainResult, FieldAnswer, Form, FormId, FormRepository, FormResponse,
    FormResponseHistoryEntry, FormStatus, NewResponse, ResponseId, ResponseRepository,
    ResponseUpdate, Submitter, UserId,
};
use tracing::info;

use crate::answers::validate_answers;
use crate::binder::{ResponseBinder, ResponseView};
use crate::forms::load_owned_form;

pub const MAX_RATING: u8 = 5;

/// Answers plus the optional rating and comment that accompany them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResponseContent {
    pub answers: Vec<FieldAnswer>,
    pub rating: Option<u8>,
    pub comments: Option<String>,
}

impl ResponseContent {
    pub fn with_answers(answers: Vec<FieldAnswer>) -> Self {
        Self {
            answers,
            ..Self::default()
        }
    }

    fn normalized(mut self) -> DomainResult<Self> {
        if let Some(rating) = self.rating {
            if !(1..=MAX_RATING).contains(&rating) {
                return Err(DomainError::Validation(format!(
                    "rating must be between 1 and {MAX_RATING}"
                )));
            }
        }
        self.comments = self
            .comments
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty());
        Ok(self)
    }
}

pub struct ResponseService {
    forms: Arc<dyn FormRepository>,
    responses: Arc<dyn ResponseRepository>,
    binder: Arc<ResponseBinder>,
}

impl ResponseService {
    pub fn new(
        forms: Arc<dyn FormRepository>,
        responses: Arc<dyn ResponseRepository>,
        binder: Arc<ResponseBinder>,
    ) -> Self {
        Self {
            forms,
            responses,
            binder,
        }
    }

    async fn load_form(&self, form_id: FormId) -> DomainResult<Form> {
        self.forms
            .get_form(form_id)
            .await?
            .ok_or_else(|| DomainError::not_found("form", form_id))
    }

    async fn load_response(&self, response_id: ResponseId) -> DomainResult<FormResponse> {
        self.responses
            .get_response(response_id)
            .await?
            .ok_or_else(|| DomainError::not_found("response", response_id))
    }

    /// Owner of the form or the authenticated submitter.
    fn ensure_can_read(form: &Form, response: &FormResponse, actor: UserId) -> DomainResult<()> {
        if form.is_owned_by(actor) || response.submitter.user_id() == Some(actor) {
            Ok(())
        } else {
            Err(DomainError::Permission(format!(
                "user {actor} cannot access response {}",
                response.id
            )))
        }
    }

    #[tracing::instrument(skip_all, fields(form_id = %form_id))]
    pub async fn submit(
        &self,
        form_id: FormId,
        submitter: Submitter,
        content: ResponseContent,
    ) -> DomainResult<FormResponse> {
        let content = content.normalized()?;
        let form = self.load_form(form_id).await?;
        let now = Utc::now();

        if form.status != FormStatus::Published {
            return Err(DomainError::Validation(format!(
                "form {form_id} is not accepting responses"
            )));
        }
        if !form.schedule.is_open_at(now) {
            return Err(DomainError::Validation(format!(
                "form {form_id} is outside its submission window"
            )));
        }
        match submitter.user_id() {
            None if !form.policy.allow_anonymous => {
                return Err(DomainError::Permission(format!(
                    "form {form_id} does not accept anonymous responses"
                )));
            }
            Some(user) if !form.policy.allow_multiple_submissions => {
                if self.responses.count_responses_by(form_id, user).await? > 0 {
                    return Err(DomainError::Permission(format!(
                        "user {user} already responded to form {form_id}"
                    )));
                }
            }
            _ => {}
        }

        let fields = self.forms.list_fields(form_id).await?;
        validate_answers(&fields, &content.answers)?;

        let response = self
            .responses
            .insert_response(NewResponse {
                form_id,
                answers: content.answers,
                rating: content.rating,
                comments: content.comments,
                submitter,
                submitted_at: now,
            })
            .await?;
        info!(response_id = %response.id, version = response.form_version, "response submitted");
        Ok(response)
    }

    #[tracing::instrument(skip_all, fields(response_id = %response_id, editor = %editor))]
    pub async fn edit(
        &self,
        response_id: ResponseId,
        editor: UserId,
        content: ResponseContent,
    ) -> DomainResult<FormResponse> {
        let content = content.normalized()?;
        let response = self.load_response(response_id).await?;
        let form = self.load_form(response.form_id).await?;

        if !form.policy.allow_editing {
            return Err(DomainError::Permission(format!(
                "form {} does not allow editing responses",
                form.id
            )));
        }
        Self::ensure_can_read(&form, &response, editor)?;

        let fields = self
            .binder
            .resolve_for_form(&form, response.form_version)
            .await?;
        validate_answers(&fields, &content.answers)?;

        let updated = self
            .responses
            .update_response(ResponseUpdate {
                response_id,
                editor,
                answers: content.answers,
                rating: content.rating,
                comments: content.comments,
                edited_at: Utc::now(),
            })
            .await?;
        info!(version = updated.form_version, "response edited");
        Ok(updated)
    }

    /// The response paired with the definitions of its own version.
    pub async fn view(&self, response_id: ResponseId, actor: UserId) -> DomainResult<ResponseView> {
        let response = self.load_response(response_id).await?;
        let form = self.load_form(response.form_id).await?;
        Self::ensure_can_read(&form, &response, actor)?;
        let fields = self
            .binder
            .resolve_for_form(&form, response.form_version)
            .await?;
        Ok(crate::binder::bind_answers(&response, fields))
    }

    pub async fn history(
        &self,
        response_id: ResponseId,
        actor: UserId,
    ) -> DomainResult<Vec<FormResponseHistoryEntry>> {
        let response = self.load_response(response_id).await?;
        let form = self.load_form(response.form_id).await?;
        Self::ensure_can_read(&form, &response, actor)?;
        self.responses.list_response_history(response_id).await
    }

    pub async fn list_for_form(
        &self,
        form_id: FormId,
        actor: UserId,
    ) -> DomainResult<Vec<FormResponse>> {
        load_owned_form(&*self.forms, form_id, actor).await?;
        self.responses.list_responses(form_id).await
    }
}
