//! Form lifecycle: creation, publishing, archiving, ownership checks.

use std::sync::Arc;

use domains::{
    DomainError, DomainResult, Form, FormId, FormRepository, FormStatus, NewForm,
    ScheduleWindow, SubmissionPolicy, UserId,
};
use tracing::info;

/// Loads a form and checks that `actor` owns it.
pub(crate) async fn load_owned_form(
    forms: &dyn FormRepository,
    form_id: FormId,
    actor: UserId,
) -> DomainResult<Form> {
    let form = forms
        .get_form(form_id)
        .await?
        .ok_or_else(|| DomainError::not_found("form", form_id))?;
    if !form.is_owned_by(actor) {
        return Err(DomainError::Permission(format!(
            "user {actor} does not own form {form_id}"
        )));
    }
    Ok(form)
}

pub(crate) fn validate_schedule(window: &ScheduleWindow) -> DomainResult<()> {
    if let (Some(open), Some(deadline)) = (window.open_time, window.deadline) {
        if open >= deadline {
            return Err(DomainError::Validation(
                "open time must be before the deadline".into(),
            ));
        }
    }
    Ok(())
}

pub struct FormService {
    forms: Arc<dyn FormRepository>,
}

impl FormService {
    pub fn new(forms: Arc<dyn FormRepository>) -> Self {
        Self { forms }
    }

    /// Creates an empty draft form at version 1. Fields are added with a batch save.
    pub async fn create_form(
        &self,
        owner: UserId,
        name: &str,
        description: Option<&str>,
        policy: SubmissionPolicy,
        schedule: ScheduleWindow,
    ) -> DomainResult<Form> {
        let name = name.trim();
        if name.is_empty() {
            return Err(DomainError::Validation("form name is required".into()));
        }
        validate_schedule(&schedule)?;
        let form = self
            .forms
            .create_form(NewForm {
                owner_id: owner,
                name: name.to_string(),
                description: description
                    .map(str::trim)
                    .filter(|d| !d.is_empty())
                    .map(str::to_string),
                policy,
                schedule,
            })
            .await?;
        info!(form_id = %form.id, owner = %owner, "form created");
        Ok(form)
    }

    pub async fn get_form(&self, form_id: FormId, actor: UserId) -> DomainResult<Form> {
        load_owned_form(&*self.forms, form_id, actor).await
    }

    pub async fn publish(&self, form_id: FormId, actor: UserId) -> DomainResult<Form> {
        let form = load_owned_form(&*self.forms, form_id, actor).await?;
        if form.status == FormStatus::Archived {
            return Err(DomainError::Validation(
                "archived forms cannot be published".into(),
            ));
        }
        if self.forms.list_fields(form_id).await?.is_empty() {
            return Err(DomainError::Validation(
                "a form needs at least one field to be published".into(),
            ));
        }
        let form = self.forms.set_status(form_id, FormStatus::Published).await?;
        info!(form_id = %form_id, version = form.current_version, "form published");
        Ok(form)
    }

    pub async fn archive(&self, form_id: FormId, actor: UserId) -> DomainResult<Form> {
        load_owned_form(&*self.forms, form_id, actor).await?;
        let form = self.forms.set_status(form_id, FormStatus::Archived).await?;
        info!(form_id = %form_id, "form archived");
        Ok(form)
    }
}
