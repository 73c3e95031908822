//! Version history queries for form owners.

use std::sync::Arc;

use domains::{
    DomainError, DomainResult, FormId, FormRepository, FormVersionSnapshot, SnapshotSummary,
    UserId, Version,
};
use serde::Serialize;

use crate::forms::load_owned_form;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VersionHistory {
    pub form_id: FormId,
    pub current_version: Version,
    /// Superseded versions, oldest first. The current version is live, not snapshotted.
    pub snapshots: Vec<SnapshotSummary>,
}

pub struct VersionHistoryService {
    forms: Arc<dyn FormRepository>,
}

impl VersionHistoryService {
    pub fn new(forms: Arc<dyn FormRepository>) -> Self {
        Self { forms }
    }

    pub async fn history(&self, form_id: FormId, actor: UserId) -> DomainResult<VersionHistory> {
        let form = load_owned_form(&*self.forms, form_id, actor).await?;
        let snapshots = self.forms.list_snapshots(form_id).await?;
        Ok(VersionHistory {
            form_id,
            current_version: form.current_version,
            snapshots: snapshots.iter().map(FormVersionSnapshot::summary).collect(),
        })
    }

    pub async fn snapshot(
        &self,
        form_id: FormId,
        actor: UserId,
        version: Version,
    ) -> DomainResult<FormVersionSnapshot> {
        load_owned_form(&*self.forms, form_id, actor).await?;
        self.forms
            .get_snapshot(form_id, version)
            .await?
            .ok_or_else(|| DomainError::not_found("snapshot", format!("{form_id}@v{version}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use domains::{
        Form, FormStatus, MockFormRepository, ScheduleWindow, SnapshotPayload, SubmissionPolicy,
        SNAPSHOT_SCHEMA_VERSION,
    };
    use tokio_test::{assert_err, assert_ok};

    fn owned_form(owner: UserId) -> Form {
        let now = Utc::now();
        Form {
            id: FormId::new(),
            owner_id: owner,
            name: "Quiz".into(),
            description: None,
            status: FormStatus::Published,
            policy: SubmissionPolicy::default(),
            schedule: ScheduleWindow::default(),
            current_version: 3,
            revision: 5,
            created_at: now,
            updated_at: now,
        }
    }

    fn snapshot(form: &Form, version: Version) -> FormVersionSnapshot {
        FormVersionSnapshot {
            form_id: form.id,
            version,
            payload: SnapshotPayload {
                schema_version: SNAPSHOT_SCHEMA_VERSION,
                name: form.name.clone(),
                description: None,
                fields: vec![],
            },
            created_by: form.owner_id,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn history_lists_superseded_versions() {
        let owner = UserId::new();
        let form = owned_form(owner);
        let form_id = form.id;
        let snapshots = vec![snapshot(&form, 1), snapshot(&form, 2)];
        let mut repo = MockFormRepository::new();
        repo.expect_get_form()
            .returning(move |_| Ok(Some(form.clone())));
        repo.expect_list_snapshots()
            .returning(move |_| Ok(snapshots.clone()));

        let history = assert_ok!(
            VersionHistoryService::new(Arc::new(repo))
                .history(form_id, owner)
                .await
        );
        assert_eq!(history.current_version, 3);
        assert_eq!(
            history.snapshots.iter().map(|s| s.version).collect::<Vec<_>>(),
            vec![1, 2]
        );
    }

    #[tokio::test]
    async fn current_version_has_no_snapshot() {
        let owner = UserId::new();
        let form = owned_form(owner);
        let form_id = form.id;
        let mut repo = MockFormRepository::new();
        repo.expect_get_form()
            .returning(move |_| Ok(Some(form.clone())));
        repo.expect_get_snapshot().returning(|_, _| Ok(None));

        let err = assert_err!(
            VersionHistoryService::new(Arc::new(repo))
                .snapshot(form_id, owner, 3)
                .await
        );
        assert!(matches!(err, DomainError::NotFound { entity: "snapshot", .. }));
    }
}
