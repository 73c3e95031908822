//! # PostgreSQL store
//!
//! Maps the relational model onto the `domains` entities.
//!
//! # Developer Note
//! A batch save runs in one transaction that starts with
//! `SELECT … FOR UPDATE` on the form row. Concurrent saves on the same form
//! queue behind that lock and then fail the revision check, so no two of them
//! can observe the same version and both bump it. Submissions take
//! `FOR SHARE` on the same row so their version stamp is the one current at
//! commit, and [`PgFormStore::get_live_form`] reads the form and its fields
//! under the same shared lock.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::Utc;
use domains::{
    AppliedBatch, DomainError, DomainResult, FieldAnswer, FieldAttributes, FieldBatchPlan,
    FieldDefinition, FieldId, FieldOption, FieldType, Form, FormId, FormRepository, FormResponse,
    FormResponseHistoryEntry, FormStatus, FormVersionSnapshot, LiveForm, NewForm, NewResponse,
    ResponseId, ResponseRepository, ResponseUpdate, ScheduleWindow, SnapshotPayload,
    SubmissionPolicy, Submitter, UserId, Version, INITIAL_VERSION,
};
use sqlx::postgres::{PgExecutor, PgPool, PgPoolOptions, PgRow};
use sqlx::types::Json;
use sqlx::Row;
use tracing::{debug, info};
use uuid::Uuid;

use crate::plan::check_plan;

const FORM_COLUMNS: &str = "id, owner_id, name, description, status, allow_anonymous, \
     allow_multiple_submissions, allow_editing, open_time, deadline, current_version, revision, \
     created_at, updated_at";

const FIELD_COLUMNS: &str = "id, form_id, version, label, field_type, required, position, \
     placeholder, help_text, regex_pattern, validation_message, options, allow_multiple, \
     selection_limit, min_value, max_value, default_value";

const RESPONSE_COLUMNS: &str = "id, form_id, form_version, answers, rating, comments, submitter, \
     submitted_at, updated_at";

fn storage(err: sqlx::Error) -> DomainError {
    DomainError::Storage(err.to_string())
}

fn version_to_db(version: Version) -> DomainResult<i32> {
    i32::try_from(version)
        .map_err(|_| DomainError::Consistency(format!("version {version} out of range")))
}

fn version_from_db(raw: i32) -> DomainResult<Version> {
    Version::try_from(raw)
        .map_err(|_| DomainError::Consistency(format!("negative version {raw} in store")))
}

fn revision_from_db(raw: i64) -> DomainResult<u64> {
    u64::try_from(raw)
        .map_err(|_| DomainError::Consistency(format!("negative revision {raw} in store")))
}

fn form_from_row(row: &PgRow) -> DomainResult<Form> {
    let status: String = row.try_get("status").map_err(storage)?;
    Ok(Form {
        id: FormId(row.try_get("id").map_err(storage)?),
        owner_id: UserId(row.try_get("owner_id").map_err(storage)?),
        name: row.try_get("name").map_err(storage)?,
        description: row.try_get("description").map_err(storage)?,
        status: FormStatus::parse(&status)
            .ok_or_else(|| DomainError::Consistency(format!("unknown form status {status:?}")))?,
        policy: SubmissionPolicy {
            allow_anonymous: row.try_get("allow_anonymous").map_err(storage)?,
            allow_multiple_submissions: row
                .try_get("allow_multiple_submissions")
                .map_err(storage)?,
            allow_editing: row.try_get("allow_editing").map_err(storage)?,
        },
        schedule: ScheduleWindow {
            open_time: row.try_get("open_time").map_err(storage)?,
            deadline: row.try_get("deadline").map_err(storage)?,
        },
        current_version: version_from_db(row.try_get("current_version").map_err(storage)?)?,
        revision: revision_from_db(row.try_get("revision").map_err(storage)?)?,
        created_at: row.try_get("created_at").map_err(storage)?,
        updated_at: row.try_get("updated_at").map_err(storage)?,
    })
}

fn field_from_row(row: &PgRow) -> DomainResult<FieldDefinition> {
    let field_type: String = row.try_get("field_type").map_err(storage)?;
    let options: Json<Vec<FieldOption>> = row.try_get("options").map_err(storage)?;
    let selection_limit: Option<i32> = row.try_get("selection_limit").map_err(storage)?;
    Ok(FieldDefinition {
        id: FieldId(row.try_get("id").map_err(storage)?),
        form_id: FormId(row.try_get("form_id").map_err(storage)?),
        version: version_from_db(row.try_get("version").map_err(storage)?)?,
        attrs: FieldAttributes {
            label: row.try_get("label").map_err(storage)?,
            field_type: FieldType::parse(&field_type).ok_or_else(|| {
                DomainError::Consistency(format!("unknown field type {field_type:?}"))
            })?,
            required: row.try_get("required").map_err(storage)?,
            order: row.try_get("position").map_err(storage)?,
            placeholder: row.try_get("placeholder").map_err(storage)?,
            help_text: row.try_get("help_text").map_err(storage)?,
            regex_pattern: row.try_get("regex_pattern").map_err(storage)?,
            validation_message: row.try_get("validation_message").map_err(storage)?,
            options: options.0,
            allow_multiple: row.try_get("allow_multiple").map_err(storage)?,
            selection_limit: selection_limit.map(selection_limit_from_db).transpose()?,
            min_value: row.try_get("min_value").map_err(storage)?,
            max_value: row.try_get("max_value").map_err(storage)?,
            default_value: row.try_get("default_value").map_err(storage)?,
        },
    })
}

fn selection_limit_from_db(raw: i32) -> DomainResult<u32> {
    u32::try_from(raw)
        .map_err(|_| DomainError::Consistency(format!("negative selection limit {raw} in store")))
}

fn selection_limit_to_db(limit: u32) -> DomainResult<i32> {
    i32::try_from(limit)
        .map_err(|_| DomainError::Validation(format!("selection limit {limit} out of range")))
}

fn rating_from_db(raw: Option<i16>) -> DomainResult<Option<u8>> {
    raw.map(|rating| {
        u8::try_from(rating)
            .map_err(|_| DomainError::Consistency(format!("rating {rating} out of range in store")))
    })
    .transpose()
}

fn response_from_row(row: &PgRow) -> DomainResult<FormResponse> {
    let answers: Json<Vec<FieldAnswer>> = row.try_get("answers").map_err(storage)?;
    let submitter: Json<Submitter> = row.try_get("submitter").map_err(storage)?;
    Ok(FormResponse {
        id: ResponseId(row.try_get("id").map_err(storage)?),
        form_id: FormId(row.try_get("form_id").map_err(storage)?),
        form_version: version_from_db(row.try_get("form_version").map_err(storage)?)?,
        answers: answers.0,
        rating: rating_from_db(row.try_get("rating").map_err(storage)?)?,
        comments: row.try_get("comments").map_err(storage)?,
        submitter: submitter.0,
        submitted_at: row.try_get("submitted_at").map_err(storage)?,
        updated_at: row.try_get("updated_at").map_err(storage)?,
    })
}

fn history_from_row(row: &PgRow) -> DomainResult<FormResponseHistoryEntry> {
    let answers: Json<Vec<FieldAnswer>> = row.try_get("answers").map_err(storage)?;
    Ok(FormResponseHistoryEntry {
        id: row.try_get("id").map_err(storage)?,
        response_id: ResponseId(row.try_get("response_id").map_err(storage)?),
        answers: answers.0,
        rating: rating_from_db(row.try_get("rating").map_err(storage)?)?,
        comments: row.try_get("comments").map_err(storage)?,
        edited_by: UserId(row.try_get("edited_by").map_err(storage)?),
        edited_at: row.try_get("edited_at").map_err(storage)?,
    })
}

fn snapshot_from_row(form_id: FormId, row: &PgRow) -> DomainResult<FormVersionSnapshot> {
    let payload: String = row.try_get("payload").map_err(storage)?;
    Ok(FormVersionSnapshot {
        form_id,
        version: version_from_db(row.try_get("version").map_err(storage)?)?,
        payload: SnapshotPayload::decode(&payload)?,
        created_by: UserId(row.try_get("created_by").map_err(storage)?),
        created_at: row.try_get("created_at").map_err(storage)?,
    })
}

async fn fetch_form<'e, E: PgExecutor<'e>>(executor: E, form_id: FormId) -> DomainResult<Option<Form>> {
    let sql = format!("SELECT {FORM_COLUMNS} FROM forms WHERE id = $1");
    sqlx::query(&sql)
        .bind(form_id.0)
        .fetch_optional(executor)
        .await
        .map_err(storage)?
        .as_ref()
        .map(form_from_row)
        .transpose()
}

async fn fetch_fields<'e, E: PgExecutor<'e>>(
    executor: E,
    form_id: FormId,
) -> DomainResult<Vec<FieldDefinition>> {
    let sql = format!(
        "SELECT {FIELD_COLUMNS} FROM form_fields WHERE form_id = $1 ORDER BY position ASC, id ASC"
    );
    sqlx::query(&sql)
        .bind(form_id.0)
        .fetch_all(executor)
        .await
        .map_err(storage)?
        .iter()
        .map(field_from_row)
        .collect()
}

pub struct PgFormStore {
    pool: PgPool,
}

impl PgFormStore {
    pub async fn connect(database_url: &str, max_connections: u32) -> DomainResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(storage)?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Applies the embedded migrations under `migrations/`.
    pub async fn migrate(&self) -> DomainResult<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|err| DomainError::Storage(err.to_string()))?;
        info!("database migrations applied");
        Ok(())
    }
}

#[async_trait]
impl FormRepository for PgFormStore {
    async fn create_form(&self, form: NewForm) -> DomainResult<Form> {
        let now = Utc::now();
        let sql = format!(
            "INSERT INTO forms ({FORM_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, 0, $12, $12) \
             RETURNING {FORM_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(Uuid::now_v7())
            .bind(form.owner_id.0)
            .bind(&form.name)
            .bind(&form.description)
            .bind(FormStatus::Draft.as_str())
            .bind(form.policy.allow_anonymous)
            .bind(form.policy.allow_multiple_submissions)
            .bind(form.policy.allow_editing)
            .bind(form.schedule.open_time)
            .bind(form.schedule.deadline)
            .bind(version_to_db(INITIAL_VERSION)?)
            .bind(now)
            .fetch_one(&self.pool)
            .await
            .map_err(storage)?;
        form_from_row(&row)
    }

    async fn get_form(&self, form_id: FormId) -> DomainResult<Option<Form>> {
        fetch_form(&self.pool, form_id).await
    }

    async fn set_status(&self, form_id: FormId, status: FormStatus) -> DomainResult<Form> {
        let sql = format!(
            "UPDATE forms SET status = $1, updated_at = $2 WHERE id = $3 RETURNING {FORM_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(status.as_str())
            .bind(Utc::now())
            .bind(form_id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage)?
            .ok_or_else(|| DomainError::not_found("form", form_id))?;
        form_from_row(&row)
    }

    async fn list_fields(&self, form_id: FormId) -> DomainResult<Vec<FieldDefinition>> {
        fetch_fields(&self.pool, form_id).await
    }

    async fn get_live_form(&self, form_id: FormId) -> DomainResult<Option<LiveForm>> {
        let mut tx = self.pool.begin().await.map_err(storage)?;
        let sql = format!("SELECT {FORM_COLUMNS} FROM forms WHERE id = $1 FOR SHARE");
        let Some(row) = sqlx::query(&sql)
            .bind(form_id.0)
            .fetch_optional(&mut *tx)
            .await
            .map_err(storage)?
        else {
            return Ok(None);
        };
        let form = form_from_row(&row)?;
        let fields = fetch_fields(&mut *tx, form_id).await?;
        tx.commit().await.map_err(storage)?;
        Ok(Some(LiveForm { form, fields }))
    }

    async fn apply_field_batch(&self, plan: FieldBatchPlan) -> DomainResult<AppliedBatch> {
        let mut tx = self.pool.begin().await.map_err(storage)?;

        let locked = sqlx::query("SELECT current_version, revision FROM forms WHERE id = $1 FOR UPDATE")
            .bind(plan.form_id.0)
            .fetch_optional(&mut *tx)
            .await
            .map_err(storage)?
            .ok_or_else(|| DomainError::not_found("form", plan.form_id))?;
        let current_version = version_from_db(locked.try_get("current_version").map_err(storage)?)?;
        let current_revision = revision_from_db(locked.try_get("revision").map_err(storage)?)?;

        let live_ids: HashSet<FieldId> = sqlx::query("SELECT id FROM form_fields WHERE form_id = $1")
            .bind(plan.form_id.0)
            .fetch_all(&mut *tx)
            .await
            .map_err(storage)?
            .iter()
            .map(|row| row.try_get::<i64, _>("id").map(FieldId))
            .collect::<Result<_, _>>()
            .map_err(storage)?;

        // An early return drops `tx`, which rolls everything back.
        check_plan(&plan, current_version, current_revision, &live_ids)?;

        let version = version_to_db(plan.resulting_version)?;

        if let Some(snapshot) = &plan.snapshot {
            sqlx::query(
                "INSERT INTO form_version_snapshots (form_id, version, payload, created_by, created_at) \
                 VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(plan.form_id.0)
            .bind(version_to_db(snapshot.version)?)
            .bind(snapshot.payload.encode()?)
            .bind(snapshot.created_by.0)
            .bind(snapshot.created_at)
            .execute(&mut *tx)
            .await
            .map_err(storage)?;
        }

        if !plan.delete_ids.is_empty() {
            let ids: Vec<i64> = plan.delete_ids.iter().map(|id| id.0).collect();
            sqlx::query("DELETE FROM form_fields WHERE form_id = $1 AND id = ANY($2)")
                .bind(plan.form_id.0)
                .bind(&ids)
                .execute(&mut *tx)
                .await
                .map_err(storage)?;
        }

        for field in &plan.updates {
            let attrs = &field.attrs;
            sqlx::query(
                "UPDATE form_fields SET version = $1, label = $2, field_type = $3, required = $4, \
                 position = $5, placeholder = $6, help_text = $7, regex_pattern = $8, \
                 validation_message = $9, options = $10, allow_multiple = $11, \
                 selection_limit = $12, min_value = $13, max_value = $14, default_value = $15 \
                 WHERE id = $16 AND form_id = $17",
            )
            .bind(version)
            .bind(&attrs.label)
            .bind(attrs.field_type.as_str())
            .bind(attrs.required)
            .bind(attrs.order)
            .bind(&attrs.placeholder)
            .bind(&attrs.help_text)
            .bind(&attrs.regex_pattern)
            .bind(&attrs.validation_message)
            .bind(Json(&attrs.options))
            .bind(attrs.allow_multiple)
            .bind(attrs.selection_limit.map(selection_limit_to_db).transpose()?)
            .bind(attrs.min_value)
            .bind(attrs.max_value)
            .bind(&attrs.default_value)
            .bind(field.id.0)
            .bind(plan.form_id.0)
            .execute(&mut *tx)
            .await
            .map_err(storage)?;
        }

        for attrs in &plan.inserts {
            sqlx::query(
                "INSERT INTO form_fields (form_id, version, label, field_type, required, position, \
                 placeholder, help_text, regex_pattern, validation_message, options, allow_multiple, \
                 selection_limit, min_value, max_value, default_value) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)",
            )
            .bind(plan.form_id.0)
            .bind(version)
            .bind(&attrs.label)
            .bind(attrs.field_type.as_str())
            .bind(attrs.required)
            .bind(attrs.order)
            .bind(&attrs.placeholder)
            .bind(&attrs.help_text)
            .bind(&attrs.regex_pattern)
            .bind(&attrs.validation_message)
            .bind(Json(&attrs.options))
            .bind(attrs.allow_multiple)
            .bind(attrs.selection_limit.map(selection_limit_to_db).transpose()?)
            .bind(attrs.min_value)
            .bind(attrs.max_value)
            .bind(&attrs.default_value)
            .execute(&mut *tx)
            .await
            .map_err(storage)?;
        }

        let schedule = plan.schedule;
        sqlx::query(
            "UPDATE forms SET current_version = $1, revision = revision + 1, updated_at = $2, \
             open_time = CASE WHEN $3 THEN $4 ELSE open_time END, \
             deadline = CASE WHEN $3 THEN $5 ELSE deadline END \
             WHERE id = $6",
        )
        .bind(version)
        .bind(plan.applied_at)
        .bind(schedule.is_some())
        .bind(schedule.and_then(|s| s.open_time))
        .bind(schedule.and_then(|s| s.deadline))
        .bind(plan.form_id.0)
        .execute(&mut *tx)
        .await
        .map_err(storage)?;

        let form = fetch_form(&mut *tx, plan.form_id)
            .await?
            .ok_or_else(|| DomainError::not_found("form", plan.form_id))?;
        let fields = fetch_fields(&mut *tx, plan.form_id).await?;

        tx.commit().await.map_err(storage)?;
        debug!(form_id = %plan.form_id, revision = form.revision, "field batch committed");
        Ok(AppliedBatch { form, fields })
    }

    async fn get_snapshot(
        &self,
        form_id: FormId,
        version: Version,
    ) -> DomainResult<Option<FormVersionSnapshot>> {
        sqlx::query(
            "SELECT version, payload, created_by, created_at FROM form_version_snapshots \
             WHERE form_id = $1 AND version = $2",
        )
        .bind(form_id.0)
        .bind(version_to_db(version)?)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage)?
        .map(|row| snapshot_from_row(form_id, &row))
        .transpose()
    }

    async fn list_snapshots(&self, form_id: FormId) -> DomainResult<Vec<FormVersionSnapshot>> {
        sqlx::query(
            "SELECT version, payload, created_by, created_at FROM form_version_snapshots \
             WHERE form_id = $1 ORDER BY version ASC",
        )
        .bind(form_id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?
        .iter()
        .map(|row| snapshot_from_row(form_id, row))
        .collect()
    }
}

#[async_trait]
impl ResponseRepository for PgFormStore {
    async fn insert_response(&self, response: NewResponse) -> DomainResult<FormResponse> {
        let mut tx = self.pool.begin().await.map_err(storage)?;
        let version: i32 = sqlx::query("SELECT current_version FROM forms WHERE id = $1 FOR SHARE")
            .bind(response.form_id.0)
            .fetch_optional(&mut *tx)
            .await
            .map_err(storage)?
            .ok_or_else(|| DomainError::not_found("form", response.form_id))?
            .try_get("current_version")
            .map_err(storage)?;

        let sql = format!(
            "INSERT INTO form_responses ({RESPONSE_COLUMNS}, submitter_user_id) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $8, $9) RETURNING {RESPONSE_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(Uuid::now_v7())
            .bind(response.form_id.0)
            .bind(version)
            .bind(Json(&response.answers))
            .bind(response.rating.map(i16::from))
            .bind(&response.comments)
            .bind(Json(&response.submitter))
            .bind(response.submitted_at)
            .bind(response.submitter.user_id().map(|user| user.0))
            .fetch_one(&mut *tx)
            .await
            .map_err(storage)?;
        let stored = response_from_row(&row)?;
        tx.commit().await.map_err(storage)?;
        Ok(stored)
    }

    async fn get_response(&self, response_id: ResponseId) -> DomainResult<Option<FormResponse>> {
        let sql = format!("SELECT {RESPONSE_COLUMNS} FROM form_responses WHERE id = $1");
        sqlx::query(&sql)
            .bind(response_id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage)?
            .as_ref()
            .map(response_from_row)
            .transpose()
    }

    async fn list_responses(&self, form_id: FormId) -> DomainResult<Vec<FormResponse>> {
        let sql = format!(
            "SELECT {RESPONSE_COLUMNS} FROM form_responses WHERE form_id = $1 \
             ORDER BY submitted_at ASC, id ASC"
        );
        sqlx::query(&sql)
            .bind(form_id.0)
            .fetch_all(&self.pool)
            .await
            .map_err(storage)?
            .iter()
            .map(response_from_row)
            .collect()
    }

    async fn count_responses_by(&self, form_id: FormId, user_id: UserId) -> DomainResult<u64> {
        let count: i64 = sqlx::query(
            "SELECT COUNT(*) AS n FROM form_responses WHERE form_id = $1 AND submitter_user_id = $2",
        )
        .bind(form_id.0)
        .bind(user_id.0)
        .fetch_one(&self.pool)
        .await
        .map_err(storage)?
        .try_get("n")
        .map_err(storage)?;
        u64::try_from(count)
            .map_err(|_| DomainError::Consistency(format!("negative response count {count}")))
    }

    async fn update_response(&self, update: ResponseUpdate) -> DomainResult<FormResponse> {
        let mut tx = self.pool.begin().await.map_err(storage)?;
        let sql = format!("SELECT {RESPONSE_COLUMNS} FROM form_responses WHERE id = $1 FOR UPDATE");
        let current = sqlx::query(&sql)
            .bind(update.response_id.0)
            .fetch_optional(&mut *tx)
            .await
            .map_err(storage)?
            .ok_or_else(|| DomainError::not_found("response", update.response_id))?;
        let current = response_from_row(&current)?;

        sqlx::query(
            "INSERT INTO form_response_history (id, response_id, answers, rating, comments, edited_by, edited_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(Uuid::now_v7())
        .bind(update.response_id.0)
        .bind(Json(&current.answers))
        .bind(current.rating.map(i16::from))
        .bind(&current.comments)
        .bind(update.editor.0)
        .bind(update.edited_at)
        .execute(&mut *tx)
        .await
        .map_err(storage)?;

        let sql = format!(
            "UPDATE form_responses SET answers = $1, rating = $2, comments = $3, updated_at = $4 \
             WHERE id = $5 RETURNING {RESPONSE_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(Json(&update.answers))
            .bind(update.rating.map(i16::from))
            .bind(&update.comments)
            .bind(update.edited_at)
            .bind(update.response_id.0)
            .fetch_one(&mut *tx)
            .await
            .map_err(storage)?;
        let updated = response_from_row(&row)?;
        tx.commit().await.map_err(storage)?;
        Ok(updated)
    }

    async fn list_response_history(
        &self,
        response_id: ResponseId,
    ) -> DomainResult<Vec<FormResponseHistoryEntry>> {
        sqlx::query(
            "SELECT id, response_id, answers, rating, comments, edited_by, edited_at \
             FROM form_response_history WHERE response_id = $1 ORDER BY edited_at ASC, id ASC",
        )
        .bind(response_id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?
        .iter()
        .map(history_from_row)
        .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_of_range_integers_are_reported_not_dropped() {
        assert_eq!(selection_limit_from_db(3).unwrap(), 3);
        assert!(matches!(
            selection_limit_from_db(-1),
            Err(DomainError::Consistency(_))
        ));
        assert_eq!(selection_limit_to_db(5).unwrap(), 5);
        assert!(matches!(
            selection_limit_to_db(u32::MAX),
            Err(DomainError::Validation(_))
        ));
        assert_eq!(rating_from_db(None).unwrap(), None);
        assert_eq!(rating_from_db(Some(4)).unwrap(), Some(4));
        assert!(matches!(
            rating_from_db(Some(300)),
            Err(DomainError::Consistency(_))
        ));
        assert!(matches!(version_from_db(-2), Err(DomainError::Consistency(_))));
    }
}
