use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{FieldId, FormId, ResponseId, UserId, Version};

/// The stored value of one answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum AnswerValue {
    Single(String),
    Multi(Vec<String>),
}

impl AnswerValue {
    /// Blank single values and empty selections count as unanswered.
    pub fn is_blank(&self) -> bool {
        match self {
            AnswerValue::Single(value) => value.trim().is_empty(),
            AnswerValue::Multi(values) => values.iter().all(|v| v.trim().is_empty()),
        }
    }

    pub fn values(&self) -> Vec<&str> {
        match self {
            AnswerValue::Single(value) => vec![value.as_str()],
            AnswerValue::Multi(values) => values.iter().map(String::as_str).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldAnswer {
    pub field_id: FieldId,
    pub value: AnswerValue,
}

impl FieldAnswer {
    pub fn single(field_id: FieldId, value: impl Into<String>) -> Self {
        Self {
            field_id,
            value: AnswerValue::Single(value.into()),
        }
    }

    pub fn multi<I, S>(field_id: FieldId, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            field_id,
            value: AnswerValue::Multi(values.into_iter().map(Into::into).collect()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Submitter {
    User { user_id: UserId },
    Anonymous { email: Option<String> },
}

impl Submitter {
    pub fn user_id(&self) -> Option<UserId> {
        match self {
            Submitter::User { user_id } => Some(*user_id),
            Submitter::Anonymous { .. } => None,
        }
    }
}

/// A submission. `form_version` is fixed at insert and never rewritten.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormResponse {
    pub id: ResponseId,
    pub form_id: FormId,
    pub form_version: Version,
    pub answers: Vec<FieldAnswer>,
    pub rating: Option<u8>,
    pub comments: Option<String>,
    pub submitter: Submitter,
    pub submitted_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FormResponse {
    pub fn answer_for(&self, field_id: FieldId) -> Option<&AnswerValue> {
        self.answers
            .iter()
            .find(|answer| answer.field_id == field_id)
            .map(|answer| &answer.value)
    }
}

/// Input for a submission. The store stamps the version inside the insert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewResponse {
    pub form_id: FormId,
    pub answers: Vec<FieldAnswer>,
    pub rating: Option<u8>,
    pub comments: Option<String>,
    pub submitter: Submitter,
    pub submitted_at: DateTime<Utc>,
}

/// Replacement content for an existing response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseUpdate {
    pub response_id: ResponseId,
    pub editor: UserId,
    pub answers: Vec<FieldAnswer>,
    pub rating: Option<u8>,
    pub comments: Option<String>,
    pub edited_at: DateTime<Utc>,
}

/// Append-only record of a response's content before one edit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormResponseHistoryEntry {
    pub id: Uuid,
    pub response_id: ResponseId,
    pub answers: Vec<FieldAnswer>,
    pub rating: Option<u8>,
    pub comments: Option<String>,
    pub edited_by: UserId,
    pub edited_at: DateTime<Utc>,
}
