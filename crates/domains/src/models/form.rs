use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{FormId, UserId, Version};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormStatus {
    #[default]
    Draft,
    Published,
    Archived,
}

impl FormStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            FormStatus::Draft => "draft",
            FormStatus::Published => "published",
            FormStatus::Archived => "archived",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "draft" => Some(FormStatus::Draft),
            "published" => Some(FormStatus::Published),
            "archived" => Some(FormStatus::Archived),
            _ => None,
        }
    }
}

/// Who may submit and whether submissions can be revised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionPolicy {
    pub allow_anonymous: bool,
    pub allow_multiple_submissions: bool,
    pub allow_editing: bool,
}

impl Default for SubmissionPolicy {
    fn default() -> Self {
        Self {
            allow_anonymous: false,
            allow_multiple_submissions: false,
            allow_editing: true,
        }
    }
}

/// Optional open/close window for submissions. Never affects versioning.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleWindow {
    pub open_time: Option<DateTime<Utc>>,
    pub deadline: Option<DateTime<Utc>>,
}

impl ScheduleWindow {
    pub fn is_open_at(&self, at: DateTime<Utc>) -> bool {
        self.open_time.is_none_or(|open| at >= open)
            && self.deadline.is_none_or(|deadline| at <= deadline)
    }
}

/// A form owns its live fields (stored separately) and the version counter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Form {
    pub id: FormId,
    pub owner_id: UserId,
    pub name: String,
    pub description: Option<String>,
    pub status: FormStatus,
    pub policy: SubmissionPolicy,
    pub schedule: ScheduleWindow,
    /// Starts at 1, bumped by exactly one on every version-breaking edit.
    pub current_version: Version,
    /// Bumped on every field batch save; used for optimistic concurrency.
    pub revision: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Form {
    pub fn is_owned_by(&self, user: UserId) -> bool {
        self.owner_id == user
    }
}

/// Input for creating a form. The store assigns version 1 and revision 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewForm {
    pub owner_id: UserId,
    pub name: String,
    pub description: Option<String>,
    pub policy: SubmissionPolicy,
    pub schedule: ScheduleWindow,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn schedule_window_bounds_are_inclusive() {
        let now = Utc::now();
        let window = ScheduleWindow {
            open_time: Some(now),
            deadline: Some(now + Duration::hours(1)),
        };
        assert!(window.is_open_at(now));
        assert!(window.is_open_at(now + Duration::hours(1)));
        assert!(!window.is_open_at(now - Duration::seconds(1)));
        assert!(!window.is_open_at(now + Duration::hours(2)));
        assert!(ScheduleWindow::default().is_open_at(now));
    }

    #[test]
    fn status_parse_matches_as_str() {
        for status in [FormStatus::Draft, FormStatus::Published, FormStatus::Archived] {
            assert_eq!(FormStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(FormStatus::parse("closed"), None);
    }
}
