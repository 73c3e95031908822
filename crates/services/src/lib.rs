//! formkeep/crates/services/src/lib.rs
//!
//! Schema versioning for published forms: compatibility classification,
//! version-break detection, snapshots, batch field edits and response binding.

pub mod answers;
pub mod binder;
pub mod compat;
pub mod field_editor;
pub mod forms;
pub mod history;
pub mod metrics;
pub mod responses;
pub mod snapshot;
pub mod validation;
pub mod version_break;

pub use answers::validate_answers;
pub use binder::{bind_answers, BoundAnswer, ResponseBinder, ResponseView};
pub use compat::{has_regex_invalidation, is_incompatible_type_change};
pub use field_editor::{BatchFieldEditor, BatchSaveOutcome};
pub use forms::FormService;
pub use history::{VersionHistory, VersionHistoryService};
pub use metrics::EditorMetrics;
pub use responses::{ResponseContent, ResponseService};
pub use snapshot::create_form_snapshot;
pub use validation::{validate_field_batch, FieldLimits};
pub use version_break::{detect_version_breaking_changes, find_version_break, BreakReason};
