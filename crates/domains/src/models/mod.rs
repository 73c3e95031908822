//! # Domain Models
//!
//! These structs represent the core entities of formkeep.
//! Forms, responses and users use UUID v7 for time-ordered identification;
//! fields use store-assigned integers that stay stable across edits.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

mod field;
mod form;
mod response;
mod snapshot;

pub use field::*;
pub use form::*;
pub use response::*;
pub use snapshot::*;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }
    };
}

uuid_id!(
    /// Identifies a form.
    FormId
);
uuid_id!(
    /// Identifies an authenticated user (form owner, submitter, editor).
    UserId
);
uuid_id!(
    /// Identifies a submitted response.
    ResponseId
);

/// Store-assigned identity of a field definition. Stores only hand out
/// positive ids; zero and negative values are client placeholders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldId(pub i64);

impl FieldId {
    pub fn is_persisted(self) -> bool {
        self.0 > 0
    }
}

impl fmt::Display for FieldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Form version numbers start at 1 and only ever grow by one.
pub type Version = u32;

pub const INITIAL_VERSION: Version = 1;
