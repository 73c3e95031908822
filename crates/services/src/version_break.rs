//! # Version-Break Detector
//!
//! Diffs a proposed field list against the live one and decides whether the
//! edit must open a new form version.

use std::collections::{HashMap, HashSet};
use std::fmt;

use domains::{FieldDefinition, FieldId, FieldType, ProposedField};

use crate::compat::{
    has_regex_invalidation, is_incompatible_type_change, is_stricter_max, is_stricter_min,
};

/// The first change found that makes an edit version-breaking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakReason {
    FieldDeleted(FieldId),
    IncompatibleType {
        field_id: FieldId,
        from: FieldType,
        to: FieldType,
    },
    PatternTightened(FieldId),
    BecameRequired(FieldId),
    BoundsTightened(FieldId),
}

impl fmt::Display for BreakReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BreakReason::FieldDeleted(id) => write!(f, "field {id} deleted"),
            BreakReason::IncompatibleType { field_id, from, to } => {
                write!(f, "field {field_id} retyped {from} -> {to}")
            }
            BreakReason::PatternTightened(id) => write!(f, "field {id} regex tightened"),
            BreakReason::BecameRequired(id) => write!(f, "field {id} became required"),
            BreakReason::BoundsTightened(id) => write!(f, "field {id} numeric bounds tightened"),
        }
    }
}

/// Classifies one existing field against its proposed replacement.
fn field_break(existing: &FieldDefinition, incoming: &ProposedField) -> Option<BreakReason> {
    let old = &existing.attrs;
    let new = &incoming.attrs;
    let field_id = existing.id;

    if is_incompatible_type_change(old.field_type, new.field_type) {
        return Some(BreakReason::IncompatibleType {
            field_id,
            from: old.field_type,
            to: new.field_type,
        });
    }
    if has_regex_invalidation(old.regex_pattern.as_deref(), new.regex_pattern.as_deref()) {
        return Some(BreakReason::PatternTightened(field_id));
    }
    if !old.required && new.required {
        return Some(BreakReason::BecameRequired(field_id));
    }
    if new.field_type.is_numeric()
        && (is_stricter_min(old.min_value, new.min_value)
            || is_stricter_max(old.max_value, new.max_value))
    {
        return Some(BreakReason::BoundsTightened(field_id));
    }
    None
}

/// Returns the first reason the proposal breaks compatibility, if any.
///
/// Deletions are checked before per-field changes. Proposed fields without an
/// id are new and never break anything on their own.
pub fn find_version_break(
    existing: &[FieldDefinition],
    incoming: &[ProposedField],
) -> Option<BreakReason> {
    let by_id: HashMap<FieldId, &FieldDefinition> =
        existing.iter().map(|field| (field.id, field)).collect();
    let kept: HashSet<FieldId> = incoming
        .iter()
        .filter_map(ProposedField::persisted_id)
        .collect();

    if let Some(deleted) = existing.iter().find(|field| !kept.contains(&field.id)) {
        return Some(BreakReason::FieldDeleted(deleted.id));
    }

    incoming.iter().find_map(|proposed| {
        let current = by_id.get(&proposed.persisted_id()?)?;
        field_break(current, proposed)
    })
}

/// True when applying `incoming` over `existing` requires a new form version.
pub fn detect_version_breaking_changes(
    existing: &[FieldDefinition],
    incoming: &[ProposedField],
) -> bool {
    find_version_break(existing, incoming).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use domains::{FieldAttributes, FormId};

    fn live(id: i64, attrs: FieldAttributes) -> FieldDefinition {
        FieldDefinition {
            id: FieldId(id),
            form_id: FormId::default(),
            version: 1,
            attrs,
        }
    }

    fn text(required: bool) -> FieldAttributes {
        FieldAttributes {
            required,
            ..FieldAttributes::new("Name", FieldType::Text)
        }
    }

    fn number(min: Option<f64>, max: Option<f64>) -> FieldAttributes {
        FieldAttributes {
            min_value: min,
            max_value: max,
            ..FieldAttributes::new("Age", FieldType::Number)
        }
    }

    #[test]
    fn deleting_a_field_breaks() {
        let existing = vec![live(1, text(false)), live(2, text(false))];
        let incoming = vec![ProposedField::existing(FieldId(1), text(false))];
        assert!(detect_version_breaking_changes(&existing, &incoming));
        assert_eq!(
            find_version_break(&existing, &incoming),
            Some(BreakReason::FieldDeleted(FieldId(2)))
        );
    }

    #[test]
    fn adding_a_required_field_does_not_break() {
        let existing = vec![live(1, text(false))];
        let incoming = vec![
            ProposedField::existing(FieldId(1), text(false)),
            ProposedField::new(FieldAttributes {
                required: true,
                ..FieldAttributes::new("Email", FieldType::Email)
            }),
        ];
        assert!(!detect_version_breaking_changes(&existing, &incoming));
    }

    #[test]
    fn compatible_retype_with_loosening_does_not_break() {
        let mut before = text(true);
        before.regex_pattern = Some("^[A-Z]+$".into());
        let existing = vec![live(1, before)];
        let after = FieldAttributes {
            required: false,
            regex_pattern: None,
            ..FieldAttributes::new("Name", FieldType::Textarea)
        };
        let incoming = vec![ProposedField::existing(FieldId(1), after)];
        assert!(!detect_version_breaking_changes(&existing, &incoming));
    }

    #[test]
    fn incompatible_retype_breaks() {
        let existing = vec![live(1, text(false))];
        let incoming = vec![ProposedField::existing(FieldId(1), number(None, None))];
        assert_eq!(
            find_version_break(&existing, &incoming),
            Some(BreakReason::IncompatibleType {
                field_id: FieldId(1),
                from: FieldType::Text,
                to: FieldType::Number,
            })
        );
    }

    #[test]
    fn adding_a_pattern_breaks() {
        let existing = vec![live(1, text(false))];
        let mut after = text(false);
        after.regex_pattern = Some("^\\d+$".into());
        let incoming = vec![ProposedField::existing(FieldId(1), after)];
        assert_eq!(
            find_version_break(&existing, &incoming),
            Some(BreakReason::PatternTightened(FieldId(1)))
        );
    }

    #[test]
    fn becoming_required_breaks_but_becoming_optional_does_not() {
        let existing = vec![live(1, text(false))];
        let incoming = vec![ProposedField::existing(FieldId(1), text(true))];
        assert_eq!(
            find_version_break(&existing, &incoming),
            Some(BreakReason::BecameRequired(FieldId(1)))
        );

        let existing = vec![live(1, text(true))];
        let incoming = vec![ProposedField::existing(FieldId(1), text(false))];
        assert!(!detect_version_breaking_changes(&existing, &incoming));
    }

    #[test]
    fn numeric_bounds() {
        let existing = vec![live(1, number(Some(0.0), Some(100.0)))];
        let check = |min, max| {
            detect_version_breaking_changes(
                &existing,
                &[ProposedField::existing(FieldId(1), number(min, max))],
            )
        };
        assert!(check(Some(10.0), Some(100.0)));
        assert!(check(Some(0.0), Some(90.0)));
        assert!(!check(Some(0.0), Some(100.0)));
        assert!(!check(Some(0.0), Some(150.0)));
        assert!(!check(None, None));
    }

    #[test]
    fn new_bound_over_unbounded_field_breaks() {
        let existing = vec![live(1, number(None, None))];
        let incoming = vec![ProposedField::existing(
            FieldId(1),
            number(None, Some(1_000_000.0)),
        )];
        assert!(detect_version_breaking_changes(&existing, &incoming));
    }

    #[test]
    fn retype_number_to_range_keeps_bounds_check() {
        let existing = vec![live(1, number(Some(0.0), Some(10.0)))];
        let mut after = number(Some(0.0), Some(5.0));
        after.field_type = FieldType::Range;
        let incoming = vec![ProposedField::existing(FieldId(1), after)];
        assert_eq!(
            find_version_break(&existing, &incoming),
            Some(BreakReason::BoundsTightened(FieldId(1)))
        );
    }

    #[test]
    fn reordering_and_relabeling_are_safe() {
        let existing = vec![live(1, text(false)), live(2, number(None, None))];
        let mut relabeled = text(false);
        relabeled.label = "Full name".into();
        relabeled.order = 5;
        let incoming = vec![
            ProposedField::existing(FieldId(2), number(None, None)),
            ProposedField::existing(FieldId(1), relabeled),
        ];
        assert!(!detect_version_breaking_changes(&existing, &incoming));
    }

    #[test]
    fn placeholder_ids_count_as_new_fields() {
        let existing = vec![live(1, text(false))];
        let incoming = vec![
            ProposedField::existing(FieldId(1), text(false)),
            ProposedField::existing(FieldId(-1), text(true)),
        ];
        assert!(!detect_version_breaking_changes(&existing, &incoming));

        // A placeholder never stands in for a live field.
        let incoming = vec![ProposedField::existing(FieldId(-1), text(false))];
        assert_eq!(
            find_version_break(&existing, &incoming),
            Some(BreakReason::FieldDeleted(FieldId(1)))
        );
    }

    #[test]
    fn empty_to_empty_is_safe() {
        assert!(!detect_version_breaking_changes(&[], &[]));
    }
}
