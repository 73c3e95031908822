//! Field payload validation.
//!
//! Runs before any store access: a rejected batch writes nothing.

use std::collections::HashSet;

use domains::{DomainError, DomainResult, FieldAttributes, ProposedField};
use regex::Regex;

/// Upper bounds applied to a proposed field list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldLimits {
    pub max_fields_per_form: usize,
    pub max_options_per_field: usize,
    pub max_label_len: usize,
}

impl Default for FieldLimits {
    fn default() -> Self {
        Self {
            max_fields_per_form: 200,
            max_options_per_field: 100,
            max_label_len: 500,
        }
    }
}

fn trimmed(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn invalid(index: usize, label: &str, reason: impl std::fmt::Display) -> DomainError {
    if label.is_empty() {
        DomainError::Validation(format!("field #{}: {reason}", index + 1))
    } else {
        DomainError::Validation(format!("field #{} ({label:?}): {reason}", index + 1))
    }
}

/// Trims text, drops attributes the type does not use, then validates.
fn normalize_field(
    index: usize,
    mut attrs: FieldAttributes,
    limits: &FieldLimits,
) -> DomainResult<FieldAttributes> {
    attrs.label = attrs.label.trim().to_string();
    let label = attrs.label.clone();
    if label.is_empty() {
        return Err(invalid(index, &label, "label is required"));
    }
    if label.chars().count() > limits.max_label_len {
        return Err(invalid(
            index,
            &label,
            format_args!("label exceeds {} characters", limits.max_label_len),
        ));
    }

    attrs.placeholder = trimmed(attrs.placeholder);
    attrs.help_text = trimmed(attrs.help_text);
    attrs.default_value = trimmed(attrs.default_value);

    let ty = attrs.field_type;

    if ty.supports_pattern() {
        attrs.regex_pattern = attrs.regex_pattern.filter(|p| !p.is_empty());
        attrs.validation_message = trimmed(attrs.validation_message);
        if let Some(pattern) = &attrs.regex_pattern {
            Regex::new(pattern)
                .map_err(|err| invalid(index, &label, format_args!("invalid regex: {err}")))?;
        }
    } else {
        attrs.regex_pattern = None;
        attrs.validation_message = None;
    }

    if !ty.supports_multiple() {
        attrs.allow_multiple = false;
    }

    if ty.requires_options() {
        if attrs.options.is_empty() {
            return Err(invalid(index, &label, format_args!("{ty} field needs at least one option")));
        }
        if attrs.options.len() > limits.max_options_per_field {
            return Err(invalid(
                index,
                &label,
                format_args!("more than {} options", limits.max_options_per_field),
            ));
        }
        let mut seen = HashSet::new();
        for option in &mut attrs.options {
            option.label = option.label.trim().to_string();
            if option.label.is_empty() {
                return Err(invalid(index, &label, "option labels cannot be empty"));
            }
            if !seen.insert(option.label.clone()) {
                return Err(invalid(
                    index,
                    &label,
                    format_args!("duplicate option {:?}", option.label),
                ));
            }
        }
        let defaults = attrs.options.iter().filter(|o| o.is_default).count();
        if defaults > 1 && !attrs.is_multi_valued() {
            return Err(invalid(index, &label, "only one default option allowed"));
        }
    } else {
        attrs.options.clear();
    }

    if attrs.is_multi_valued() {
        if attrs.selection_limit == Some(0) {
            return Err(invalid(index, &label, "selection limit must be at least 1"));
        }
    } else {
        attrs.selection_limit = None;
    }

    if ty.is_numeric() {
        for bound in [attrs.min_value, attrs.max_value].into_iter().flatten() {
            if !bound.is_finite() {
                return Err(invalid(index, &label, "numeric bounds must be finite"));
            }
        }
        if let (Some(min), Some(max)) = (attrs.min_value, attrs.max_value) {
            if min >= max {
                return Err(invalid(
                    index,
                    &label,
                    format_args!("min value {min} must be below max value {max}"),
                ));
            }
        }
        if let Some(default) = &attrs.default_value {
            let parsed: f64 = default
                .parse()
                .map_err(|_| invalid(index, &label, "default value is not a number"))?;
            let below = attrs.min_value.is_some_and(|min| parsed < min);
            let above = attrs.max_value.is_some_and(|max| parsed > max);
            if below || above {
                return Err(invalid(index, &label, "default value is out of range"));
            }
        }
    } else {
        attrs.min_value = None;
        attrs.max_value = None;
    }

    Ok(attrs)
}

/// Validates and normalizes a complete proposed field list.
pub fn validate_field_batch(
    proposed: Vec<ProposedField>,
    limits: &FieldLimits,
) -> DomainResult<Vec<ProposedField>> {
    if proposed.len() > limits.max_fields_per_form {
        return Err(DomainError::Validation(format!(
            "a form can hold at most {} fields",
            limits.max_fields_per_form
        )));
    }

    let mut ids = HashSet::new();
    proposed
        .into_iter()
        .enumerate()
        .map(|(index, field)| {
            let id = field.persisted_id();
            if let Some(id) = id {
                if !ids.insert(id) {
                    return Err(DomainError::Validation(format!(
                        "field id {id} appears more than once"
                    )));
                }
            }
            Ok(ProposedField {
                id,
                attrs: normalize_field(index, field.attrs, limits)?,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use domains::{FieldId, FieldOption, FieldType};

    fn validate_one(attrs: FieldAttributes) -> DomainResult<FieldAttributes> {
        validate_field_batch(vec![ProposedField::new(attrs)], &FieldLimits::default())
            .map(|mut fields| fields.remove(0).attrs)
    }

    fn options(labels: &[&str]) -> Vec<FieldOption> {
        labels.iter().map(|l| FieldOption::new(*l)).collect()
    }

    #[test]
    fn rejects_blank_label() {
        let err = validate_one(FieldAttributes::new("   ", FieldType::Text)).unwrap_err();
        assert!(matches!(err, DomainError::Validation(msg) if msg.contains("label is required")));
    }

    #[test]
    fn rejects_option_type_without_options() {
        for ty in [FieldType::Select, FieldType::Radio, FieldType::CheckboxGroup] {
            assert!(validate_one(FieldAttributes::new("Pick", ty)).is_err(), "{ty}");
        }
    }

    #[test]
    fn rejects_min_not_below_max() {
        let attrs = FieldAttributes {
            min_value: Some(5.0),
            max_value: Some(5.0),
            ..FieldAttributes::new("Score", FieldType::Range)
        };
        assert!(validate_one(attrs).is_err());
    }

    #[test]
    fn rejects_uncompilable_regex() {
        let attrs = FieldAttributes {
            regex_pattern: Some("([a-z".into()),
            ..FieldAttributes::new("Code", FieldType::Text)
        };
        assert!(validate_one(attrs).is_err());
    }

    #[test]
    fn rejects_duplicate_ids() {
        let fields = vec![
            ProposedField::existing(FieldId(1), FieldAttributes::new("A", FieldType::Text)),
            ProposedField::existing(FieldId(1), FieldAttributes::new("B", FieldType::Text)),
        ];
        assert!(validate_field_batch(fields, &FieldLimits::default()).is_err());
    }

    #[test]
    fn placeholder_ids_are_cleared_and_may_repeat() {
        let fields = vec![
            ProposedField::existing(FieldId(-1), FieldAttributes::new("A", FieldType::Text)),
            ProposedField::existing(FieldId(-1), FieldAttributes::new("B", FieldType::Text)),
            ProposedField::existing(FieldId(0), FieldAttributes::new("C", FieldType::Text)),
        ];
        let validated = validate_field_batch(fields, &FieldLimits::default()).unwrap();
        assert!(validated.iter().all(|field| field.id.is_none()));
    }

    #[test]
    fn rejects_two_defaults_on_single_choice() {
        let mut attrs = FieldAttributes::new("Size", FieldType::Radio);
        attrs.options = options(&["S", "M"]);
        attrs.options.iter_mut().for_each(|o| o.is_default = true);
        assert!(validate_one(attrs.clone()).is_err());

        attrs.field_type = FieldType::CheckboxGroup;
        assert!(validate_one(attrs).is_ok());
    }

    #[test]
    fn rejects_too_many_fields() {
        let limits = FieldLimits {
            max_fields_per_form: 1,
            ..FieldLimits::default()
        };
        let fields = vec![
            ProposedField::new(FieldAttributes::new("A", FieldType::Text)),
            ProposedField::new(FieldAttributes::new("B", FieldType::Text)),
        ];
        assert!(validate_field_batch(fields, &limits).is_err());
    }

    #[test]
    fn rejects_out_of_range_numeric_default() {
        let attrs = FieldAttributes {
            min_value: Some(0.0),
            max_value: Some(10.0),
            default_value: Some("11".into()),
            ..FieldAttributes::new("Score", FieldType::Number)
        };
        assert!(validate_one(attrs).is_err());
    }

    #[test]
    fn clears_attributes_the_type_ignores() {
        let attrs = FieldAttributes {
            regex_pattern: Some("^x$".into()),
            options: options(&["a"]),
            allow_multiple: true,
            selection_limit: Some(2),
            min_value: Some(1.0),
            max_value: Some(2.0),
            placeholder: Some("   ".into()),
            ..FieldAttributes::new("  When  ", FieldType::Date)
        };
        let normalized = validate_one(attrs).unwrap();
        assert_eq!(normalized.label, "When");
        assert_eq!(normalized.regex_pattern, None);
        assert!(normalized.options.is_empty());
        assert!(!normalized.allow_multiple);
        assert_eq!(normalized.selection_limit, None);
        assert_eq!((normalized.min_value, normalized.max_value), (None, None));
        assert_eq!(normalized.placeholder, None);
    }

    #[test]
    fn keeps_selection_limit_on_multi_select() {
        let attrs = FieldAttributes {
            options: options(&["a", "b", "c"]),
            allow_multiple: true,
            selection_limit: Some(2),
            ..FieldAttributes::new("Toppings", FieldType::Select)
        };
        assert_eq!(validate_one(attrs).unwrap().selection_limit, Some(2));
    }
}
