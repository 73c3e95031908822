//! Answer validation against a resolved field list.

use std::collections::{HashMap, HashSet};

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use domains::{AnswerValue, DomainError, DomainResult, FieldAnswer, FieldDefinition, FieldType};
use regex::Regex;

fn rejected(field: &FieldDefinition, reason: impl std::fmt::Display) -> DomainError {
    DomainError::Validation(format!("{}: {reason}", field.attrs.label))
}

fn check_scalar(field: &FieldDefinition, value: &str) -> DomainResult<()> {
    let attrs = &field.attrs;
    match attrs.field_type {
        FieldType::Number | FieldType::Range => {
            let number: f64 = value
                .trim()
                .parse()
                .map_err(|_| rejected(field, "must be a number"))?;
            if attrs.min_value.is_some_and(|min| number < min) {
                return Err(rejected(field, "is below the minimum"));
            }
            if attrs.max_value.is_some_and(|max| number > max) {
                return Err(rejected(field, "is above the maximum"));
            }
        }
        FieldType::Date => {
            NaiveDate::parse_from_str(value, "%Y-%m-%d")
                .map_err(|_| rejected(field, "must be a date (YYYY-MM-DD)"))?;
        }
        FieldType::Time => {
            NaiveTime::parse_from_str(value, "%H:%M")
                .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M:%S"))
                .map_err(|_| rejected(field, "must be a time (HH:MM)"))?;
        }
        FieldType::Datetime => {
            NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M")
                .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S"))
                .map_err(|_| rejected(field, "must be a date and time (YYYY-MM-DDTHH:MM)"))?;
        }
        FieldType::Email => {
            let valid = value
                .split_once('@')
                .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.'));
            if !valid {
                return Err(rejected(field, "must be an email address"));
            }
        }
        FieldType::Select | FieldType::Radio | FieldType::CheckboxGroup => {
            if !attrs.options.iter().any(|option| option.label == value) {
                return Err(rejected(field, format_args!("{value:?} is not an option")));
            }
        }
        _ => {}
    }

    if let Some(pattern) = &attrs.regex_pattern {
        let regex = Regex::new(pattern)
            .map_err(|err| rejected(field, format_args!("stored pattern is invalid: {err}")))?;
        if !regex.is_match(value) {
            let message = attrs
                .validation_message
                .as_deref()
                .unwrap_or("does not match the required format");
            return Err(rejected(field, message));
        }
    }
    Ok(())
}

fn check_answer(field: &FieldDefinition, value: &AnswerValue) -> DomainResult<()> {
    match (field.attrs.is_multi_valued(), value) {
        (false, AnswerValue::Single(single)) => check_scalar(field, single),
        (true, AnswerValue::Multi(values)) => {
            if let Some(limit) = field.attrs.selection_limit {
                if values.len() > limit as usize {
                    return Err(rejected(
                        field,
                        format_args!("at most {limit} selections allowed"),
                    ));
                }
            }
            let mut seen = HashSet::new();
            for value in values {
                if !seen.insert(value) {
                    return Err(rejected(field, format_args!("{value:?} selected twice")));
                }
                check_scalar(field, value)?;
            }
            Ok(())
        }
        (false, AnswerValue::Multi(_)) => Err(rejected(field, "expects a single value")),
        (true, AnswerValue::Single(_)) => Err(rejected(field, "expects a list of values")),
    }
}

/// Checks `answers` against `fields`: every answer must target a known field,
/// required fields must be answered, and each value must fit its field.
pub fn validate_answers(fields: &[FieldDefinition], answers: &[FieldAnswer]) -> DomainResult<()> {
    let by_id: HashMap<_, _> = fields.iter().map(|field| (field.id, field)).collect();
    let mut answered = HashMap::new();
    for answer in answers {
        if !by_id.contains_key(&answer.field_id) {
            return Err(DomainError::Validation(format!(
                "answer references unknown field {}",
                answer.field_id
            )));
        }
        if answered.insert(answer.field_id, &answer.value).is_some() {
            return Err(DomainError::Validation(format!(
                "field {} answered more than once",
                answer.field_id
            )));
        }
    }

    for field in fields {
        match answered.get(&field.id) {
            Some(value) if !value.is_blank() => check_answer(field, value)?,
            _ if field.attrs.required => return Err(rejected(field, "is required")),
            _ => {}
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use domains::{FieldAttributes, FieldId, FieldOption, FormId};

    fn def(id: i64, attrs: FieldAttributes) -> FieldDefinition {
        FieldDefinition {
            id: FieldId(id),
            form_id: FormId::default(),
            version: 1,
            attrs,
        }
    }

    fn choices(ty: FieldType, labels: &[&str]) -> FieldAttributes {
        FieldAttributes {
            options: labels.iter().map(|l| FieldOption::new(*l)).collect(),
            ..FieldAttributes::new("Choice", ty)
        }
    }

    #[test]
    fn required_fields_must_be_answered() {
        let fields = vec![def(
            1,
            FieldAttributes {
                required: true,
                ..FieldAttributes::new("Name", FieldType::Text)
            },
        )];
        assert!(validate_answers(&fields, &[]).is_err());
        assert!(validate_answers(&fields, &[FieldAnswer::single(FieldId(1), "  ")]).is_err());
        assert!(validate_answers(&fields, &[FieldAnswer::single(FieldId(1), "Ada")]).is_ok());
    }

    #[test]
    fn optional_blank_answers_pass() {
        let fields = vec![def(1, FieldAttributes::new("Age", FieldType::Number))];
        assert!(validate_answers(&fields, &[FieldAnswer::single(FieldId(1), "")]).is_ok());
    }

    #[test]
    fn unknown_and_duplicate_answers_are_rejected() {
        let fields = vec![def(1, FieldAttributes::new("Name", FieldType::Text))];
        assert!(validate_answers(&fields, &[FieldAnswer::single(FieldId(2), "x")]).is_err());
        let twice = [
            FieldAnswer::single(FieldId(1), "a"),
            FieldAnswer::single(FieldId(1), "b"),
        ];
        assert!(validate_answers(&fields, &twice).is_err());
    }

    #[test]
    fn numeric_answers_respect_bounds() {
        let fields = vec![def(
            1,
            FieldAttributes {
                min_value: Some(0.0),
                max_value: Some(10.0),
                ..FieldAttributes::new("Score", FieldType::Range)
            },
        )];
        assert!(validate_answers(&fields, &[FieldAnswer::single(FieldId(1), "10")]).is_ok());
        assert!(validate_answers(&fields, &[FieldAnswer::single(FieldId(1), "11")]).is_err());
        assert!(validate_answers(&fields, &[FieldAnswer::single(FieldId(1), "ten")]).is_err());
    }

    #[test]
    fn answer_shape_must_match_field() {
        let fields = vec![
            def(1, choices(FieldType::Radio, &["a", "b"])),
            def(2, choices(FieldType::CheckboxGroup, &["x", "y", "z"])),
        ];
        assert!(validate_answers(
            &fields,
            &[FieldAnswer::single(FieldId(1), "a"), FieldAnswer::multi(FieldId(2), ["x", "z"])]
        )
        .is_ok());
        assert!(validate_answers(&fields, &[FieldAnswer::multi(FieldId(1), ["a"])]).is_err());
        assert!(validate_answers(&fields, &[FieldAnswer::single(FieldId(2), "x")]).is_err());
        assert!(validate_answers(&fields, &[FieldAnswer::single(FieldId(1), "c")]).is_err());
    }

    #[test]
    fn selection_limit_is_enforced() {
        let mut attrs = choices(FieldType::Select, &["a", "b", "c"]);
        attrs.allow_multiple = true;
        attrs.selection_limit = Some(2);
        let fields = vec![def(1, attrs)];
        assert!(validate_answers(&fields, &[FieldAnswer::multi(FieldId(1), ["a", "b"])]).is_ok());
        assert!(
            validate_answers(&fields, &[FieldAnswer::multi(FieldId(1), ["a", "b", "c"])]).is_err()
        );
    }

    #[test]
    fn pattern_failure_uses_custom_message() {
        let fields = vec![def(
            1,
            FieldAttributes {
                regex_pattern: Some("^[A-Z]+$".into()),
                validation_message: Some("capitals only".into()),
                ..FieldAttributes::new("Code", FieldType::Text)
            },
        )];
        let err = validate_answers(&fields, &[FieldAnswer::single(FieldId(1), "abc")]).unwrap_err();
        assert_eq!(err, DomainError::Validation("Code: capitals only".into()));
    }

    #[test]
    fn temporal_formats() {
        let fields = vec![
            def(1, FieldAttributes::new("Day", FieldType::Date)),
            def(2, FieldAttributes::new("At", FieldType::Time)),
            def(3, FieldAttributes::new("When", FieldType::Datetime)),
        ];
        let ok = [
            FieldAnswer::single(FieldId(1), "2024-02-29"),
            FieldAnswer::single(FieldId(2), "09:30"),
            FieldAnswer::single(FieldId(3), "2024-02-29T09:30"),
        ];
        assert!(validate_answers(&fields, &ok).is_ok());
        assert!(validate_answers(&fields, &[FieldAnswer::single(FieldId(1), "2023-02-29")]).is_err());
    }
}
