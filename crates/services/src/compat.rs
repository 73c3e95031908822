//! # Compatibility Classifier
//!
//! Pure per-attribute checks deciding whether changing one property of a
//! field could invalidate or misinterpret answers that were already stored.

use domains::FieldType;

/// Retypes that keep the stored representation intact, listed once per pair.
const SAFE_RETYPES: [(FieldType, FieldType); 5] = [
    (FieldType::Text, FieldType::Textarea),
    (FieldType::Text, FieldType::Email),
    (FieldType::Text, FieldType::Url),
    (FieldType::Text, FieldType::Tel),
    (FieldType::Number, FieldType::Range),
];

/// True when answers stored under `old` may not be readable as `new`.
pub fn is_incompatible_type_change(old: FieldType, new: FieldType) -> bool {
    if old == new {
        return false;
    }
    !SAFE_RETYPES
        .iter()
        .any(|&(a, b)| (a == old && b == new) || (a == new && b == old))
}

/// True when a regex change may reject answers the old pattern accepted.
///
/// Removing a pattern only loosens validation. Adding one, or swapping it
/// for any textually different pattern, cannot be assumed safe.
pub fn has_regex_invalidation(old: Option<&str>, new: Option<&str>) -> bool {
    match (old, new) {
        (_, None) => false,
        (None, Some(_)) => true,
        (Some(old), Some(new)) => old != new,
    }
}

/// True when the new lower bound rejects values the old one allowed.
///
/// An absent old bound is unbounded, so any new bound is stricter.
pub fn is_stricter_min(old: Option<f64>, new: Option<f64>) -> bool {
    match (old, new) {
        (_, None) => false,
        (None, Some(_)) => true,
        (Some(old), Some(new)) => new > old,
    }
}

/// Mirror of [`is_stricter_min`] for the upper bound.
pub fn is_stricter_max(old: Option<f64>, new: Option<f64>) -> bool {
    match (old, new) {
        (_, None) => false,
        (None, Some(_)) => true,
        (Some(old), Some(new)) => new < old,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn is_whitelisted(a: FieldType, b: FieldType) -> bool {
        SAFE_RETYPES
            .iter()
            .any(|&(x, y)| (x == a && y == b) || (x == b && y == a))
    }

    #[test]
    fn whitelisted_pairs_are_safe_both_ways() {
        for (a, b) in SAFE_RETYPES {
            assert!(!is_incompatible_type_change(a, b), "{a} -> {b}");
            assert!(!is_incompatible_type_change(b, a), "{b} -> {a}");
        }
    }

    #[test]
    fn identity_is_always_safe() {
        for ty in FieldType::ALL {
            assert!(!is_incompatible_type_change(ty, ty));
        }
    }

    #[test]
    fn whitelist_is_not_transitive() {
        // textarea and email both pair with text, but not with each other
        assert!(is_incompatible_type_change(FieldType::Textarea, FieldType::Email));
        assert!(is_incompatible_type_change(FieldType::Url, FieldType::Tel));
    }

    #[test]
    fn option_types_never_retype_safely() {
        assert!(is_incompatible_type_change(FieldType::Select, FieldType::Text));
        assert!(is_incompatible_type_change(FieldType::Text, FieldType::Select));
        assert!(is_incompatible_type_change(FieldType::Radio, FieldType::Select));
        assert!(is_incompatible_type_change(FieldType::Text, FieldType::Number));
    }

    #[test]
    fn regex_transitions() {
        assert!(!has_regex_invalidation(None, None));
        assert!(!has_regex_invalidation(Some("^a$"), None));
        assert!(has_regex_invalidation(None, Some("^a$")));
        assert!(!has_regex_invalidation(Some("^a$"), Some("^a$")));
        assert!(has_regex_invalidation(Some("^a$"), Some("^b$")));
    }

    #[test]
    fn bounds_transitions() {
        assert!(is_stricter_min(Some(0.0), Some(10.0)));
        assert!(!is_stricter_min(Some(10.0), Some(0.0)));
        assert!(!is_stricter_min(Some(0.0), Some(0.0)));
        assert!(!is_stricter_min(Some(0.0), None));
        assert!(is_stricter_min(None, Some(-1_000_000.0)));

        assert!(is_stricter_max(Some(100.0), Some(50.0)));
        assert!(!is_stricter_max(Some(100.0), Some(150.0)));
        assert!(!is_stricter_max(None, None));
        assert!(is_stricter_max(None, Some(1_000_000.0)));
    }

    fn any_field_type() -> impl Strategy<Value = FieldType> {
        prop::sample::select(FieldType::ALL.to_vec())
    }

    proptest! {
        #[test]
        fn classifier_matches_whitelist(a in any_field_type(), b in any_field_type()) {
            let expected = a != b && !is_whitelisted(a, b);
            prop_assert_eq!(is_incompatible_type_change(a, b), expected);
            prop_assert_eq!(is_incompatible_type_change(a, b), is_incompatible_type_change(b, a));
        }

        #[test]
        fn distinct_patterns_always_invalidate(p in "[a-z]{1,8}", q in "[a-z]{1,8}") {
            prop_assert_eq!(has_regex_invalidation(Some(&p), Some(&q)), p != q);
        }
    }
}
