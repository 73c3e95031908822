use std::fmt;

use serde::{Deserialize, Serialize};

use super::{FieldId, FormId, Version};

/// The fixed set of input kinds a field can take.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FieldType {
    #[default]
    Text,
    Textarea,
    Email,
    Url,
    Tel,
    Number,
    Range,
    Date,
    Time,
    Datetime,
    Select,
    Radio,
    Checkbox,
    CheckboxGroup,
}

impl FieldType {
    pub const ALL: [FieldType; 14] = [
        FieldType::Text,
        FieldType::Textarea,
        FieldType::Email,
        FieldType::Url,
        FieldType::Tel,
        FieldType::Number,
        FieldType::Range,
        FieldType::Date,
        FieldType::Time,
        FieldType::Datetime,
        FieldType::Select,
        FieldType::Radio,
        FieldType::Checkbox,
        FieldType::CheckboxGroup,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            FieldType::Text => "text",
            FieldType::Textarea => "textarea",
            FieldType::Email => "email",
            FieldType::Url => "url",
            FieldType::Tel => "tel",
            FieldType::Number => "number",
            FieldType::Range => "range",
            FieldType::Date => "date",
            FieldType::Time => "time",
            FieldType::Datetime => "datetime",
            FieldType::Select => "select",
            FieldType::Radio => "radio",
            FieldType::Checkbox => "checkbox",
            FieldType::CheckboxGroup => "checkbox-group",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|ty| ty.as_str() == raw)
    }

    /// Select, radio and checkbox-group need a non-empty option list.
    pub fn requires_options(self) -> bool {
        matches!(
            self,
            FieldType::Select | FieldType::Radio | FieldType::CheckboxGroup
        )
    }

    /// Regex validation only applies to free-text inputs.
    pub fn supports_pattern(self) -> bool {
        matches!(self, FieldType::Text | FieldType::Textarea)
    }

    /// `allow_multiple` and `selection_limit` only apply here.
    pub fn supports_multiple(self) -> bool {
        matches!(self, FieldType::Select | FieldType::CheckboxGroup)
    }

    pub fn is_numeric(self) -> bool {
        matches!(self, FieldType::Number | FieldType::Range)
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One choice of a select, radio or checkbox-group field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldOption {
    pub label: String,
    #[serde(default)]
    pub is_default: bool,
}

impl FieldOption {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            is_default: false,
        }
    }
}

/// Everything about a field except its identity and version stamp.
///
/// Shared by live definitions, edit proposals and snapshot entries so the
/// three can never drift apart.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldAttributes {
    pub label: String,
    pub field_type: FieldType,
    pub required: bool,
    /// Display position. Need not be contiguous.
    pub order: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub help_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub regex_pattern: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation_message: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<FieldOption>,
    pub allow_multiple: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selection_limit: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_value: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_value: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_value: Option<String>,
}

impl FieldAttributes {
    pub fn new(label: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            label: label.into(),
            field_type,
            ..Self::default()
        }
    }

    /// True when answers to this field carry several values.
    pub fn is_multi_valued(&self) -> bool {
        match self.field_type {
            FieldType::CheckboxGroup => true,
            FieldType::Select => self.allow_multiple,
            _ => false,
        }
    }
}

/// A persisted field of a form, stamped with the form version it belongs to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDefinition {
    pub id: FieldId,
    pub form_id: FormId,
    pub version: Version,
    #[serde(flatten)]
    pub attrs: FieldAttributes,
}

/// One entry of a proposed replacement field list.
///
/// `id` is present when the entry edits an existing field and absent for a
/// field that is being created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProposedField {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<FieldId>,
    #[serde(flatten)]
    pub attrs: FieldAttributes,
}

impl ProposedField {
    pub fn new(attrs: FieldAttributes) -> Self {
        Self { id: None, attrs }
    }

    pub fn existing(id: FieldId, attrs: FieldAttributes) -> Self {
        Self { id: Some(id), attrs }
    }

    /// The id of the live field this proposal edits. Placeholder ids
    /// (zero or negative) mark a field that does not exist yet.
    pub fn persisted_id(&self) -> Option<FieldId> {
        self.id.filter(|id| id.is_persisted())
    }
}

impl From<&FieldDefinition> for ProposedField {
    fn from(field: &FieldDefinition) -> Self {
        Self::existing(field.id, field.attrs.clone())
    }
}
