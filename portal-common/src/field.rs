//! Custom field definitions and the values stored under them.

use std::cmp::Ordering;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Value kind declared by a custom field definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    /// Free text input
    #[default]
    Text,
    /// Numeric input
    Number,
    /// Checkbox
    Boolean,
    /// Single choice from the definition's options
    Select,
}

impl FieldKind {
    /// All kind variants for iteration.
    pub const ALL: [FieldKind; 4] = [
        FieldKind::Text,
        FieldKind::Number,
        FieldKind::Boolean,
        FieldKind::Select,
    ];
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldKind::Text => write!(f, "text"),
            FieldKind::Number => write!(f, "number"),
            FieldKind::Boolean => write!(f, "boolean"),
            FieldKind::Select => write!(f, "select"),
        }
    }
}

/// A value stored in a record's custom field map.
///
/// Select values are stored as text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl FieldValue {
    pub fn text(value: impl Into<String>) -> Self {
        FieldValue::Text(value.into())
    }

    /// Whether the value counts as "not filled in".
    ///
    /// Booleans are never empty, `false` is a valid answer.
    pub fn is_empty(&self) -> bool {
        match self {
            FieldValue::Bool(_) => false,
            FieldValue::Number(n) => !n.is_finite(),
            FieldValue::Text(s) => s.trim().is_empty(),
        }
    }

    /// Three-way comparison used by table sorting.
    ///
    /// Values of the same variant compare naturally; mixed variants fall
    /// back to comparing their display form.
    pub fn compare(&self, other: &FieldValue) -> Ordering {
        match (self, other) {
            (FieldValue::Bool(a), FieldValue::Bool(b)) => a.cmp(b),
            (FieldValue::Number(a), FieldValue::Number(b)) => a.total_cmp(b),
            (FieldValue::Text(a), FieldValue::Text(b)) => a.cmp(b),
            _ => self.to_string().cmp(&other.to_string()),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Bool(b) => write!(f, "{}", b),
            FieldValue::Number(n) => write!(f, "{}", n),
            FieldValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Bool(value)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Number(value)
    }
}

/// Administrator-declared extra attribute attached to every registration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDefinition {
    pub id: String,
    /// Display label, also the key into each record's custom field map
    pub name: String,
    #[serde(rename = "type")]
    pub kind: FieldKind,
    #[serde(default)]
    pub required: bool,
    /// Allowed values, only meaningful for `FieldKind::Select`
    #[serde(default, deserialize_with = "crate::registration::null_as_default")]
    pub options: Vec<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Payload for creating a field definition.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NewFieldDefinition {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: FieldKind,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub options: Vec<String>,
}

/// Partial update of a field definition. Absent fields are left untouched.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FieldDefinitionPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<FieldKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<String>>,
}

impl FieldDefinitionPatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.kind.is_none() && self.required.is_none() && self.options.is_none()
    }

    /// The definition as it would look after applying this patch.
    pub fn apply_to(&self, definition: &FieldDefinition) -> FieldDefinition {
        FieldDefinition {
            id: definition.id.clone(),
            name: self.name.clone().unwrap_or_else(|| definition.name.clone()),
            kind: self.kind.unwrap_or(definition.kind),
            required: self.required.unwrap_or(definition.required),
            options: self.options.clone().unwrap_or_else(|| definition.options.clone()),
            created_at: definition.created_at,
        }
    }
}
