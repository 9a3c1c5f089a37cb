//! Dynamic field model.
//!
//! Administrator-defined custom fields drive both the registration form and
//! the shape of each record's `custom_fields` map. This module validates
//! definitions before they reach the store, validates and normalizes the
//! values submitted for them, and provides the search and sort rules used
//! by the review table.

pub mod query;
pub mod values;

pub use query::{matches_search, sort_records, SortDirection, SortField, SortState, StatusFilter};
pub use values::{build_custom_values, merge_custom_values, validate_value, validate_values};

use portal_common::{FieldDefinition, FieldDefinitionPatch, FieldKind, NewFieldDefinition};

/// Validation failures for definitions and submitted values.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FieldError {
    #[error("Field name is required")]
    EmptyName,
    #[error("Select field '{0}' must have at least one option")]
    MissingOptions(String),
    #[error("A field named '{0}' already exists")]
    DuplicateName(String),
    #[error("Unknown field definition: {0}")]
    UnknownDefinition(String),
    #[error("Field '{0}' is required")]
    Required(String),
    #[error("Field '{field}' must be a number, got '{value}'")]
    InvalidNumber { field: String, value: String },
    #[error("Field '{field}' must be one of its options, got '{value}'")]
    InvalidOption { field: String, value: String },
    #[error("Field '{field}' expects a {expected} value")]
    WrongKind { field: String, expected: FieldKind },
}

/// Trim options, drop blanks and duplicates, keep first-seen order.
fn normalize_options(options: &[String]) -> Vec<String> {
    let mut seen = Vec::with_capacity(options.len());
    for option in options {
        let option = option.trim();
        if !option.is_empty() && !seen.iter().any(|o: &String| o == option) {
            seen.push(option.to_string());
        }
    }
    seen
}

fn check_shape(name: &str, kind: FieldKind, options: &[String]) -> Result<(), FieldError> {
    if name.is_empty() {
        return Err(FieldError::EmptyName);
    }
    if kind == FieldKind::Select && options.is_empty() {
        return Err(FieldError::MissingOptions(name.to_string()));
    }
    Ok(())
}

fn check_unique(name: &str, existing: &[FieldDefinition], skip_id: Option<&str>) -> Result<(), FieldError> {
    let taken = existing
        .iter()
        .filter(|def| Some(def.id.as_str()) != skip_id)
        .any(|def| def.name.trim() == name);
    if taken {
        return Err(FieldError::DuplicateName(name.to_string()));
    }
    Ok(())
}

/// Validate a new definition against the current set and return the
/// normalized payload to send to the store.
pub fn validate_new_definition(
    definition: &NewFieldDefinition,
    existing: &[FieldDefinition],
) -> Result<NewFieldDefinition, FieldError> {
    let name = definition.name.trim().to_string();
    let options = match definition.kind {
        FieldKind::Select => normalize_options(&definition.options),
        _ => Vec::new(),
    };

    check_shape(&name, definition.kind, &options)?;
    check_unique(&name, existing, None)?;

    Ok(NewFieldDefinition {
        name,
        kind: definition.kind,
        required: definition.required,
        options,
    })
}

/// Validate an edit of definition `id`, judged on the definition it would
/// produce, and return the normalized patch.
pub fn validate_definition_patch(
    id: &str,
    patch: &FieldDefinitionPatch,
    existing: &[FieldDefinition],
) -> Result<FieldDefinitionPatch, FieldError> {
    let current = existing
        .iter()
        .find(|def| def.id == id)
        .ok_or_else(|| FieldError::UnknownDefinition(id.to_string()))?;

    let mut normalized = patch.clone();
    if let Some(name) = &patch.name {
        normalized.name = Some(name.trim().to_string());
    }
    if let Some(options) = &patch.options {
        normalized.options = Some(normalize_options(options));
    }
    // Switching away from select drops the options.
    if matches!(patch.kind, Some(kind) if kind != FieldKind::Select) && !current.options.is_empty() {
        normalized.options = Some(Vec::new());
    }

    let result = normalized.apply_to(current);
    check_shape(&result.name, result.kind, &result.options)?;
    if normalized.name.is_some() {
        check_unique(&result.name, existing, Some(id))?;
    }

    Ok(normalized)
}
