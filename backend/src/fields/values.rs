//! Validation and normalization of custom field values.

use portal_common::{CustomValues, FieldDefinition, FieldKind, FieldValue};

use super::FieldError;

/// Check one submitted value against its definition.
///
/// `None` and empty values only fail when the field is required. Present
/// values must fit the declared kind.
pub fn validate_value(definition: &FieldDefinition, value: Option<&FieldValue>) -> Result<(), FieldError> {
    normalize(definition, value).map(|_| ())
}

/// Check every definition against the submitted map, in definition order.
/// The first failure is returned.
pub fn validate_values(definitions: &[FieldDefinition], values: &CustomValues) -> Result<(), FieldError> {
    for definition in definitions {
        validate_value(definition, values.get(&definition.name))?;
    }
    Ok(())
}

/// Build the custom map written on record creation.
///
/// Keys are limited to the current definition names, values are coerced to
/// their declared kind, and empty optional values are left out. An unchecked
/// boolean is written as `false`.
pub fn build_custom_values(
    definitions: &[FieldDefinition],
    input: &CustomValues,
) -> Result<CustomValues, FieldError> {
    let mut out = CustomValues::new();
    for definition in definitions {
        if let Some(value) = normalize(definition, input.get(&definition.name))? {
            out.insert(definition.name.clone(), value);
        }
    }
    Ok(out)
}

/// Build the custom map for an edit of an existing record.
///
/// Starts from the record's current map so keys of deleted definitions are
/// kept. Edited values are only accepted for defined keys, and required
/// checks run against the merged result.
pub fn merge_custom_values(
    definitions: &[FieldDefinition],
    current: &CustomValues,
    edited: &CustomValues,
) -> Result<CustomValues, FieldError> {
    let mut merged = current.clone();
    for definition in definitions {
        let value = edited
            .get(&definition.name)
            .or_else(|| current.get(&definition.name));
        match normalize(definition, value)? {
            Some(value) => {
                merged.insert(definition.name.clone(), value);
            }
            None => {
                merged.remove(&definition.name);
            }
        }
    }
    Ok(merged)
}

fn normalize(definition: &FieldDefinition, value: Option<&FieldValue>) -> Result<Option<FieldValue>, FieldError> {
    let field = || definition.name.clone();

    let Some(value) = value.filter(|v| !v.is_empty()) else {
        return match (definition.required, definition.kind) {
            (true, _) => Err(FieldError::Required(field())),
            (false, FieldKind::Boolean) => Ok(Some(FieldValue::Bool(false))),
            (false, _) => Ok(None),
        };
    };

    let normalized = match definition.kind {
        FieldKind::Text => FieldValue::Text(value.to_string()),
        FieldKind::Number => match value {
            FieldValue::Number(n) => FieldValue::Number(*n),
            FieldValue::Text(s) => s
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|n| n.is_finite())
                .map(FieldValue::Number)
                .ok_or_else(|| FieldError::InvalidNumber {
                    field: field(),
                    value: s.clone(),
                })?,
            FieldValue::Bool(_) => {
                return Err(FieldError::WrongKind {
                    field: field(),
                    expected: FieldKind::Number,
                })
            }
        },
        FieldKind::Boolean => match value {
            FieldValue::Bool(b) => FieldValue::Bool(*b),
            FieldValue::Text(s) => match s.trim() {
                "true" | "on" => FieldValue::Bool(true),
                "false" | "off" => FieldValue::Bool(false),
                _ => {
                    return Err(FieldError::WrongKind {
                        field: field(),
                        expected: FieldKind::Boolean,
                    })
                }
            },
            FieldValue::Number(_) => {
                return Err(FieldError::WrongKind {
                    field: field(),
                    expected: FieldKind::Boolean,
                })
            }
        },
        FieldKind::Select => {
            let choice = value.to_string();
            if !definition.options.iter().any(|o| *o == choice) {
                return Err(FieldError::InvalidOption {
                    field: field(),
                    value: choice,
                });
            }
            FieldValue::Text(choice)
        }
    };

    Ok(Some(normalized))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn def(name: &str, kind: FieldKind, required: bool, options: &[&str]) -> FieldDefinition {
        FieldDefinition {
            id: format!("id-{}", name),
            name: name.to_string(),
            kind,
            required,
            options: options.iter().map(|o| o.to_string()).collect(),
            created_at: None,
        }
    }

    fn values(pairs: &[(&str, FieldValue)]) -> CustomValues {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn test_missing_required_field_is_named() {
        let defs = vec![
            def("Nickname", FieldKind::Text, false, &[]),
            def("Team", FieldKind::Select, true, &["red", "blue"]),
            def("Age", FieldKind::Number, false, &[]),
        ];
        let input = values(&[("Nickname", FieldValue::text("Al"))]);
        let err = build_custom_values(&defs, &input).unwrap_err();
        assert_eq!(err, FieldError::Required("Team".to_string()));
        assert!(err.to_string().contains("Team"));
    }

    #[test]
    fn test_required_text_rejects_blank() {
        let d = def("Nickname", FieldKind::Text, true, &[]);
        assert!(validate_value(&d, Some(&FieldValue::text("  "))).is_err());
        assert!(validate_value(&d, Some(&FieldValue::text("ok"))).is_ok());
    }

    #[test]
    fn test_required_boolean_accepts_false() {
        let d = def("Agree", FieldKind::Boolean, true, &[]);
        assert!(validate_value(&d, Some(&FieldValue::Bool(false))).is_ok());
        assert_eq!(validate_value(&d, None), Err(FieldError::Required("Agree".to_string())));
    }

    #[test]
    fn test_select_requires_member() {
        let d = def("Team", FieldKind::Select, false, &["red", "blue"]);
        assert!(validate_value(&d, Some(&FieldValue::text("red"))).is_ok());
        assert!(matches!(
            validate_value(&d, Some(&FieldValue::text("green"))),
            Err(FieldError::InvalidOption { .. })
        ));
        assert!(validate_value(&d, None).is_ok());
    }

    #[test]
    fn test_number_parsing() {
        let d = def("Age", FieldKind::Number, true, &[]);
        assert!(validate_value(&d, Some(&FieldValue::text("42"))).is_ok());
        assert!(validate_value(&d, Some(&FieldValue::Number(0.0))).is_ok());
        assert!(matches!(
            validate_value(&d, Some(&FieldValue::text("forty"))),
            Err(FieldError::InvalidNumber { .. })
        ));
    }

    #[test]
    fn test_build_restricts_to_definitions() {
        let defs = vec![
            def("Age", FieldKind::Number, false, &[]),
            def("Agree", FieldKind::Boolean, false, &[]),
            def("Nickname", FieldKind::Text, false, &[]),
        ];
        let input = values(&[
            ("Age", FieldValue::text(" 30 ")),
            ("Nickname", FieldValue::text("")),
            ("Injected", FieldValue::text("nope")),
        ]);
        let out = build_custom_values(&defs, &input).unwrap();
        assert_eq!(out.get("Age"), Some(&FieldValue::Number(30.0)));
        assert_eq!(out.get("Agree"), Some(&FieldValue::Bool(false)));
        assert!(!out.contains_key("Nickname"));
        assert!(!out.contains_key("Injected"));
    }

    #[test]
    fn test_merge_keeps_stale_keys() {
        let defs = vec![def("Team", FieldKind::Select, true, &["red", "blue"])];
        let current = values(&[
            ("Team", FieldValue::text("red")),
            ("Deleted field", FieldValue::text("legacy")),
        ]);
        let edited = values(&[("Team", FieldValue::text("blue")), ("Other", FieldValue::text("x"))]);

        let merged = merge_custom_values(&defs, &current, &edited).unwrap();
        assert_eq!(merged.get("Team"), Some(&FieldValue::text("blue")));
        assert_eq!(merged.get("Deleted field"), Some(&FieldValue::text("legacy")));
        assert!(!merged.contains_key("Other"));
    }

    #[test]
    fn test_merge_enforces_required_on_result() {
        let defs = vec![def("Team", FieldKind::Select, true, &["red"])];
        let current = CustomValues::new();
        assert!(merge_custom_values(&defs, &current, &CustomValues::new()).is_err());
    }
}
