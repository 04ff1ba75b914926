//! Document validation against synthesized schemas.

use chrono::{NaiveDate, NaiveDateTime};
use jsonschema::error::ValidationErrorKind;
use serde_json::Value;

use crate::error::{BridgeError, FieldErrors};
use crate::schema::{RuleKind, ValidationSchema, DATETIME_FORMAT, DATE_FORMAT};

/// Outcome of validating one document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: FieldErrors,
}

impl ValidationReport {
    /// Convert into `Err(BridgeError::Validation)` when invalid.
    pub fn into_result(self) -> Result<(), BridgeError> {
        if self.valid {
            Ok(())
        } else {
            Err(BridgeError::Validation {
                errors: self.errors,
            })
        }
    }
}

/// Validate a document against a schema.
///
/// A top-level `id` switches to update semantics: omitted fields are never
/// reported as missing. Without it every required field must be present.
///
/// # Errors
///
/// Returns `BridgeError::InvalidSchema` if the schema does not compile.
/// Document problems are reported in the returned [`ValidationReport`].
pub fn validate(document: &Value, schema: &ValidationSchema) -> Result<ValidationReport, BridgeError> {
    validate_with(document, schema, false)
}

/// Like [`validate`], with `strict` rejecting fields the schema does not know.
pub fn validate_with(
    document: &Value,
    schema: &ValidationSchema,
    strict: bool,
) -> Result<ValidationReport, BridgeError> {
    let update = document.get("id").is_some();
    let compiled = schema.to_json_schema(update, strict);
    let validator = jsonschema::options()
        .with_format(DATE_FORMAT, is_date_str)
        .with_format(DATETIME_FORMAT, is_datetime_str)
        .should_validate_formats(true)
        .build(&compiled)
        .map_err(|e| BridgeError::InvalidSchema {
            message: e.to_string(),
        })?;

    let mut errors = FieldErrors::new();
    for error in validator.iter_errors(document) {
        let base = pointer_to_path(&error.instance_path.to_string());
        match &error.kind {
            ValidationErrorKind::Required { property } => {
                let field = property.as_str().map(String::from).unwrap_or_else(|| property.to_string());
                push(&mut errors, join(&base, &field), "required field");
            }
            ValidationErrorKind::AdditionalProperties { unexpected } => {
                for field in unexpected {
                    push(&mut errors, join(&base, field), "unknown field");
                }
            }
            ValidationErrorKind::Format { format } => {
                push(&mut errors, base, format!("must be of {format} type"));
            }
            _ => push(&mut errors, base, error.to_string()),
        }
    }
    check_readonly(document, schema, "", &mut errors);

    Ok(ValidationReport {
        valid: errors.is_empty(),
        errors,
    })
}

/// `YYYY-MM-DD`, nothing more or less.
pub fn is_date_str(value: &str) -> bool {
    has_shape(value, "dddd-dd-dd") && NaiveDate::parse_from_str(value, "%Y-%m-%d").is_ok()
}

/// `YYYY-MM-DD HH:MM:SS`, nothing more or less.
pub fn is_datetime_str(value: &str) -> bool {
    has_shape(value, "dddd-dd-dd dd:dd:dd")
        && NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S").is_ok()
}

fn has_shape(value: &str, shape: &str) -> bool {
    value.len() == shape.len()
        && value.bytes().zip(shape.bytes()).all(|(v, s)| match s {
            b'd' => v.is_ascii_digit(),
            other => v == other,
        })
}

fn check_readonly(document: &Value, schema: &ValidationSchema, path: &str, errors: &mut FieldErrors) {
    let Value::Object(map) = document else {
        return;
    };
    for (name, rule) in &schema.fields {
        let Some(value) = map.get(name) else {
            continue;
        };
        let field_path = join(path, name);
        if rule.readonly {
            push(errors, field_path.clone(), "read-only field");
        }
        match (&rule.kind, value) {
            (RuleKind::Record(nested), Value::Object(_)) => {
                check_readonly(value, nested, &field_path, errors);
            }
            (RuleKind::RecordList(nested), Value::Array(items)) => {
                for (i, item) in items.iter().enumerate() {
                    check_readonly(item, nested, &join(&field_path, &i.to_string()), errors);
                }
            }
            _ => {}
        }
    }
}

fn push(errors: &mut FieldErrors, path: String, message: impl Into<String>) {
    let key = if path.is_empty() {
        "document".to_string()
    } else {
        path
    };
    errors.entry(key).or_default().push(message.into());
}

/// `/partner_id/name` -> `partner_id.name`
fn pointer_to_path(pointer: &str) -> String {
    pointer
        .split('/')
        .filter(|s| !s.is_empty())
        .map(|s| s.replace("~1", "/").replace("~0", "~"))
        .collect::<Vec<_>>()
        .join(".")
}

fn join(path: &str, field: &str) -> String {
    if path.is_empty() {
        field.to_string()
    } else {
        format!("{path}.{field}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FieldRule;
    use serde_json::json;

    fn schema(fields: Vec<(&str, FieldRule)>) -> ValidationSchema {
        ValidationSchema {
            fields: fields.into_iter().map(|(n, r)| (n.to_string(), r)).collect(),
        }
    }

    fn required(kind: RuleKind) -> FieldRule {
        let mut rule = FieldRule::new(kind);
        rule.required = true;
        rule
    }

    #[test]
    fn date_shapes() {
        assert!(is_date_str("2020-01-01"));
        assert!(!is_date_str("31-01-2020"));
        assert!(!is_date_str("2020-1-1"));
        assert!(!is_date_str("2020-02-30"));
        assert!(!is_date_str("2020-01-01 "));
        assert!(is_datetime_str("2020-01-01 13:45:00"));
        assert!(!is_datetime_str("2020-01-01T13:45:00"));
        assert!(!is_datetime_str("2020-01-01"));
    }

    #[test]
    fn date_field_rejects_wrong_order() {
        let schema = schema(vec![("d", FieldRule::new(RuleKind::DateStr))]);

        let report = validate(&json!({"d": "31-01-2020"}), &schema).unwrap();
        assert!(!report.valid);
        assert_eq!(report.errors["d"], vec!["must be of date_str type".to_string()]);

        let report = validate(&json!({"d": "2020-01-01"}), &schema).unwrap();
        assert!(report.valid);
        assert!(report.errors.is_empty());
    }

    #[test]
    fn sibling_errors_are_all_collected() {
        let schema = schema(vec![
            ("d", FieldRule::new(RuleKind::DateStr)),
            ("t", FieldRule::new(RuleKind::DatetimeStr)),
            ("n", FieldRule::new(RuleKind::Integer)),
        ]);
        let report = validate(
            &json!({"d": "2020/01/01", "t": "yesterday", "n": "three"}),
            &schema,
        )
        .unwrap();
        assert_eq!(report.errors.len(), 3);
        assert_eq!(report.errors["t"], vec!["must be of datetime_str type".to_string()]);
    }

    #[test]
    fn missing_required_on_create_only() {
        let schema = schema(vec![
            ("id", FieldRule::new(RuleKind::Integer)),
            ("name", required(RuleKind::String)),
        ]);
        let report = validate(&json!({}), &schema).unwrap();
        assert_eq!(report.errors["name"], vec!["required field".to_string()]);

        let report = validate(&json!({"id": 4}), &schema).unwrap();
        assert!(report.valid);
    }

    #[test]
    fn nested_errors_use_dotted_paths() {
        let mut line = ValidationSchema::new();
        line.fields.insert("name".into(), required(RuleKind::String));
        line.fields
            .insert("quantity".into(), FieldRule::new(RuleKind::Number));
        let schema = schema(vec![("line_ids", FieldRule::new(RuleKind::RecordList(line)))]);

        let report = validate(
            &json!({"line_ids": [{"name": "ok"}, {"quantity": "x"}, 5]}),
            &schema,
        )
        .unwrap();
        assert!(!report.valid);
        assert_eq!(
            report.errors["line_ids.1.name"],
            vec!["required field".to_string()]
        );
        assert!(report.errors.contains_key("line_ids.1.quantity"));
        assert!(!report.errors.contains_key("line_ids.2"));
    }

    #[test]
    fn readonly_fields_rejected_when_sent() {
        let mut amount = FieldRule::new(RuleKind::Number);
        amount.readonly = true;
        let schema = schema(vec![
            ("id", FieldRule::new(RuleKind::Integer)),
            ("amount", amount),
        ]);
        let report = validate(&json!({"id": 1, "amount": 3.5}), &schema).unwrap();
        assert_eq!(report.errors["amount"], vec!["read-only field".to_string()]);
        assert!(validate(&json!({"id": 1}), &schema).unwrap().valid);
    }

    #[test]
    fn false_clears_optional_relations_only() {
        let mut tags = FieldRule::new(RuleKind::RecordList(ValidationSchema::id_only()));
        tags.accepts_false = true;
        let schema = schema(vec![("id", FieldRule::new(RuleKind::Integer)), ("tag_ids", tags)]);

        assert!(validate(&json!({"id": 1, "tag_ids": false}), &schema).unwrap().valid);
        let report = validate(&json!({"id": 1, "tag_ids": true}), &schema).unwrap();
        assert!(report.errors.contains_key("tag_ids"));

        let plain = self::schema(vec![("count", FieldRule::new(RuleKind::Integer))]);
        assert!(!validate(&json!({"count": false}), &plain).unwrap().valid);
    }

    #[test]
    fn strict_rejects_unknown_fields() {
        let schema = schema(vec![("name", FieldRule::new(RuleKind::String))]);
        let report = validate_with(&json!({"name": "x", "bogus": 1}), &schema, true).unwrap();
        assert_eq!(report.errors["bogus"], vec!["unknown field".to_string()]);
        assert!(validate(&json!({"name": "x", "bogus": 1}), &schema).unwrap().valid);
    }

    #[test]
    fn allowed_values_and_max_length() {
        let mut state = FieldRule::new(RuleKind::String);
        state.allowed = Some(vec![json!("draft"), json!("done")]);
        let mut code = FieldRule::new(RuleKind::String);
        code.max_length = Some(3);
        let schema = schema(vec![("state", state), ("code", code)]);

        let report = validate(&json!({"state": "open", "code": "ABCD"}), &schema).unwrap();
        assert!(report.errors.contains_key("state"));
        assert!(report.errors.contains_key("code"));
        assert!(validate(&json!({"state": null, "code": "ABC"}), &schema)
            .unwrap()
            .valid);
    }

    #[test]
    fn into_result() {
        let schema = schema(vec![("name", required(RuleKind::String))]);
        let err = validate(&json!({}), &schema)
            .unwrap()
            .into_result()
            .unwrap_err();
        assert!(matches!(err, BridgeError::Validation { errors } if errors.contains_key("name")));
    }
}
