//! Core types describing the remote data model.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Remote record identifier.
pub type RecordId = i64;

/// Field definitions of one remote model, keyed by field name.
pub type ModelMetadata = BTreeMap<String, FieldDef>;

/// Returns the JSON type name for error messages.
pub fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// The remote's "empty" marker: `false` or `null`.
pub fn is_empty_marker(value: &Value) -> bool {
    matches!(value, Value::Null | Value::Bool(false))
}

/// Remote field type as reported by `fields_get`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Char,
    Text,
    Html,
    Selection,
    Binary,
    Reference,
    Date,
    Datetime,
    Integer,
    Float,
    Monetary,
    Boolean,
    Many2one,
    One2many,
    Many2many,
    #[serde(other)]
    Other,
}

impl FieldType {
    pub fn is_relation(self) -> bool {
        matches!(
            self,
            FieldType::Many2one | FieldType::One2many | FieldType::Many2many
        )
    }

    /// One-to-many and many-to-many.
    pub fn is_multi(self) -> bool {
        matches!(self, FieldType::One2many | FieldType::Many2many)
    }
}

/// One field definition from remote metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDef {
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub readonly: bool,
    /// Target model of a relation field.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relation: Option<String>,
    /// `(value, label)` pairs for selection and reference fields.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selection: Option<Vec<(Value, Value)>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    /// Per-state attribute overrides, e.g. `{"done": [["readonly", true]]}`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub states: Option<BTreeMap<String, Vec<(String, Value)>>>,
}

impl FieldDef {
    pub fn new(field_type: FieldType) -> Self {
        Self {
            field_type,
            required: false,
            readonly: false,
            relation: None,
            selection: None,
            size: None,
            states: None,
        }
    }

    pub fn relation(mut self, model: impl Into<String>) -> Self {
        self.relation = Some(model.into());
        self
    }

    pub fn required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    pub fn readonly(mut self, readonly: bool) -> Self {
        self.readonly = readonly;
        self
    }

    pub fn size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }

    pub fn selection<I, V>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.selection = Some(
            values
                .into_iter()
                .map(|v| {
                    let v = v.into();
                    (v.clone(), v)
                })
                .collect(),
        );
        self
    }

    pub fn state_override(mut self, state: &str, attribute: &str, value: bool) -> Self {
        self.states
            .get_or_insert_with(BTreeMap::new)
            .entry(state.to_string())
            .or_default()
            .push((attribute.to_string(), Value::Bool(value)));
        self
    }

    /// Selection keys, without labels.
    pub fn selection_values(&self) -> Option<Vec<Value>> {
        self.selection
            .as_ref()
            .map(|pairs| pairs.iter().map(|(value, _)| value.clone()).collect())
    }
}

/// Mutation instruction for a multi-valued relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkCommand {
    /// Add an existing record to the relation.
    Link(RecordId),
    /// Remove every record from the relation.
    Clear,
}

impl LinkCommand {
    /// Wire form understood by the remote service.
    pub fn to_value(self) -> Value {
        match self {
            LinkCommand::Link(id) => json!([4, id]),
            LinkCommand::Clear => json!([5]),
        }
    }
}

/// Resolve a collection name to a remote model name.
///
/// Dotted names are used verbatim; CamelCase names are split on capitals
/// (`ResPartner` -> `res.partner`).
pub fn model_name(collection: &str) -> String {
    if collection.contains('.') {
        return collection.to_string();
    }
    let mut name = String::with_capacity(collection.len() + 4);
    for (i, ch) in collection.chars().enumerate() {
        if ch.is_uppercase() {
            if i > 0 {
                name.push('.');
            }
            name.extend(ch.to_lowercase());
        } else {
            name.push(ch);
        }
    }
    name
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_def_from_remote_metadata() {
        let raw = json!({
            "type": "selection",
            "string": "Status",
            "required": true,
            "selection": [["draft", "Draft"], ["done", "Done"]],
            "states": {"done": [["readonly", true]]}
        });
        let def: FieldDef = serde_json::from_value(raw).unwrap();
        assert_eq!(def.field_type, FieldType::Selection);
        assert!(def.required);
        assert!(!def.readonly);
        assert_eq!(
            def.selection_values(),
            Some(vec![json!("draft"), json!("done")])
        );
        assert_eq!(def.states.unwrap()["done"][0].0, "readonly");
    }

    #[test]
    fn unknown_field_type_maps_to_other() {
        let def: FieldDef = serde_json::from_value(json!({"type": "properties"})).unwrap();
        assert_eq!(def.field_type, FieldType::Other);
    }

    #[test]
    fn relation_kinds() {
        assert!(FieldType::Many2one.is_relation());
        assert!(!FieldType::Many2one.is_multi());
        assert!(FieldType::Many2many.is_multi());
        assert!(!FieldType::Char.is_relation());
    }

    #[test]
    fn link_command_wire_form() {
        assert_eq!(LinkCommand::Link(9).to_value(), json!([4, 9]));
        assert_eq!(LinkCommand::Clear.to_value(), json!([5]));
    }

    #[test]
    fn model_name_conversion() {
        assert_eq!(model_name("res.partner"), "res.partner");
        assert_eq!(model_name("ResPartner"), "res.partner");
        assert_eq!(model_name("AccountInvoiceLine"), "account.invoice.line");
        assert_eq!(model_name("invoice"), "invoice");
    }

    #[test]
    fn empty_marker() {
        assert!(is_empty_marker(&Value::Null));
        assert!(is_empty_marker(&json!(false)));
        assert!(!is_empty_marker(&json!(0)));
        assert!(!is_empty_marker(&json!("")));
    }
}
