//! Validation schemas synthesized from remote metadata.
//!
//! A [`ValidationSchema`] mirrors the requested field tree: one [`FieldRule`]
//! per field, with nested schemas for relations. It compiles to a standard
//! JSON Schema for the validator.

use std::collections::BTreeMap;

use serde_json::{json, Map, Value};

/// Format name for `YYYY-MM-DD` strings.
pub const DATE_FORMAT: &str = "date_str";
/// Format name for `YYYY-MM-DD HH:MM:SS` strings.
pub const DATETIME_FORMAT: &str = "datetime_str";

/// What a field's value must look like.
#[derive(Debug, Clone, PartialEq)]
pub enum RuleKind {
    String,
    Integer,
    Number,
    Boolean,
    DateStr,
    DatetimeStr,
    /// A single nested record (many-to-one sent as a mapping).
    Record(ValidationSchema),
    /// A list of nested records or bare ids (one-to-many, many-to-many).
    RecordList(ValidationSchema),
    /// No type constraint.
    Any,
}

impl RuleKind {
    pub fn name(&self) -> &'static str {
        match self {
            RuleKind::String => "string",
            RuleKind::Integer => "integer",
            RuleKind::Number => "number",
            RuleKind::Boolean => "boolean",
            RuleKind::DateStr => DATE_FORMAT,
            RuleKind::DatetimeStr => DATETIME_FORMAT,
            RuleKind::Record(_) => "dict",
            RuleKind::RecordList(_) => "list",
            RuleKind::Any => "any",
        }
    }
}

/// Constraints on one field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldRule {
    pub kind: RuleKind,
    pub required: bool,
    pub readonly: bool,
    pub allowed: Option<Vec<Value>>,
    pub max_length: Option<u64>,
    pub pattern: Option<String>,
    /// Also accept `false`, the remote's "no value", when not required.
    pub accepts_false: bool,
}

impl FieldRule {
    pub fn new(kind: RuleKind) -> Self {
        Self {
            kind,
            required: false,
            readonly: false,
            allowed: None,
            max_length: None,
            pattern: None,
            accepts_false: false,
        }
    }

    /// Nested schema of a relation rule.
    pub fn nested(&self) -> Option<&ValidationSchema> {
        match &self.kind {
            RuleKind::Record(schema) | RuleKind::RecordList(schema) => Some(schema),
            _ => None,
        }
    }

    fn to_json_schema(&self, update: bool, strict: bool) -> Value {
        let mut out = Map::new();
        let base: Vec<&str> = match &self.kind {
            RuleKind::String => vec!["string"],
            RuleKind::Integer => vec!["integer"],
            RuleKind::Number => vec!["number"],
            RuleKind::Boolean => vec!["boolean"],
            RuleKind::DateStr | RuleKind::DatetimeStr => {
                out.insert("format".into(), self.kind.name().into());
                vec!["string"]
            }
            RuleKind::Record(schema) => {
                schema.write_object(&mut out, update, strict);
                // A bare id is also a valid many-to-one value.
                vec!["object", "integer"]
            }
            RuleKind::RecordList(schema) => {
                let mut item = Map::new();
                schema.write_object(&mut item, update, strict);
                item.insert("type".into(), json!(["object", "integer"]));
                out.insert("items".into(), Value::Object(item));
                vec!["array"]
            }
            RuleKind::Any => Vec::new(),
        };

        if !base.is_empty() {
            let mut types: Vec<Value> = base.into_iter().map(Value::from).collect();
            if !self.required {
                types.push("null".into());
                if self.accepts_false {
                    types.push("boolean".into());
                    out.insert("not".into(), json!({"const": true}));
                }
            }
            let ty = if types.len() == 1 {
                types.remove(0)
            } else {
                Value::Array(types)
            };
            out.insert("type".into(), ty);
        }
        if let Some(allowed) = &self.allowed {
            let mut values = allowed.clone();
            if !self.required {
                values.push(Value::Null);
            }
            out.insert("enum".into(), Value::Array(values));
        }
        if let Some(max) = self.max_length {
            out.insert("maxLength".into(), max.into());
        }
        if let Some(pattern) = &self.pattern {
            out.insert("pattern".into(), pattern.clone().into());
        }
        if self.readonly {
            out.insert("readOnly".into(), true.into());
        }
        Value::Object(out)
    }
}

/// Field rules of one model, keyed by field name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationSchema {
    pub fields: BTreeMap<String, FieldRule>,
}

impl ValidationSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// The schema used when only a relation's identifier is wanted.
    pub fn id_only() -> Self {
        let mut schema = Self::new();
        schema
            .fields
            .insert("id".into(), FieldRule::new(RuleKind::Integer));
        schema
    }

    pub fn get(&self, field: &str) -> Option<&FieldRule> {
        self.fields.get(field)
    }

    /// Compile to JSON Schema.
    ///
    /// `update` drops every `required` list. `strict` closes objects with
    /// `additionalProperties: false`.
    pub fn to_json_schema(&self, update: bool, strict: bool) -> Value {
        let mut out = Map::new();
        out.insert("type".into(), "object".into());
        self.write_object(&mut out, update, strict);
        Value::Object(out)
    }

    fn write_object(&self, out: &mut Map<String, Value>, update: bool, strict: bool) {
        let properties: Map<String, Value> = self
            .fields
            .iter()
            .map(|(name, rule)| (name.clone(), rule.to_json_schema(update, strict)))
            .collect();
        out.insert("properties".into(), Value::Object(properties));

        if !update {
            let required: Vec<Value> = self
                .fields
                .iter()
                .filter(|(_, rule)| rule.required)
                .map(|(name, _)| Value::from(name.clone()))
                .collect();
            if !required.is_empty() {
                out.insert("required".into(), Value::Array(required));
            }
        }
        if strict {
            out.insert("additionalProperties".into(), false.into());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(kind: RuleKind) -> FieldRule {
        FieldRule::new(kind)
    }

    #[test]
    fn optional_scalars_accept_null() {
        let mut schema = ValidationSchema::new();
        schema.fields.insert("name".into(), rule(RuleKind::String));
        let json = schema.to_json_schema(false, false);
        assert_eq!(json["properties"]["name"]["type"], json!(["string", "null"]));
        assert!(json.get("required").is_none());
    }

    #[test]
    fn required_fields_listed_unless_update() {
        let mut name = rule(RuleKind::String);
        name.required = true;
        let mut schema = ValidationSchema::new();
        schema.fields.insert("name".into(), name);

        let create = schema.to_json_schema(false, false);
        assert_eq!(create["required"], json!(["name"]));
        assert_eq!(create["properties"]["name"]["type"], json!("string"));

        let update = schema.to_json_schema(true, false);
        assert!(update.get("required").is_none());
    }

    #[test]
    fn constraints_compile() {
        let mut state = rule(RuleKind::String);
        state.allowed = Some(vec![json!("draft"), json!("done")]);
        let mut code = rule(RuleKind::String);
        code.max_length = Some(8);
        let mut date = rule(RuleKind::DateStr);
        date.readonly = true;
        let mut schema = ValidationSchema::new();
        schema.fields.insert("state".into(), state);
        schema.fields.insert("code".into(), code);
        schema.fields.insert("date".into(), date);

        let json = schema.to_json_schema(false, true);
        assert_eq!(
            json["properties"]["state"]["enum"],
            json!(["draft", "done", null])
        );
        assert_eq!(json["properties"]["code"]["maxLength"], json!(8));
        assert_eq!(json["properties"]["date"]["format"], json!("date_str"));
        assert_eq!(json["properties"]["date"]["readOnly"], json!(true));
        assert_eq!(json["additionalProperties"], json!(false));
    }

    #[test]
    fn relations_nest() {
        let mut schema = ValidationSchema::new();
        schema.fields.insert(
            "partner_id".into(),
            rule(RuleKind::Record(ValidationSchema::id_only())),
        );
        schema.fields.insert(
            "line_ids".into(),
            rule(RuleKind::RecordList(ValidationSchema::id_only())),
        );
        let json = schema.to_json_schema(false, false);
        assert_eq!(
            json["properties"]["partner_id"]["properties"]["id"]["type"],
            json!(["integer", "null"])
        );
        assert_eq!(json["properties"]["line_ids"]["type"], json!(["array", "null"]));
        assert_eq!(
            json["properties"]["line_ids"]["items"]["type"],
            json!(["object", "integer"])
        );
    }

    #[test]
    fn optional_relations_accept_false() {
        let mut tags = rule(RuleKind::RecordList(ValidationSchema::id_only()));
        tags.accepts_false = true;
        let mut parent = rule(RuleKind::Integer);
        parent.accepts_false = true;
        let mut partner = rule(RuleKind::Integer);
        partner.accepts_false = true;
        partner.required = true;
        let mut schema = ValidationSchema::new();
        schema.fields.insert("tag_ids".into(), tags);
        schema.fields.insert("parent_id".into(), parent);
        schema.fields.insert("partner_id".into(), partner);

        let json = schema.to_json_schema(false, false);
        assert_eq!(
            json["properties"]["tag_ids"]["type"],
            json!(["array", "null", "boolean"])
        );
        assert_eq!(json["properties"]["parent_id"]["not"], json!({"const": true}));
        assert_eq!(json["properties"]["partner_id"]["type"], json!("integer"));
        assert!(json["properties"]["partner_id"].get("not").is_none());
    }

    #[test]
    fn record_rule_also_takes_bare_ids() {
        let mut schema = ValidationSchema::new();
        schema.fields.insert(
            "partner_id".into(),
            rule(RuleKind::Record(ValidationSchema::id_only())),
        );
        let json = schema.to_json_schema(false, false);
        assert_eq!(
            json["properties"]["partner_id"]["type"],
            json!(["object", "integer", "null"])
        );
    }

    #[test]
    fn any_has_no_type() {
        let mut schema = ValidationSchema::new();
        schema.fields.insert("blob".into(), rule(RuleKind::Any));
        let json = schema.to_json_schema(false, false);
        assert_eq!(json["properties"]["blob"], json!({}));
    }
}
