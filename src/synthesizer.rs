//! Validation schema synthesis from remote metadata.
//!
//! Given a model, the requested field tree and the in-flight document, build
//! the [`ValidationSchema`] the document must satisfy. The result depends only
//! on what the [`MetadataSource`] returns and on the inputs.

use std::sync::Arc;

use serde_json::{Map, Value};

use crate::error::BridgeError;
use crate::paths::{FieldNode, FieldTree};
use crate::schema::{FieldRule, RuleKind, ValidationSchema};
use crate::types::{FieldDef, FieldType, ModelMetadata};

/// Where field definitions and default values come from.
pub trait MetadataSource {
    fn fields(&self, model: &str) -> Result<Arc<ModelMetadata>, BridgeError>;

    fn defaults(&self, model: &str, fields: &[String]) -> Result<Map<String, Value>, BridgeError>;
}

/// Build the validation schema for `document` on `model`.
///
/// `requested` limits the schema to those fields (all fields when `None`);
/// relation sub-trees drive recursion into related models. On create (no
/// `id` requested), fields that are required without a default are always
/// included so that their absence is reported.
///
/// # Errors
///
/// Propagates metadata and default lookups failures.
pub fn synthesize<S>(
    source: &S,
    model: &str,
    requested: Option<&FieldTree>,
    document: &Value,
) -> Result<ValidationSchema, BridgeError>
where
    S: MetadataSource + ?Sized,
{
    let metadata = source.fields(model)?;
    let is_create = match requested {
        Some(tree) => !tree.contains("id"),
        None => document.get("id").is_none(),
    };

    let mut names: Vec<String> = match requested {
        Some(tree) => tree
            .fields()
            .into_iter()
            .filter(|name| name == "id" || metadata.contains_key(name))
            .collect(),
        None => metadata.keys().cloned().collect(),
    };
    if !names.iter().any(|n| n == "id") && requested.is_none() {
        names.push("id".to_string());
    }
    if is_create {
        for (name, def) in metadata.iter() {
            if def.required && !names.contains(name) {
                names.push(name.clone());
            }
        }
    }

    let defaults = if is_create {
        let wanted = default_candidates(&metadata, &names, document);
        if wanted.is_empty() {
            Map::new()
        } else {
            source.defaults(model, &wanted)?
        }
    } else {
        Map::new()
    };
    let state = document
        .get("state")
        .and_then(Value::as_str)
        .or_else(|| defaults.get("state").and_then(Value::as_str));

    let mut schema = ValidationSchema::new();
    for name in names {
        let rule = match metadata.get(&name) {
            Some(def) => {
                let sub = requested.and_then(|tree| tree.get(&name));
                let mut rule = field_rule(source, def, sub, document.get(&name))?;
                let (mut required, mut readonly) = (def.required, def.readonly);
                if let Some(overrides) = state.and_then(|s| def.states.as_ref()?.get(s)) {
                    for (attribute, value) in overrides {
                        match (attribute.as_str(), value.as_bool()) {
                            ("required", Some(flag)) => required = flag,
                            ("readonly", Some(flag)) => readonly = flag,
                            _ => {}
                        }
                    }
                }
                let is_id = name == "id";
                rule.required = required && is_create && !is_id && !defaults.contains_key(&name);
                rule.readonly = readonly && !is_id;
                rule
            }
            // Metadata without an `id` entry still accepts one.
            None => FieldRule::new(RuleKind::Integer),
        };
        schema.fields.insert(name, rule);
    }
    Ok(schema)
}

/// Fields whose defaults affect the schema: required ones and the state.
fn default_candidates(metadata: &ModelMetadata, names: &[String], document: &Value) -> Vec<String> {
    let mut wanted: Vec<String> = names
        .iter()
        .filter(|name| {
            metadata.get(*name).is_some_and(|def| {
                def.required
                    || def.states.as_ref().is_some_and(|states| {
                        states
                            .values()
                            .flatten()
                            .any(|(attr, value)| attr == "required" && value == &Value::Bool(true))
                    })
            })
        })
        .cloned()
        .collect();
    let uses_states = names
        .iter()
        .filter_map(|name| metadata.get(name))
        .any(|def| def.states.is_some());
    if uses_states
        && metadata.contains_key("state")
        && document.get("state").is_none()
        && !wanted.iter().any(|n| n == "state")
    {
        wanted.push("state".to_string());
    }
    wanted
}

fn field_rule<S>(
    source: &S,
    def: &FieldDef,
    requested: Option<&FieldNode>,
    value: Option<&Value>,
) -> Result<FieldRule, BridgeError>
where
    S: MetadataSource + ?Sized,
{
    let rule = match def.field_type {
        FieldType::Char | FieldType::Text | FieldType::Html | FieldType::Binary => {
            let mut rule = FieldRule::new(RuleKind::String);
            if def.field_type == FieldType::Char {
                rule.max_length = def.size.filter(|size| *size > 0);
            }
            rule
        }
        FieldType::Selection => {
            let allowed = def.selection_values();
            let all_strings = allowed
                .as_ref()
                .map_or(true, |values| values.iter().all(Value::is_string));
            let mut rule = FieldRule::new(if all_strings {
                RuleKind::String
            } else {
                RuleKind::Any
            });
            rule.allowed = allowed;
            rule
        }
        FieldType::Reference => {
            let mut rule = FieldRule::new(RuleKind::String);
            rule.pattern = reference_pattern(def);
            rule
        }
        FieldType::Date => FieldRule::new(RuleKind::DateStr),
        FieldType::Datetime => FieldRule::new(RuleKind::DatetimeStr),
        FieldType::Integer => FieldRule::new(RuleKind::Integer),
        FieldType::Float | FieldType::Monetary => FieldRule::new(RuleKind::Number),
        FieldType::Boolean => FieldRule::new(RuleKind::Boolean),
        FieldType::Many2one => {
            let mut rule = if value.is_some_and(Value::is_object) {
                let nested = relation_schema(source, def, requested, value)?;
                FieldRule::new(RuleKind::Record(nested))
            } else {
                FieldRule::new(RuleKind::Integer)
            };
            rule.accepts_false = true;
            rule
        }
        FieldType::One2many | FieldType::Many2many => {
            let elements = merged_elements(value);
            let nested = relation_schema(source, def, requested, Some(&elements))?;
            let mut rule = FieldRule::new(RuleKind::RecordList(nested));
            rule.accepts_false = true;
            rule
        }
        FieldType::Other => FieldRule::new(RuleKind::Any),
    };
    Ok(rule)
}

fn relation_schema<S>(
    source: &S,
    def: &FieldDef,
    requested: Option<&FieldNode>,
    value: Option<&Value>,
) -> Result<ValidationSchema, BridgeError>
where
    S: MetadataSource + ?Sized,
{
    match (requested, def.relation.as_deref()) {
        (Some(FieldNode::Branch(tree)), Some(relation)) => synthesize(
            source,
            relation,
            Some(tree),
            value.unwrap_or(&Value::Null),
        ),
        _ => Ok(ValidationSchema::id_only()),
    }
}

/// One object holding the fields of every mapping in a relation list.
///
/// A field any element sends as a mapping keeps that mapping, so nested
/// many-to-one values get a record rule.
fn merged_elements(value: Option<&Value>) -> Value {
    let mut merged = Map::new();
    for item in value.and_then(Value::as_array).into_iter().flatten() {
        let Value::Object(fields) = item else {
            continue;
        };
        for (name, field) in fields {
            if !merged.get(name).is_some_and(Value::is_object) {
                merged.insert(name.clone(), field.clone());
            }
        }
    }
    Value::Object(merged)
}

/// `^(model\.a|model\.b),\d+$` over the allowed target models.
fn reference_pattern(def: &FieldDef) -> Option<String> {
    let models: Vec<String> = def
        .selection_values()?
        .iter()
        .filter_map(Value::as_str)
        .map(regex::escape)
        .collect();
    if models.is_empty() {
        return None;
    }
    Some(format!(r"^({}),\d+$", models.join("|")))
}
