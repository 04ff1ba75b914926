//! Mapping documents onto remote records and back.
//!
//! [`upsert`] walks a [`Document`] and turns it into create/write calls,
//! recursing into inline related records first. [`normalize`] reshapes raw
//! `read` results into client documents, following the requested field tree
//! into related models.
//!
//! Nested writes are issued one call per entity with no enclosing
//! transaction: a failure partway leaves earlier writes committed.

use std::collections::HashMap;

use serde_json::{Map, Value};

use crate::bridge::Session;
use crate::document::{Document, FieldValue, RelationItem};
use crate::error::{BridgeError, RemoteError};
use crate::paths::{FieldNode, FieldTree};
use crate::synthesizer::MetadataSource;
use crate::types::{is_empty_marker, FieldDef, FieldType, LinkCommand, RecordId};

/// Create or update `document` on `model`, returning the record id.
///
/// Without an `id` one `create` call is made. With an `id`, the touched
/// scalar fields are re-read and unchanged ones dropped; relation fields are
/// always written. Nothing left means no `write` call at all.
///
/// # Errors
///
/// Returns `NotFound` if an updated record does not exist, `InvalidDocument`
/// if a value cannot target its field, and propagates remote faults.
pub fn upsert(session: &Session<'_>, model: &str, document: &Document) -> Result<RecordId, BridgeError> {
    let metadata = session.fields(model)?;
    let mut values = Map::new();
    let mut relations = Vec::new();

    for (name, value) in &document.fields {
        let Some(def) = metadata.get(name) else {
            tracing::debug!(model, field = %name, "skipping unknown field");
            continue;
        };
        let resolved = match def.field_type {
            FieldType::Many2one => {
                relations.push(name.as_str());
                resolve_many2one(session, def, name, value)?
            }
            FieldType::One2many | FieldType::Many2many => {
                relations.push(name.as_str());
                resolve_many(session, def, name, value)?
            }
            field_type => resolve_scalar(field_type, name, value)?,
        };
        values.insert(name.clone(), resolved);
    }

    let Some(id) = document.id else {
        let id = session.client().create(model, &values)?;
        tracing::info!(model, id, "created");
        return Ok(id);
    };

    let scalars: Vec<String> = values
        .keys()
        .filter(|name| !relations.contains(&name.as_str()))
        .cloned()
        .collect();
    if !scalars.is_empty() {
        let current = session
            .client()
            .read(model, &[id], &scalars)?
            .into_iter()
            .next()
            .ok_or_else(|| BridgeError::NotFound {
                model: model.to_string(),
                id,
            })?;
        values.retain(|name, value| {
            relations.contains(&name.as_str()) || !same_value(value, current.get(name))
        });
    }

    if values.is_empty() {
        tracing::debug!(model, id, "no changes, skipping write");
    } else {
        session.client().write(model, &[id], &values)?;
        tracing::info!(model, id, fields = values.len(), "written");
    }
    Ok(id)
}

fn resolve_scalar(field_type: FieldType, name: &str, value: &FieldValue) -> Result<Value, BridgeError> {
    let FieldValue::Scalar(value) = value else {
        return Err(BridgeError::invalid_document(name, "expected a plain value"));
    };
    Ok(match (field_type, value) {
        (FieldType::Boolean, Value::Bool(flag)) => Value::from(u8::from(*flag)),
        (FieldType::Boolean, Value::Null) => Value::from(0),
        (_, Value::Null) => Value::Bool(false),
        (_, other) => other.clone(),
    })
}

fn resolve_many2one(
    session: &Session<'_>,
    def: &FieldDef,
    name: &str,
    value: &FieldValue,
) -> Result<Value, BridgeError> {
    match value {
        FieldValue::Scalar(Value::Null) => Ok(Value::Bool(false)),
        FieldValue::Scalar(other) => Ok(other.clone()),
        FieldValue::Reference(id) => Ok((*id).into()),
        FieldValue::InlineRecord(nested) => {
            let relation = relation_of(def, name)?;
            Ok(upsert(session, relation, nested)?.into())
        }
        FieldValue::RelationList(_) => Err(BridgeError::invalid_document(
            name,
            "expected a single record, got a list",
        )),
    }
}

fn resolve_many(
    session: &Session<'_>,
    def: &FieldDef,
    name: &str,
    value: &FieldValue,
) -> Result<Value, BridgeError> {
    let items = match value {
        FieldValue::Scalar(v) if is_empty_marker(v) => {
            return Ok(Value::Array(vec![LinkCommand::Clear.to_value()]))
        }
        FieldValue::RelationList(items) => items,
        _ => {
            return Err(BridgeError::invalid_document(
                name,
                "expected a list of records",
            ))
        }
    };
    if items.is_empty() {
        return Ok(Value::Array(vec![LinkCommand::Clear.to_value()]));
    }

    let mut commands = Vec::with_capacity(items.len());
    for item in items {
        let id = match item {
            RelationItem::LinkExisting(id) => *id,
            RelationItem::InlineRecord(nested) => upsert(session, relation_of(def, name)?, nested)?,
        };
        commands.push(LinkCommand::Link(id).to_value());
    }
    Ok(Value::Array(commands))
}

fn relation_of<'d>(def: &'d FieldDef, name: &str) -> Result<&'d str, BridgeError> {
    def.relation
        .as_deref()
        .ok_or_else(|| BridgeError::invalid_document(name, "relation field without target model"))
}

/// Equality between a resolved write value and what the remote stores.
fn same_value(resolved: &Value, stored: Option<&Value>) -> bool {
    let Some(stored) = stored else {
        return false;
    };
    match (resolved, stored) {
        (Value::Number(n), Value::Bool(flag)) => n.as_i64() == Some(i64::from(*flag)),
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        (a, b) => a == b,
    }
}

/// Reshape a raw `read` result of `model` for the client.
///
/// Empty markers become `[]` for multi-valued relations and `null` for other
/// non-boolean fields. Relations collapse to `{id}` unless `requested` has
/// sub-fields for them, in which case the related records are read through
/// the data cache and normalized in turn. The key set is preserved.
///
/// # Errors
///
/// Propagates metadata and read failures, and returns `Remote` if a relation
/// value is not in the remote's id format.
pub fn normalize(
    session: &Session<'_>,
    model: &str,
    raw: &Map<String, Value>,
    requested: Option<&FieldTree>,
) -> Result<Map<String, Value>, BridgeError> {
    let metadata = session.fields(model)?;
    let mut out = raw.clone();

    for (name, value) in raw {
        let Some(def) = metadata.get(name) else {
            continue;
        };
        let multi = def.field_type.is_multi();
        if is_empty_marker(value) {
            if multi {
                out.insert(name.clone(), Value::Array(Vec::new()));
            } else if def.field_type != FieldType::Boolean {
                out.insert(name.clone(), Value::Null);
            }
            continue;
        }
        let Some(relation) = def.relation.as_deref().filter(|_| def.field_type.is_relation()) else {
            continue;
        };
        let sub = requested
            .and_then(|tree| tree.get(name))
            .and_then(FieldNode::as_branch)
            .filter(|tree| !tree.is_empty());

        let shaped = if multi {
            let ids = id_list(value, name)?;
            Value::Array(related(session, relation, &ids, sub)?)
        } else {
            let id = many2one_id(value, name)?;
            related(session, relation, &[id], sub)?
                .into_iter()
                .next()
                .unwrap_or_else(|| id_only(id))
        };
        out.insert(name.clone(), shaped);
    }
    Ok(out)
}

fn related(
    session: &Session<'_>,
    relation: &str,
    ids: &[RecordId],
    sub: Option<&FieldTree>,
) -> Result<Vec<Value>, BridgeError> {
    let Some(tree) = sub else {
        return Ok(ids.iter().map(|id| id_only(*id)).collect());
    };
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let records = session.read_cached(relation, ids, &tree.fields())?;
    let by_id: HashMap<RecordId, &Map<String, Value>> = records
        .iter()
        .filter_map(|record| Some((record.get("id")?.as_i64()?, record)))
        .collect();
    let mut shaped = Vec::with_capacity(ids.len());
    for id in ids {
        if let Some(record) = by_id.get(id) {
            shaped.push(Value::Object(normalize(session, relation, record, Some(tree))?));
        }
    }
    Ok(shaped)
}

fn id_only(id: RecordId) -> Value {
    let mut map = Map::new();
    map.insert("id".into(), id.into());
    Value::Object(map)
}

/// `[id, display_name]` or a bare id.
fn many2one_id(value: &Value, field: &str) -> Result<RecordId, BridgeError> {
    let id = match value {
        Value::Array(pair) => pair.first().and_then(Value::as_i64),
        other => other.as_i64(),
    };
    id.ok_or_else(|| RemoteError::protocol(format!("unexpected value for {field}: {value}")).into())
}

fn id_list(value: &Value, field: &str) -> Result<Vec<RecordId>, BridgeError> {
    value
        .as_array()
        .and_then(|items| items.iter().map(Value::as_i64).collect::<Option<Vec<_>>>())
        .ok_or_else(|| RemoteError::protocol(format!("unexpected value for {field}: {value}")).into())
}
