//! Structured client documents.
//!
//! A JSON object is decoded into a [`Document`] whose values are tagged by
//! shape, so mapping onto remote records is structural recursion rather than
//! runtime type probing.

use serde_json::{Map, Value};

use crate::error::BridgeError;
use crate::types::{json_type_name, RecordId};

/// One record as sent by a client.
///
/// `id` present means "update or link this record"; absent means "create".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    pub id: Option<RecordId>,
    pub fields: Vec<(String, FieldValue)>,
}

/// Value of a single document field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// Plain value: string, number, boolean or null. Also a bare relation id.
    Scalar(Value),
    /// A mapping holding only `id`.
    Reference(RecordId),
    /// A nested record to create or update.
    InlineRecord(Document),
    /// Elements of a multi-valued relation.
    RelationList(Vec<RelationItem>),
}

/// Element of a multi-valued relation.
#[derive(Debug, Clone, PartialEq)]
pub enum RelationItem {
    LinkExisting(RecordId),
    InlineRecord(Document),
}

impl Document {
    /// Decode a JSON object.
    ///
    /// # Errors
    ///
    /// Returns `BridgeError::InvalidDocument` if the value is not an object,
    /// or an `id` is not an integer.
    pub fn from_value(value: &Value) -> Result<Self, BridgeError> {
        Self::decode(value, "")
    }

    fn decode(value: &Value, path: &str) -> Result<Self, BridgeError> {
        let Value::Object(map) = value else {
            return Err(BridgeError::invalid_document(
                display_path(path),
                format!("expected object, got {}", json_type_name(value)),
            ));
        };
        let mut document = Document::default();
        for (key, value) in map {
            let child_path = join(path, key);
            if key == "id" {
                document.id = Some(decode_id(value, &child_path)?);
                continue;
            }
            document
                .fields
                .push((key.clone(), decode_field(value, &child_path)?));
        }
        Ok(document)
    }

    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.fields
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, value)| value)
    }

    /// Encode back to JSON; `{id}` references come back as mappings.
    pub fn to_value(&self) -> Value {
        let mut map = Map::new();
        if let Some(id) = self.id {
            map.insert("id".into(), id.into());
        }
        for (name, value) in &self.fields {
            let encoded = match value {
                FieldValue::Scalar(v) => v.clone(),
                FieldValue::Reference(id) => reference(*id),
                FieldValue::InlineRecord(doc) => doc.to_value(),
                FieldValue::RelationList(items) => Value::Array(
                    items
                        .iter()
                        .map(|item| match item {
                            RelationItem::LinkExisting(id) => reference(*id),
                            RelationItem::InlineRecord(doc) => doc.to_value(),
                        })
                        .collect(),
                ),
            };
            map.insert(name.clone(), encoded);
        }
        Value::Object(map)
    }
}

fn reference(id: RecordId) -> Value {
    let mut map = Map::new();
    map.insert("id".into(), id.into());
    Value::Object(map)
}

fn decode_field(value: &Value, path: &str) -> Result<FieldValue, BridgeError> {
    match value {
        Value::Object(map) if map.len() == 1 && map.contains_key("id") => {
            Ok(FieldValue::Reference(decode_id(&map["id"], &join(path, "id"))?))
        }
        Value::Object(_) => Ok(FieldValue::InlineRecord(Document::decode(value, path)?)),
        Value::Array(items) => {
            let mut decoded = Vec::with_capacity(items.len());
            for (i, item) in items.iter().enumerate() {
                let item_path = join(path, &i.to_string());
                let element = match decode_field(item, &item_path)? {
                    FieldValue::Reference(id) => RelationItem::LinkExisting(id),
                    FieldValue::InlineRecord(doc) => RelationItem::InlineRecord(doc),
                    FieldValue::Scalar(v) => RelationItem::LinkExisting(decode_id(&v, &item_path)?),
                    FieldValue::RelationList(_) => {
                        return Err(BridgeError::invalid_document(
                            item_path,
                            "nested lists are not relation elements",
                        ))
                    }
                };
                decoded.push(element);
            }
            Ok(FieldValue::RelationList(decoded))
        }
        other => Ok(FieldValue::Scalar(other.clone())),
    }
}

fn decode_id(value: &Value, path: &str) -> Result<RecordId, BridgeError> {
    value.as_i64().ok_or_else(|| {
        BridgeError::invalid_document(
            path,
            format!("expected integer id, got {}", json_type_name(value)),
        )
    })
}

fn join(path: &str, key: &str) -> String {
    if path.is_empty() {
        key.to_string()
    } else {
        format!("{path}.{key}")
    }
}

fn display_path(path: &str) -> &str {
    if path.is_empty() {
        "document"
    } else {
        path
    }
}
