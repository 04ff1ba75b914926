//! In-process remote service.
//!
//! Holds models and records in memory, applies relation link commands, and
//! records every call so callers can assert on the exact remote traffic.
//! Clones share state.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::{Map, Value};

use crate::error::RemoteError;
use crate::filter::Domain;
use crate::remote::{Connector, Credentials, RecordHandle, RemoteClient, SearchOptions};
use crate::types::{is_empty_marker, FieldType, ModelMetadata, RecordId};

/// One call received by a [`MemoryRemote`].
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteCall {
    FieldsGet { model: String },
    DefaultGet { model: String, fields: Vec<String> },
    Search { model: String, domain: Value },
    SearchCount { model: String, domain: Value },
    Read { model: String, ids: Vec<RecordId>, fields: Vec<String> },
    Create { model: String, values: Map<String, Value> },
    Write { model: String, ids: Vec<RecordId>, values: Map<String, Value> },
    Unlink { model: String, ids: Vec<RecordId> },
    Execute { model: String, method: String, args: Vec<Value> },
}

impl RemoteCall {
    pub fn method(&self) -> &'static str {
        match self {
            RemoteCall::FieldsGet { .. } => "fields_get",
            RemoteCall::DefaultGet { .. } => "default_get",
            RemoteCall::Search { .. } => "search",
            RemoteCall::SearchCount { .. } => "search_count",
            RemoteCall::Read { .. } => "read",
            RemoteCall::Create { .. } => "create",
            RemoteCall::Write { .. } => "write",
            RemoteCall::Unlink { .. } => "unlink",
            RemoteCall::Execute { .. } => "execute",
        }
    }
}

#[derive(Debug, Default)]
struct MemoryModel {
    fields: ModelMetadata,
    defaults: Map<String, Value>,
    records: BTreeMap<RecordId, Map<String, Value>>,
    methods: HashMap<String, Value>,
    next_id: RecordId,
}

#[derive(Debug, Default)]
struct State {
    models: BTreeMap<String, MemoryModel>,
    calls: Vec<RemoteCall>,
    failing: HashSet<(String, String)>,
}

/// Remote object service living in process memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryRemote {
    state: Arc<Mutex<State>>,
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Define (or redefine) a model's fields.
    pub fn with_model(self, model: &str, fields: ModelMetadata) -> Self {
        self.define_model(model, fields);
        self
    }

    pub fn define_model(&self, model: &str, fields: ModelMetadata) {
        let mut state = self.lock();
        let entry = state.models.entry(model.to_string()).or_default();
        entry.fields = fields;
        if entry.next_id == 0 {
            entry.next_id = 1;
        }
    }

    pub fn set_defaults(&self, model: &str, defaults: Value) {
        if let (Some(entry), Value::Object(map)) = (self.lock().models.get_mut(model), defaults) {
            entry.defaults = map;
        }
    }

    /// Store a record verbatim under `id`.
    pub fn insert_record(&self, model: &str, id: RecordId, values: Value) {
        let mut state = self.lock();
        if let (Some(entry), Value::Object(mut map)) = (state.models.get_mut(model), values) {
            map.insert("id".into(), id.into());
            entry.records.insert(id, map);
            entry.next_id = entry.next_id.max(id + 1);
        }
    }

    /// Stored values of a record, relations as raw ids.
    pub fn record(&self, model: &str, id: RecordId) -> Option<Map<String, Value>> {
        self.lock()
            .models
            .get(model)
            .and_then(|m| m.records.get(&id))
            .cloned()
    }

    pub fn record_count(&self, model: &str) -> usize {
        self.lock()
            .models
            .get(model)
            .map(|m| m.records.len())
            .unwrap_or(0)
    }

    /// Canned result for `execute(model, method, ..)`.
    pub fn set_method_result(&self, model: &str, method: &str, result: Value) {
        if let Some(entry) = self.lock().models.get_mut(model) {
            entry.methods.insert(method.to_string(), result);
        }
    }

    /// Make every `method` call on `model` fail with a remote fault.
    pub fn fail_on(&self, model: &str, method: &str) {
        self.lock()
            .failing
            .insert((model.to_string(), method.to_string()));
    }

    pub fn calls(&self) -> Vec<RemoteCall> {
        self.lock().calls.clone()
    }

    /// Number of recorded calls with the given method name.
    pub fn call_count(&self, method: &str) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|c| c.method() == method)
            .count()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    fn begin(&self, call: RemoteCall) -> Result<MutexGuard<'_, State>, RemoteError> {
        let mut state = self.lock();
        let model = call_model(&call).to_string();
        let method = call.method();
        state.calls.push(call);
        if state.failing.contains(&(model.clone(), method.to_string())) {
            return Err(RemoteError::Fault {
                code: 1,
                message: format!("{method} failed on {model}"),
            });
        }
        if !state.models.contains_key(&model) {
            return Err(RemoteError::Fault {
                code: 2,
                message: format!("unknown model {model}"),
            });
        }
        Ok(state)
    }
}

fn call_model(call: &RemoteCall) -> &str {
    match call {
        RemoteCall::FieldsGet { model }
        | RemoteCall::DefaultGet { model, .. }
        | RemoteCall::Search { model, .. }
        | RemoteCall::SearchCount { model, .. }
        | RemoteCall::Read { model, .. }
        | RemoteCall::Create { model, .. }
        | RemoteCall::Write { model, .. }
        | RemoteCall::Unlink { model, .. }
        | RemoteCall::Execute { model, .. } => model,
    }
}

fn model<'s>(state: &'s State, name: &str) -> &'s MemoryModel {
    // `begin` already checked the model exists.
    &state.models[name]
}

fn fault(message: String) -> RemoteError {
    RemoteError::Fault { code: 3, message }
}

fn matches_domain(record: &Map<String, Value>, domain: &Domain) -> Result<bool, RemoteError> {
    for term in domain.terms() {
        match term {
            Value::String(op) if op == "&" => continue,
            Value::String(op) => return Err(fault(format!("operator {op} not supported"))),
            Value::Array(cond) => {
                let field = cond[0].as_str().unwrap_or_default();
                let stored = record.get(field).cloned().unwrap_or(Value::Bool(false));
                let ok = match cond[1].as_str() {
                    Some("=") => stored == cond[2],
                    Some("!=") => stored != cond[2],
                    Some("in") => cond[2]
                        .as_array()
                        .map(|values| values.contains(&stored))
                        .unwrap_or(false),
                    other => return Err(fault(format!("operator {other:?} not supported"))),
                };
                if !ok {
                    return Ok(false);
                }
            }
            _ => return Err(fault("invalid domain term".into())),
        }
    }
    Ok(true)
}

fn search_ids(
    state: &State,
    name: &str,
    domain: &Domain,
    active_test: bool,
) -> Result<Vec<RecordId>, RemoteError> {
    let entry = model(state, name);
    let check_active = active_test && entry.fields.contains_key("active");
    let mut ids = Vec::new();
    for (id, record) in &entry.records {
        if check_active && record.get("active") == Some(&Value::Bool(false)) {
            continue;
        }
        if matches_domain(record, domain)? {
            ids.push(*id);
        }
    }
    Ok(ids)
}

fn apply_values(
    entry: &mut Map<String, Value>,
    fields: &ModelMetadata,
    values: &Map<String, Value>,
) -> Result<(), RemoteError> {
    for (name, value) in values {
        let def = fields
            .get(name)
            .ok_or_else(|| fault(format!("invalid field {name}")))?;
        if def.field_type.is_multi() {
            let mut ids: Vec<Value> = entry
                .get(name)
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            for command in value.as_array().into_iter().flatten() {
                match command.as_array().map(Vec::as_slice) {
                    Some([code, id]) if code == 4 => {
                        if !ids.contains(id) {
                            ids.push(id.clone());
                        }
                    }
                    Some([code]) if code == 5 => ids.clear(),
                    _ => return Err(fault(format!("unsupported command {command} on {name}"))),
                }
            }
            entry.insert(name.clone(), Value::Array(ids));
        } else {
            entry.insert(name.clone(), value.clone());
        }
    }
    Ok(())
}

fn display_name(state: &State, relation: Option<&str>, id: &Value) -> Value {
    relation
        .and_then(|r| state.models.get(r))
        .zip(id.as_i64())
        .and_then(|(m, id)| m.records.get(&id))
        .and_then(|r| r.get("name"))
        .cloned()
        .unwrap_or_else(|| Value::String(String::new()))
}

impl RemoteClient for MemoryRemote {
    fn fields_get(&self, model_name: &str) -> Result<ModelMetadata, RemoteError> {
        let state = self.begin(RemoteCall::FieldsGet {
            model: model_name.into(),
        })?;
        Ok(model(&state, model_name).fields.clone())
    }

    fn default_get(
        &self,
        model_name: &str,
        fields: &[String],
    ) -> Result<Map<String, Value>, RemoteError> {
        let state = self.begin(RemoteCall::DefaultGet {
            model: model_name.into(),
            fields: fields.to_vec(),
        })?;
        let entry = model(&state, model_name);
        Ok(entry
            .defaults
            .iter()
            .filter(|(k, _)| fields.contains(k))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    fn search(
        &self,
        model_name: &str,
        domain: &Domain,
        options: &SearchOptions,
    ) -> Result<Vec<RecordId>, RemoteError> {
        let state = self.begin(RemoteCall::Search {
            model: model_name.into(),
            domain: domain.to_value(),
        })?;
        let ids = search_ids(&state, model_name, domain, options.active_test)?;
        let limit = options.limit.map(|l| l as usize).unwrap_or(usize::MAX);
        Ok(ids
            .into_iter()
            .skip(options.offset as usize)
            .take(limit)
            .collect())
    }

    fn search_count(&self, model_name: &str, domain: &Domain) -> Result<u64, RemoteError> {
        let state = self.begin(RemoteCall::SearchCount {
            model: model_name.into(),
            domain: domain.to_value(),
        })?;
        Ok(search_ids(&state, model_name, domain, true)?.len() as u64)
    }

    fn read(
        &self,
        model_name: &str,
        ids: &[RecordId],
        fields: &[String],
    ) -> Result<Vec<Map<String, Value>>, RemoteError> {
        let state = self.begin(RemoteCall::Read {
            model: model_name.into(),
            ids: ids.to_vec(),
            fields: fields.to_vec(),
        })?;
        let entry = model(&state, model_name);
        let names: Vec<String> = if fields.is_empty() {
            entry.fields.keys().cloned().collect()
        } else {
            fields.to_vec()
        };
        let mut out = Vec::new();
        for id in ids {
            let Some(stored) = entry.records.get(id) else {
                continue;
            };
            let mut record = Map::new();
            record.insert("id".into(), (*id).into());
            for name in &names {
                if name == "id" {
                    continue;
                }
                let Some(def) = entry.fields.get(name) else {
                    return Err(fault(format!("invalid field {name} on {model_name}")));
                };
                let raw = stored.get(name).cloned().unwrap_or(Value::Bool(false));
                let value = match def.field_type {
                    FieldType::Many2one if !is_empty_marker(&raw) => Value::Array(vec![
                        raw.clone(),
                        display_name(&state, def.relation.as_deref(), &raw),
                    ]),
                    FieldType::One2many | FieldType::Many2many if is_empty_marker(&raw) => {
                        Value::Array(Vec::new())
                    }
                    _ => raw,
                };
                record.insert(name.clone(), value);
            }
            out.push(record);
        }
        Ok(out)
    }

    fn create(&self, model_name: &str, values: &Map<String, Value>) -> Result<RecordId, RemoteError> {
        let mut state = self.begin(RemoteCall::Create {
            model: model_name.into(),
            values: values.clone(),
        })?;
        let entry = state
            .models
            .get_mut(model_name)
            .ok_or_else(|| fault(format!("unknown model {model_name}")))?;
        let id = entry.next_id.max(1);
        let mut record = entry.defaults.clone();
        apply_values(&mut record, &entry.fields, values)?;
        record.insert("id".into(), id.into());
        entry.records.insert(id, record);
        entry.next_id = id + 1;
        Ok(id)
    }

    fn write(
        &self,
        model_name: &str,
        ids: &[RecordId],
        values: &Map<String, Value>,
    ) -> Result<(), RemoteError> {
        let mut state = self.begin(RemoteCall::Write {
            model: model_name.into(),
            ids: ids.to_vec(),
            values: values.clone(),
        })?;
        let entry = state
            .models
            .get_mut(model_name)
            .ok_or_else(|| fault(format!("unknown model {model_name}")))?;
        for id in ids {
            let record = entry
                .records
                .get_mut(id)
                .ok_or_else(|| fault(format!("{model_name} record {id} does not exist")))?;
            apply_values(record, &entry.fields, values)?;
        }
        Ok(())
    }

    fn unlink(&self, model_name: &str, ids: &[RecordId]) -> Result<(), RemoteError> {
        let mut state = self.begin(RemoteCall::Unlink {
            model: model_name.into(),
            ids: ids.to_vec(),
        })?;
        let entry = state
            .models
            .get_mut(model_name)
            .ok_or_else(|| fault(format!("unknown model {model_name}")))?;
        for id in ids {
            entry
                .records
                .remove(id)
                .ok_or_else(|| fault(format!("{model_name} record {id} does not exist")))?;
        }
        Ok(())
    }

    fn execute(&self, model_name: &str, method: &str, args: Vec<Value>) -> Result<Value, RemoteError> {
        let state = self.begin(RemoteCall::Execute {
            model: model_name.into(),
            method: method.into(),
            args,
        })?;
        model(&state, model_name)
            .methods
            .get(method)
            .cloned()
            .ok_or_else(|| fault(format!("{model_name} has no method {method}")))
    }

    fn browse(&self, model_name: &str, id: RecordId) -> RecordHandle<'_> {
        RecordHandle::new(self, model_name, id)
    }
}

/// Connector handing out clones of one shared [`MemoryRemote`].
#[derive(Debug, Default)]
pub struct MemoryConnector {
    remote: MemoryRemote,
    reject_user: Option<String>,
    opened: AtomicUsize,
}

impl MemoryConnector {
    pub fn new(remote: MemoryRemote) -> Self {
        Self {
            remote,
            reject_user: None,
            opened: AtomicUsize::new(0),
        }
    }

    /// A connector refusing to authenticate `user`.
    pub fn rejecting(user: &str) -> Self {
        Self {
            reject_user: Some(user.to_string()),
            ..Self::default()
        }
    }

    /// Number of clients opened so far.
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }
}

impl Connector for MemoryConnector {
    type Client = MemoryRemote;

    fn connect(&self, credentials: &Credentials) -> Result<MemoryRemote, RemoteError> {
        if self.reject_user.as_deref() == Some(credentials.user()) {
            return Err(RemoteError::AuthenticationFailed {
                user: credentials.user().to_string(),
                database: credentials.database().to_string(),
            });
        }
        self.opened.fetch_add(1, Ordering::SeqCst);
        // Clones share the same tables.
        Ok(self.remote.clone())
    }
}
