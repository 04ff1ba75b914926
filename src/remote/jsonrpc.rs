//! JSON-RPC transport to the remote object service.
//!
//! Authenticates through `common.login` and routes every model call through
//! `object.execute_kw`. Requires the `remote` feature (enabled by default).

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::{json, Map, Value};

use crate::error::RemoteError;
use crate::filter::Domain;
use crate::remote::{Connector, Credentials, RecordHandle, RemoteClient, SearchOptions};
use crate::types::{ModelMetadata, RecordId};

/// Default timeout for HTTP requests (10 seconds).
pub const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Attributes requested from `fields_get`.
const FIELD_ATTRIBUTES: &[&str] = &[
    "type", "required", "readonly", "relation", "selection", "size", "states",
];

/// Authenticated JSON-RPC client bound to one database and user.
#[derive(Debug)]
pub struct JsonRpcClient {
    http: reqwest::blocking::Client,
    url: String,
    database: String,
    uid: i64,
    password: String,
    next_id: AtomicU64,
}

impl JsonRpcClient {
    /// Log in and return a client carrying the resulting user id.
    ///
    /// # Errors
    ///
    /// Returns `RemoteError::AuthenticationFailed` if the server refuses the
    /// credentials, or a transport/fault error if the call itself fails.
    pub fn login(
        http: reqwest::blocking::Client,
        credentials: &Credentials,
    ) -> Result<Self, RemoteError> {
        let mut client = Self {
            http,
            url: endpoint(&credentials.server),
            database: credentials.database().to_string(),
            uid: 0,
            password: credentials.password().to_string(),
            next_id: AtomicU64::new(1),
        };
        let reply = client.call(
            "common",
            "login",
            vec![
                credentials.database().into(),
                credentials.user().into(),
                credentials.password().into(),
            ],
        )?;
        client.uid = reply
            .as_i64()
            .ok_or_else(|| RemoteError::AuthenticationFailed {
                user: credentials.user().to_string(),
                database: credentials.database().to_string(),
            })?;
        tracing::debug!(url = %client.url, uid = client.uid, "logged in");
        Ok(client)
    }

    pub fn uid(&self) -> i64 {
        self.uid
    }

    fn call(&self, service: &str, method: &str, args: Vec<Value>) -> Result<Value, RemoteError> {
        let request = json!({
            "jsonrpc": "2.0",
            "method": "call",
            "params": { "service": service, "method": method, "args": args },
            "id": self.next_id.fetch_add(1, Ordering::Relaxed),
        });

        let transport = |source| RemoteError::Transport {
            url: self.url.clone(),
            source,
        };
        let reply: Value = self
            .http
            .post(&self.url)
            .json(&request)
            .send()
            .map_err(transport)?
            .error_for_status()
            .map_err(transport)?
            .json()
            .map_err(transport)?;

        if let Some(error) = reply.get("error") {
            return Err(fault_from_error(error));
        }
        reply
            .get("result")
            .cloned()
            .ok_or_else(|| RemoteError::protocol("reply has neither result nor error"))
    }

    fn execute_kw(
        &self,
        model: &str,
        method: &str,
        args: Vec<Value>,
        kwargs: Map<String, Value>,
    ) -> Result<Value, RemoteError> {
        self.call(
            "object",
            "execute_kw",
            vec![
                self.database.clone().into(),
                self.uid.into(),
                self.password.clone().into(),
                model.into(),
                method.into(),
                Value::Array(args),
                Value::Object(kwargs),
            ],
        )
    }
}

fn endpoint(server: &str) -> String {
    format!("{}/jsonrpc", server.trim_end_matches('/'))
}

fn fault_from_error(error: &Value) -> RemoteError {
    let code = error.get("code").and_then(Value::as_i64).unwrap_or_default();
    let message = error
        .pointer("/data/message")
        .or_else(|| error.get("message"))
        .and_then(Value::as_str)
        .unwrap_or("remote error")
        .to_string();
    RemoteError::Fault { code, message }
}

fn decode<T: DeserializeOwned>(value: Value, what: &str) -> Result<T, RemoteError> {
    serde_json::from_value(value)
        .map_err(|e| RemoteError::protocol(format!("cannot decode {what} reply: {e}")))
}

fn kwargs(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

impl RemoteClient for JsonRpcClient {
    fn fields_get(&self, model: &str) -> Result<ModelMetadata, RemoteError> {
        let reply = self.execute_kw(
            model,
            "fields_get",
            Vec::new(),
            kwargs(json!({ "attributes": FIELD_ATTRIBUTES })),
        )?;
        decode(reply, "fields_get")
    }

    fn default_get(
        &self,
        model: &str,
        fields: &[String],
    ) -> Result<Map<String, Value>, RemoteError> {
        let reply = self.execute_kw(model, "default_get", vec![json!(fields)], Map::new())?;
        decode(reply, "default_get")
    }

    fn search(
        &self,
        model: &str,
        domain: &Domain,
        options: &SearchOptions,
    ) -> Result<Vec<RecordId>, RemoteError> {
        let mut kw = Map::new();
        if let Some(limit) = options.limit {
            kw.insert("limit".into(), limit.into());
        }
        kw.insert("offset".into(), options.offset.into());
        if !options.active_test {
            kw.insert("context".into(), json!({ "active_test": false }));
        }
        let reply = self.execute_kw(model, "search", vec![domain.to_value()], kw)?;
        decode(reply, "search")
    }

    fn search_count(&self, model: &str, domain: &Domain) -> Result<u64, RemoteError> {
        let reply = self.execute_kw(model, "search_count", vec![domain.to_value()], Map::new())?;
        decode(reply, "search_count")
    }

    fn read(
        &self,
        model: &str,
        ids: &[RecordId],
        fields: &[String],
    ) -> Result<Vec<Map<String, Value>>, RemoteError> {
        let reply = self.execute_kw(
            model,
            "read",
            vec![json!(ids)],
            kwargs(json!({ "fields": fields })),
        )?;
        decode(reply, "read")
    }

    fn create(&self, model: &str, values: &Map<String, Value>) -> Result<RecordId, RemoteError> {
        let reply = self.execute_kw(
            model,
            "create",
            vec![Value::Object(values.clone())],
            Map::new(),
        )?;
        decode(reply, "create")
    }

    fn write(
        &self,
        model: &str,
        ids: &[RecordId],
        values: &Map<String, Value>,
    ) -> Result<(), RemoteError> {
        self.execute_kw(
            model,
            "write",
            vec![json!(ids), Value::Object(values.clone())],
            Map::new(),
        )?;
        Ok(())
    }

    fn unlink(&self, model: &str, ids: &[RecordId]) -> Result<(), RemoteError> {
        self.execute_kw(model, "unlink", vec![json!(ids)], Map::new())?;
        Ok(())
    }

    fn execute(&self, model: &str, method: &str, args: Vec<Value>) -> Result<Value, RemoteError> {
        self.execute_kw(model, method, args, Map::new())
    }

    fn browse(&self, model: &str, id: RecordId) -> RecordHandle<'_> {
        RecordHandle::new(self, model, id)
    }
}

/// Opens [`JsonRpcClient`]s with a shared HTTP timeout.
#[derive(Debug, Clone)]
pub struct JsonRpcConnector {
    timeout: Duration,
}

impl JsonRpcConnector {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for JsonRpcConnector {
    fn default() -> Self {
        Self::new(HTTP_TIMEOUT)
    }
}

impl Connector for JsonRpcConnector {
    type Client = JsonRpcClient;

    fn connect(&self, credentials: &Credentials) -> Result<JsonRpcClient, RemoteError> {
        let http = reqwest::blocking::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|source| RemoteError::Transport {
                url: credentials.server.clone(),
                source,
            })?;
        JsonRpcClient::login(http, credentials)
    }
}
