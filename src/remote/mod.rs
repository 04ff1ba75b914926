//! The remote object service as seen by the bridge.
//!
//! [`RemoteClient`] is the full capability set the bridge consumes. Concrete
//! transports implement it once; [`Connector`] opens authenticated clients so
//! the pool can stay transport-agnostic.

use serde_json::{Map, Value};

use crate::error::RemoteError;
use crate::filter::Domain;
use crate::types::{ModelMetadata, RecordId};

#[cfg(feature = "remote")]
pub mod jsonrpc;
pub mod memory;

#[cfg(feature = "remote")]
pub use jsonrpc::{JsonRpcClient, JsonRpcConnector};
pub use memory::{MemoryConnector, MemoryRemote, RemoteCall};

/// Address and credentials of one remote database.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub server: String,
    pub database: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
}

impl Credentials {
    pub fn new(
        server: impl Into<String>,
        database: impl Into<String>,
        user: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            server: server.into(),
            database: Some(database.into()),
            user: Some(user.into()),
            password: Some(password.into()),
        }
    }

    pub fn database(&self) -> &str {
        self.database.as_deref().unwrap_or_default()
    }

    pub fn user(&self) -> &str {
        self.user.as_deref().unwrap_or_default()
    }

    pub fn password(&self) -> &str {
        self.password.as_deref().unwrap_or_default()
    }
}

/// Paging and context for `search`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchOptions {
    pub limit: Option<u32>,
    pub offset: u32,
    /// When false, archived records are matched too.
    pub active_test: bool,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            limit: None,
            offset: 0,
            active_test: true,
        }
    }
}

impl SearchOptions {
    pub fn page(limit: u32, offset: u32) -> Self {
        Self {
            limit: Some(limit),
            offset,
            active_test: true,
        }
    }

    pub fn include_archived(mut self) -> Self {
        self.active_test = false;
        self
    }
}

/// Per-model operations offered by the remote object service.
///
/// Every call is synchronous and bounded only by the remote's own
/// responsiveness.
pub trait RemoteClient: Send + Sync {
    fn fields_get(&self, model: &str) -> Result<ModelMetadata, RemoteError>;

    fn default_get(&self, model: &str, fields: &[String])
        -> Result<Map<String, Value>, RemoteError>;

    fn search(
        &self,
        model: &str,
        domain: &Domain,
        options: &SearchOptions,
    ) -> Result<Vec<RecordId>, RemoteError>;

    fn search_count(&self, model: &str, domain: &Domain) -> Result<u64, RemoteError>;

    /// Records come back in the order the remote chooses, each with its `id`.
    fn read(
        &self,
        model: &str,
        ids: &[RecordId],
        fields: &[String],
    ) -> Result<Vec<Map<String, Value>>, RemoteError>;

    fn create(&self, model: &str, values: &Map<String, Value>) -> Result<RecordId, RemoteError>;

    fn write(
        &self,
        model: &str,
        ids: &[RecordId],
        values: &Map<String, Value>,
    ) -> Result<(), RemoteError>;

    fn unlink(&self, model: &str, ids: &[RecordId]) -> Result<(), RemoteError>;

    /// Call any model method by name with positional arguments.
    fn execute(&self, model: &str, method: &str, args: Vec<Value>) -> Result<Value, RemoteError>;

    fn browse(&self, model: &str, id: RecordId) -> RecordHandle<'_>;
}

/// One remote record with attribute access and bound method calls.
pub struct RecordHandle<'a> {
    client: &'a dyn RemoteClient,
    model: String,
    id: RecordId,
}

impl<'a> RecordHandle<'a> {
    pub fn new(client: &'a dyn RemoteClient, model: &str, id: RecordId) -> Self {
        Self {
            client,
            model: model.to_string(),
            id,
        }
    }

    pub fn id(&self) -> RecordId {
        self.id
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Current value of one field. `null` if the record does not exist.
    pub fn get(&self, field: &str) -> Result<Value, RemoteError> {
        let records = self
            .client
            .read(&self.model, &[self.id], &[field.to_string()])?;
        Ok(records
            .into_iter()
            .next()
            .and_then(|mut record| record.remove(field))
            .unwrap_or(Value::Null))
    }

    /// Invoke `method` on this record; the id list is passed first.
    pub fn invoke(&self, method: &str, args: Vec<Value>) -> Result<Value, RemoteError> {
        let mut call_args = Vec::with_capacity(args.len() + 1);
        call_args.push(Value::Array(vec![self.id.into()]));
        call_args.extend(args);
        self.client.execute(&self.model, method, call_args)
    }
}

/// Opens authenticated clients for the connection pool.
pub trait Connector: Send + Sync {
    type Client: RemoteClient + 'static;

    fn connect(&self, credentials: &Credentials) -> Result<Self::Client, RemoteError>;
}
