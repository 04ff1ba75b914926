//! Inbound operations over a remote object service.
//!
//! A [`Bridge`] owns the connection pool, both caches and the configuration.
//! Each request opens a [`Session`], the explicit context every operation runs
//! in: it carries the authenticated client and borrows the shared caches.

use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::cache::{DataCache, MetadataCache};
use crate::config::BridgeConfig;
use crate::document::Document;
use crate::error::{BridgeError, RemoteError};
use crate::filter::Domain;
use crate::mapper::{normalize, upsert};
use crate::paths::{document_paths, parse_field_list, to_tree, FieldTree};
use crate::pool::ConnectionPool;
use crate::remote::{Connector, Credentials, RemoteClient, SearchOptions};
use crate::synthesizer::{synthesize, MetadataSource};
use crate::types::{model_name, ModelMetadata, RecordId};
use crate::validator::validate_with;

/// Process-wide state shared by all requests.
pub struct Bridge<C: Connector> {
    pool: ConnectionPool<C>,
    metadata: MetadataCache,
    data: DataCache,
    config: BridgeConfig,
}

impl<C: Connector> Bridge<C> {
    pub fn new(connector: C, config: BridgeConfig) -> Self {
        Self {
            pool: ConnectionPool::new(connector, config.pool_size, config.pool_timeout),
            metadata: MetadataCache::new(config.metadata_ttl, config.cache_max_entries),
            data: DataCache::new(config.data_ttl, config.cache_max_entries),
            config,
        }
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn pool(&self) -> &ConnectionPool<C> {
        &self.pool
    }

    /// Open a session for one request, reusing a pooled client when possible.
    ///
    /// # Errors
    ///
    /// Returns `BridgeError::Remote` if a new client cannot authenticate.
    pub fn session(&self, credentials: &Credentials) -> Result<Session<'_>, BridgeError> {
        let client: Arc<dyn RemoteClient> = self.pool.connect(credentials)?;
        Ok(Session::new(client, &self.metadata, &self.data, &self.config))
    }
}

/// Listing parameters as received from a client.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListParams {
    /// Serialized filter expression.
    pub filter: Option<String>,
    /// Comma-separated dotted field paths.
    pub schema: Option<String>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

/// One page of a listing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ListPage {
    pub items: Vec<Map<String, Value>>,
    pub n_items: u64,
    pub limit: u32,
    pub offset: u32,
}

/// Per-request context: an authenticated client plus the shared caches.
pub struct Session<'a> {
    client: Arc<dyn RemoteClient>,
    metadata: &'a MetadataCache,
    data: &'a DataCache,
    config: &'a BridgeConfig,
}

impl<'a> Session<'a> {
    pub fn new(
        client: Arc<dyn RemoteClient>,
        metadata: &'a MetadataCache,
        data: &'a DataCache,
        config: &'a BridgeConfig,
    ) -> Self {
        Self {
            client,
            metadata,
            data,
            config,
        }
    }

    pub fn client(&self) -> &dyn RemoteClient {
        self.client.as_ref()
    }

    pub fn config(&self) -> &BridgeConfig {
        self.config
    }

    /// Read records through the data cache.
    pub fn read_cached(
        &self,
        model: &str,
        ids: &[RecordId],
        fields: &[String],
    ) -> Result<Arc<Vec<Map<String, Value>>>, BridgeError> {
        if let Some(records) = self.data.get_data(model, ids, fields) {
            return Ok(records);
        }
        let records = Arc::new(self.client.read(model, ids, fields)?);
        self.data.set_data(model, ids, fields, Arc::clone(&records));
        Ok(records)
    }

    /// List records of a collection.
    ///
    /// # Errors
    ///
    /// Returns `MalformedFilter` for an unparsable filter and `SearchFailed`
    /// when the remote rejects the search; other remote faults propagate.
    pub fn list(&self, collection: &str, params: &ListParams) -> Result<ListPage, BridgeError> {
        let model = model_name(collection);
        let domain = match params.filter.as_deref().map(str::trim) {
            Some(raw) if !raw.is_empty() => Domain::parse(raw)?,
            _ => Domain::all(),
        };
        let limit = params.limit.unwrap_or(self.config.default_limit);
        let offset = params.offset.unwrap_or(0);

        let n_items = self
            .client
            .search_count(&model, &domain)
            .map_err(|e| search_failed(&model, e))?;
        let tree = self.field_tree(&model, params.schema.as_deref())?;
        let ids = self
            .client
            .search(&model, &domain, &SearchOptions::page(limit, offset))
            .map_err(|e| search_failed(&model, e))?;

        let records = if ids.is_empty() {
            Vec::new()
        } else {
            self.client.read(&model, &ids, &tree.fields())?
        };
        let items = records
            .iter()
            .map(|record| normalize(self, &model, record, Some(&tree)))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ListPage {
            items,
            n_items,
            limit,
            offset,
        })
    }

    /// Fetch one record shaped by `schema` (all fields when absent).
    pub fn fetch(
        &self,
        collection: &str,
        id: RecordId,
        schema: Option<&str>,
    ) -> Result<Map<String, Value>, BridgeError> {
        let model = model_name(collection);
        let tree = self.field_tree(&model, schema)?;
        let record = self
            .client
            .read(&model, &[id], &tree.fields())?
            .into_iter()
            .next()
            .ok_or_else(|| BridgeError::NotFound {
                model: model.clone(),
                id,
            })?;
        normalize(self, &model, &record, Some(&tree))
    }

    /// Validate and create a record, returning its id.
    pub fn create(&self, collection: &str, body: &Value) -> Result<RecordId, BridgeError> {
        self.write_document(&model_name(collection), body)
    }

    /// Validate and update record `id`; the path id overrides any id in the body.
    pub fn update(&self, collection: &str, id: RecordId, body: &Value) -> Result<RecordId, BridgeError> {
        let mut body = body.clone();
        match body.as_object_mut() {
            Some(map) => {
                map.insert("id".into(), id.into());
            }
            None => {
                return Err(BridgeError::invalid_document(
                    "document",
                    "expected object",
                ))
            }
        }
        self.write_document(&model_name(collection), &body)
    }

    /// Delete record `id`, archived records included.
    pub fn delete(&self, collection: &str, id: RecordId) -> Result<(), BridgeError> {
        let model = model_name(collection);
        let found = self.client.search(
            &model,
            &Domain::by_id(id),
            &SearchOptions::default().include_archived(),
        )?;
        if found.is_empty() {
            return Err(BridgeError::NotFound { model, id });
        }
        self.client.unlink(&model, &found)?;
        tracing::info!(model = %model, id, "unlinked");
        Ok(())
    }

    /// Call a model-level method.
    pub fn invoke(&self, collection: &str, method: &str, args: Vec<Value>) -> Result<Value, BridgeError> {
        let model = model_name(collection);
        tracing::debug!(model = %model, method, "invoking");
        Ok(self.client.execute(&model, method, args)?)
    }

    /// Call a method bound to record `id`.
    pub fn invoke_record(
        &self,
        collection: &str,
        id: RecordId,
        method: &str,
        args: Vec<Value>,
    ) -> Result<Value, BridgeError> {
        let model = model_name(collection);
        tracing::debug!(model = %model, id, method, "invoking on record");
        Ok(self.client.browse(&model, id).invoke(method, args)?)
    }

    fn write_document(&self, model: &str, body: &Value) -> Result<RecordId, BridgeError> {
        let document = Document::from_value(body)?;
        let tree = to_tree(document_paths(body));
        let schema = synthesize(self, model, Some(&tree), body)?;
        validate_with(body, &schema, self.config.strict)?.into_result()?;
        upsert(self, model, &document)
    }

    fn field_tree(&self, model: &str, schema: Option<&str>) -> Result<FieldTree, BridgeError> {
        let paths = schema.map(parse_field_list).unwrap_or_default();
        if !paths.is_empty() {
            return Ok(to_tree(paths));
        }
        let metadata = self.fields(model)?;
        Ok(to_tree(metadata.keys()))
    }
}

impl MetadataSource for Session<'_> {
    fn fields(&self, model: &str) -> Result<Arc<ModelMetadata>, BridgeError> {
        if let Some(metadata) = self.metadata.get_fields(model) {
            return Ok(metadata);
        }
        let metadata = Arc::new(self.client.fields_get(model)?);
        self.metadata.set_fields(model, Arc::clone(&metadata));
        Ok(metadata)
    }

    fn defaults(&self, model: &str, fields: &[String]) -> Result<Map<String, Value>, BridgeError> {
        Ok(self.client.default_get(model, fields)?)
    }
}

/// Positional arguments of a method call body: its `args` array, if any.
pub fn call_args(body: Option<&Value>) -> Result<Vec<Value>, BridgeError> {
    match body.and_then(|b| b.get("args")) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(args)) => Ok(args.clone()),
        Some(_) => Err(BridgeError::invalid_document("args", "expected array")),
    }
}

fn search_failed(model: &str, error: RemoteError) -> BridgeError {
    tracing::warn!(model, error = %error, "search failed");
    BridgeError::SearchFailed {
        model: model.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::{MemoryConnector, MemoryRemote};
    use crate::types::{FieldDef, FieldType};
    use serde_json::json;

    fn bridge() -> (MemoryRemote, Bridge<MemoryConnector>) {
        let remote = MemoryRemote::new().with_model(
            "res.partner",
            [
                ("name".to_string(), FieldDef::new(FieldType::Char).required(true)),
                ("active".to_string(), FieldDef::new(FieldType::Boolean)),
            ]
            .into(),
        );
        let bridge = Bridge::new(MemoryConnector::new(remote.clone()), BridgeConfig::default());
        (remote, bridge)
    }

    fn creds() -> Credentials {
        Credentials::new("http://erp", "db", "admin", "pw")
    }

    #[test]
    fn sessions_share_pooled_client() {
        let (_, bridge) = bridge();
        bridge.session(&creds()).unwrap();
        bridge.session(&creds()).unwrap();
        assert_eq!(bridge.pool().connector().opened(), 1);
    }

    #[test]
    fn metadata_is_cached_across_sessions() {
        let (remote, bridge) = bridge();
        bridge.session(&creds()).unwrap().fields("res.partner").unwrap();
        bridge.session(&creds()).unwrap().fields("res.partner").unwrap();
        assert_eq!(remote.call_count("fields_get"), 1);
    }

    #[test]
    fn update_requires_object_body() {
        let (_, bridge) = bridge();
        let session = bridge.session(&creds()).unwrap();
        let err = session.update("res.partner", 1, &json!([1])).unwrap_err();
        assert!(matches!(err, BridgeError::InvalidDocument { .. }));
    }

    #[test]
    fn call_args_shapes() {
        assert!(call_args(None).unwrap().is_empty());
        assert!(call_args(Some(&json!({}))).unwrap().is_empty());
        assert_eq!(
            call_args(Some(&json!({"args": [1, "x"]}))).unwrap(),
            vec![json!(1), json!("x")]
        );
        assert!(call_args(Some(&json!({"args": 3}))).is_err());
    }

    #[test]
    fn count_fault_becomes_search_failed() {
        let (remote, bridge) = bridge();
        remote.fail_on("res.partner", "search_count");
        let session = bridge.session(&creds()).unwrap();
        let err = session.list("ResPartner", &ListParams::default()).unwrap_err();
        assert!(matches!(err, BridgeError::SearchFailed { ref model } if model == "res.partner"));
    }
}
