//! ERP REST Bridge
//!
//! Schema-driven document access to a remote object-relational service whose
//! models are discovered at runtime.
//!
//! The bridge turns dotted field lists into field trees, synthesizes a
//! validation schema from remote metadata for every write, validates
//! documents against it, and maps nested documents onto create/write calls
//! with relation link commands. Reads come back normalized, with related
//! records expanded as far as the requested field tree goes.
//!
//! # Example
//!
//! ```
//! use erp_rest_bridge::{
//!     Bridge, BridgeConfig, Credentials, FieldDef, FieldType, MemoryConnector, MemoryRemote,
//! };
//! use serde_json::json;
//!
//! let remote = MemoryRemote::new().with_model(
//!     "res.partner",
//!     [("name".to_string(), FieldDef::new(FieldType::Char).required(true))].into(),
//! );
//! let bridge = Bridge::new(MemoryConnector::new(remote), BridgeConfig::default());
//! let session = bridge
//!     .session(&Credentials::new("http://localhost:8069", "db", "admin", "admin"))
//!     .unwrap();
//!
//! let id = session.create("ResPartner", &json!({"name": "Acme"})).unwrap();
//! let record = session.fetch("res.partner", id, Some("name")).unwrap();
//! assert_eq!(record["name"], "Acme");
//!
//! // Missing required fields never reach the remote.
//! let err = session.create("res.partner", &json!({})).unwrap_err();
//! assert_eq!(err.status_code(), 422);
//! ```
//!
//! # Document Shapes
//!
//! | Value | Many-to-one | One/many-to-many |
//! |-------|-------------|------------------|
//! | `7` | link record 7 | - |
//! | `{"id": 7}` | link record 7 | - |
//! | `{"name": "x"}` | create, then link | - |
//! | `[{"id": 7}, {"name": "x"}]` | - | link 7, create and link |
//! | `[]` | - | clear all links |
//! | `null`, `false` | unset | clear all links |
//!
//! Creating a record rejects `null` and `false` on its required relations.

pub mod bridge;
pub mod cache;
pub mod config;
pub mod document;
pub mod error;
pub mod filter;
pub mod loader;
pub mod mapper;
pub mod paths;
pub mod pool;
pub mod remote;
pub mod response;
pub mod schema;
pub mod synthesizer;
pub mod types;
pub mod validator;

pub use bridge::{call_args, Bridge, ListPage, ListParams, Session};
pub use cache::{DataCache, MetadataCache, TtlCache};
pub use config::BridgeConfig;
pub use document::{Document, FieldValue, RelationItem};
pub use error::{BridgeError, FieldErrors, LoadError, RemoteError};
pub use filter::Domain;
pub use loader::{load_document, load_document_str};
pub use mapper::{normalize, upsert};
pub use paths::{document_paths, parse_field_list, to_paths, to_tree, FieldNode, FieldTree};
pub use pool::ConnectionPool;
pub use remote::{
    Connector, Credentials, MemoryConnector, MemoryRemote, RecordHandle, RemoteCall, RemoteClient,
    SearchOptions,
};
pub use response::ApiResponse;
pub use schema::{FieldRule, RuleKind, ValidationSchema};
pub use synthesizer::{synthesize, MetadataSource};
pub use types::{model_name, FieldDef, FieldType, LinkCommand, ModelMetadata, RecordId};
pub use validator::{validate, validate_with, ValidationReport};

#[cfg(feature = "remote")]
pub use remote::{JsonRpcClient, JsonRpcConnector};
