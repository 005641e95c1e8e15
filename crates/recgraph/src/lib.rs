//! ## Crate layout
//! - `core`: record graph runtime, schema contract, resolution cache, and
//!   observability.
//! - `error`: stable public error taxonomy for hosts.
//!
//! The `prelude` module mirrors the surface a host needs to push, read,
//! write, and commit records.

pub use recgraph_core as core;

pub mod error;

pub use error::{Error, ErrorKind, ErrorOrigin};

//
// Consts
//

/// Workspace version re-export for downstream tooling/tests.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Result alias carrying the public [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

///
/// Host Prelude
///

pub mod prelude {
    pub use crate::core::{
        DEFAULT_IDENTITY_KEY,
        graph::{
            ArrayHandle, ArrayKind, ChangeNotification, GraphConfig, ModelHandle, ModelKind,
            RecordGraph, RecordHandle,
        },
        identity::{ModelName, RecordId, RecordIdentity},
        record::{AttrChange, Changes},
        schema::{
            ModelTable, NestedModelSpec, RecordRef, ReferenceSpec, Schema, SchemaConfig,
            SchemaReader, SchemaWriter, TableSchema,
        },
        value::{AttrValue, Resolved},
    };
    pub use crate::Error;
    pub use serde_json::{Map, Value, json};
}
