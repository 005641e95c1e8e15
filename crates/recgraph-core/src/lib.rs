//! Core runtime for recgraph: schemaless JSON records held in an arena-backed
//! graph, with layered attribute buckets, projections, lazy references, and
//! the observability boundary exported via the `prelude`.
#![warn(unreachable_pub)]

// public exports are one module level down
pub mod cache;
pub mod error;
pub mod graph;
pub mod identity;
pub mod index;
pub mod obs;
pub mod record;
pub mod schema;
pub mod value;

// test
#[cfg(test)]
pub(crate) mod test_support;

///
/// CONSTANTS
///

/// Attribute key that carries entity identity instead of bucket data.
pub const DEFAULT_IDENTITY_KEY: &str = "id";

///
/// Prelude
///
/// Prelude contains only domain vocabulary.
/// No errors, sinks, or helpers are re-exported here.
///

pub mod prelude {
    pub use crate::{
        graph::{ArrayHandle, ArrayKind, ModelHandle, RecordGraph, RecordHandle},
        identity::{ModelName, RecordId, RecordIdentity},
        record::{AttrChange, Changes},
        schema::{NestedModelSpec, RecordRef, ReferenceSpec, Schema, SchemaReader},
        value::{AttrValue, Resolved},
    };
}
