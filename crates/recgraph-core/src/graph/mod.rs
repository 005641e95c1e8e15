//! Module: graph
//! Responsibility: the arena of records, facades and lazy arrays, and every
//! operation that moves data between them.
//! Does not own: schema decisions (see `schema`) or bucket semantics (see
//! `record`).
//!
//! Invariants:
//! - A record is reachable through at most one owner facade plus any number
//!   of projections; nested records hang off exactly one parent slot.
//! - Handles never dangle silently: stale handles surface as `NotFound`.
//! - Resolution reads the graph immutably; all mutation happens afterwards.

mod arena;
mod array;
mod commit;
mod facade;
mod push;
mod query;
mod resolve;
mod unload;
mod write;

#[cfg(test)]
mod tests;

pub use arena::{Arena, Handle};

use crate::{
    DEFAULT_IDENTITY_KEY,
    cache::ResolutionCache,
    error::{InternalError, RecordError},
    identity::{IdentityKey, ModelName, RecordId},
    index::GlobalIdentityIndex,
    obs::sink::{self, RecordEvent},
    record::{ParentLink, RecordData},
    schema::{NestedModelSpec, RecordRef, Schema, SchemaReader, SchemaWriter},
    value::{AttrValue, Resolved},
};
use serde_json::Value;
use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    rc::Rc,
};

pub type RecordHandle = Handle<RecordData>;
pub type ModelHandle = Handle<Model>;
pub type ArrayHandle = Handle<LazyArray>;

///
/// GraphConfig
///

#[derive(Clone, Debug)]
pub struct GraphConfig {
    /// Attribute key carrying entity identity.
    pub identity_key: String,

    /// Queue notifications for local writes, not only for server data.
    pub notify_on_local_writes: bool,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            identity_key: DEFAULT_IDENTITY_KEY.to_string(),
            notify_on_local_writes: true,
        }
    }
}

///
/// ModelKind
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[remain::sorted]
pub enum ModelKind {
    /// Declared type equals the record's base type.
    Base,
    /// Embedded entity under a parent record.
    Nested,
    /// Typed view over a shared base record.
    Projection,
}

///
/// Model
///
/// A typed facade over one record, with its own resolution cache.
///

#[derive(Debug)]
pub struct Model {
    pub(crate) model_name: ModelName,
    pub(crate) record: RecordHandle,
    pub(crate) kind: ModelKind,
    pub(crate) cache: ResolutionCache,
}

impl Model {
    #[must_use]
    pub(crate) fn new(model_name: ModelName, record: RecordHandle, kind: ModelKind) -> Self {
        Self {
            model_name,
            record,
            kind,
            cache: ResolutionCache::new(),
        }
    }

    #[must_use]
    pub const fn model_name(&self) -> &ModelName {
        &self.model_name
    }

    #[must_use]
    pub const fn record(&self) -> RecordHandle {
        self.record
    }

    #[must_use]
    pub const fn kind(&self) -> ModelKind {
        self.kind
    }

    #[must_use]
    pub const fn cache(&self) -> &ResolutionCache {
        &self.cache
    }
}

///
/// ArrayKind
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[remain::sorted]
pub enum ArrayKind {
    Reference,
    Tracked,
}

impl ArrayKind {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Reference => "reference",
            Self::Tracked => "tracked",
        }
    }
}

///
/// ArrayOwner
///
/// Attribute slot an array materializes. Every facade of the record shares
/// the one array per slot.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ArrayOwner {
    pub record: RecordHandle,
    pub key: String,
}

///
/// ArrayEntry
///

#[derive(Clone, Debug, PartialEq)]
pub enum ArrayEntry {
    Unresolved(RecordRef),
    Model(ModelHandle),
    Value(Value),
}

///
/// LazyArray
///
/// Identity-stable array behind an attribute. A stale array is refilled in
/// place on next access, so outstanding handles keep working.
///

#[derive(Clone, Debug)]
pub struct LazyArray {
    pub(crate) kind: ArrayKind,
    pub(crate) owner: Option<ArrayOwner>,
    pub(crate) entries: Vec<ArrayEntry>,
    pub(crate) stale: bool,
}

impl LazyArray {
    #[must_use]
    pub(crate) const fn detached(kind: ArrayKind) -> Self {
        Self {
            kind,
            owner: None,
            entries: Vec::new(),
            stale: false,
        }
    }

    #[must_use]
    pub const fn kind(&self) -> ArrayKind {
        self.kind
    }

    #[must_use]
    pub const fn owner(&self) -> Option<&ArrayOwner> {
        self.owner.as_ref()
    }

    #[must_use]
    pub fn entries(&self) -> &[ArrayEntry] {
        &self.entries
    }

    #[must_use]
    pub const fn is_stale(&self) -> bool {
        self.stale
    }

    #[must_use]
    pub(crate) fn is_owned_by(&self, record: RecordHandle, key: &str) -> bool {
        self.owner
            .as_ref()
            .is_some_and(|owner| owner.record == record && owner.key == key)
    }
}

///
/// ChangeNotification
///
/// Keys a facade's observers should re-read, coalesced until drained.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ChangeNotification {
    pub model: ModelHandle,
    pub keys: Vec<String>,
}

///
/// RecordGraph
///

pub struct RecordGraph {
    schema: Rc<dyn Schema>,
    config: GraphConfig,

    records: Arena<RecordData>,
    models: Arena<Model>,
    arrays: Arena<LazyArray>,

    /// (base model, id) -> record
    record_index: HashMap<IdentityKey, RecordHandle>,

    /// (declared model, id) -> facade
    model_index: HashMap<IdentityKey, ModelHandle>,

    global: GlobalIdentityIndex,
    pending: BTreeMap<ModelHandle, BTreeSet<String>>,
}

impl RecordGraph {
    #[must_use]
    pub fn new(schema: impl Schema + 'static) -> Self {
        Self::with_config(Rc::new(schema), GraphConfig::default())
    }

    #[must_use]
    pub fn with_config(schema: Rc<dyn Schema>, config: GraphConfig) -> Self {
        Self {
            schema,
            config,
            records: Arena::new(),
            models: Arena::new(),
            arrays: Arena::new(),
            record_index: HashMap::new(),
            model_index: HashMap::new(),
            global: GlobalIdentityIndex::new(),
            pending: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn schema(&self) -> &dyn Schema {
        &*self.schema
    }

    #[must_use]
    pub const fn config(&self) -> &GraphConfig {
        &self.config
    }

    #[must_use]
    pub const fn record_count(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub const fn model_count(&self) -> usize {
        self.models.len()
    }

    #[must_use]
    pub const fn array_count(&self) -> usize {
        self.arrays.len()
    }

    #[must_use]
    pub fn record_data(&self, record: RecordHandle) -> Option<&RecordData> {
        self.records.get(record)
    }

    #[must_use]
    pub fn model_data(&self, model: ModelHandle) -> Option<&Model> {
        self.models.get(model)
    }

    #[must_use]
    pub fn array_data(&self, array: ArrayHandle) -> Option<&LazyArray> {
        self.arrays.get(array)
    }

    // ------------------------------------------------------------------
    // Lookups
    // ------------------------------------------------------------------

    /// Live facade of declared type `model_name` for `id`.
    #[must_use]
    pub fn peek(&self, model_name: &ModelName, id: &RecordId) -> Option<ModelHandle> {
        self.model_index
            .get(&(model_name.clone(), id.clone()))
            .copied()
            .filter(|model| self.models.contains(*model))
    }

    /// Base record stored for (`base model`, `id`).
    #[must_use]
    pub fn peek_record(&self, model_name: &ModelName, id: &RecordId) -> Option<RecordHandle> {
        self.record_index
            .get(&(model_name.clone(), id.clone()))
            .copied()
    }

    /// Facade registered for `id` in the global identity index.
    #[must_use]
    pub fn lookup_id(&self, id: &RecordId) -> Option<ModelHandle> {
        self.global
            .get(id)
            .filter(|model| self.models.contains(*model))
    }

    pub(crate) fn lookup_ref(&self, target: &RecordRef) -> Option<ModelHandle> {
        match &target.model_name {
            Some(model_name) => self.peek(model_name, &target.id),
            None => self.lookup_id(&target.id),
        }
    }

    // ------------------------------------------------------------------
    // Checked access
    // ------------------------------------------------------------------

    pub(crate) fn record(&self, record: RecordHandle) -> Result<&RecordData, InternalError> {
        self.records.get(record).ok_or_else(|| {
            RecordError::RecordNotFound {
                handle: record.to_string(),
            }
            .into()
        })
    }

    pub(crate) fn record_mut(
        &mut self,
        record: RecordHandle,
    ) -> Result<&mut RecordData, InternalError> {
        self.records.get_mut(record).ok_or_else(|| {
            RecordError::RecordNotFound {
                handle: record.to_string(),
            }
            .into()
        })
    }

    pub(crate) fn model(&self, model: ModelHandle) -> Result<&Model, InternalError> {
        self.models.get(model).ok_or_else(|| {
            RecordError::ModelNotFound {
                handle: model.to_string(),
            }
            .into()
        })
    }

    pub(crate) fn model_mut(&mut self, model: ModelHandle) -> Result<&mut Model, InternalError> {
        self.models.get_mut(model).ok_or_else(|| {
            RecordError::ModelNotFound {
                handle: model.to_string(),
            }
            .into()
        })
    }

    pub(crate) fn array(&self, array: ArrayHandle) -> Result<&LazyArray, InternalError> {
        self.arrays.get(array).ok_or_else(|| {
            RecordError::ArrayNotFound {
                handle: array.to_string(),
            }
            .into()
        })
    }

    pub(crate) fn array_mut(
        &mut self,
        array: ArrayHandle,
    ) -> Result<&mut LazyArray, InternalError> {
        self.arrays.get_mut(array).ok_or_else(|| {
            RecordError::ArrayNotFound {
                handle: array.to_string(),
            }
            .into()
        })
    }

    // ------------------------------------------------------------------
    // Schema helpers
    // ------------------------------------------------------------------

    /// Model name the schema sees for record-level operations.
    pub(crate) fn primary_model_name(
        &self,
        record: RecordHandle,
    ) -> Result<ModelName, InternalError> {
        let rec = self.record(record)?;

        Ok(rec
            .owner
            .and_then(|owner| self.models.get(owner))
            .map_or_else(
                || rec.identity.model_name.clone(),
                |model| model.model_name.clone(),
            ))
    }

    pub(crate) fn allows(&self, model_name: &ModelName, key: &str) -> bool {
        self.schema
            .model_table(model_name)
            .is_none_or(|table| table.allows(key))
    }

    pub(crate) fn nested_spec(
        &self,
        record: RecordHandle,
        model_name: &ModelName,
        key: &str,
        value: &Value,
    ) -> Option<NestedModelSpec> {
        let schema = Rc::clone(&self.schema);
        let mut reader = GraphReader::new(self, record, model_name.clone());

        schema.compute_nested_model(key, value, model_name, &mut reader)
    }

    // ------------------------------------------------------------------
    // Invalidation and notification
    // ------------------------------------------------------------------

    /// Invalidate `roots` and their dependents on one facade's cache,
    /// returning every affected key. Owned arrays go stale instead of
    /// being dropped. With `keep_roots`, only dependents are invalidated.
    pub(crate) fn invalidate_keys(
        &mut self,
        model: ModelHandle,
        roots: &BTreeSet<String>,
        keep_roots: bool,
    ) -> Result<BTreeSet<String>, InternalError> {
        let Some(facade) = self.models.get_mut(model) else {
            return Ok(BTreeSet::new());
        };
        let record = facade.record;

        let closure = facade
            .cache
            .dependents_closure(roots.iter().map(String::as_str));
        let mut stale = Vec::new();
        let mut invalidated = 0u64;

        for key in &closure {
            if keep_roots && roots.contains(key) {
                continue;
            }
            match facade.cache.get(key) {
                Some(Resolved::Array(array))
                    if self
                        .arrays
                        .get(*array)
                        .is_some_and(|a| a.is_owned_by(record, key)) =>
                {
                    stale.push(*array);
                    invalidated += 1;
                }
                Some(_) => {
                    facade.cache.remove(key);
                    invalidated += 1;
                }
                None => {}
            }
        }

        if invalidated > 0 {
            sink::record(RecordEvent::Invalidated {
                model_name: facade.model_name.as_str(),
                keys: invalidated,
            });
        }
        for array in stale {
            self.array_mut(array)?.stale = true;
        }

        Ok(closure)
    }

    /// Invalidate `changed` on every facade of `record`, optionally
    /// queueing notifications.
    pub(crate) fn fan_out(
        &mut self,
        record: RecordHandle,
        changed: &BTreeSet<String>,
        notify: bool,
    ) -> Result<(), InternalError> {
        if changed.is_empty() {
            return Ok(());
        }

        for facade in self.record(record)?.facades() {
            let affected = self.invalidate_keys(facade, changed, false)?;
            if notify {
                self.notify(facade, affected);
            }
        }

        self.touch_ancestors(record, notify)
    }

    /// A change inside a reified child changes the composed value of the
    /// parent key. The parent keeps its resolution of that key; whatever
    /// read it is invalidated, up the whole chain.
    pub(crate) fn touch_ancestors(
        &mut self,
        record: RecordHandle,
        notify: bool,
    ) -> Result<(), InternalError> {
        let mut link = self.records.get(record).and_then(|rec| rec.parent.clone());

        while let Some(ParentLink {
            record: parent,
            key,
            ..
        }) = link
        {
            let Some(facades) = self.records.get(parent).map(RecordData::facades) else {
                break;
            };
            let roots = BTreeSet::from([key]);

            for facade in facades {
                let mut affected = self.invalidate_keys(facade, &roots, true)?;
                affected.retain(|key| !roots.contains(key));
                if notify {
                    self.notify(facade, affected);
                }
            }

            link = self.records.get(parent).and_then(|rec| rec.parent.clone());
        }

        Ok(())
    }

    /// Queue `keys` for `model`, filtered by its whitelist.
    pub(crate) fn notify(&mut self, model: ModelHandle, keys: impl IntoIterator<Item = String>) {
        let Some(model_name) = self.models.get(model).map(|m| m.model_name.clone()) else {
            return;
        };

        let keys: Vec<String> = keys
            .into_iter()
            .filter(|key| *key != self.config.identity_key && self.allows(&model_name, key))
            .collect();
        if keys.is_empty() {
            return;
        }

        sink::record(RecordEvent::Notified {
            model_name: model_name.as_str(),
            keys: keys.len() as u64,
        });
        self.pending.entry(model).or_default().extend(keys);
    }

    /// Drain queued change notifications, one per facade.
    pub fn take_notifications(&mut self) -> Vec<ChangeNotification> {
        std::mem::take(&mut self.pending)
            .into_iter()
            .map(|(model, keys)| ChangeNotification {
                model,
                keys: keys.into_iter().collect(),
            })
            .collect()
    }

    #[must_use]
    pub fn has_pending_notifications(&self) -> bool {
        !self.pending.is_empty()
    }
}

impl std::fmt::Debug for RecordGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordGraph")
            .field("records", &self.records.len())
            .field("models", &self.models.len())
            .field("arrays", &self.arrays.len())
            .field("pending", &self.pending.len())
            .finish_non_exhaustive()
    }
}

///
/// GraphReader
///
/// Raw, read-only view of one record handed to schema hooks. Every key read
/// is recorded as a dependency.
///

pub(crate) struct GraphReader<'a> {
    graph: &'a RecordGraph,
    record: RecordHandle,
    model_name: ModelName,
    reads: BTreeSet<String>,
}

impl<'a> GraphReader<'a> {
    pub(crate) const fn new(
        graph: &'a RecordGraph,
        record: RecordHandle,
        model_name: ModelName,
    ) -> Self {
        Self {
            graph,
            record,
            model_name,
            reads: BTreeSet::new(),
        }
    }

    pub(crate) fn into_reads(self) -> BTreeSet<String> {
        self.reads
    }
}

impl SchemaReader for GraphReader<'_> {
    fn get_attr(&mut self, key: &str) -> Option<AttrValue> {
        self.reads.insert(key.to_string());

        self.graph.get_attr(self.record, key).ok().flatten()
    }

    fn model_name(&self) -> &ModelName {
        &self.model_name
    }
}

///
/// GraphWriter
///

pub(crate) struct GraphWriter<'a> {
    graph: &'a mut RecordGraph,
    record: RecordHandle,
}

impl SchemaWriter for GraphWriter<'_> {
    fn set_attr(&mut self, key: &str, value: AttrValue) -> Result<(), InternalError> {
        self.graph.write_local(self.record, key, value)
    }

    fn get_attr(&mut self, key: &str) -> Option<AttrValue> {
        let rec = self.graph.records.get(self.record)?;

        self.graph.composed_attr(rec, key).ok().flatten()
    }
}
