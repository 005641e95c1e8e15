//! Module: record
//! Responsibility: the three-bucket attribute store of a single entity.
//! Does not own: resolution, notifications, or graph topology beyond the
//! handles it records (see `graph`).
//!
//! Invariants:
//! - Reads use precedence `local > in_flight > server`.
//! - A key is dirty iff `local` holds it and it differs from the prior value
//!   (`in_flight` if present, else `server`).
//! - `in_flight` is non-empty only between commit start and its outcome.

mod diff;

#[cfg(test)]
mod tests;

pub use diff::{AttrChange, Changes};

use crate::{
    graph::{ModelHandle, RecordHandle},
    identity::RecordIdentity,
    value::AttrValue,
};
use std::collections::{BTreeMap, BTreeSet};

/// Attribute bucket keyed by raw attribute name.
pub type Bucket = BTreeMap<String, AttrValue>;

///
/// ChildSlot
///
/// Reified nested records under one attribute key.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ChildSlot {
    One(RecordHandle),

    /// One entry per array position; `None` where the element is plain data.
    Many(Vec<Option<RecordHandle>>),
}

impl ChildSlot {
    #[must_use]
    pub fn records(&self) -> Vec<RecordHandle> {
        match self {
            Self::One(record) => vec![*record],
            Self::Many(records) => records.iter().flatten().copied().collect(),
        }
    }
}

///
/// ParentLink
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ParentLink {
    pub record: RecordHandle,
    pub key: String,
    pub index: Option<usize>,
}

///
/// RecordData
///

#[derive(Debug)]
pub struct RecordData {
    pub(crate) identity: RecordIdentity,

    pub(crate) server: Bucket,
    pub(crate) in_flight: Bucket,
    pub(crate) local: Bucket,

    pub(crate) children: BTreeMap<String, ChildSlot>,
    pub(crate) parent: Option<ParentLink>,

    /// Facade loaded directly for this record (base or nested).
    pub(crate) owner: Option<ModelHandle>,

    /// Projection facades delegating to this record.
    pub(crate) projections: Vec<ModelHandle>,

    pub(crate) holds: u32,
    pub(crate) is_new: bool,
    pub(crate) committing: bool,
}

impl RecordData {
    #[must_use]
    pub(crate) fn new(identity: RecordIdentity, is_new: bool) -> Self {
        Self {
            identity,
            server: Bucket::new(),
            in_flight: Bucket::new(),
            local: Bucket::new(),
            children: BTreeMap::new(),
            parent: None,
            owner: None,
            projections: Vec::new(),
            holds: 0,
            is_new,
            committing: false,
        }
    }

    #[must_use]
    pub(crate) fn nested(identity: RecordIdentity, server: Bucket, parent: ParentLink) -> Self {
        Self {
            server,
            parent: Some(parent),
            ..Self::new(identity, false)
        }
    }

    #[must_use]
    pub const fn identity(&self) -> &RecordIdentity {
        &self.identity
    }

    #[must_use]
    pub const fn parent(&self) -> Option<&ParentLink> {
        self.parent.as_ref()
    }

    #[must_use]
    pub const fn owner(&self) -> Option<ModelHandle> {
        self.owner
    }

    #[must_use]
    pub fn projections(&self) -> &[ModelHandle] {
        &self.projections
    }

    /// Facades currently backed by this record: owner first.
    #[must_use]
    pub(crate) fn facades(&self) -> Vec<ModelHandle> {
        self.owner
            .into_iter()
            .chain(self.projections.iter().copied())
            .collect()
    }

    /// Whether nothing keeps this record alive any more.
    #[must_use]
    pub(crate) fn is_orphaned(&self) -> bool {
        self.owner.is_none() && self.projections.is_empty() && self.holds == 0
    }

    #[must_use]
    pub fn effective(&self, key: &str) -> Option<&AttrValue> {
        self.local
            .get(key)
            .or_else(|| self.in_flight.get(key))
            .or_else(|| self.server.get(key))
    }

    #[must_use]
    pub fn prior(&self, key: &str) -> Option<&AttrValue> {
        self.in_flight.get(key).or_else(|| self.server.get(key))
    }

    /// Whether unconfirmed state hides the server value of `key`.
    #[must_use]
    pub fn is_shadowed(&self, key: &str) -> bool {
        self.local.contains_key(key) || self.in_flight.contains_key(key)
    }

    /// Dirtiness of the bucket value at `key`, ignoring reified children.
    #[must_use]
    pub fn is_key_dirty(&self, key: &str) -> bool {
        self.local
            .get(key)
            .is_some_and(|value| self.prior(key) != Some(value))
    }

    pub fn dirty_keys(&self) -> impl Iterator<Item = &str> {
        self.local
            .keys()
            .map(String::as_str)
            .filter(|key| self.is_key_dirty(key))
    }

    #[must_use]
    pub fn attribute_keys(&self) -> BTreeSet<String> {
        self.server
            .keys()
            .chain(self.in_flight.keys())
            .chain(self.local.keys())
            .cloned()
            .collect()
    }

    /// Snapshot `local` into `in_flight`.
    pub(crate) fn begin_commit(&mut self) {
        let local = std::mem::take(&mut self.local);
        self.in_flight.extend(local);
        self.committing = true;
    }

    /// Confirm `in_flight` into `server`.
    pub(crate) fn confirm_commit(&mut self) {
        let in_flight = std::mem::take(&mut self.in_flight);
        self.server.extend(in_flight);
        self.committing = false;
        self.is_new = false;
    }

    /// Return `in_flight` to `local`; writes made during the commit win.
    pub(crate) fn reject_commit(&mut self) {
        for (key, value) in std::mem::take(&mut self.in_flight) {
            self.local.entry(key).or_insert(value);
        }
        self.committing = false;
    }

    /// Drop `local` and `in_flight`, returning the keys whose effective
    /// value changed.
    pub(crate) fn rollback(&mut self) -> Vec<String> {
        let touched: BTreeSet<String> = self
            .local
            .keys()
            .chain(self.in_flight.keys())
            .cloned()
            .collect();

        let changed = touched
            .into_iter()
            .filter(|key| self.effective(key) != self.server.get(key))
            .collect();

        self.local.clear();
        self.in_flight.clear();
        self.committing = false;

        changed
    }

    /// Remove `key` from every bucket.
    pub(crate) fn remove_attr(&mut self, key: &str) -> Option<AttrValue> {
        let local = self.local.remove(key);
        let in_flight = self.in_flight.remove(key);
        let server = self.server.remove(key);

        local.or(in_flight).or(server)
    }
}
