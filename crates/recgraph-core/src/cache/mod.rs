//! Module: cache
//! Responsibility: per-facade memo of resolved attribute values and the
//! dependency multimap used to invalidate derived keys.
//! Does not own: the decision of what a raw value resolves to (see
//! `graph::resolve`), or how stale arrays are refreshed.
//!
//! Invariants:
//! - `dependents` is the exact reverse of `dependencies`.
//! - Reads never clear entries.


use crate::{graph::ModelHandle, value::Resolved};
use std::collections::{BTreeMap, BTreeSet, VecDeque};

///
/// ResolutionCache
///

#[derive(Clone, Debug, Default)]
pub struct ResolutionCache {
    entries: BTreeMap<String, Resolved>,

    /// key -> keys read while resolving it
    dependencies: BTreeMap<String, BTreeSet<String>>,

    /// read key -> keys whose resolution read it
    dependents: BTreeMap<String, BTreeSet<String>>,
}

impl ResolutionCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Resolved> {
        self.entries.get(key)
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Memoize `resolved` for `key`, replacing its previous dependencies.
    pub fn insert(&mut self, key: &str, resolved: Resolved, dependencies: BTreeSet<String>) {
        self.unlink(key);

        for dependency in &dependencies {
            self.dependents
                .entry(dependency.clone())
                .or_default()
                .insert(key.to_string());
        }
        if !dependencies.is_empty() {
            self.dependencies.insert(key.to_string(), dependencies);
        }

        self.entries.insert(key.to_string(), resolved);
    }

    /// Drop the entry for `key` along with the dependencies it recorded.
    pub fn remove(&mut self, key: &str) -> Option<Resolved> {
        self.unlink(key);
        self.entries.remove(key)
    }

    /// `roots` plus every key that transitively depends on one of them.
    #[must_use]
    pub fn dependents_closure<'a>(
        &self,
        roots: impl IntoIterator<Item = &'a str>,
    ) -> BTreeSet<String> {
        let mut seen = BTreeSet::new();
        let mut queue: VecDeque<String> = roots.into_iter().map(str::to_string).collect();

        while let Some(key) = queue.pop_front() {
            if !seen.insert(key.clone()) {
                continue;
            }
            if let Some(dependents) = self.dependents.get(&key) {
                queue.extend(
                    dependents
                        .iter()
                        .filter(|dependent| !seen.contains(*dependent))
                        .cloned(),
                );
            }
        }

        seen
    }

    #[must_use]
    pub fn keys_resolving_to_model(&self, model: ModelHandle) -> Vec<String> {
        self.entries
            .iter()
            .filter(|(_, resolved)| resolved.as_model() == Some(model))
            .map(|(key, _)| key.clone())
            .collect()
    }

    fn unlink(&mut self, key: &str) {
        let Some(dependencies) = self.dependencies.remove(key) else {
            return;
        };

        for dependency in dependencies {
            if let Some(dependents) = self.dependents.get_mut(&dependency) {
                dependents.remove(key);
                if dependents.is_empty() {
                    self.dependents.remove(&dependency);
                }
            }
        }
    }
}
