use crate::{record::RecordData, value::AttrValue};
use std::collections::BTreeMap;

/// Changed attributes of one record, keyed by attribute name.
pub type Changes = BTreeMap<String, AttrChange>;

///
/// AttrChange
///
/// Dirty bucket values report `[prior, current]`; dirty reified children
/// report their own diff, per position for arrays.
///

#[derive(Clone, Debug, PartialEq)]
pub enum AttrChange {
    Changed {
        old: Option<AttrValue>,
        new: Option<AttrValue>,
    },
    Nested(Changes),
    NestedList(BTreeMap<usize, Changes>),
}

impl RecordData {
    /// Bucket-level changes only; the graph folds in reified children.
    #[must_use]
    pub fn local_changes(&self) -> Changes {
        self.dirty_keys()
            .map(|key| {
                let change = AttrChange::Changed {
                    old: self.prior(key).cloned(),
                    new: self.local.get(key).cloned(),
                };

                (key.to_string(), change)
            })
            .collect()
    }
}
