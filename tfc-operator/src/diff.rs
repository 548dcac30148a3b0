//! Keyed set difference between a desired and an observed collection.
//!
//! Implemented once for every sub-resource. Desired and observed entries may
//! have different types (spec entries vs remote objects); the caller supplies
//! the payload comparison.

use std::collections::BTreeMap;

/// How a desired entry relates to the observed entry under the same key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Equal,
    /// Converge in place.
    Update,
    /// The remote object cannot be changed in place; delete and recreate.
    Replace,
}

/// Result of [`diff`]. Keys of the four maps are pairwise disjoint.
#[derive(Debug)]
pub struct Diff<K, D, O> {
    /// Desired, not observed.
    pub to_create: BTreeMap<K, D>,
    /// In both, payload differs.
    pub to_update: BTreeMap<K, (D, O)>,
    /// In both, payload differs in a way only delete-then-create can fix.
    pub to_replace: BTreeMap<K, (D, O)>,
    /// Observed, not desired.
    pub to_delete: BTreeMap<K, O>,
}

impl<K, D, O> Diff<K, D, O> {
    pub fn is_empty(&self) -> bool {
        self.to_create.is_empty()
            && self.to_update.is_empty()
            && self.to_replace.is_empty()
            && self.to_delete.is_empty()
    }
}

pub fn diff<K, D, O>(
    desired: BTreeMap<K, D>,
    mut observed: BTreeMap<K, O>,
    compare: impl Fn(&D, &O) -> Comparison,
) -> Diff<K, D, O>
where
    K: Ord,
{
    let mut out = Diff {
        to_create: BTreeMap::new(),
        to_update: BTreeMap::new(),
        to_replace: BTreeMap::new(),
        to_delete: BTreeMap::new(),
    };

    for (key, want) in desired {
        match observed.remove(&key) {
            None => {
                out.to_create.insert(key, want);
            }
            Some(have) => match compare(&want, &have) {
                Comparison::Equal => {}
                Comparison::Update => {
                    out.to_update.insert(key, (want, have));
                }
                Comparison::Replace => {
                    out.to_replace.insert(key, (want, have));
                }
            },
        }
    }
    out.to_delete = observed;
    out
}

/// Mutation counts of one collection pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Changes {
    pub created: usize,
    pub updated: usize,
    pub replaced: usize,
    pub deleted: usize,
}

impl Changes {
    pub fn is_empty(&self) -> bool {
        self.created == 0 && self.updated == 0 && self.replaced == 0 && self.deleted == 0
    }

    pub fn total(&self) -> usize {
        self.created + self.updated + self.replaced + self.deleted
    }
}

impl std::ops::AddAssign for Changes {
    fn add_assign(&mut self, other: Changes) {
        self.created += other.created;
        self.updated += other.updated;
        self.replaced += other.replaced;
        self.deleted += other.deleted;
    }
}
