//! Child collection bookkeeping.
//!
//! Live children are `(enumerated ∪ upserted) − tombstones`. A reference is
//! pending while its delegate is being initialized; it is live once the
//! delegate exists, and tombstoned forever once it is known to be destroyed.

use std::collections::{BTreeMap, HashSet};

use super::window::Window;
use crate::service::ElementRef;

pub(crate) type WindowCollection = ChildCollection<Window>;

#[derive(Debug, PartialEq)]
pub(crate) enum Resolution<C> {
    Live(C),
    Destroyed,
    /// Not known yet, including references still being initialized.
    Unknown,
}

#[derive(Debug, PartialEq)]
pub(crate) enum Upserted<C> {
    Added,
    /// The reference was tombstoned while its delegate was being built.
    Suppressed(C),
}

#[derive(Debug)]
pub(crate) struct ChildCollection<C> {
    live: BTreeMap<ElementRef, C>,
    pending: HashSet<ElementRef>,
    tombstones: HashSet<ElementRef>,
}

impl<C> Default for ChildCollection<C> {
    fn default() -> Self {
        Self {
            live: BTreeMap::new(),
            pending: HashSet::new(),
            tombstones: HashSet::new(),
        }
    }
}

impl<C: Clone> ChildCollection<C> {
    fn is_known(&self, element: ElementRef) -> bool {
        self.live.contains_key(&element)
            || self.pending.contains(&element)
            || self.tombstones.contains(&element)
    }

    /// Start tracking a created child. Returns false if it is already
    /// present, pending or tombstoned.
    pub fn begin_upsert(&mut self, element: ElementRef) -> bool {
        if self.is_known(element) {
            return false;
        }
        self.pending.insert(element);
        true
    }

    /// Fold an enumeration result in. Returns the references that still
    /// need a delegate, each now pending.
    pub fn merge_enumeration(&mut self, enumerated: Vec<ElementRef>) -> Vec<ElementRef> {
        enumerated
            .into_iter()
            .filter(|element| self.begin_upsert(*element))
            .collect()
    }

    pub fn finish_upsert(&mut self, element: ElementRef, child: C) -> Upserted<C> {
        self.pending.remove(&element);
        if self.tombstones.contains(&element) {
            return Upserted::Suppressed(child);
        }
        self.live.insert(element, child);
        Upserted::Added
    }

    /// Give up on a pending child. Only a child known to be destroyed is
    /// tombstoned; otherwise a later creation may retry it.
    pub fn abandon(&mut self, element: ElementRef, tombstone: bool) {
        self.pending.remove(&element);
        if tombstone {
            self.tombstones.insert(element);
        }
    }

    /// Record `element` as destroyed and drop it from the live set.
    pub fn remove(&mut self, element: ElementRef) -> Option<C> {
        self.tombstones.insert(element);
        self.live.remove(&element)
    }

    pub fn resolve(&self, element: ElementRef) -> Resolution<C> {
        if self.tombstones.contains(&element) {
            Resolution::Destroyed
        } else if let Some(child) = self.live.get(&element) {
            Resolution::Live(child.clone())
        } else {
            Resolution::Unknown
        }
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn len(&self) -> usize {
        self.live.len()
    }

    pub fn children(&self) -> Vec<C> {
        self.live.values().cloned().collect()
    }

    pub fn drain(&mut self) -> Vec<C> {
        std::mem::take(&mut self.live).into_values().collect()
    }
}
