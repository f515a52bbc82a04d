//! Forward iterators over set, map and value views.

use std::rc::Rc;

use crate::error::CollectionError;
use crate::modification::{ModificationKind, Operands};
use crate::node::{element_operands, Node};
use crate::ops;

/// Iterator view yielding projections of the visible entries.
///
/// Removing through the iterator keeps it usable; any other change to the
/// container makes the next call fail with [`CollectionError::StaleView`].
pub struct ViewIter<K, V, T> {
    node: Rc<Node<K, V>>,
    cursor: usize,
    last: Option<usize>,
    failed: bool,
    project: fn(&K, &V) -> T,
}

pub type SetIter<K, V = ()> = ViewIter<K, V, K>;
pub type EntryIter<K, V> = ViewIter<K, V, (K, V)>;
pub type ValueIter<K, V> = ViewIter<K, V, V>;

impl<K: Clone + 'static, V: Clone + 'static, T> ViewIter<K, V, T> {
    pub(crate) fn new(node: Rc<Node<K, V>>, project: fn(&K, &V) -> T) -> Self {
        Self {
            node,
            cursor: 0,
            last: None,
            failed: false,
            project,
        }
    }

    /// Removes the entry last returned by `next`.
    pub fn remove(&mut self) -> Result<(), CollectionError> {
        let slot = self
            .last
            .ok_or(CollectionError::IllegalState("remove without next"))?;
        self.node.check_fresh()?;
        let operands = {
            let store = self.node.shared.store.borrow();
            let entry = store.slot(slot);
            element_operands(self.node.kind(), entry.key.clone(), entry.value.clone())
        };
        ops::modify(
            &self.node,
            ModificationKind::IteratorRemove,
            operands,
            |planner, _| {
                planner.remove(slot);
                Ok(())
            },
        )?;
        self.cursor -= 1;
        self.last = None;
        Ok(())
    }
}

impl<K: Clone + 'static, V: Clone + 'static> ViewIter<K, V, (K, V)> {
    /// Replaces the value of the entry last returned by `next`.
    pub fn set_value(&mut self, value: V) -> Result<V, CollectionError> {
        let slot = self
            .last
            .ok_or(CollectionError::IllegalState("set_value without next"))?;
        self.node.check_fresh()?;
        let (key, old) = {
            let store = self.node.shared.store.borrow();
            let entry = store.slot(slot);
            (entry.key.clone(), entry.value.clone())
        };
        let operands = Operands::Entry {
            key: key.clone(),
            value: value.clone(),
        };
        ops::modify(
            &self.node,
            ModificationKind::IteratorReplace,
            operands,
            |planner, _| planner.put(key, value),
        )?;
        let store = self.node.shared.store.borrow();
        if let Some(local) = self.node.local_position(&store, slot) {
            self.cursor = local + 1;
        }
        Ok(old)
    }
}

impl<K: Clone + 'static, V: Clone + 'static, T> Iterator for ViewIter<K, V, T> {
    type Item = Result<T, CollectionError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        if let Err(err) = self.node.check_fresh() {
            self.failed = true;
            return Some(Err(err));
        }
        let store = self.node.shared.store.borrow();
        let slot = self.node.visible_at(&store, self.cursor)?;
        let entry = store.slot(slot);
        self.cursor += 1;
        self.last = Some(slot);
        Some(Ok((self.project)(&entry.key, &entry.value)))
    }
}
