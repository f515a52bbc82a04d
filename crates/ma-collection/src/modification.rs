//! Modification descriptors.
//!
//! One descriptor is built per caller-level operation and shared (`Rc`) by
//! every event that operation produces. Descriptors compare by identity:
//! two structurally equal requests made by two calls never coalesce.

use std::cell::Cell;
use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModificationKind {
    Insert,
    Remove,
    RemoveAt,
    ReplaceAt,
    Clear,
    InsertAll,
    RemoveAll,
    RetainAll,
    PutAll,
    PutOne,
    EntrySetValue,
    IteratorRemove,
    IteratorReplace,
    SuspendForKeyMutation,
    ResumeForKeyMutation,
}

/// Lifecycle of one in-flight modification.
///
/// `Proposed -> Committed -> Notified`, or `Proposed -> Aborted` when a
/// `modifying` listener rejects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModificationState {
    Proposed,
    Committed,
    Notified,
    Aborted,
}

/// Operands of a modification, in the coordinates of the view it was
/// issued through.
#[derive(Debug, Clone, PartialEq)]
pub enum Operands<K, V> {
    None,
    Index(usize),
    Element(K),
    IndexedElement { index: usize, element: K },
    Elements(Vec<K>),
    IndexedElements { index: usize, elements: Vec<K> },
    Entry { key: K, value: V },
    Entries(Vec<(K, V)>),
    Value(V),
    Values(Vec<V>),
}

#[derive(Debug)]
pub struct Modification<K, V> {
    kind: ModificationKind,
    operands: Operands<K, V>,
    state: Cell<ModificationState>,
}

impl<K, V> Modification<K, V> {
    pub(crate) fn new(kind: ModificationKind, operands: Operands<K, V>) -> Rc<Self> {
        Rc::new(Self {
            kind,
            operands,
            state: Cell::new(ModificationState::Proposed),
        })
    }

    pub fn kind(&self) -> ModificationKind {
        self.kind
    }

    pub fn operands(&self) -> &Operands<K, V> {
        &self.operands
    }

    pub fn state(&self) -> ModificationState {
        self.state.get()
    }

    pub(crate) fn transition(&self, next: ModificationState) {
        self.state.set(next);
    }

    /// Identity comparison; the only equality descriptors have.
    pub fn same(a: &Rc<Self>, b: &Rc<Self>) -> bool {
        Rc::ptr_eq(a, b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_operands_are_still_distinct_modifications() {
        let a = Modification::<i32, ()>::new(ModificationKind::Insert, Operands::Element(1));
        let b = Modification::<i32, ()>::new(ModificationKind::Insert, Operands::Element(1));
        assert_eq!(a.operands(), b.operands());
        assert!(!Modification::same(&a, &b));
        assert!(Modification::same(&a, &Rc::clone(&a)));
    }

    #[test]
    fn starts_proposed() {
        let m = Modification::<i32, ()>::new(ModificationKind::Clear, Operands::None);
        assert_eq!(m.state(), ModificationState::Proposed);
        m.transition(ModificationState::Aborted);
        assert_eq!(m.state(), ModificationState::Aborted);
    }
}
