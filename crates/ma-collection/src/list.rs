//! Sequence containers, their sub-ranges and positional iterators.

use std::hash::Hash;
use std::rc::Rc;

use crate::comparator::{DefaultEquality, EqualityComparator};
use crate::dispatch::Outcome;
use crate::error::{CollectionError, InvariantViolation};
use crate::event::EventKind;
use crate::frozen::SuspendToken;
use crate::listener::{Listener, ListenerId};
use crate::modification::{ModificationKind, Operands};
use crate::node::{Derivation, Node};
use crate::ops;
use crate::options::CollectionOptions;
use crate::store::{Keying, Store, StoreStats};
use crate::suspend;
use crate::view_info::ViewInfo;

type ListNode<E> = Rc<Node<E, ()>>;

/// A mutation-aware list.
///
/// Every structural change is announced to the listeners of the view it was
/// issued through and of each ancestor, before (`modifying`) and after
/// (`modified`) it is applied. A bidirectional list holds no two equal
/// elements: inserting an element that is already present detaches the old
/// occurrence first.
pub struct MaList<E> {
    node: ListNode<E>,
}

impl<E> Clone for MaList<E> {
    fn clone(&self) -> Self {
        Self {
            node: Rc::clone(&self.node),
        }
    }
}

impl<E: Clone + PartialEq + 'static> Default for MaList<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Clone + PartialEq + 'static> MaList<E> {
    pub fn new() -> Self {
        Self::from_store(Store::new(
            Keying::Sequence(None),
            None,
            CollectionOptions::default(),
        ))
    }

    /// Bidirectional list using `eq` for its element index.
    pub fn bidi_with(eq: Rc<dyn EqualityComparator<E>>, options: CollectionOptions) -> Self {
        Self::from_store(Store::new(Keying::Sequence(Some(eq)), None, options))
    }

    fn from_store(store: Store<E, ()>) -> Self {
        Self {
            node: Node::root(store, EventKind::Element),
        }
    }

    pub fn len(&self) -> usize {
        self.node.shared.store.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, index: usize) -> Option<E> {
        let store = self.node.shared.store.borrow();
        store.order().get(index).map(|&s| store.slot(s).key.clone())
    }

    pub fn to_vec(&self) -> Vec<E> {
        let store = self.node.shared.store.borrow();
        store
            .order()
            .iter()
            .map(|&s| store.slot(s).key.clone())
            .collect()
    }

    pub fn contains(&self, element: &E) -> bool {
        self.index_of(element).is_some()
    }

    pub fn index_of(&self, element: &E) -> Option<usize> {
        let store = self.node.shared.store.borrow();
        store
            .order()
            .iter()
            .position(|&s| store.slot(s).key == *element)
    }

    /// Position of `element` through the element index (bidirectional lists
    /// only).
    pub fn inverse_lookup(&self, element: &E) -> Option<usize> {
        let store = self.node.shared.store.borrow();
        store
            .find_key(element)
            .and_then(|slot| store.position_of(slot))
    }

    pub fn push(&self, element: E) -> Result<(), CollectionError> {
        push(&self.node, element)
    }

    pub fn insert(&self, index: usize, element: E) -> Result<(), CollectionError> {
        insert(&self.node, index, element)
    }

    pub fn insert_all(&self, index: usize, elements: Vec<E>) -> Result<(), CollectionError> {
        insert_all(&self.node, index, elements)
    }

    pub fn extend(&self, elements: impl IntoIterator<Item = E>) -> Result<(), CollectionError> {
        insert_all(&self.node, self.len(), elements.into_iter().collect())
    }

    /// Replaces the element at `index`, returning the previous one.
    pub fn set(&self, index: usize, element: E) -> Result<E, CollectionError> {
        set(&self.node, index, element).map(|(old, _)| old)
    }

    pub fn remove_at(&self, index: usize) -> Result<E, CollectionError> {
        remove_at(&self.node, index).map(|(old, _)| old)
    }

    /// Removes the first element equal to `element`.
    pub fn remove(&self, element: &E) -> Result<bool, CollectionError> {
        remove(&self.node, element)
    }

    pub fn remove_all(&self, elements: &[E]) -> Result<usize, CollectionError> {
        remove_all(&self.node, elements)
    }

    pub fn retain_all(&self, elements: &[E]) -> Result<usize, CollectionError> {
        retain_all(&self.node, elements)
    }

    pub fn clear(&self) -> Result<(), CollectionError> {
        ops::clear(&self.node)
    }

    /// View of `[from, to)`. Changes made through it reach this list's
    /// listeners; changes made around it make it stale.
    pub fn sub_list(&self, from: usize, to: usize) -> Result<SubList<E>, CollectionError> {
        sub_list(&self.node, from, to)
    }

    pub fn list_iter(&self, index: usize) -> Result<ListIter<E>, CollectionError> {
        ListIter::positional(&self.node, index)
    }

    pub fn iter(&self) -> ListIter<E> {
        ListIter::start(&self.node)
    }

    /// Detaches `element` while a field its equality depends on changes.
    pub fn suspend(&self, element: &E) -> Result<SuspendToken, CollectionError> {
        suspend::suspend_key(&self.node, element)
    }

    pub fn resume(&self, token: SuspendToken) -> Result<(), CollectionError> {
        suspend::resume(&self.node, token)
    }

    pub fn add_listener(&self, listener: impl Into<Listener<E, ()>>) -> ListenerId {
        self.node.add_listener(listener.into())
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.node.remove_listener(id)
    }

    pub fn view_info(&self) -> Option<ViewInfo<E>> {
        self.node.info().cloned()
    }

    pub fn integrity(&self) -> Result<(), InvariantViolation> {
        ops::integrity(&self.node)
    }

    pub fn debug_stats(&self) -> StoreStats {
        ops::stats(&self.node)
    }
}

impl<E: Clone + PartialEq + Hash + Eq + 'static> MaList<E> {
    pub fn bidi() -> Self {
        Self::with_options(CollectionOptions::bidi())
    }

    pub fn with_options(options: CollectionOptions) -> Self {
        let eq: Option<Rc<dyn EqualityComparator<E>>> = options
            .is_bidi()
            .then(|| Rc::new(DefaultEquality::new()) as Rc<dyn EqualityComparator<E>>);
        Self::from_store(Store::new(Keying::Sequence(eq), None, options))
    }
}

/// A `[from, to)` window onto a list or onto another sub-list.
///
/// Reads and writes fail with [`CollectionError::StaleView`] once the
/// backing list changed through any path that does not go through this view.
pub struct SubList<E> {
    node: ListNode<E>,
}

impl<E> Clone for SubList<E> {
    fn clone(&self) -> Self {
        Self {
            node: Rc::clone(&self.node),
        }
    }
}

impl<E: Clone + PartialEq + 'static> SubList<E> {
    pub fn len(&self) -> Result<usize, CollectionError> {
        ops::len(&self.node)
    }

    pub fn is_empty(&self) -> Result<bool, CollectionError> {
        self.len().map(|len| len == 0)
    }

    pub fn get(&self, index: usize) -> Result<Option<E>, CollectionError> {
        ops::nth(&self.node, index, |s| s.key.clone())
    }

    pub fn to_vec(&self) -> Result<Vec<E>, CollectionError> {
        ops::collect(&self.node, |s| s.key.clone())
    }

    pub fn contains(&self, element: &E) -> Result<bool, CollectionError> {
        self.index_of(element).map(|i| i.is_some())
    }

    pub fn index_of(&self, element: &E) -> Result<Option<usize>, CollectionError> {
        self.node.check_fresh()?;
        let store = self.node.shared.store.borrow();
        Ok(self
            .node
            .visible_slots(&store)
            .into_iter()
            .position(|s| store.slot(s).key == *element))
    }

    pub fn push(&self, element: E) -> Result<(), CollectionError> {
        push(&self.node, element)
    }

    pub fn insert(&self, index: usize, element: E) -> Result<(), CollectionError> {
        insert(&self.node, index, element)
    }

    pub fn insert_all(&self, index: usize, elements: Vec<E>) -> Result<(), CollectionError> {
        insert_all(&self.node, index, elements)
    }

    pub fn extend(&self, elements: impl IntoIterator<Item = E>) -> Result<(), CollectionError> {
        let len = self.len()?;
        insert_all(&self.node, len, elements.into_iter().collect())
    }

    pub fn set(&self, index: usize, element: E) -> Result<E, CollectionError> {
        set(&self.node, index, element).map(|(old, _)| old)
    }

    pub fn remove_at(&self, index: usize) -> Result<E, CollectionError> {
        remove_at(&self.node, index).map(|(old, _)| old)
    }

    pub fn remove(&self, element: &E) -> Result<bool, CollectionError> {
        remove(&self.node, element)
    }

    pub fn remove_all(&self, elements: &[E]) -> Result<usize, CollectionError> {
        remove_all(&self.node, elements)
    }

    pub fn retain_all(&self, elements: &[E]) -> Result<usize, CollectionError> {
        retain_all(&self.node, elements)
    }

    pub fn clear(&self) -> Result<(), CollectionError> {
        ops::clear(&self.node)
    }

    pub fn sub_list(&self, from: usize, to: usize) -> Result<SubList<E>, CollectionError> {
        sub_list(&self.node, from, to)
    }

    pub fn list_iter(&self, index: usize) -> Result<ListIter<E>, CollectionError> {
        ListIter::positional(&self.node, index)
    }

    pub fn iter(&self) -> Result<ListIter<E>, CollectionError> {
        self.node.check_fresh()?;
        Ok(ListIter::start(&self.node))
    }

    pub fn add_listener(&self, listener: impl Into<Listener<E, ()>>) -> ListenerId {
        self.node.add_listener(listener.into())
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.node.remove_listener(id)
    }

    pub fn view_info(&self) -> Option<ViewInfo<E>> {
        self.node.info().cloned()
    }
}

fn push<E: Clone + 'static>(node: &ListNode<E>, element: E) -> Result<(), CollectionError> {
    let index = ops::len(node)?;
    insert(node, index, element)
}

fn insert<E: Clone + 'static>(
    node: &ListNode<E>,
    index: usize,
    element: E,
) -> Result<(), CollectionError> {
    let operands = Operands::IndexedElement {
        index,
        element: element.clone(),
    };
    insert_elements(node, ModificationKind::Insert, operands, index, vec![element]).map(|_| ())
}

fn insert_all<E: Clone + 'static>(
    node: &ListNode<E>,
    index: usize,
    elements: Vec<E>,
) -> Result<(), CollectionError> {
    let operands = Operands::IndexedElements {
        index,
        elements: elements.clone(),
    };
    insert_elements(node, ModificationKind::InsertAll, operands, index, elements).map(|_| ())
}

fn insert_elements<E: Clone + 'static>(
    node: &ListNode<E>,
    kind: ModificationKind,
    operands: Operands<E, ()>,
    index: usize,
    elements: Vec<E>,
) -> Result<Outcome, CollectionError> {
    ops::modify(node, kind, operands, |planner, store| {
        let len = node.visible_len(store);
        if index > len {
            return Err(CollectionError::OutOfBounds { index, len });
        }
        let (offset, _) = node.window(store);
        let mut at = offset + index;
        for element in elements {
            at = planner.insert(element, (), Some(at))? + 1;
        }
        Ok(())
    })
    .map(|((), outcome)| outcome)
}

fn set<E: Clone + 'static>(
    node: &ListNode<E>,
    index: usize,
    element: E,
) -> Result<(E, Outcome), CollectionError> {
    let operands = Operands::IndexedElement {
        index,
        element: element.clone(),
    };
    ops::modify(node, ModificationKind::ReplaceAt, operands, |planner, store| {
        let len = node.visible_len(store);
        let slot = node
            .visible_at(store, index)
            .ok_or(CollectionError::OutOfBounds { index, len })?;
        let old = store.slot(slot).key.clone();
        planner.replace_at(slot, element, ())?;
        Ok(old)
    })
}

fn remove_at<E: Clone + 'static>(
    node: &ListNode<E>,
    index: usize,
) -> Result<(E, Outcome), CollectionError> {
    ops::modify(node, ModificationKind::RemoveAt, Operands::Index(index), |planner, store| {
        let len = node.visible_len(store);
        let slot = node
            .visible_at(store, index)
            .ok_or(CollectionError::OutOfBounds { index, len })?;
        planner.remove(slot);
        Ok(store.slot(slot).key.clone())
    })
}

fn remove<E: Clone + PartialEq + 'static>(
    node: &ListNode<E>,
    element: &E,
) -> Result<bool, CollectionError> {
    let operands = Operands::Element(element.clone());
    ops::modify(node, ModificationKind::Remove, operands, |planner, store| {
        let hit = node
            .visible_slots(store)
            .into_iter()
            .find(|&s| store.slot(s).key == *element);
        if let Some(slot) = hit {
            planner.remove(slot);
        }
        Ok(hit.is_some())
    })
    .map(|(removed, _)| removed)
}

fn remove_all<E: Clone + PartialEq + 'static>(
    node: &ListNode<E>,
    elements: &[E],
) -> Result<usize, CollectionError> {
    ops::remove_matching(
        node,
        ModificationKind::RemoveAll,
        Operands::Elements(elements.to_vec()),
        |_, slot| elements.contains(&slot.key),
    )
}

fn retain_all<E: Clone + PartialEq + 'static>(
    node: &ListNode<E>,
    elements: &[E],
) -> Result<usize, CollectionError> {
    ops::remove_matching(
        node,
        ModificationKind::RetainAll,
        Operands::Elements(elements.to_vec()),
        |_, slot| !elements.contains(&slot.key),
    )
}

fn sub_list<E: Clone + 'static>(
    node: &ListNode<E>,
    from: usize,
    to: usize,
) -> Result<SubList<E>, CollectionError> {
    node.check_fresh()?;
    let offset = {
        let store = node.shared.store.borrow();
        let len = node.visible_len(&store);
        if to > len {
            return Err(CollectionError::OutOfBounds { index: to, len });
        }
        if from > to {
            return Err(CollectionError::OutOfBounds { index: from, len: to });
        }
        node.window(&store).0
    };
    let derivation = Derivation::new(ViewInfo::SubRange { from, to }).window(offset + from, to - from);
    Ok(SubList {
        node: node.derive(derivation),
    })
}

/// Bidirectional cursor over a list or sub-list.
///
/// The cursor sits between two elements. `remove` and `set` act on the
/// element last returned by `next` or `previous`; `add` inserts before the
/// cursor. Once the list changes through another path every call fails with
/// [`CollectionError::StaleView`]; as an [`Iterator`] it yields that error
/// once and then ends.
pub struct ListIter<E> {
    node: ListNode<E>,
    cursor: usize,
    last: Option<usize>,
    failed: bool,
}

impl<E: Clone + 'static> ListIter<E> {
    fn start(parent: &ListNode<E>) -> Self {
        Self {
            node: parent.derive(Derivation::new(ViewInfo::Iterator)),
            cursor: 0,
            last: None,
            failed: false,
        }
    }

    fn positional(parent: &ListNode<E>, index: usize) -> Result<Self, CollectionError> {
        let len = ops::len(parent)?;
        if index > len {
            return Err(CollectionError::OutOfBounds { index, len });
        }
        Ok(Self {
            node: parent.derive(Derivation::new(ViewInfo::PositionalIterator { index })),
            cursor: index,
            last: None,
            failed: false,
        })
    }

    pub fn has_next(&self) -> Result<bool, CollectionError> {
        Ok(self.cursor < ops::len(&self.node)?)
    }

    pub fn has_previous(&self) -> bool {
        self.cursor > 0
    }

    pub fn next_index(&self) -> usize {
        self.cursor
    }

    pub fn previous_index(&self) -> Option<usize> {
        self.cursor.checked_sub(1)
    }

    pub fn previous(&mut self) -> Result<E, CollectionError> {
        self.node.check_fresh()?;
        let index = self
            .cursor
            .checked_sub(1)
            .ok_or(CollectionError::NoSuchElement)?;
        let element = ops::nth(&self.node, index, |s| s.key.clone())?
            .ok_or(CollectionError::NoSuchElement)?;
        self.cursor = index;
        self.last = Some(index);
        Ok(element)
    }

    /// Removes the element last returned.
    pub fn remove(&mut self) -> Result<(), CollectionError> {
        let index = self
            .last
            .ok_or(CollectionError::IllegalState("remove without next or previous"))?;
        let offset = self.offset();
        let (_, outcome) = ops::modify(
            &self.node,
            ModificationKind::IteratorRemove,
            Operands::Index(index),
            |planner, store| {
                let len = self.node.visible_len(store);
                let slot = self
                    .node
                    .visible_at(store, index)
                    .ok_or(CollectionError::OutOfBounds { index, len })?;
                planner.remove(slot);
                Ok(())
            },
        )?;
        self.cursor = self.realign(offset, self.cursor, &outcome);
        self.last = None;
        Ok(())
    }

    /// Replaces the element last returned.
    pub fn set(&mut self, element: E) -> Result<(), CollectionError> {
        let index = self
            .last
            .ok_or(CollectionError::IllegalState("set without next or previous"))?;
        let offset = self.offset();
        let operands = Operands::IndexedElement {
            index,
            element: element.clone(),
        };
        let (_, outcome) = ops::modify(
            &self.node,
            ModificationKind::IteratorReplace,
            operands,
            |planner, store| {
                let len = self.node.visible_len(store);
                let slot = self
                    .node
                    .visible_at(store, index)
                    .ok_or(CollectionError::OutOfBounds { index, len })?;
                planner.replace_at(slot, element, ())
            },
        )?;
        self.cursor = self.realign(offset, self.cursor, &outcome);
        self.last = Some(self.realign(offset, index, &outcome));
        Ok(())
    }

    /// Inserts before the cursor; the cursor ends up after the new element.
    pub fn add(&mut self, element: E) -> Result<(), CollectionError> {
        let index = self.cursor;
        let offset = self.offset();
        let operands = Operands::IndexedElement {
            index,
            element: element.clone(),
        };
        let outcome = insert_elements(
            &self.node,
            ModificationKind::Insert,
            operands,
            index,
            vec![element],
        )?;
        self.cursor = match outcome.attached.first() {
            Some(&root) => (root + 1).saturating_sub(self.offset()),
            None => self.realign(offset, self.cursor, &outcome),
        };
        self.last = None;
        Ok(())
    }

    fn offset(&self) -> usize {
        let store = self.node.shared.store.borrow();
        self.node.window(&store).0
    }

    /// Maps a local index taken before a change to its index afterwards.
    fn realign(&self, offset_before: usize, local: usize, outcome: &Outcome) -> usize {
        let root = offset_before + local;
        let shifted = outcome.detached.iter().filter(|&&p| p < root).count();
        (root - shifted).saturating_sub(self.offset())
    }
}

impl<E: Clone + 'static> Iterator for ListIter<E> {
    type Item = Result<E, CollectionError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        match ops::nth(&self.node, self.cursor, |s| s.key.clone()) {
            Ok(Some(element)) => {
                self.last = Some(self.cursor);
                self.cursor += 1;
                Some(Ok(element))
            }
            Ok(None) => None,
            Err(err) => {
                self.failed = true;
                Some(Err(err))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iterator_remove_keeps_cursor_on_following_element() {
        let list = MaList::new();
        list.extend([1, 2, 3, 4]).unwrap();
        let mut it = list.iter();
        assert_eq!(it.next(), Some(Ok(1)));
        assert_eq!(it.next(), Some(Ok(2)));
        it.remove().unwrap();
        assert_eq!(it.next(), Some(Ok(3)));
        assert_eq!(list.to_vec(), vec![1, 3, 4]);
    }

    #[test]
    fn iterator_add_on_bidi_list_moves_duplicate() {
        let list = MaList::bidi();
        list.extend([1, 2, 3]).unwrap();
        let mut it = list.list_iter(2).unwrap();
        it.add(1).unwrap();
        assert_eq!(list.to_vec(), vec![2, 1, 3]);
        assert_eq!(it.next(), Some(Ok(3)));
    }

    #[test]
    fn sub_list_bounds_are_checked() {
        let list = MaList::new();
        list.extend([1, 2, 3]).unwrap();
        assert_eq!(
            list.sub_list(1, 4).err(),
            Some(CollectionError::OutOfBounds { index: 4, len: 3 })
        );
        assert!(list.sub_list(3, 3).unwrap().is_empty().unwrap());
    }
}
