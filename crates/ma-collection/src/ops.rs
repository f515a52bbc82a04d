//! Building blocks shared by the container and view handles.

use std::rc::Rc;

use crate::dispatch::{execute, Outcome};
use crate::error::{CollectionError, InvariantViolation};
use crate::modification::{Modification, ModificationKind, Operands};
use crate::node::Node;
use crate::plan::Planner;
use crate::store::{Slot, Store, StoreStats};

/// Plans one modification through `node` and dispatches it.
pub(crate) fn modify<K, V, T>(
    node: &Rc<Node<K, V>>,
    kind: ModificationKind,
    operands: Operands<K, V>,
    build: impl FnOnce(&mut Planner<'_, K, V>, &Store<K, V>) -> Result<T, CollectionError>,
) -> Result<(T, Outcome), CollectionError>
where
    K: Clone + 'static,
    V: Clone + 'static,
{
    node.check_fresh()?;
    let (result, plan) = {
        let store = node.shared.store.borrow();
        let mut planner = Planner::new(&store);
        let result = build(&mut planner, &store)?;
        (result, planner.finish())
    };
    let outcome = execute(node, Modification::new(kind, operands), plan)?;
    Ok((result, outcome))
}

/// Removes every visible slot matching `pred`; returns how many went.
pub(crate) fn remove_matching<K, V>(
    node: &Rc<Node<K, V>>,
    kind: ModificationKind,
    operands: Operands<K, V>,
    pred: impl Fn(&Store<K, V>, &Slot<K, V>) -> bool,
) -> Result<usize, CollectionError>
where
    K: Clone + 'static,
    V: Clone + 'static,
{
    let (count, _) = modify(node, kind, operands, |planner, store| {
        let mut count = 0;
        for slot in node.visible_slots(store) {
            if pred(store, store.slot(slot)) {
                planner.remove(slot);
                count += 1;
            }
        }
        Ok(count)
    })?;
    Ok(count)
}

pub(crate) fn clear<K, V>(node: &Rc<Node<K, V>>) -> Result<(), CollectionError>
where
    K: Clone + 'static,
    V: Clone + 'static,
{
    remove_matching(node, ModificationKind::Clear, Operands::None, |_, _| true).map(|_| ())
}

/// Projects the visible slots in view order.
pub(crate) fn collect<K, V, T>(
    node: &Node<K, V>,
    project: impl Fn(&Slot<K, V>) -> T,
) -> Result<Vec<T>, CollectionError> {
    node.check_fresh()?;
    let store = node.shared.store.borrow();
    Ok(node
        .visible_slots(&store)
        .into_iter()
        .map(|slot| project(store.slot(slot)))
        .collect())
}

pub(crate) fn len<K, V>(node: &Node<K, V>) -> Result<usize, CollectionError> {
    node.check_fresh()?;
    let store = node.shared.store.borrow();
    Ok(node.visible_len(&store))
}

/// Visible slot at a local index.
pub(crate) fn nth<K, V, T>(
    node: &Node<K, V>,
    index: usize,
    project: impl FnOnce(&Slot<K, V>) -> T,
) -> Result<Option<T>, CollectionError> {
    node.check_fresh()?;
    let store = node.shared.store.borrow();
    Ok(node
        .visible_at(&store, index)
        .map(|slot| project(store.slot(slot))))
}

pub(crate) fn integrity<K, V>(node: &Node<K, V>) -> Result<(), InvariantViolation> {
    node.shared.store.borrow().integrity()
}

pub(crate) fn stats<K, V>(node: &Node<K, V>) -> StoreStats {
    node.shared.store.borrow().stats()
}
