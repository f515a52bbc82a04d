//! Container side of suspend/resume for values with mutable identity.

use std::rc::{Rc, Weak};

use crate::dispatch::{execute, release_entry};
use crate::error::CollectionError;
use crate::event::EventKind;
use crate::frozen::{FreezeTarget, SuspendToken};
use crate::modification::{Modification, ModificationKind, Operands};
use crate::node::{element_operands, Node};
use crate::plan::Planner;

pub(crate) struct KeyTarget<K, V> {
    root: Weak<Node<K, V>>,
}

impl<K, V> KeyTarget<K, V> {
    pub(crate) fn new(root: Weak<Node<K, V>>) -> Self {
        Self { root }
    }
}

pub(crate) struct ValueTarget<K, V> {
    root: Weak<Node<K, V>>,
}

impl<K, V> ValueTarget<K, V> {
    pub(crate) fn new(root: Weak<Node<K, V>>) -> Self {
        Self { root }
    }
}

fn absent_is_none(
    result: Result<SuspendToken, CollectionError>,
) -> Result<Option<SuspendToken>, CollectionError> {
    match result {
        Ok(token) => Ok(Some(token)),
        Err(CollectionError::NoSuchElement) => Ok(None),
        Err(err) => Err(err),
    }
}

impl<K: Clone + 'static, V: Clone + 'static> FreezeTarget<K> for KeyTarget<K, V> {
    fn suspend_frozen(&self, key: &K) -> Result<Option<SuspendToken>, CollectionError> {
        match self.root.upgrade() {
            Some(root) => absent_is_none(suspend_key(&root, key)),
            None => Ok(None),
        }
    }

    fn resume_frozen(&self, token: SuspendToken) -> Result<(), CollectionError> {
        match self.root.upgrade() {
            Some(root) => resume(&root, token),
            None => Ok(()),
        }
    }
}

impl<K: Clone + 'static, V: Clone + 'static> FreezeTarget<V> for ValueTarget<K, V> {
    fn suspend_frozen(&self, value: &V) -> Result<Option<SuspendToken>, CollectionError> {
        match self.root.upgrade() {
            Some(root) => absent_is_none(suspend_value(&root, value)),
            None => Ok(None),
        }
    }

    fn resume_frozen(&self, token: SuspendToken) -> Result<(), CollectionError> {
        match self.root.upgrade() {
            Some(root) => resume(&root, token),
            None => Ok(()),
        }
    }
}

pub(crate) fn suspend_key<K, V>(root: &Rc<Node<K, V>>, key: &K) -> Result<SuspendToken, CollectionError>
where
    K: Clone + 'static,
    V: Clone + 'static,
{
    let (slot, nested) = {
        let store = root.shared.store.borrow();
        if !store.unique_keys() {
            return Err(CollectionError::Unsupported(
                "suspend needs a keyed or bidirectional container",
            ));
        }
        match store.find_suspended_key(key) {
            Some(slot) => (slot, true),
            None => (store.find_key(key).ok_or(CollectionError::NoSuchElement)?, false),
        }
    };
    suspend_slot(root, slot, nested, Operands::Element(key.clone()))
}

pub(crate) fn suspend_value<K, V>(root: &Rc<Node<K, V>>, value: &V) -> Result<SuspendToken, CollectionError>
where
    K: Clone + 'static,
    V: Clone + 'static,
{
    let (slot, nested) = {
        let store = root.shared.store.borrow();
        if store.value_eq().is_none() {
            return Err(CollectionError::Unsupported(
                "value suspend needs a bidirectional map",
            ));
        }
        match store.find_suspended_value(value) {
            Some(slot) => (slot, true),
            None => (store.find_value(value).ok_or(CollectionError::NoSuchElement)?, false),
        }
    };
    suspend_slot(root, slot, nested, Operands::Value(value.clone()))
}

fn suspend_slot<K, V>(
    root: &Rc<Node<K, V>>,
    slot: usize,
    nested: bool,
    operands: Operands<K, V>,
) -> Result<SuspendToken, CollectionError>
where
    K: Clone + 'static,
    V: Clone + 'static,
{
    if nested {
        let mut store = root.shared.store.borrow_mut();
        let stamp = store
            .deepen(slot)
            .ok_or(CollectionError::IllegalState("suspended slot vanished"))?;
        return Ok(SuspendToken {
            store: store.id(),
            slot,
            stamp,
        });
    }

    let plan = {
        let store = root.shared.store.borrow();
        let mut planner = Planner::new(&store);
        planner.suspend(slot);
        planner.finish()
    };
    execute(
        root,
        Modification::new(ModificationKind::SuspendForKeyMutation, operands),
        plan,
    )?;

    let store = root.shared.store.borrow();
    let stamp = store
        .suspension(slot)
        .map(|s| s.stamp)
        .ok_or(CollectionError::IllegalState("suspended slot vanished"))?;
    Ok(SuspendToken {
        store: store.id(),
        slot,
        stamp,
    })
}

/// Reattaches a suspended value. If the reattach is refused (rejection or
/// conflict) the value stays out of the container for good.
pub(crate) fn resume<K, V>(root: &Rc<Node<K, V>>, token: SuspendToken) -> Result<(), CollectionError>
where
    K: Clone + 'static,
    V: Clone + 'static,
{
    let slot = token.slot;
    {
        let mut store = root.shared.store.borrow_mut();
        if token.store != store.id() {
            return Err(CollectionError::IllegalState(
                "token belongs to another container",
            ));
        }
        match store.suspension(slot) {
            Some(s) if s.stamp == token.stamp => {}
            _ => return Err(CollectionError::IllegalState("token was already resumed")),
        }
        if store.shallow_release(slot) {
            return Ok(());
        }
    }

    let planned = {
        let store = root.shared.store.borrow();
        let entry = store.slot(slot);
        let operands = match root.kind() {
            EventKind::Entry => Operands::Entry {
                key: entry.key.clone(),
                value: entry.value.clone(),
            },
            kind => element_operands(kind, entry.key.clone(), entry.value.clone()),
        };
        let mut planner = Planner::new(&store);
        planner.reattach(slot).map(|()| (planner.finish(), operands))
    };
    let result = planned.and_then(|(plan, operands)| {
        execute(
            root,
            Modification::new(ModificationKind::ResumeForKeyMutation, operands),
            plan,
        )
    });

    if let Err(err) = result {
        tracing::warn!(error = %err, slot, "resume refused; value stays detached");
        let discarded = root.shared.store.borrow_mut().discard_suspended(slot);
        if let Some((key, value)) = discarded {
            release_entry(&root.shared, &key, &value);
        }
        return Err(err);
    }
    Ok(())
}
