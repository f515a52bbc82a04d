//! Two-phase listeners and the per-view registry that orders them.

use std::rc::Rc;

use indexmap::IndexMap;

use crate::error::{ListenerError, Rejection};
use crate::event::ElementEvent;

/// Receives the two notifications of every change a view reports.
///
/// `modifying` runs before anything is applied and may veto the whole
/// operation. `modified` runs after the commit and cannot undo it.
pub trait ElementListener<K, V> {
    fn modifying(&self, _event: &ElementEvent<K, V>) -> Result<(), Rejection> {
        Ok(())
    }

    fn modified(&self, _event: &ElementEvent<K, V>) -> Result<(), ListenerError> {
        Ok(())
    }
}

type ValidateFn<K, V> = dyn Fn(&ElementEvent<K, V>) -> Result<(), Rejection>;
type NotifyFn<K, V> = dyn Fn(&ElementEvent<K, V>);

/// The closed set of listener shapes a view accepts.
pub enum Listener<K, V> {
    /// Full two-phase observer.
    Observer(Rc<dyn ElementListener<K, V>>),
    /// Pre-phase only; may reject.
    Validator(Rc<ValidateFn<K, V>>),
    /// Post-phase only.
    Callback(Rc<NotifyFn<K, V>>),
}

impl<K, V> Clone for Listener<K, V> {
    fn clone(&self) -> Self {
        match self {
            Listener::Observer(l) => Listener::Observer(Rc::clone(l)),
            Listener::Validator(f) => Listener::Validator(Rc::clone(f)),
            Listener::Callback(f) => Listener::Callback(Rc::clone(f)),
        }
    }
}

impl<K, V> Listener<K, V> {
    pub fn validator<F>(f: F) -> Self
    where
        F: Fn(&ElementEvent<K, V>) -> Result<(), Rejection> + 'static,
    {
        Listener::Validator(Rc::new(f))
    }

    pub fn callback<F>(f: F) -> Self
    where
        F: Fn(&ElementEvent<K, V>) + 'static,
    {
        Listener::Callback(Rc::new(f))
    }

    pub(crate) fn modifying(&self, event: &ElementEvent<K, V>) -> Result<(), Rejection> {
        match self {
            Listener::Observer(l) => l.modifying(event),
            Listener::Validator(f) => f(event),
            Listener::Callback(_) => Ok(()),
        }
    }

    pub(crate) fn modified(&self, event: &ElementEvent<K, V>) -> Result<(), ListenerError> {
        match self {
            Listener::Observer(l) => l.modified(event),
            Listener::Validator(_) => Ok(()),
            Listener::Callback(f) => {
                f(event);
                Ok(())
            }
        }
    }
}

impl<K, V, L> From<Rc<L>> for Listener<K, V>
where
    L: ElementListener<K, V> + 'static,
{
    fn from(listener: Rc<L>) -> Self {
        Listener::Observer(listener)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

pub(crate) struct ListenerRegistry<K, V> {
    next_id: u64,
    entries: IndexMap<ListenerId, Listener<K, V>>,
}

impl<K, V> ListenerRegistry<K, V> {
    pub(crate) fn new() -> Self {
        Self {
            next_id: 1,
            entries: IndexMap::new(),
        }
    }

    pub(crate) fn add(&mut self, listener: Listener<K, V>) -> ListenerId {
        let id = ListenerId(self.next_id);
        self.next_id = self.next_id.saturating_add(1);
        self.entries.insert(id, listener);
        id
    }

    /// Keeps registration order of the remaining listeners.
    pub(crate) fn remove(&mut self, id: ListenerId) -> bool {
        self.entries.shift_remove(&id).is_some()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Copy of the current list, so listeners may (un)register during
    /// dispatch.
    pub(crate) fn snapshot(&self) -> Vec<Listener<K, V>> {
        self.entries.values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn removal_keeps_registration_order() {
        let mut reg = ListenerRegistry::<i32, ()>::new();
        let a = reg.add(Listener::callback(|_| {}));
        let b = reg.add(Listener::callback(|_| {}));
        let c = reg.add(Listener::callback(|_| {}));
        assert!(a < b && b < c);
        assert!(reg.remove(b));
        assert!(!reg.remove(b));
        assert_eq!(reg.entries.len(), 2);
        let ids: Vec<_> = reg.entries.keys().copied().collect();
        assert_eq!(ids, vec![a, c]);
    }
}
