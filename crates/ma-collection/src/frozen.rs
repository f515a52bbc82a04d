//! Freeze registrations for values whose hash, equality or order depends on
//! mutable fields.
//!
//! A comparator that reads such a field registers the container with the
//! value's [`FrozenContext`] from its `freeze` hook. Mutating the field then
//! goes through [`FrozenContext::mutate`] (or an explicit
//! `suspend`/`resume` pair), which takes the value out of every registered
//! container before the change and puts it back afterwards.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use crate::error::CollectionError;

/// Container side of a freeze registration.
pub(crate) trait FreezeTarget<T> {
    /// `Ok(None)` when the value is not (or no longer) stored.
    fn suspend_frozen(&self, value: &T) -> Result<Option<SuspendToken>, CollectionError>;

    fn resume_frozen(&self, token: SuspendToken) -> Result<(), CollectionError>;
}

/// Proof that a value is currently suspended in one container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SuspendToken {
    pub(crate) store: u64,
    pub(crate) slot: usize,
    pub(crate) stamp: u64,
}

/// Weak reference from a value to a container indexing it.
pub struct FreezeHandle<T> {
    target: Weak<dyn FreezeTarget<T>>,
}

impl<T> Clone for FreezeHandle<T> {
    fn clone(&self) -> Self {
        Self {
            target: Weak::clone(&self.target),
        }
    }
}

impl<T> fmt::Debug for FreezeHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FreezeHandle")
            .field("alive", &self.is_alive())
            .finish()
    }
}

impl<T> FreezeHandle<T> {
    pub(crate) fn new(target: &Rc<dyn FreezeTarget<T>>) -> Self {
        Self {
            target: Rc::downgrade(target),
        }
    }

    pub fn is_alive(&self) -> bool {
        self.target.strong_count() > 0
    }

    /// Two handles are equal when they point at the same container.
    pub fn same_container(&self, other: &Self) -> bool {
        Weak::ptr_eq(&self.target, &other.target)
    }

    fn upgrade(&self) -> Option<Rc<dyn FreezeTarget<T>>> {
        self.target.upgrade()
    }
}

struct Registration<T> {
    handle: FreezeHandle<T>,
    count: usize,
}

struct ContextState<T> {
    registrations: Vec<Registration<T>>,
    depth: usize,
    tokens: Vec<(FreezeHandle<T>, SuspendToken)>,
}

/// Per-field registry of the containers that index a value by that field.
pub struct FrozenContext<T> {
    state: RefCell<ContextState<T>>,
}

impl<T> Default for FrozenContext<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for FrozenContext<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("FrozenContext")
            .field("containers", &state.registrations.len())
            .field("depth", &state.depth)
            .finish()
    }
}

impl<T> FrozenContext<T> {
    pub fn new() -> Self {
        Self {
            state: RefCell::new(ContextState {
                registrations: Vec::new(),
                depth: 0,
                tokens: Vec::new(),
            }),
        }
    }

    /// Registers a container; call from a comparator's `freeze` hook.
    pub fn freeze(&self, handle: FreezeHandle<T>) {
        let mut state = self.state.borrow_mut();
        state.registrations.retain(|r| r.handle.is_alive());
        let existing = state
            .registrations
            .iter()
            .position(|r| r.handle.same_container(&handle));
        match existing {
            Some(pos) => state.registrations[pos].count += 1,
            None => state.registrations.push(Registration { handle, count: 1 }),
        }
    }

    /// Drops one registration; call from a comparator's `unfreeze` hook.
    pub fn unfreeze(&self, handle: &FreezeHandle<T>) {
        let mut state = self.state.borrow_mut();
        if let Some(pos) = state
            .registrations
            .iter()
            .position(|r| r.handle.same_container(handle))
        {
            state.registrations[pos].count -= 1;
            if state.registrations[pos].count == 0 {
                state.registrations.remove(pos);
            }
        }
    }

    /// Number of live containers currently registered.
    pub fn container_count(&self) -> usize {
        self.state
            .borrow()
            .registrations
            .iter()
            .filter(|r| r.handle.is_alive())
            .count()
    }

    pub fn is_suspended(&self) -> bool {
        self.state.borrow().depth > 0
    }

    /// Opens a bracket. Only the outermost bracket reaches the containers.
    ///
    /// If one container refuses, the containers already suspended by this
    /// call are resumed and the error is returned.
    pub fn suspend(&self, value: &T) -> Result<(), CollectionError> {
        let handles = {
            let mut state = self.state.borrow_mut();
            state.depth += 1;
            if state.depth > 1 {
                return Ok(());
            }
            state.registrations.retain(|r| r.handle.is_alive());
            state
                .registrations
                .iter()
                .map(|r| r.handle.clone())
                .collect::<Vec<_>>()
        };

        let mut tokens = Vec::with_capacity(handles.len());
        for handle in handles {
            let Some(target) = handle.upgrade() else {
                continue;
            };
            match target.suspend_frozen(value) {
                Ok(Some(token)) => tokens.push((handle, token)),
                Ok(None) => {}
                Err(err) => {
                    for (handle, token) in tokens.into_iter().rev() {
                        if let Some(target) = handle.upgrade() {
                            if let Err(undo) = target.resume_frozen(token) {
                                tracing::warn!(error = %undo, "failed to undo partial suspend");
                            }
                        }
                    }
                    self.state.borrow_mut().depth = 0;
                    return Err(err);
                }
            }
        }
        self.state.borrow_mut().tokens = tokens;
        Ok(())
    }

    /// Closes a bracket; the outermost close resumes every container.
    ///
    /// All containers are resumed even if one fails; the first failure is
    /// returned.
    pub fn resume(&self) -> Result<(), CollectionError> {
        let tokens = {
            let mut state = self.state.borrow_mut();
            if state.depth == 0 {
                return Err(CollectionError::IllegalState("resume without suspend"));
            }
            state.depth -= 1;
            if state.depth > 0 {
                return Ok(());
            }
            std::mem::take(&mut state.tokens)
        };

        let mut first_error = None;
        for (handle, token) in tokens {
            let Some(target) = handle.upgrade() else {
                continue;
            };
            if let Err(err) = target.resume_frozen(token) {
                tracing::warn!(error = %err, "container refused to resume a frozen value");
                first_error.get_or_insert(err);
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Runs `mutate` inside a suspend/resume bracket.
    pub fn mutate<R>(&self, value: &T, mutate: impl FnOnce() -> R) -> Result<R, CollectionError> {
        self.suspend(value)?;
        let out = mutate();
        self.resume()?;
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    struct Counting {
        suspended: Cell<usize>,
        resumed: Cell<usize>,
        refuse: bool,
    }

    impl FreezeTarget<i32> for Counting {
        fn suspend_frozen(&self, _value: &i32) -> Result<Option<SuspendToken>, CollectionError> {
            if self.refuse {
                return Err(CollectionError::NoSuchElement);
            }
            self.suspended.set(self.suspended.get() + 1);
            Ok(Some(SuspendToken {
                store: 0,
                slot: 0,
                stamp: 0,
            }))
        }

        fn resume_frozen(&self, _token: SuspendToken) -> Result<(), CollectionError> {
            self.resumed.set(self.resumed.get() + 1);
            Ok(())
        }
    }

    fn target(refuse: bool) -> (Rc<Counting>, Rc<dyn FreezeTarget<i32>>) {
        let counting = Rc::new(Counting {
            suspended: Cell::new(0),
            resumed: Cell::new(0),
            refuse,
        });
        let dyn_target: Rc<dyn FreezeTarget<i32>> = counting.clone();
        (counting, dyn_target)
    }

    #[test]
    fn nested_brackets_reach_containers_once() {
        let (counting, dyn_target) = target(false);
        let ctx = FrozenContext::new();
        ctx.freeze(FreezeHandle::new(&dyn_target));

        ctx.suspend(&1).unwrap();
        ctx.suspend(&1).unwrap();
        assert_eq!(counting.suspended.get(), 1);
        ctx.resume().unwrap();
        assert_eq!(counting.resumed.get(), 0);
        ctx.resume().unwrap();
        assert_eq!(counting.resumed.get(), 1);
        assert!(matches!(
            ctx.resume(),
            Err(CollectionError::IllegalState(_))
        ));
    }

    #[test]
    fn refusal_undoes_earlier_suspends() {
        let (ok, ok_target) = target(false);
        let (_bad, bad_target) = target(true);
        let ctx = FrozenContext::new();
        ctx.freeze(FreezeHandle::new(&ok_target));
        ctx.freeze(FreezeHandle::new(&bad_target));

        assert!(ctx.suspend(&1).is_err());
        assert_eq!(ok.suspended.get(), 1);
        assert_eq!(ok.resumed.get(), 1);
        assert!(!ctx.is_suspended());
    }

    #[test]
    fn dead_containers_are_pruned() {
        let ctx = FrozenContext::new();
        {
            let (_counting, dyn_target) = target(false);
            ctx.freeze(FreezeHandle::new(&dyn_target));
            assert_eq!(ctx.container_count(), 1);
        }
        assert_eq!(ctx.container_count(), 0);
        ctx.mutate(&1, || ()).unwrap();
    }

    #[test]
    fn registrations_are_counted_per_container() {
        let (_counting, dyn_target) = target(false);
        let handle = FreezeHandle::new(&dyn_target);
        let ctx = FrozenContext::new();
        ctx.freeze(handle.clone());
        ctx.freeze(handle.clone());
        ctx.unfreeze(&handle);
        assert_eq!(ctx.container_count(), 1);
        ctx.unfreeze(&handle);
        assert_eq!(ctx.container_count(), 0);
    }
}
