//! Equality and ordering strategies used by hashed and ordered containers.
//!
//! Both traits carry optional `freeze`/`unfreeze` hooks. A comparator that
//! reads mutable fields of the value implements them to register the
//! container with the value's [`FrozenContext`](crate::FrozenContext), so
//! that mutating those fields later suspends and resumes the value in every
//! index that depends on them.

use std::cmp::Ordering;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::rc::Rc;

use rustc_hash::FxHasher;

use crate::frozen::FreezeHandle;

pub trait EqualityComparator<T> {
    fn hash(&self, value: &T) -> u64;

    fn equals(&self, a: &T, b: &T) -> bool;

    /// Called after `value` was attached to a container indexing it with
    /// this comparator.
    fn freeze(&self, _value: &T, _handle: FreezeHandle<T>) {}

    /// Called after `value` was detached from such a container.
    fn unfreeze(&self, _value: &T, _handle: &FreezeHandle<T>) {}
}

pub trait OrderComparator<T> {
    fn compare(&self, a: &T, b: &T) -> Ordering;

    fn freeze(&self, _value: &T, _handle: FreezeHandle<T>) {}

    fn unfreeze(&self, _value: &T, _handle: &FreezeHandle<T>) {}
}

/// Equality through `Hash + Eq`.
pub struct DefaultEquality<T>(PhantomData<fn(&T)>);

impl<T> DefaultEquality<T> {
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<T> Default for DefaultEquality<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Hash + Eq> EqualityComparator<T> for DefaultEquality<T> {
    fn hash(&self, value: &T) -> u64 {
        fx_hash(value)
    }

    fn equals(&self, a: &T, b: &T) -> bool {
        a == b
    }
}

/// Ordering through `Ord`.
pub struct NaturalOrder<T>(PhantomData<fn(&T)>);

impl<T> NaturalOrder<T> {
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<T> Default for NaturalOrder<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Ord> OrderComparator<T> for NaturalOrder<T> {
    fn compare(&self, a: &T, b: &T) -> Ordering {
        a.cmp(b)
    }
}

/// Adapts a plain closure into an [`OrderComparator`] without freeze hooks.
pub struct FnOrder<F>(pub F);

impl<T, F> OrderComparator<T> for FnOrder<F>
where
    F: Fn(&T, &T) -> Ordering,
{
    fn compare(&self, a: &T, b: &T) -> Ordering {
        (self.0)(a, b)
    }
}

/// How a set or map indexes its keys.
pub enum KeyIndex<K> {
    /// Hash index, iteration in insertion order.
    Hashed(Rc<dyn EqualityComparator<K>>),
    /// Sorted order; enables navigable views.
    Ordered(Rc<dyn OrderComparator<K>>),
}

impl<K> Clone for KeyIndex<K> {
    fn clone(&self) -> Self {
        match self {
            KeyIndex::Hashed(eq) => KeyIndex::Hashed(Rc::clone(eq)),
            KeyIndex::Ordered(cmp) => KeyIndex::Ordered(Rc::clone(cmp)),
        }
    }
}

impl<K: Hash + Eq + 'static> KeyIndex<K> {
    pub fn hashed() -> Self {
        KeyIndex::Hashed(Rc::new(DefaultEquality::new()))
    }
}

impl<K: Ord + 'static> KeyIndex<K> {
    pub fn ordered() -> Self {
        KeyIndex::Ordered(Rc::new(NaturalOrder::new()))
    }
}

pub(crate) fn fx_hash<T: Hash + ?Sized>(value: &T) -> u64 {
    let mut hasher = FxHasher::default();
    value.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_equality_agrees_with_eq() {
        let eq = DefaultEquality::<&str>::new();
        assert!(eq.equals(&"a", &"a"));
        assert!(!eq.equals(&"a", &"b"));
        assert_eq!(eq.hash(&"a"), eq.hash(&"a"));
    }

    #[test]
    fn fn_order_wraps_closures() {
        let by_len = FnOrder(|a: &String, b: &String| a.len().cmp(&b.len()));
        assert_eq!(
            by_len.compare(&"aa".to_string(), &"b".to_string()),
            Ordering::Greater
        );
    }
}
