//! View nodes.
//!
//! Every handle wraps an `Rc<Node>`. A node knows its parent and how it was
//! derived from it; the root owns nothing but the shared store. Coordinates
//! are resolved eagerly at derivation time: a node's sub-range window is in
//! root positions and its key bounds are in ascending root order, already
//! intersected with every ancestor's.

use std::cell::{Cell, RefCell};
use std::cmp::Ordering;
use std::rc::{Rc, Weak};

use crate::comparator::OrderComparator;
use crate::error::CollectionError;
use crate::event::EventKind;
use crate::frozen::{FreezeHandle, FreezeTarget};
use crate::listener::{Listener, ListenerId, ListenerRegistry};
use crate::modification::Operands;
use crate::store::Store;
use crate::suspend::{KeyTarget, ValueTarget};
use crate::view_info::ViewInfo;

pub(crate) struct Shared<K, V> {
    pub(crate) store: RefCell<Store<K, V>>,
    pub(crate) key_handle: FreezeHandle<K>,
    pub(crate) value_handle: FreezeHandle<V>,
    _targets: (Rc<dyn FreezeTarget<K>>, Rc<dyn FreezeTarget<V>>),
}

struct Link<K, V> {
    parent: Rc<Node<K, V>>,
    info: ViewInfo<K>,
}

struct Window {
    offset: Cell<usize>,
    len: Cell<usize>,
}

/// Key range of a navigable view, in ascending order.
#[derive(Clone)]
pub(crate) struct Bounds<K> {
    lower: Option<(K, bool)>,
    upper: Option<(K, bool)>,
}

impl<K: Clone> Bounds<K> {
    pub(crate) fn with_lower(&self, key: K, inclusive: bool) -> Self {
        Self {
            lower: Some((key, inclusive)),
            upper: self.upper.clone(),
        }
    }

    pub(crate) fn with_upper(&self, key: K, inclusive: bool) -> Self {
        Self {
            lower: self.lower.clone(),
            upper: Some((key, inclusive)),
        }
    }
}

impl<K> Bounds<K> {
    pub(crate) fn unbounded() -> Self {
        Self {
            lower: None,
            upper: None,
        }
    }

    pub(crate) fn is_unbounded(&self) -> bool {
        self.lower.is_none() && self.upper.is_none()
    }

    pub(crate) fn too_low(&self, cmp: &dyn OrderComparator<K>, key: &K) -> bool {
        self.lower.as_ref().is_some_and(|(bound, inclusive)| {
            match cmp.compare(key, bound) {
                Ordering::Less => true,
                Ordering::Equal => !inclusive,
                Ordering::Greater => false,
            }
        })
    }

    pub(crate) fn too_high(&self, cmp: &dyn OrderComparator<K>, key: &K) -> bool {
        self.upper.as_ref().is_some_and(|(bound, inclusive)| {
            match cmp.compare(key, bound) {
                Ordering::Greater => true,
                Ordering::Equal => !inclusive,
                Ordering::Less => false,
            }
        })
    }

    pub(crate) fn contains(&self, cmp: &dyn OrderComparator<K>, key: &K) -> bool {
        !self.too_low(cmp, key) && !self.too_high(cmp, key)
    }

    /// Whether `key` may become a new bound of a sub-view. An exclusive
    /// bound only has to lie in the closed range.
    pub(crate) fn admits_bound(
        &self,
        cmp: &dyn OrderComparator<K>,
        key: &K,
        inclusive: bool,
    ) -> bool {
        if inclusive {
            return self.contains(cmp, key);
        }
        let above_lower = self
            .lower
            .as_ref()
            .map_or(true, |(bound, _)| cmp.compare(key, bound) != Ordering::Less);
        let below_upper = self
            .upper
            .as_ref()
            .map_or(true, |(bound, _)| cmp.compare(key, bound) != Ordering::Greater);
        above_lower && below_upper
    }
}

/// Parameters of a child node.
pub(crate) struct Derivation<K> {
    info: ViewInfo<K>,
    kind: Option<EventKind>,
    window: Option<(usize, usize)>,
    bounds: Option<Bounds<K>>,
    reverse: bool,
}

impl<K> Derivation<K> {
    pub(crate) fn new(info: ViewInfo<K>) -> Self {
        Self {
            info,
            kind: None,
            window: None,
            bounds: None,
            reverse: false,
        }
    }

    pub(crate) fn kind(mut self, kind: EventKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub(crate) fn window(mut self, offset: usize, len: usize) -> Self {
        self.window = Some((offset, len));
        self
    }

    pub(crate) fn bounds(mut self, bounds: Bounds<K>) -> Self {
        self.bounds = Some(bounds);
        self
    }

    pub(crate) fn reversed(mut self) -> Self {
        self.reverse = true;
        self
    }
}

pub(crate) struct Node<K, V> {
    pub(crate) shared: Rc<Shared<K, V>>,
    link: Option<Link<K, V>>,
    kind: EventKind,
    window: Option<Window>,
    bounds: Bounds<K>,
    descending: bool,
    /// Sub-ranges and iterators go stale when the store changes through
    /// any other path.
    strict: bool,
    expected: Cell<u64>,
    listeners: RefCell<ListenerRegistry<K, V>>,
}

impl<K: Clone + 'static, V: Clone + 'static> Node<K, V> {
    pub(crate) fn root(store: Store<K, V>, kind: EventKind) -> Rc<Self> {
        Rc::new_cyclic(|weak: &Weak<Self>| {
            let key_target: Rc<dyn FreezeTarget<K>> = Rc::new(KeyTarget::new(weak.clone()));
            let value_target: Rc<dyn FreezeTarget<V>> =
                Rc::new(ValueTarget::new(weak.clone()));
            let shared = Rc::new(Shared {
                store: RefCell::new(store),
                key_handle: FreezeHandle::new(&key_target),
                value_handle: FreezeHandle::new(&value_target),
                _targets: (key_target, value_target),
            });
            Node {
                shared,
                link: None,
                kind,
                window: None,
                bounds: Bounds::unbounded(),
                descending: false,
                strict: false,
                expected: Cell::new(0),
                listeners: RefCell::new(ListenerRegistry::new()),
            }
        })
    }

    pub(crate) fn derive(self: &Rc<Self>, derivation: Derivation<K>) -> Rc<Self> {
        let Derivation {
            info,
            kind,
            window,
            bounds,
            reverse,
        } = derivation;
        let strict = window.is_some() || info.is_iterator();
        let mod_count = self.shared.store.borrow().mod_count();
        Rc::new(Node {
            shared: Rc::clone(&self.shared),
            kind: kind.unwrap_or(self.kind),
            window: window.map(|(offset, len)| Window {
                offset: Cell::new(offset),
                len: Cell::new(len),
            }),
            bounds: bounds.unwrap_or_else(|| self.bounds.clone()),
            descending: self.descending != reverse,
            strict,
            expected: Cell::new(mod_count),
            listeners: RefCell::new(ListenerRegistry::new()),
            link: Some(Link {
                parent: Rc::clone(self),
                info,
            }),
        })
    }
}

impl<K, V> Node<K, V> {
    pub(crate) fn info(&self) -> Option<&ViewInfo<K>> {
        self.link.as_ref().map(|link| &link.info)
    }

    pub(crate) fn parent(&self) -> Option<&Rc<Self>> {
        self.link.as_ref().map(|link| &link.parent)
    }

    pub(crate) fn kind(&self) -> EventKind {
        self.kind
    }

    pub(crate) fn is_descending(&self) -> bool {
        self.descending
    }

    pub(crate) fn bounds(&self) -> &Bounds<K> {
        &self.bounds
    }

    pub(crate) fn view_name(&self) -> &'static str {
        self.info().map_or("root", ViewInfo::name)
    }

    /// This node followed by every ancestor up to the root.
    pub(crate) fn path(self: &Rc<Self>) -> Vec<Rc<Self>> {
        let mut path = vec![Rc::clone(self)];
        let mut current = Rc::clone(self);
        while let Some(parent) = current.parent().cloned() {
            path.push(Rc::clone(&parent));
            current = parent;
        }
        path
    }

    pub(crate) fn root_node(self: &Rc<Self>) -> Rc<Self> {
        let mut current = Rc::clone(self);
        while let Some(parent) = current.parent().cloned() {
            current = parent;
        }
        current
    }

    pub(crate) fn check_fresh(&self) -> Result<(), CollectionError> {
        let mod_count = self.shared.store.borrow().mod_count();
        let mut node = Some(self);
        while let Some(current) = node {
            if current.strict && current.expected.get() != mod_count {
                return Err(CollectionError::StaleView {
                    view: current.view_name(),
                });
            }
            node = current.parent().map(|p| p.as_ref());
        }
        Ok(())
    }

    pub(crate) fn mark_fresh(&self, mod_count: u64) {
        if self.strict {
            self.expected.set(mod_count);
        }
    }

    pub(crate) fn own_window(&self) -> Option<(usize, usize)> {
        self.window
            .as_ref()
            .map(|w| (w.offset.get(), w.len.get()))
    }

    pub(crate) fn set_window(&self, offset: usize, len: usize) {
        if let Some(window) = &self.window {
            window.offset.set(offset);
            window.len.set(len);
        }
    }

    /// Effective sub-range in root positions.
    pub(crate) fn window(&self, store: &Store<K, V>) -> (usize, usize) {
        let mut node = Some(self);
        while let Some(current) = node {
            if let Some(window) = current.own_window() {
                return window;
            }
            node = current.parent().map(|p| p.as_ref());
        }
        (0, store.len())
    }

    /// Range of `store.order()` this node can see.
    pub(crate) fn visible_range(&self, store: &Store<K, V>) -> (usize, usize) {
        if store.is_positional() {
            let (offset, len) = self.window(store);
            return (offset, offset + len);
        }
        let order = store.order();
        match store.keying().order() {
            Some(cmp) if !self.bounds.is_unbounded() => {
                let lo = order.partition_point(|&s| self.bounds.too_low(cmp.as_ref(), &store.slot(s).key));
                let hi = order.partition_point(|&s| !self.bounds.too_high(cmp.as_ref(), &store.slot(s).key));
                (lo, hi.max(lo))
            }
            _ => (0, order.len()),
        }
    }

    pub(crate) fn visible_len(&self, store: &Store<K, V>) -> usize {
        let (lo, hi) = self.visible_range(store);
        hi - lo
    }

    /// Slot at a local index, honouring the traversal direction.
    pub(crate) fn visible_at(&self, store: &Store<K, V>, index: usize) -> Option<usize> {
        let (lo, hi) = self.visible_range(store);
        if index >= hi - lo {
            return None;
        }
        let position = if self.descending {
            hi - 1 - index
        } else {
            lo + index
        };
        Some(store.order()[position])
    }

    pub(crate) fn visible_slots(&self, store: &Store<K, V>) -> Vec<usize> {
        let (lo, hi) = self.visible_range(store);
        let slots = &store.order()[lo..hi];
        if self.descending {
            slots.iter().rev().copied().collect()
        } else {
            slots.to_vec()
        }
    }

    pub(crate) fn local_position(&self, store: &Store<K, V>, slot: usize) -> Option<usize> {
        let position = store.position_of(slot)?;
        let (lo, hi) = self.visible_range(store);
        if !(lo..hi).contains(&position) {
            return None;
        }
        Some(if self.descending {
            hi - 1 - position
        } else {
            position - lo
        })
    }

    pub(crate) fn admits_key(&self, store: &Store<K, V>, key: &K) -> bool {
        match store.keying().order() {
            Some(cmp) => self.bounds.contains(cmp.as_ref(), key),
            None => true,
        }
    }

    /// Visible slot holding `key`.
    pub(crate) fn locate(&self, store: &Store<K, V>, key: &K) -> Option<usize> {
        if !self.admits_key(store, key) {
            return None;
        }
        store.find_key(key)
    }

    pub(crate) fn add_listener(&self, listener: Listener<K, V>) -> ListenerId {
        self.listeners.borrow_mut().add(listener)
    }

    pub(crate) fn remove_listener(&self, id: ListenerId) -> bool {
        self.listeners.borrow_mut().remove(id)
    }

    pub(crate) fn listeners(&self) -> Vec<Listener<K, V>> {
        self.listeners.borrow().snapshot()
    }

    pub(crate) fn has_listeners(&self) -> bool {
        !self.listeners.borrow().is_empty()
    }
}

/// Operands describing one element of a node, shaped by the node's kind.
pub(crate) fn element_operands<K, V>(kind: EventKind, key: K, value: V) -> Operands<K, V> {
    match kind {
        EventKind::Element | EventKind::Key => Operands::Element(key),
        EventKind::Value => Operands::Value(value),
        EventKind::Entry => Operands::Entry { key, value },
    }
}
