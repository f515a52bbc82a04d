use std::rc::Rc;

use crate::modification::Modification;
use crate::view_info::ViewInfo;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Attach,
    Detach,
    Replace,
}

impl ChangeKind {
    pub fn contains(self, version: PropertyVersion) -> bool {
        matches!(
            (self, version),
            (ChangeKind::Replace, _)
                | (ChangeKind::Attach, PropertyVersion::Attach)
                | (ChangeKind::Detach, PropertyVersion::Detach)
        )
    }
}

/// Which side of a change an accessor reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyVersion {
    Detach,
    Attach,
}

/// The shape of the node that reported an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// Sequence or set element; the element is the snapshot key.
    Element,
    /// Key/value pair of a map or map sub-view.
    Entry,
    /// Key projection of a map; the element is the key.
    Key,
    /// Value projection of a map; the element is the value.
    Value,
}

/// One side of a change as seen by one node.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot<K, V> {
    key: K,
    value: V,
    index: Option<usize>,
}

impl<K, V> Snapshot<K, V> {
    pub(crate) fn new(key: K, value: V, index: Option<usize>) -> Self {
        Self { key, value, index }
    }

    pub fn key(&self) -> &K {
        &self.key
    }

    pub fn value(&self) -> &V {
        &self.value
    }

    /// Position in the reporting view; only sequence views report one.
    pub fn index(&self) -> Option<usize> {
        self.index
    }
}

/// The event a child view reported, wrapped for its parent.
#[derive(Debug)]
pub struct Cause<K, V> {
    view_info: ViewInfo<K>,
    event: Rc<ElementEvent<K, V>>,
}

impl<K, V> Cause<K, V> {
    pub(crate) fn new(view_info: ViewInfo<K>, event: Rc<ElementEvent<K, V>>) -> Self {
        Self { view_info, event }
    }

    /// Derivation of the child view that raised the inner event.
    pub fn view_info(&self) -> &ViewInfo<K> {
        &self.view_info
    }

    pub fn event(&self) -> &Rc<ElementEvent<K, V>> {
        &self.event
    }
}

#[derive(Debug)]
pub enum Origin<K, V> {
    Modification(Rc<Modification<K, V>>),
    Cause(Cause<K, V>),
}

#[derive(Debug)]
pub struct ElementEvent<K, V> {
    kind: EventKind,
    change: ChangeKind,
    detached: Option<Snapshot<K, V>>,
    attached: Option<Snapshot<K, V>>,
    origin: Origin<K, V>,
}

impl<K, V> ElementEvent<K, V> {
    pub(crate) fn new(
        kind: EventKind,
        change: ChangeKind,
        detached: Option<Snapshot<K, V>>,
        attached: Option<Snapshot<K, V>>,
        origin: Origin<K, V>,
    ) -> Self {
        Self {
            kind,
            change,
            detached,
            attached,
            origin,
        }
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }

    pub fn change(&self) -> ChangeKind {
        self.change
    }

    pub fn detached(&self) -> Option<&Snapshot<K, V>> {
        self.detached.as_ref()
    }

    pub fn attached(&self) -> Option<&Snapshot<K, V>> {
        self.attached.as_ref()
    }

    pub fn snapshot(&self, version: PropertyVersion) -> Option<&Snapshot<K, V>> {
        match version {
            PropertyVersion::Detach => self.detached.as_ref(),
            PropertyVersion::Attach => self.attached.as_ref(),
        }
    }

    pub fn key(&self, version: PropertyVersion) -> Option<&K> {
        self.snapshot(version).map(Snapshot::key)
    }

    pub fn value(&self, version: PropertyVersion) -> Option<&V> {
        self.snapshot(version).map(Snapshot::value)
    }

    pub fn index(&self, version: PropertyVersion) -> Option<usize> {
        self.snapshot(version).and_then(Snapshot::index)
    }

    pub fn origin(&self) -> &Origin<K, V> {
        &self.origin
    }

    /// Set only on the event of the view the operation was issued through.
    pub fn modification(&self) -> Option<&Rc<Modification<K, V>>> {
        match &self.origin {
            Origin::Modification(m) => Some(m),
            Origin::Cause(_) => None,
        }
    }

    /// Set only on bubbled events.
    pub fn cause(&self) -> Option<&Cause<K, V>> {
        match &self.origin {
            Origin::Modification(_) => None,
            Origin::Cause(cause) => Some(cause),
        }
    }

    /// The descriptor at the bottom of the cause chain.
    pub fn root_modification(&self) -> &Rc<Modification<K, V>> {
        let mut event = self;
        loop {
            match &event.origin {
                Origin::Modification(m) => return m,
                Origin::Cause(cause) => event = &cause.event,
            }
        }
    }

    /// Whether both events were produced by the same caller-level call.
    pub fn same_modification(&self, other: &Self) -> bool {
        Modification::same(self.root_modification(), other.root_modification())
    }

    /// Number of views the event travelled through before reaching this one.
    pub fn depth(&self) -> usize {
        let mut depth = 0;
        let mut event = self;
        while let Origin::Cause(cause) = &event.origin {
            depth += 1;
            event = &cause.event;
        }
        depth
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modification::{ModificationKind, Operands};

    #[test]
    fn replace_contains_both_versions() {
        assert!(ChangeKind::Replace.contains(PropertyVersion::Attach));
        assert!(ChangeKind::Replace.contains(PropertyVersion::Detach));
        assert!(!ChangeKind::Attach.contains(PropertyVersion::Detach));
        assert!(!ChangeKind::Detach.contains(PropertyVersion::Attach));
    }

    #[test]
    fn root_modification_follows_the_cause_chain() {
        let m = Modification::<i32, ()>::new(ModificationKind::Remove, Operands::Element(7));
        let inner = Rc::new(ElementEvent::new(
            EventKind::Element,
            ChangeKind::Detach,
            Some(Snapshot::new(7, (), Some(0))),
            None,
            Origin::Modification(Rc::clone(&m)),
        ));
        let outer = ElementEvent::new(
            EventKind::Element,
            ChangeKind::Detach,
            Some(Snapshot::new(7, (), Some(3))),
            None,
            Origin::Cause(Cause::new(
                ViewInfo::SubRange { from: 3, to: 5 },
                Rc::clone(&inner),
            )),
        );
        assert!(outer.modification().is_none());
        assert!(Modification::same(outer.root_modification(), &m));
        assert!(outer.same_modification(&inner));
        assert_eq!(outer.depth(), 1);
        assert_eq!(outer.index(PropertyVersion::Detach), Some(3));
        assert_eq!(outer.key(PropertyVersion::Attach), None);
    }
}
