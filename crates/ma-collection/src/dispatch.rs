//! Two-phase dispatch: `modifying` up the path, commit, `modified` up the
//! path.

use std::rc::Rc;

use smallvec::SmallVec;

use crate::comparator::{EqualityComparator, OrderComparator};
use crate::error::CollectionError;
use crate::event::{Cause, ChangeKind, ElementEvent, Origin, Snapshot};
use crate::frozen::FreezeHandle;
use crate::modification::{Modification, ModificationState};
use crate::node::{Node, Shared};
use crate::plan::{Plan, PlannedEvent, Side};
use crate::store::Keying;
use crate::view_info::ViewInfo;

/// Root positions touched by a committed modification (sequences only).
#[derive(Debug, Default)]
pub(crate) struct Outcome {
    /// Pre-operation positions of detached slots.
    pub(crate) detached: SmallVec<[usize; 4]>,
    /// Post-operation positions of attached slots.
    pub(crate) attached: SmallVec<[usize; 4]>,
}

/// Sub-range of one path node before and after the commit.
#[derive(Debug, Clone, Copy)]
struct Frame {
    before: (usize, usize),
    after: (usize, usize),
}

type Level<K, V> = Vec<Rc<ElementEvent<K, V>>>;

pub(crate) fn execute<K, V>(
    origin: &Rc<Node<K, V>>,
    modification: Rc<Modification<K, V>>,
    plan: Plan<K, V>,
) -> Result<Outcome, CollectionError>
where
    K: Clone + 'static,
    V: Clone + 'static,
{
    let Plan { events, commit } = plan;
    if events.is_empty() {
        return Ok(Outcome::default());
    }

    let shared = Rc::clone(&origin.shared);
    let path = origin.path();
    let (positional, stamp, frames) = {
        let store = shared.store.borrow();
        let positional = store.is_positional();
        let frames = resolve_frames(&path, &events, store.len(), commit.order.len(), positional);
        (positional, store.mod_count(), frames)
    };
    let levels = build_levels(&path, &frames, &events, &modification, positional);

    for (node, level) in path.iter().zip(&levels) {
        if !node.has_listeners() {
            continue;
        }
        let listeners = node.listeners();
        for event in level {
            tracing::trace!(
                phase = "modifying",
                view = node.view_name(),
                change = ?event.change(),
                "element event"
            );
            for listener in &listeners {
                if let Err(rejection) = listener.modifying(event) {
                    modification.transition(ModificationState::Aborted);
                    tracing::debug!(
                        kind = ?modification.kind(),
                        view = node.view_name(),
                        reason = rejection.reason(),
                        "modification rejected"
                    );
                    return Err(rejection.into());
                }
            }
        }
    }

    let mod_count = {
        let mut store = shared.store.borrow_mut();
        if store.mod_count() != stamp {
            modification.transition(ModificationState::Aborted);
            return Err(CollectionError::StaleView {
                view: origin.view_name(),
            });
        }
        store.apply(commit);
        if store.options().verify_integrity {
            if let Err(violation) = store.integrity() {
                tracing::error!(
                    kind = ?modification.kind(),
                    error = %violation,
                    "collection invariant violated"
                );
                panic!("{violation}");
            }
        }
        store.mod_count()
    };
    modification.transition(ModificationState::Committed);
    tracing::debug!(
        kind = ?modification.kind(),
        events = events.len(),
        mod_count,
        "modification committed"
    );

    for (node, frame) in path.iter().zip(&frames) {
        if node.own_window().is_some() {
            node.set_window(frame.after.0, frame.after.1);
        }
        node.mark_fresh(mod_count);
    }

    run_freeze_hooks(&shared, &events);

    for (node, level) in path.iter().zip(&levels) {
        if !node.has_listeners() {
            continue;
        }
        let listeners = node.listeners();
        for event in level {
            tracing::trace!(
                phase = "modified",
                view = node.view_name(),
                change = ?event.change(),
                "element event"
            );
            for listener in &listeners {
                if let Err(err) = listener.modified(event) {
                    tracing::warn!(
                        kind = ?modification.kind(),
                        view = node.view_name(),
                        error = %err,
                        "listener failed after commit"
                    );
                }
            }
        }
    }
    modification.transition(ModificationState::Notified);

    let mut outcome = Outcome::default();
    if positional {
        for planned in &events {
            match planned.change {
                ChangeKind::Detach => {
                    outcome
                        .detached
                        .extend(planned.detached.as_ref().and_then(|s| s.position));
                }
                ChangeKind::Attach => {
                    outcome
                        .attached
                        .extend(planned.attached.as_ref().and_then(|s| s.position));
                }
                ChangeKind::Replace => {}
            }
        }
    }
    Ok(outcome)
}

/// Windows of every path node, resolved from the root down. Slots detached
/// before a window shift it left; attaches always land inside the windows
/// of the path they were issued through.
fn resolve_frames<K, V>(
    path: &[Rc<Node<K, V>>],
    events: &[PlannedEvent<K, V>],
    len_before: usize,
    len_after: usize,
    positional: bool,
) -> Vec<Frame> {
    let mut current = Frame {
        before: (0, len_before),
        after: (0, len_after),
    };
    let mut frames = vec![current; path.len()];
    if !positional {
        return frames;
    }
    let detached: SmallVec<[usize; 8]> = events
        .iter()
        .filter(|e| e.change == ChangeKind::Detach)
        .filter_map(|e| e.detached.as_ref().and_then(|s| s.position))
        .collect();
    let attached = events
        .iter()
        .filter(|e| e.change == ChangeKind::Attach)
        .count();
    for (i, node) in path.iter().enumerate().rev() {
        if let Some((offset, len)) = node.own_window() {
            let before = detached.iter().filter(|&&p| p < offset).count();
            let inside = detached
                .iter()
                .filter(|&&p| p >= offset && p < offset + len)
                .count();
            current = Frame {
                before: (offset, len),
                after: (offset - before, (len + attached).saturating_sub(inside)),
            };
        }
        frames[i] = current;
    }
    frames
}

fn local<K, V>(side: &Side<K, V>, window: (usize, usize)) -> Option<usize> {
    let (offset, len) = window;
    side.position
        .filter(|&p| p >= offset && p < offset + len)
        .map(|p| p - offset)
}

fn build_levels<K: Clone, V: Clone>(
    path: &[Rc<Node<K, V>>],
    frames: &[Frame],
    events: &[PlannedEvent<K, V>],
    modification: &Rc<Modification<K, V>>,
    positional: bool,
) -> Vec<Level<K, V>> {
    let mut levels: Vec<Level<K, V>> = Vec::with_capacity(path.len());
    let mut below: Option<&ViewInfo<K>> = None;
    for (node, frame) in path.iter().zip(frames) {
        let level = events
            .iter()
            .enumerate()
            .map(|(j, planned)| {
                let snapshot = |side: &Side<K, V>, window| {
                    let index = if positional { local(side, window) } else { None };
                    Snapshot::new(side.key.clone(), side.value.clone(), index)
                };
                let origin = match (below, levels.last()) {
                    (Some(info), Some(child)) => {
                        Origin::Cause(Cause::new(info.clone(), Rc::clone(&child[j])))
                    }
                    _ => Origin::Modification(Rc::clone(modification)),
                };
                Rc::new(ElementEvent::new(
                    node.kind(),
                    planned.change,
                    planned.detached.as_ref().map(|s| snapshot(s, frame.before)),
                    planned.attached.as_ref().map(|s| snapshot(s, frame.after)),
                    origin,
                ))
            })
            .collect();
        levels.push(level);
        below = node.info();
    }
    levels
}

enum KeyHooks<K> {
    None,
    Equality(Rc<dyn EqualityComparator<K>>),
    Order(Rc<dyn OrderComparator<K>>),
}

impl<K> KeyHooks<K> {
    fn of(keying: &Keying<K>) -> Self {
        match keying {
            Keying::Sequence(None) => KeyHooks::None,
            Keying::Sequence(Some(eq)) | Keying::Hashed(eq) => KeyHooks::Equality(Rc::clone(eq)),
            Keying::Ordered(cmp) => KeyHooks::Order(Rc::clone(cmp)),
        }
    }

    fn freeze(&self, key: &K, handle: &FreezeHandle<K>) {
        match self {
            KeyHooks::None => {}
            KeyHooks::Equality(eq) => eq.freeze(key, handle.clone()),
            KeyHooks::Order(cmp) => cmp.freeze(key, handle.clone()),
        }
    }

    fn unfreeze(&self, key: &K, handle: &FreezeHandle<K>) {
        match self {
            KeyHooks::None => {}
            KeyHooks::Equality(eq) => eq.unfreeze(key, handle),
            KeyHooks::Order(cmp) => cmp.unfreeze(key, handle),
        }
    }
}

fn hooks<K, V>(shared: &Shared<K, V>) -> (KeyHooks<K>, Option<Rc<dyn EqualityComparator<V>>>) {
    let store = shared.store.borrow();
    (KeyHooks::of(store.keying()), store.value_eq().cloned())
}

/// Unregisters detached entries from, then registers attached entries with,
/// the comparators that index them.
fn run_freeze_hooks<K, V>(shared: &Shared<K, V>, events: &[PlannedEvent<K, V>]) {
    let (keys, values) = hooks(shared);
    if matches!(keys, KeyHooks::None) && values.is_none() {
        return;
    }
    for side in events
        .iter()
        .filter(|e| e.hooks)
        .filter_map(|e| e.detached.as_ref())
    {
        keys.unfreeze(&side.key, &shared.key_handle);
        if let Some(eq) = &values {
            eq.unfreeze(&side.value, &shared.value_handle);
        }
    }
    for side in events
        .iter()
        .filter(|e| e.hooks)
        .filter_map(|e| e.attached.as_ref())
    {
        keys.freeze(&side.key, &shared.key_handle);
        if let Some(eq) = &values {
            eq.freeze(&side.value, shared.value_handle.clone());
        }
    }
}

/// Drops the freeze registrations of an entry that left the store without
/// an event, such as a suspended value whose resume was refused.
pub(crate) fn release_entry<K, V>(shared: &Shared<K, V>, key: &K, value: &V) {
    let (keys, values) = hooks(shared);
    keys.unfreeze(key, &shared.key_handle);
    if let Some(eq) = &values {
        eq.unfreeze(value, &shared.value_handle);
    }
}
