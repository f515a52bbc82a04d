use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

use ma_collection::{
    ChangeKind, CollectionError, CollectionOptions, ConflictPolicy, ElementEvent, Listener, MaList,
    MaMap, ModificationKind, PropertyVersion,
};
use proptest::prelude::*;

type MapLog = Rc<RefCell<Vec<(ChangeKind, Option<(char, i32)>, Option<(char, i32)>)>>>;

fn record_map(map: &MaMap<char, i32>) -> MapLog {
    let log: MapLog = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&log);
    map.add_listener(Listener::callback(move |event: &ElementEvent<char, i32>| {
        let side = |v| {
            event
                .key(v)
                .copied()
                .zip(event.value(v).copied())
        };
        sink.borrow_mut().push((
            event.change(),
            side(PropertyVersion::Detach),
            side(PropertyVersion::Attach),
        ));
    }));
    log
}

#[test]
fn put_of_mapped_value_detaches_its_old_key_first() {
    let map = MaMap::hashed_bidi();
    map.put('a', 1).unwrap();
    let log = record_map(&map);

    assert_eq!(map.put('b', 1), Ok(None));
    assert_eq!(
        *log.borrow(),
        vec![
            (ChangeKind::Detach, Some(('a', 1)), None),
            (ChangeKind::Attach, None, Some(('b', 1))),
        ]
    );
    assert_eq!(map.inverse_lookup(&1), Some('b'));
    assert!(!map.contains_key(&'a'));
}

#[test]
fn put_on_existing_key_reports_replace_and_evicts_value_owner() {
    let map = MaMap::hashed_bidi();
    map.put_all(vec![('a', 1), ('b', 2)]).unwrap();
    let log = record_map(&map);

    assert_eq!(map.put('a', 2), Ok(Some(1)));
    assert_eq!(
        *log.borrow(),
        vec![
            (ChangeKind::Detach, Some(('b', 2)), None),
            (ChangeKind::Replace, Some(('a', 1)), Some(('a', 2))),
        ]
    );
    assert_eq!(map.inverse_lookup(&2), Some('a'));
    assert_eq!(map.inverse_lookup(&1), None);
    assert_eq!(map.len(), 1);
    map.integrity().unwrap();
}

#[test]
fn reject_new_policy_refuses_the_put_without_events() {
    let map = MaMap::hashed_with(CollectionOptions::bidi().with_conflict(ConflictPolicy::RejectNew));
    map.put('a', 1).unwrap();
    let log = record_map(&map);
    let before = map.debug_stats();

    assert_eq!(map.put('b', 1), Err(CollectionError::Conflict));
    assert!(log.borrow().is_empty());
    assert_eq!(map.debug_stats(), before);
    assert_eq!(map.to_vec(), vec![('a', 1)]);
}

#[test]
fn values_view_removes_through_inverse_side() {
    let map = MaMap::hashed_bidi();
    map.put_all(vec![('a', 1), ('b', 2), ('c', 3)]).unwrap();
    let values = map.values();
    assert!(values.remove(&2).unwrap());
    assert_eq!(values.to_vec(), vec![1, 3]);
    assert_eq!(map.inverse_lookup(&2), None);
    assert_eq!(map.debug_stats().inverse_len, 2);
}

#[test]
fn entry_iterator_set_value_moves_value_between_keys() {
    let map = MaMap::ordered_with(CollectionOptions::bidi());
    map.put_all(vec![('a', 1), ('b', 2), ('c', 3)]).unwrap();
    let mut it = map.iter();
    assert_eq!(it.next(), Some(Ok(('a', 1))));
    assert_eq!(it.next(), Some(Ok(('b', 2))));
    assert_eq!(it.set_value(1), Ok(2));
    assert_eq!(it.next(), Some(Ok(('c', 3))));
    assert_eq!(map.to_vec(), vec![('b', 1), ('c', 3)]);
}

#[test]
fn descending_iterator_keeps_its_place_after_set_value_evicts() {
    let map = MaMap::ordered_with(CollectionOptions::bidi());
    map.put_all(vec![('a', 1), ('b', 2), ('c', 3), ('d', 4)]).unwrap();
    let descending = map.descending_map();
    let mut it = descending.iter();
    assert_eq!(it.next(), Some(Ok(('d', 4))));
    assert_eq!(it.next(), Some(Ok(('c', 3))));

    assert_eq!(it.set_value(4), Ok(3));
    assert_eq!(it.next(), Some(Ok(('b', 2))));
    assert_eq!(map.to_vec(), vec![('a', 1), ('b', 2), ('c', 4)]);
    map.integrity().unwrap();
}

#[test]
fn bounded_iterator_keeps_its_place_after_set_value_evicts() {
    let map = MaMap::ordered_with(CollectionOptions::bidi());
    map.put_all(vec![('a', 1), ('b', 2), ('c', 3), ('d', 4)]).unwrap();
    let tail = map.tail_map('b', true).unwrap();
    let mut it = tail.iter();
    assert_eq!(it.next(), Some(Ok(('b', 2))));

    assert_eq!(it.set_value(4), Ok(2));
    assert_eq!(it.next(), Some(Ok(('c', 3))));
    assert_eq!(it.next(), None);
    assert_eq!(map.inverse_lookup(&4), Some('b'));
}

#[test]
fn bidi_list_push_of_present_element_moves_it() {
    let list = MaList::bidi();
    list.extend([1, 2, 3]).unwrap();

    let log = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&log);
    list.add_listener(Listener::callback(move |event: &ElementEvent<i32, ()>| {
        sink.borrow_mut().push((
            event.change(),
            event.index(PropertyVersion::Detach),
            event.index(PropertyVersion::Attach),
            event.root_modification().kind(),
        ));
    }));

    list.push(1).unwrap();
    assert_eq!(
        *log.borrow(),
        vec![
            (ChangeKind::Detach, Some(0), None, ModificationKind::Insert),
            (ChangeKind::Attach, None, Some(2), ModificationKind::Insert),
        ]
    );
    assert_eq!(list.to_vec(), vec![2, 3, 1]);
    assert_eq!(list.inverse_lookup(&1), Some(2));
    assert_eq!(list.debug_stats().inverse_len, 3);
}

#[test]
fn bidi_list_set_to_present_element_drops_the_other_occurrence() {
    let list = MaList::bidi();
    list.extend([1, 2, 3]).unwrap();
    assert_eq!(list.set(2, 1), Ok(3));
    assert_eq!(list.to_vec(), vec![2, 1]);
    list.integrity().unwrap();
}

#[derive(Debug, Clone)]
enum MapOp {
    Put(u8, u8),
    Remove(u8),
    PutAll(Vec<(u8, u8)>),
}

fn map_op() -> impl Strategy<Value = MapOp> {
    prop_oneof![
        (0u8..8, 0u8..8).prop_map(|(k, v)| MapOp::Put(k, v)),
        (0u8..8).prop_map(MapOp::Remove),
        prop::collection::vec((0u8..8, 0u8..8), 0..5).prop_map(MapOp::PutAll),
    ]
}

proptest! {
    #[test]
    fn inverse_index_matches_forward_map(ops in prop::collection::vec(map_op(), 1..40)) {
        let map: MaMap<u8, u8> = MaMap::hashed_bidi();
        for op in ops {
            match op {
                MapOp::Put(k, v) => {
                    map.put(k, v).unwrap();
                }
                MapOp::Remove(k) => {
                    map.remove(&k).unwrap();
                }
                MapOp::PutAll(entries) => {
                    map.put_all(entries).unwrap();
                }
            }
            prop_assert!(map.integrity().is_ok());
            let entries = map.to_vec();
            let values: HashSet<u8> = entries.iter().map(|(_, v)| *v).collect();
            prop_assert_eq!(values.len(), entries.len());
            for (k, v) in &entries {
                prop_assert_eq!(map.inverse_lookup(v), Some(*k));
            }
            prop_assert_eq!(map.debug_stats().inverse_len, entries.len());
        }
    }

    #[test]
    fn bidi_list_never_holds_duplicates(items in prop::collection::vec(0u8..6, 0..30)) {
        let list = MaList::bidi();
        for item in &items {
            list.push(*item).unwrap();
        }
        let held = list.to_vec();
        let unique: HashSet<u8> = held.iter().copied().collect();
        prop_assert_eq!(unique.len(), held.len());
        for item in &items {
            prop_assert_eq!(list.get(list.inverse_lookup(item).unwrap()), Some(*item));
        }
        prop_assert!(list.integrity().is_ok());
    }
}

#[test]
fn stale_entry_iterator_refuses_set_value() {
    let map = MaMap::hashed_bidi();
    map.put_all(vec![('a', 1), ('b', 2)]).unwrap();
    let mut it = map.iter();
    assert_eq!(it.next(), Some(Ok(('a', 1))));
    assert_eq!(map.remove(&'a'), Ok(Some(1)));

    assert!(it.set_value(99).unwrap_err().is_stale());
    assert!(it.remove().unwrap_err().is_stale());
    assert_eq!(map.to_vec(), vec![('b', 2)]);
    assert_eq!(map.inverse_lookup(&99), None);
    map.integrity().unwrap();
}

#[test]
fn stale_values_iterator_refuses_to_remove() {
    let map = MaMap::hashed_bidi();
    map.put_all(vec![('a', 1), ('b', 2)]).unwrap();
    let values = map.values();
    let mut it = values.iter();
    assert_eq!(it.next(), Some(Ok(1)));
    map.put('c', 3).unwrap();

    assert!(it.remove().unwrap_err().is_stale());
    assert_eq!(map.len(), 3);
    assert_eq!(map.inverse_lookup(&1), Some('a'));
}

#[test]
fn entry_view_goes_stale_once_its_key_leaves() {
    let map = MaMap::hashed_bidi();
    map.put_all(vec![('a', 1), ('b', 2)]).unwrap();
    let entry = map.entry(&'a').unwrap();
    assert_eq!(entry.set_value(10), Ok(1));
    assert_eq!(map.inverse_lookup(&10), Some('a'));
    map.remove(&'a').unwrap();

    assert!(entry.value().unwrap_err().is_stale());
    assert!(entry.set_value(11).unwrap_err().is_stale());
    assert_eq!(map.to_vec(), vec![('b', 2)]);
    assert_eq!(map.inverse_lookup(&11), None);
}
