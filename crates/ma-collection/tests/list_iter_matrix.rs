use ma_collection::{CollectionError, ListIter, MaList};
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Step {
    Next,
    Previous,
    Remove,
    Set(i32),
    Add(i32),
}

fn step() -> impl Strategy<Value = Step> {
    prop_oneof![
        3 => Just(Step::Next),
        2 => Just(Step::Previous),
        1 => Just(Step::Remove),
        1 => (100i32..200).prop_map(Step::Set),
        1 => (100i32..200).prop_map(Step::Add),
    ]
}

/// Reference cursor over a plain `Vec`.
struct Model {
    items: Vec<i32>,
    cursor: usize,
    last: Option<usize>,
}

impl Model {
    fn apply(&mut self, step: &Step) -> Option<i32> {
        match step {
            Step::Next => {
                let item = *self.items.get(self.cursor)?;
                self.last = Some(self.cursor);
                self.cursor += 1;
                Some(item)
            }
            Step::Previous => {
                self.cursor = self.cursor.checked_sub(1)?;
                self.last = Some(self.cursor);
                Some(self.items[self.cursor])
            }
            Step::Remove => {
                let last = self.last.take()?;
                self.items.remove(last);
                if last < self.cursor {
                    self.cursor -= 1;
                }
                Some(0)
            }
            Step::Set(x) => {
                let last = self.last?;
                self.items[last] = *x;
                Some(0)
            }
            Step::Add(x) => {
                self.items.insert(self.cursor, *x);
                self.cursor += 1;
                self.last = None;
                Some(0)
            }
        }
    }
}

fn run(it: &mut ListIter<i32>, step: &Step) -> Option<i32> {
    let unit = |r: Result<(), CollectionError>| r.ok().map(|()| 0);
    match step {
        Step::Next => it.next().map(|r| r.unwrap()),
        Step::Previous => it.previous().ok(),
        Step::Remove => unit(it.remove()),
        Step::Set(x) => unit(it.set(*x)),
        Step::Add(x) => unit(it.add(*x)),
    }
}

proptest! {
    #[test]
    fn sub_list_iterator_matches_vec_cursor(
        len in 0usize..6,
        start in 0usize..6,
        steps in prop::collection::vec(step(), 1..40),
    ) {
        let start = start.min(len);
        let list = MaList::new();
        list.extend([-2, -1]).unwrap();
        list.extend(0..len as i32).unwrap();
        list.extend([-3]).unwrap();
        let sub = list.sub_list(2, 2 + len).unwrap();
        let mut it = sub.list_iter(start).unwrap();
        let mut model = Model {
            items: (0..len as i32).collect(),
            cursor: start,
            last: None,
        };

        for step in &steps {
            prop_assert_eq!(run(&mut it, step), model.apply(step), "step {:?}", step);
            prop_assert_eq!(it.next_index(), model.cursor);
        }

        prop_assert_eq!(sub.to_vec().unwrap(), model.items.clone());
        let mut whole = vec![-2, -1];
        whole.extend(model.items.iter().copied());
        whole.push(-3);
        prop_assert_eq!(list.to_vec(), whole);
    }
}

#[test]
fn remove_without_a_returned_element_is_illegal() {
    let list = MaList::new();
    list.extend([1, 2]).unwrap();
    let mut it = list.iter();
    assert!(matches!(it.remove(), Err(CollectionError::IllegalState(_))));
    assert_eq!(it.next(), Some(Ok(1)));
    it.remove().unwrap();
    assert!(matches!(it.remove(), Err(CollectionError::IllegalState(_))));
    assert_eq!(list.to_vec(), vec![2]);
}

#[test]
fn previous_walks_back_and_set_replaces_in_place() {
    let list = MaList::new();
    list.extend([1, 2, 3]).unwrap();
    let mut it = list.list_iter(3).unwrap();
    assert_eq!(it.previous(), Ok(3));
    assert_eq!(it.previous(), Ok(2));
    it.set(20).unwrap();
    assert_eq!(it.previous_index(), Some(0));
    assert_eq!(it.previous(), Ok(1));
    assert_eq!(it.previous(), Err(CollectionError::NoSuchElement));
    assert_eq!(list.to_vec(), vec![1, 20, 3]);
}

#[test]
fn positional_iterator_out_of_range_is_refused() {
    let list: MaList<i32> = MaList::new();
    assert!(matches!(
        list.list_iter(1),
        Err(CollectionError::OutOfBounds { index: 1, len: 0 })
    ));
}

#[test]
fn outside_change_makes_every_iterator_call_stale() {
    let list = MaList::new();
    list.extend([1, 2, 3]).unwrap();
    let mut it = list.iter();
    assert_eq!(it.next(), Some(Ok(1)));
    assert_eq!(it.has_next(), Ok(true));
    list.push(4).unwrap();

    assert!(it.has_next().unwrap_err().is_stale());
    assert!(it.remove().unwrap_err().is_stale());
    assert!(it.set(10).unwrap_err().is_stale());
    assert!(it.add(10).unwrap_err().is_stale());
    assert_eq!(list.to_vec(), vec![1, 2, 3, 4]);
}

#[test]
fn sub_list_mutations_after_an_outside_change_are_stale() {
    let list = MaList::new();
    list.extend(0..5).unwrap();
    let sub = list.sub_list(1, 4).unwrap();
    assert_eq!(sub.set(0, 10), Ok(1));
    list.remove_at(0).unwrap();

    assert!(sub.set(0, 9).unwrap_err().is_stale());
    assert!(sub.remove_at(0).unwrap_err().is_stale());
    assert!(sub.insert(0, 9).unwrap_err().is_stale());
    assert!(sub.clear().unwrap_err().is_stale());
    assert_eq!(list.to_vec(), vec![10, 2, 3, 4]);
    list.integrity().unwrap();
}

#[test]
fn bulk_inserts_land_where_a_vec_would_put_them() {
    let list = MaList::new();
    let mut model: Vec<i32> = Vec::new();
    list.extend(0..500).unwrap();
    model.extend(0..500);
    list.insert_all(250, (1000..1100).collect()).unwrap();
    model.splice(250..250, 1000..1100);
    list.insert_all(0, vec![-1, -2]).unwrap();
    model.splice(0..0, [-1, -2]);
    list.extend(2000..2050).unwrap();
    model.extend(2000..2050);

    assert_eq!(list.to_vec(), model);
    assert_eq!(list.len(), 652);
    list.integrity().unwrap();
}
