/// How a view was derived from its parent.
///
/// Parameters are recorded in the coordinates of the parent view, exactly as
/// the caller passed them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewInfo<K> {
    SubRange {
        from: usize,
        to: usize,
    },
    Iterator,
    DescendingIterator,
    PositionalIterator {
        index: usize,
    },
    HeadSet {
        bound: K,
        inclusive: bool,
    },
    TailSet {
        bound: K,
        inclusive: bool,
    },
    SubSet {
        from: K,
        from_inclusive: bool,
        to: K,
        to_inclusive: bool,
    },
    Reversed,
    KeyProjection,
    ValueProjection,
    SingleEntry {
        key: K,
    },
}

impl<K> ViewInfo<K> {
    pub fn name(&self) -> &'static str {
        match self {
            ViewInfo::SubRange { .. } => "sub_range",
            ViewInfo::Iterator => "iterator",
            ViewInfo::DescendingIterator => "descending_iterator",
            ViewInfo::PositionalIterator { .. } => "positional_iterator",
            ViewInfo::HeadSet { .. } => "head_set",
            ViewInfo::TailSet { .. } => "tail_set",
            ViewInfo::SubSet { .. } => "sub_set",
            ViewInfo::Reversed => "reversed",
            ViewInfo::KeyProjection => "key_projection",
            ViewInfo::ValueProjection => "value_projection",
            ViewInfo::SingleEntry { .. } => "single_entry",
        }
    }

    pub fn is_iterator(&self) -> bool {
        matches!(
            self,
            ViewInfo::Iterator | ViewInfo::DescendingIterator | ViewInfo::PositionalIterator { .. }
        )
    }
}
