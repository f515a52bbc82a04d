//! Mutation-aware collections.
//!
//! Lists, sets and maps whose derived views (sub-ranges, iterators, key and
//! value projections, navigable sub-sets) stay consistent with the container
//! they came from. Every structural change is reported through a two-phase
//! protocol: `modifying` listeners may veto it before anything is applied,
//! `modified` listeners observe it afterwards. Events raised on a view bubble
//! up to every ancestor, each ancestor seeing them in its own coordinates and
//! linked to the child event through a [`Cause`].
//!
//! Bidirectional maps and lists keep an inverse index that stays correct
//! while stored values change the fields their hash or order depends on,
//! through the suspend/resume bracket of [`FrozenContext`].

pub mod comparator;
pub mod error;
pub mod event;
pub mod frozen;
pub mod iter;
pub mod list;
pub mod listener;
pub mod map;
pub mod modification;
pub mod options;
pub mod set;
pub mod view_info;

mod dispatch;
mod node;
mod ops;
mod plan;
mod store;
mod suspend;

pub use comparator::{
    DefaultEquality, EqualityComparator, FnOrder, KeyIndex, NaturalOrder, OrderComparator,
};
pub use error::{CollectionError, InvariantViolation, ListenerError, Rejection};
pub use event::{Cause, ChangeKind, ElementEvent, EventKind, Origin, PropertyVersion, Snapshot};
pub use frozen::{FreezeHandle, FrozenContext, SuspendToken};
pub use iter::{EntryIter, SetIter, ValueIter, ViewIter};
pub use list::{ListIter, MaList, SubList};
pub use listener::{ElementListener, Listener, ListenerId};
pub use map::{EntryView, MaMap, Values};
pub use modification::{Modification, ModificationKind, ModificationState, Operands};
pub use options::{BidiType, CollectionOptions, ConflictPolicy};
pub use set::MaSet;
pub use store::StoreStats;
pub use view_info::ViewInfo;

/// Returns the crate version at compile time.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
