//! Construction-time options shared by every root container.

use serde::{Deserialize, Serialize};

/// Whether a container keeps an inverse (value -> key) index.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BidiType {
    #[default]
    None,
    /// Every stored value is unique; inserting a duplicate detaches its
    /// previous owner first (or fails, see [`ConflictPolicy`]).
    AllValues,
}

/// What happens when an insert collides with a value that is already stored
/// under a different key or position.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    #[default]
    NewReferenceWins,
    RejectNew,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectionOptions {
    pub bidi: BidiType,
    pub conflict: ConflictPolicy,
    /// Re-check forward/inverse consistency after every committed change.
    pub verify_integrity: bool,
}

impl Default for CollectionOptions {
    fn default() -> Self {
        Self {
            bidi: BidiType::None,
            conflict: ConflictPolicy::NewReferenceWins,
            verify_integrity: cfg!(debug_assertions),
        }
    }
}

impl CollectionOptions {
    pub fn bidi() -> Self {
        Self {
            bidi: BidiType::AllValues,
            ..Self::default()
        }
    }

    pub fn with_conflict(mut self, conflict: ConflictPolicy) -> Self {
        self.conflict = conflict;
        self
    }

    pub fn is_bidi(&self) -> bool {
        self.bidi == BidiType::AllValues
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_unidirectional_new_reference_wins() {
        let opts = CollectionOptions::default();
        assert_eq!(opts.bidi, BidiType::None);
        assert_eq!(opts.conflict, ConflictPolicy::NewReferenceWins);
        assert!(!opts.is_bidi());
    }

    #[test]
    fn bidi_builder_keeps_other_defaults() {
        let opts = CollectionOptions::bidi().with_conflict(ConflictPolicy::RejectNew);
        assert!(opts.is_bidi());
        assert_eq!(opts.conflict, ConflictPolicy::RejectNew);
        assert_eq!(opts.verify_integrity, cfg!(debug_assertions));
    }
}
