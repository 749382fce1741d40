//! Error types for the tracking engine.

use lifecycle_common::{BlockHash, OracleError};

use crate::tree_error::BlockTreeError;

/// Fatal errors raised while handling an event.
///
/// None of these are transient: the run that produced one must stop.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TrackerError {
    /// The oracle rejected a query as a contract violation.
    #[error("oracle contract violation: {0}")]
    Oracle(#[from] OracleError),

    /// A `finalized` event named a block that is neither the frontier nor
    /// one of its live descendants.
    #[error("finalized block not in tree: {hash}")]
    UnknownFinalizedBlock { hash: BlockHash },

    /// The fork tree rejected an update it should have accepted.
    #[error("fork tree inconsistency: {0}")]
    Tree(#[from] BlockTreeError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tree_errors_are_propagated_not_swallowed() {
        let error: TrackerError = BlockTreeError::BlockNotInTree {
            hash: BlockHash::from("b1"),
        }
        .into();

        assert!(matches!(error, TrackerError::Tree(_)));
        assert_eq!(error.to_string(), "fork tree inconsistency: block not in tree: b1");
    }
}
