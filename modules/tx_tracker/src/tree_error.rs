//! Error types for fork tree operations.

use lifecycle_common::BlockHash;

/// Errors returned by [`BlockTree`](crate::block_tree::BlockTree) operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BlockTreeError {
    /// The block's parent hash is not present in the tree.
    #[error("parent not found: {hash}")]
    ParentNotFound { hash: BlockHash },

    /// A block hash referenced by an operation is not in the tree.
    #[error("block not in tree: {hash}")]
    BlockNotInTree { hash: BlockHash },
}
