//! Block representation within the fork tree.

use lifecycle_common::{BlockHash, TxId};

/// A node in the fork tree: one announced block above the finalization
/// frontier, or the frontier itself.
#[derive(Debug, Clone)]
pub struct TrackedBlock {
    /// Block hash (identity key).
    pub hash: BlockHash,
    /// Parent block hash; `None` for the root.
    pub parent: Option<BlockHash>,
    /// Child block hashes, in announcement order.
    pub children: Vec<BlockHash>,
    /// Transaction ids in the block; `None` until fetched.
    pub body: Option<Vec<TxId>>,
    /// Transactions currently settled in this block, with their arrival index.
    pub settled: Vec<(u64, TxId)>,
    /// Position in announcement order across the whole tree.
    pub seq: u64,
    /// False for a virtual root the chain never announced.
    pub announced: bool,
}

impl TrackedBlock {
    /// Create a new block with no body, no children and nothing settled.
    pub fn new(hash: BlockHash, parent: Option<BlockHash>, seq: u64, announced: bool) -> Self {
        Self {
            hash,
            parent,
            children: Vec::new(),
            body: None,
            settled: Vec::new(),
            seq,
            announced,
        }
    }
}
