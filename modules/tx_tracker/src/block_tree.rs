//! Fork tree of announced blocks above the finalization frontier.
//!
//! Blocks are held in a map keyed by hash with explicit parent and child
//! links, so pruning is removal from the map. The root of the tree is always
//! the current finalization frontier; everything in the tree descends from it.

use std::collections::{HashMap, HashSet};

use lifecycle_common::BlockHash;

use crate::tree_block::TrackedBlock;
use crate::tree_error::BlockTreeError;

/// What a finalization would change, computed before anything is removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalizationPlan {
    /// The frontier being superseded.
    pub previous_root: BlockHash,
    /// Blocks from the previous frontier (exclusive) to the new one
    /// (inclusive), oldest first.
    pub path: Vec<BlockHash>,
    /// Blocks on forks that branch off the path and can no longer become
    /// canonical.
    pub abandoned: Vec<BlockHash>,
}

/// The top-level data structure holding all non-final blocks.
///
/// Operations are single-threaded; the owning engine is the only writer.
#[derive(Debug, Default)]
pub struct BlockTree {
    /// All blocks keyed by hash.
    blocks: HashMap<BlockHash, TrackedBlock>,
    /// Root of the tree: the finalization frontier.
    root: Option<BlockHash>,
    /// Next announcement sequence number.
    next_seq: u64,
}

impl BlockTree {
    /// Create a new empty tree.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the root of the tree.
    ///
    /// Must be called before any other insertion. `announced` is false for a
    /// virtual root inferred from the first block's parent.
    pub fn set_root(&mut self, hash: BlockHash, announced: bool) {
        let block = TrackedBlock::new(hash.clone(), None, self.bump_seq(), announced);
        self.blocks.insert(hash.clone(), block);
        self.root = Some(hash);
    }

    /// Returns the root hash, if the tree is non-empty.
    pub fn root(&self) -> Option<&BlockHash> {
        self.root.as_ref()
    }

    /// Returns a reference to the block with the given hash, if present.
    pub fn get_block(&self, hash: &BlockHash) -> Option<&TrackedBlock> {
        self.blocks.get(hash)
    }

    /// Returns a mutable reference to the block with the given hash.
    pub fn get_block_mut(&mut self, hash: &BlockHash) -> Option<&mut TrackedBlock> {
        self.blocks.get_mut(hash)
    }

    /// Returns the number of blocks in the tree.
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Returns true if the tree has no blocks.
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Sequence number the next announced block will receive.
    pub fn next_seq(&self) -> u64 {
        self.next_seq
    }

    fn bump_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    /// Insert an announced block under an existing parent.
    pub fn insert_block(
        &mut self,
        hash: BlockHash,
        parent: BlockHash,
    ) -> Result<(), BlockTreeError> {
        if !self.blocks.contains_key(&parent) {
            return Err(BlockTreeError::ParentNotFound { hash: parent });
        }

        let seq = self.bump_seq();
        let block = TrackedBlock::new(hash.clone(), Some(parent.clone()), seq, true);
        self.blocks.insert(hash.clone(), block);

        if let Some(parent_block) = self.blocks.get_mut(&parent) {
            parent_block.children.push(hash);
        }

        Ok(())
    }

    /// Collect block hashes on the chain from ancestor (exclusive) to tip (inclusive),
    /// in ascending order.
    fn collect_chain_from_ancestor(&self, ancestor: &BlockHash, tip: &BlockHash) -> Vec<BlockHash> {
        let mut chain = Vec::new();
        let mut current = Some(tip);
        while let Some(h) = current {
            if h == ancestor {
                break;
            }
            chain.push(h.clone());
            current = self.blocks.get(h).and_then(|b| b.parent.as_ref());
        }
        chain.reverse();
        chain
    }

    /// Collect all hashes reachable from a block.
    /// If `inclusive` is true, includes the block itself; otherwise only its descendants.
    fn collect_all_from(&self, hash: &BlockHash, inclusive: bool) -> Vec<BlockHash> {
        let mut result = if inclusive { vec![hash.clone()] } else { Vec::new() };
        let mut stack = vec![hash];
        while let Some(h) = stack.pop() {
            if let Some(block) = self.blocks.get(h) {
                for child in &block.children {
                    result.push(child.clone());
                    stack.push(child);
                }
            }
        }
        result
    }

    /// Strict descendants of a block, in the order they were announced.
    pub fn descendants_by_announcement(&self, hash: &BlockHash) -> Vec<BlockHash> {
        let mut descendants = self.collect_all_from(hash, false);
        descendants.sort_by_key(|h| self.blocks.get(h).map_or(u64::MAX, |b| b.seq));
        descendants
    }

    /// Work out which blocks become final and which become unreachable if
    /// `hash` is finalized. Does not modify the tree.
    pub fn plan_finalization(&self, hash: &BlockHash) -> Result<FinalizationPlan, BlockTreeError> {
        let root = self
            .root
            .clone()
            .ok_or_else(|| BlockTreeError::BlockNotInTree { hash: hash.clone() })?;
        if !self.blocks.contains_key(hash) {
            return Err(BlockTreeError::BlockNotInTree { hash: hash.clone() });
        }

        let path = self.collect_chain_from_ancestor(&root, hash);
        let keep: HashSet<BlockHash> = self.collect_all_from(hash, true).into_iter().collect();
        let on_path: HashSet<&BlockHash> = path.iter().collect();

        let mut abandoned: Vec<BlockHash> = self
            .collect_all_from(&root, false)
            .into_iter()
            .filter(|h| !keep.contains(h) && !on_path.contains(h))
            .collect();
        abandoned.sort_by_key(|h| self.blocks.get(h).map_or(u64::MAX, |b| b.seq));

        Ok(FinalizationPlan {
            previous_root: root,
            path,
            abandoned,
        })
    }

    /// Make `hash` the new root, removing every block that does not descend
    /// from it. Returns the removed blocks.
    pub fn advance_root(&mut self, hash: &BlockHash) -> Result<Vec<TrackedBlock>, BlockTreeError> {
        if !self.blocks.contains_key(hash) {
            return Err(BlockTreeError::BlockNotInTree { hash: hash.clone() });
        }

        // Collect all blocks to keep: blocks reachable from the new root
        let blocks_to_keep: HashSet<BlockHash> =
            self.collect_all_from(hash, true).into_iter().collect();

        let all_hashes: Vec<BlockHash> = self.blocks.keys().cloned().collect();
        let mut removed = Vec::new();
        for h in all_hashes {
            if !blocks_to_keep.contains(&h) {
                if let Some(block) = self.blocks.remove(&h) {
                    removed.push(block);
                }
            }
        }
        removed.sort_by_key(|b| b.seq);

        // Update root and clear its parent pointer
        self.root = Some(hash.clone());
        if let Some(block) = self.blocks.get_mut(hash) {
            block.parent = None;
        }

        Ok(removed)
    }
}
