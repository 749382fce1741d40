//! Transaction lifecycle tracker
//! Turns new-transaction, new-block and finalized events into settled and
//! done signals, and tells the chain which blocks it no longer needs

pub mod block_tree;
pub mod pending;
pub mod tracker_config;
pub mod tracker_error;
pub mod tree_block;
pub mod tree_error;

use std::collections::{BTreeSet, HashMap, HashSet};

use lifecycle_common::{
    BlockHash, ChainEvent, ChainQuery, LifecycleObserver, Outcome, Settled, TrackingEngine, TxId,
};
use tracing::{debug, info, warn};

use block_tree::BlockTree;
use pending::PendingQueue;
use tree_error::BlockTreeError;

pub use tracker_config::{SettlementMode, TrackerConfig};
pub use tracker_error::TrackerError;

/// The active settlement of one transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settlement {
    /// Arrival index of the transaction.
    pub arrival: u64,
    pub state: Settled,
}

/// Where a transaction sits in the event stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Arrival {
    /// Position among all announced transactions.
    index: u64,
    /// Announcement sequence of the first block that may contain it.
    first_block_seq: u64,
}

/// Tracking engine state. One instance per event stream.
#[derive(Debug, Default)]
pub struct TxTracker {
    config: TrackerConfig,
    /// Non-final blocks rooted at the finalization frontier.
    tree: BlockTree,
    /// Unsettled transactions in arrival order.
    pending: PendingQueue,
    /// Every transaction ever announced, kept after done so that a repeated
    /// announcement stays a no-op.
    arrivals: HashMap<TxId, Arrival>,
    /// Active settlements, removed when done.
    settlements: HashMap<TxId, Settlement>,
    /// Announced blocks that hang off pruned history.
    orphans: BTreeSet<BlockHash>,
}

impl TxTracker {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }

    /// Current finalization frontier, once the first block has been seen.
    pub fn frontier(&self) -> Option<&BlockHash> {
        self.tree.root()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn settled_len(&self) -> usize {
        self.settlements.len()
    }

    /// Number of blocks held in the fork tree, frontier included.
    pub fn block_count(&self) -> usize {
        self.tree.len()
    }

    pub fn settlement(&self, tx: &TxId) -> Option<&Settlement> {
        self.settlements.get(tx)
    }

    fn on_new_transaction(&mut self, tx: &TxId) {
        if self.arrivals.contains_key(tx) {
            debug!(%tx, "Ignoring duplicate transaction");
            return;
        }
        let arrival = Arrival {
            index: self.arrivals.len() as u64,
            first_block_seq: self.tree.next_seq(),
        };
        self.arrivals.insert(tx.clone(), arrival);
        self.pending.insert(arrival.index, tx.clone());
    }

    fn on_new_block(
        &mut self,
        hash: &BlockHash,
        parent: &BlockHash,
        chain: &dyn ChainQuery,
        output: &mut dyn LifecycleObserver,
    ) -> Result<(), TrackerError> {
        if self.tree.is_empty() {
            debug!(%parent, "Tree root set to parent of first block");
            self.tree.set_root(parent.clone(), false);
        }

        if let Some(block) = self.tree.get_block_mut(hash) {
            // A late announcement of the virtual root makes it eligible for unpinning
            block.announced = true;
            debug!(%hash, "Ignoring duplicate block");
            return Ok(());
        }
        if self.orphans.contains(hash) {
            debug!(%hash, "Ignoring duplicate orphan block");
            return Ok(());
        }

        match self.tree.insert_block(hash.clone(), parent.clone()) {
            Ok(()) => {}
            Err(BlockTreeError::ParentNotFound { .. }) => {
                warn!(%hash, %parent, "Block does not descend from the finalized chain, will unpin");
                self.orphans.insert(hash.clone());
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        }

        let settled = self.settle_pending(hash, None, chain, output)?;
        if settled > 0 {
            debug!(%hash, settled, "Settled transactions in new block");
        }
        Ok(())
    }

    fn on_finalized(
        &mut self,
        hash: &BlockHash,
        chain: &mut dyn ChainQuery,
        output: &mut dyn LifecycleObserver,
    ) -> Result<(), TrackerError> {
        if self.tree.root() == Some(hash) {
            debug!(%hash, "Block is already the finalization frontier");
            return Ok(());
        }

        let plan = self
            .tree
            .plan_finalization(hash)
            .map_err(|_| TrackerError::UnknownFinalizedBlock { hash: hash.clone() })?;

        // Settlements on dead forks
        let mut reverted = HashSet::new();
        for block_hash in &plan.abandoned {
            let Some(block) = self.tree.get_block_mut(block_hash) else {
                continue;
            };
            for (arrival, tx) in std::mem::take(&mut block.settled) {
                self.settlements.remove(&tx);
                if self.config.settlement_mode.is_provisional() {
                    debug!(%tx, block = %block_hash, "Settlement lost its fork, back to pending");
                    self.pending.insert(arrival, tx.clone());
                    reverted.insert(tx);
                } else {
                    debug!(%tx, block = %block_hash, "Dropping settlement on abandoned fork");
                }
            }
        }

        if !reverted.is_empty() {
            let candidates = plan
                .path
                .iter()
                .cloned()
                .chain(self.tree.descendants_by_announcement(hash))
                .collect::<Vec<_>>();
            for candidate in candidates {
                if reverted.is_empty() {
                    break;
                }
                self.settle_pending(&candidate, Some(&mut reverted), chain, output)?;
            }
        }

        // Everything settled along the newly final path is done
        let mut done = Vec::new();
        for block_hash in &plan.path {
            if let Some(block) = self.tree.get_block_mut(block_hash) {
                done.append(&mut block.settled);
            }
        }
        done.sort_by_key(|(arrival, _)| *arrival);
        for (_, tx) in &done {
            if let Some(settlement) = self.settlements.remove(tx) {
                output.tx_done(tx, &settlement.state);
            }
        }

        let removed = self
            .tree
            .advance_root(hash)
            .map_err(|_| TrackerError::UnknownFinalizedBlock { hash: hash.clone() })?;
        let mut unpin: BTreeSet<BlockHash> =
            removed.into_iter().filter(|b| b.announced).map(|b| b.hash).collect();
        unpin.append(&mut self.orphans);

        info!(
            %hash,
            path = plan.path.len(),
            done = done.len(),
            unpinned = unpin.len(),
            "Finalized"
        );
        chain.unpin(&unpin);
        Ok(())
    }

    /// Test pending transactions against one block, in arrival order, and
    /// settle the ones it contains. Only transactions that were already
    /// pending when the block was announced are considered.
    ///
    /// With `only`, just those transactions are considered and each one
    /// settled is taken out of the set. The body is fetched at most once per
    /// block, and only if there is something to test.
    fn settle_pending(
        &mut self,
        hash: &BlockHash,
        mut only: Option<&mut HashSet<TxId>>,
        chain: &dyn ChainQuery,
        output: &mut dyn LifecycleObserver,
    ) -> Result<usize, TrackerError> {
        let Some(block_seq) = self.tree.get_block(hash).map(|b| b.seq) else {
            return Ok(0);
        };
        // Blocks announced before a transaction arrived are never matched to it
        let candidates: Vec<(u64, TxId)> = self
            .pending
            .iter()
            .filter(|(_, tx)| only.as_ref().map_or(true, |set| set.contains(*tx)))
            .filter(|(_, tx)| {
                self.arrivals.get(*tx).is_some_and(|a| a.first_block_seq <= block_seq)
            })
            .map(|(arrival, tx)| (arrival, tx.clone()))
            .collect();
        if candidates.is_empty() {
            return Ok(0);
        }

        let body: HashSet<TxId> = self.body(hash, chain)?.into_iter().collect();

        let mut settled = 0;
        for (arrival, tx) in candidates {
            if !body.contains(&tx) {
                continue;
            }

            let outcome = if chain.is_tx_valid(hash, &tx)? {
                Outcome::Valid {
                    successful: chain.is_tx_successful(hash, &tx)?,
                }
            } else {
                Outcome::Invalid
            };
            let state = Settled {
                block_hash: hash.clone(),
                outcome,
            };

            self.pending.remove(arrival);
            if let Some(set) = only.as_deref_mut() {
                set.remove(&tx);
            }
            if let Some(block) = self.tree.get_block_mut(hash) {
                block.settled.push((arrival, tx.clone()));
            }
            output.tx_settled(&tx, &state);
            self.settlements.insert(tx, Settlement { arrival, state });
            settled += 1;
        }
        Ok(settled)
    }

    /// Block body, fetched from the chain on first use and cached.
    fn body(&mut self, hash: &BlockHash, chain: &dyn ChainQuery) -> Result<Vec<TxId>, TrackerError> {
        if let Some(body) = self.tree.get_block(hash).and_then(|b| b.body.clone()) {
            return Ok(body);
        }
        let body = chain.get_body(hash)?;
        if let Some(block) = self.tree.get_block_mut(hash) {
            block.body = Some(body.clone());
        }
        Ok(body)
    }
}

impl TrackingEngine for TxTracker {
    type Error = TrackerError;

    fn handle_event(
        &mut self,
        event: &ChainEvent,
        chain: &mut dyn ChainQuery,
        output: &mut dyn LifecycleObserver,
    ) -> Result<(), TrackerError> {
        match event {
            ChainEvent::NewTransaction { value } => {
                self.on_new_transaction(value);
                Ok(())
            }
            ChainEvent::NewBlock { block_hash, parent } => {
                self.on_new_block(block_hash, parent, chain, output)
            }
            ChainEvent::Finalized { block_hash } => self.on_finalized(block_hash, chain, output),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lifecycle_common::OracleError;
    use lifecycle_test_utils::{drive, RecordingObserver, ScriptedChain, Signal, INVALID, KO, OK};

    fn hash(s: &str) -> BlockHash {
        BlockHash::from(s)
    }

    fn unpin_set(hashes: &[&str]) -> BTreeSet<BlockHash> {
        hashes.iter().map(|h| hash(h)).collect()
    }

    fn run(
        tracker: &mut TxTracker,
        chain: &mut ScriptedChain,
        events: &[ChainEvent],
    ) -> Vec<Signal> {
        let mut output = RecordingObserver::new();
        drive(tracker, chain, &mut output, events).unwrap();
        output.take()
    }

    #[test]
    fn test_single_block_settles_then_finalizes() {
        let mut chain = ScriptedChain::new().with_block("b1", &[("t1", OK)]);
        let mut tracker = TxTracker::default();

        let signals = run(
            &mut tracker,
            &mut chain,
            &[
                ChainEvent::new_transaction("t1"),
                ChainEvent::new_block("b1", "genesis"),
                ChainEvent::finalized("b1"),
            ],
        );

        let state = Settled::valid(hash("b1"), true);
        assert_eq!(
            signals,
            vec![Signal::settled("t1", state.clone()), Signal::done("t1", state)]
        );
        // Only the virtual root was superseded, and it was never announced
        assert_eq!(chain.unpins(), &[unpin_set(&[])]);
        assert_eq!(tracker.frontier(), Some(&hash("b1")));
        assert_eq!(tracker.settled_len(), 0);
        assert_eq!(tracker.pending_len(), 0);
    }

    #[test]
    fn test_settlement_on_losing_fork_reverts_and_is_unpinned() {
        let mut chain = ScriptedChain::new().with_block("b1", &[("t1", OK)]).with_block("b2", &[]);
        let mut tracker = TxTracker::default();

        let signals = run(
            &mut tracker,
            &mut chain,
            &[
                ChainEvent::new_transaction("t1"),
                ChainEvent::new_block("b2", "genesis"),
                ChainEvent::new_block("b1", "genesis"),
                ChainEvent::finalized("b2"),
            ],
        );

        // t1 settles provisionally in b1, then reverts when b2 wins
        assert_eq!(
            signals,
            vec![Signal::settled("t1", Settled::valid(hash("b1"), true))]
        );
        assert_eq!(chain.unpins(), &[unpin_set(&["b1"])]);
        assert_eq!(tracker.pending_len(), 1);
        assert_eq!(tracker.settled_len(), 0);
        assert_eq!(tracker.block_count(), 1);
    }

    #[test]
    fn test_transaction_arriving_after_its_block_never_settles() {
        let mut chain = ScriptedChain::new().with_block("b1", &[("t1", OK)]);
        let mut tracker = TxTracker::default();

        let signals = run(
            &mut tracker,
            &mut chain,
            &[
                ChainEvent::new_block("b1", "genesis"),
                ChainEvent::new_block("b2", "genesis"),
                ChainEvent::new_transaction("t1"),
                ChainEvent::finalized("b2"),
            ],
        );

        assert!(signals.is_empty());
        assert_eq!(chain.unpins(), &[unpin_set(&["b1"])]);
        assert_eq!(tracker.pending_len(), 1);
    }

    #[test]
    fn test_reverted_transaction_skips_blocks_announced_before_it() {
        let mut chain = ScriptedChain::new()
            .with_block("b1", &[("t1", OK)])
            .with_block("a1", &[("t1", OK)]);
        let mut tracker = TxTracker::default();

        let signals = run(
            &mut tracker,
            &mut chain,
            &[
                ChainEvent::new_block("b1", "genesis"),
                ChainEvent::new_transaction("t1"),
                ChainEvent::new_block("a1", "genesis"),
                ChainEvent::finalized("b1"),
            ],
        );

        // b1 predates t1, so losing a1 leaves t1 pending rather than done in b1
        assert_eq!(
            signals,
            vec![Signal::settled("t1", Settled::valid(hash("a1"), true))]
        );
        assert_eq!(chain.unpins(), &[unpin_set(&["a1"])]);
        assert_eq!(chain.calls().get_body, 1);
        assert_eq!(tracker.pending_len(), 1);
        assert_eq!(tracker.settled_len(), 0);
    }

    #[test]
    fn test_finalizing_descendant_completes_skipped_blocks_in_arrival_order() {
        let mut chain = ScriptedChain::new()
            .with_block("b1", &[("t2", OK)])
            .with_block("b2", &[("t1", KO)])
            .with_block("b3", &[]);
        let mut tracker = TxTracker::default();

        let signals = run(
            &mut tracker,
            &mut chain,
            &[
                ChainEvent::new_transaction("t1"),
                ChainEvent::new_transaction("t2"),
                ChainEvent::new_block("b1", "genesis"),
                ChainEvent::new_block("b2", "b1"),
                ChainEvent::new_block("b3", "b2"),
                ChainEvent::finalized("b3"),
            ],
        );

        let t1 = Settled::valid(hash("b2"), false);
        let t2 = Settled::valid(hash("b1"), true);
        assert_eq!(
            signals,
            vec![
                Signal::settled("t2", t2.clone()),
                Signal::settled("t1", t1.clone()),
                Signal::done("t1", t1),
                Signal::done("t2", t2),
            ]
        );
        assert_eq!(chain.unpins(), &[unpin_set(&["b1", "b2"])]);
    }

    #[test]
    fn test_settled_in_arrival_order_not_body_order() {
        let mut chain =
            ScriptedChain::new().with_block("b1", &[("t3", OK), ("t2", INVALID), ("t1", KO)]);
        let mut tracker = TxTracker::default();

        let signals = run(
            &mut tracker,
            &mut chain,
            &[
                ChainEvent::new_transaction("t1"),
                ChainEvent::new_transaction("t2"),
                ChainEvent::new_transaction("t3"),
                ChainEvent::new_block("b1", "genesis"),
            ],
        );

        assert_eq!(
            signals,
            vec![
                Signal::settled("t1", Settled::valid(hash("b1"), false)),
                Signal::settled("t2", Settled::invalid(hash("b1"))),
                Signal::settled("t3", Settled::valid(hash("b1"), true)),
            ]
        );
        // Success is never asked for the invalid transaction
        let calls = chain.calls();
        assert_eq!(calls.get_body, 1);
        assert_eq!(calls.is_tx_valid, 3);
        assert_eq!(calls.is_tx_successful, 2);
    }

    #[test]
    fn test_no_body_fetch_without_pending_transactions() {
        let mut chain = ScriptedChain::new().with_block("b1", &[("t1", OK)]);
        let mut tracker = TxTracker::default();

        run(
            &mut tracker,
            &mut chain,
            &[
                ChainEvent::new_block("b1", "genesis"),
                ChainEvent::new_block("b2", "b1"),
                ChainEvent::finalized("b2"),
            ],
        );

        assert_eq!(chain.calls().get_body, 0);
        assert_eq!(chain.unpins(), &[unpin_set(&["b1"])]);
    }

    #[test]
    fn test_duplicate_transaction_and_block_are_idempotent() {
        let mut chain = ScriptedChain::new().with_block("b1", &[("t1", OK)]);
        let mut tracker = TxTracker::default();

        let signals = run(
            &mut tracker,
            &mut chain,
            &[
                ChainEvent::new_transaction("t1"),
                ChainEvent::new_transaction("t1"),
                ChainEvent::new_block("b1", "genesis"),
                ChainEvent::new_block("b1", "genesis"),
                ChainEvent::finalized("b1"),
                ChainEvent::finalized("b1"),
                ChainEvent::new_transaction("t1"),
            ],
        );

        assert_eq!(signals.len(), 2);
        assert_eq!(chain.calls().get_body, 1);
        assert_eq!(chain.unpins().len(), 1);
        assert_eq!(tracker.pending_len(), 0);
    }

    #[test]
    fn test_reverted_transaction_resettles_on_winning_path() {
        let mut chain = ScriptedChain::new()
            .with_block("a1", &[("t1", OK), ("t2", OK)])
            .with_block("b1", &[("t1", KO)]);
        let mut tracker = TxTracker::default();

        let signals = run(
            &mut tracker,
            &mut chain,
            &[
                ChainEvent::new_transaction("t1"),
                ChainEvent::new_transaction("t2"),
                ChainEvent::new_block("a1", "genesis"),
                ChainEvent::new_block("b1", "genesis"),
                ChainEvent::finalized("b1"),
            ],
        );

        let first = Settled::valid(hash("a1"), true);
        let second = Settled::valid(hash("b1"), false);
        assert_eq!(
            signals,
            vec![
                Signal::settled("t1", first.clone()),
                Signal::settled("t2", first),
                Signal::settled("t1", second.clone()),
                Signal::done("t1", second),
            ]
        );
        // b1 was never fetched when announced, so it is fetched exactly once now
        assert_eq!(chain.calls().get_body, 2);
        assert_eq!(chain.unpins(), &[unpin_set(&["a1"])]);
        // t2 is back in the queue
        assert_eq!(tracker.pending_len(), 1);
    }

    #[test]
    fn test_reverted_transaction_resettles_above_new_frontier() {
        let mut chain = ScriptedChain::new()
            .with_block("a1", &[("t1", OK)])
            .with_block("b2", &[("t1", OK)]);
        let mut tracker = TxTracker::default();

        let signals = run(
            &mut tracker,
            &mut chain,
            &[
                ChainEvent::new_transaction("t1"),
                ChainEvent::new_block("a1", "genesis"),
                ChainEvent::new_block("b1", "genesis"),
                ChainEvent::new_block("b2", "b1"),
                ChainEvent::finalized("b1"),
            ],
        );

        assert_eq!(
            signals,
            vec![
                Signal::settled("t1", Settled::valid(hash("a1"), true)),
                Signal::settled("t1", Settled::valid(hash("b2"), true)),
            ]
        );
        assert_eq!(
            tracker.settlement(&TxId::from("t1")).map(|s| &s.state),
            Some(&Settled::valid(hash("b2"), true))
        );
    }

    #[test]
    fn test_permanent_mode_drops_settlement_on_lost_fork() {
        let mut chain = ScriptedChain::new()
            .with_block("a1", &[("t1", OK)])
            .with_block("b1", &[("t1", KO)]);
        let mut tracker = TxTracker::new(TrackerConfig {
            settlement_mode: SettlementMode::Permanent,
        });

        let signals = run(
            &mut tracker,
            &mut chain,
            &[
                ChainEvent::new_transaction("t1"),
                ChainEvent::new_block("a1", "genesis"),
                ChainEvent::new_block("b1", "genesis"),
                ChainEvent::finalized("b1"),
            ],
        );

        assert_eq!(
            signals,
            vec![Signal::settled("t1", Settled::valid(hash("a1"), true))]
        );
        assert_eq!(tracker.pending_len(), 0);
        assert_eq!(tracker.settled_len(), 0);
    }

    #[test]
    fn test_superseded_frontier_and_orphans_are_unpinned() {
        let mut chain = ScriptedChain::new();
        let mut tracker = TxTracker::default();

        run(
            &mut tracker,
            &mut chain,
            &[
                ChainEvent::new_block("b1", "genesis"),
                ChainEvent::new_block("x1", "genesis"),
                ChainEvent::new_block("b2", "b1"),
                ChainEvent::finalized("b1"),
                // x1 is gone, so its child can never be canonical
                ChainEvent::new_block("x2", "x1"),
                ChainEvent::new_block("x3", "x2"),
                ChainEvent::finalized("b2"),
            ],
        );

        assert_eq!(
            chain.unpins(),
            &[unpin_set(&["x1"]), unpin_set(&["b1", "x2", "x3"])]
        );
        assert_eq!(tracker.block_count(), 1);
    }

    #[test]
    fn test_unknown_finalized_block_is_fatal() {
        let mut chain = ScriptedChain::new();
        let mut tracker = TxTracker::default();
        let mut output = RecordingObserver::new();

        let result = drive(
            &mut tracker,
            &mut chain,
            &mut output,
            &[ChainEvent::new_block("b1", "genesis"), ChainEvent::finalized("zz")],
        );

        assert_eq!(
            result,
            Err(TrackerError::UnknownFinalizedBlock { hash: hash("zz") })
        );
        assert!(chain.unpins().is_empty());
    }

    #[test]
    fn test_oracle_contract_violation_propagates() {
        let mut chain = ScriptedChain::new().with_block("b1", &[("t1", OK)]);
        let mut tracker = TxTracker::default();
        let mut output = RecordingObserver::new();

        // Dispatch without announcing the block to the oracle
        tracker.handle_event(&ChainEvent::new_transaction("t1"), &mut chain, &mut output).unwrap();
        let result =
            tracker.handle_event(&ChainEvent::new_block("b1", "genesis"), &mut chain, &mut output);

        assert_eq!(
            result,
            Err(TrackerError::Oracle(OracleError::UnknownBlock { hash: hash("b1") }))
        );
        assert!(output.signals.is_empty());
    }

    #[test]
    fn test_replay_is_deterministic() {
        let events = vec![
            ChainEvent::new_transaction("t1"),
            ChainEvent::new_transaction("t2"),
            ChainEvent::new_transaction("t3"),
            ChainEvent::new_block("a1", "genesis"),
            ChainEvent::new_block("b1", "genesis"),
            ChainEvent::new_block("a2", "a1"),
            ChainEvent::finalized("a2"),
        ];
        let script = || {
            ScriptedChain::new()
                .with_block("a1", &[("t2", OK)])
                .with_block("b1", &[("t1", OK), ("t3", KO)])
                .with_block("a2", &[("t1", INVALID)])
        };

        let mut first_chain = script();
        let first = run(&mut TxTracker::default(), &mut first_chain, &events);
        let mut second_chain = script();
        let second = run(&mut TxTracker::default(), &mut second_chain, &events);

        assert_eq!(first, second);
        assert_eq!(first_chain.unpins(), second_chain.unpins());
        assert_eq!(first_chain.calls(), second_chain.calls());
    }
}
