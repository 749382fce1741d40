//! Chain query oracle backed by a ledger fixture.

use std::cell::Cell;
use std::collections::{BTreeSet, HashMap, HashSet};

use lifecycle_common::{BlockHash, ChainEvent, ChainQuery, OracleError, TxId};
use tracing::debug;

use crate::fixture::{LedgerFixture, LedgerLabel, QueryCounts, UnpinRecord};

/// Answers queries from the fixture, refusing anything not yet announced,
/// and records query counts and unpin calls.
#[derive(Debug)]
pub struct ReplayOracle<'a> {
    ledger: &'a LedgerFixture,
    /// Block contents derived from the ledger.
    bodies: HashMap<BlockHash, Vec<TxId>>,
    seen_blocks: HashSet<BlockHash>,
    seen_txs: HashSet<TxId>,
    counts: Cell<QueryCounts>,
    unpins: Vec<UnpinRecord>,
    /// Index of the event being dispatched.
    idx: usize,
}

impl<'a> ReplayOracle<'a> {
    /// Build the oracle. A block's body lists, in the order the ledger file
    /// names them, every transaction with a non-invalid label for that block.
    pub fn new(ledger: &'a LedgerFixture) -> Self {
        let mut bodies: HashMap<BlockHash, Vec<TxId>> = HashMap::new();
        for (tx, blocks) in ledger {
            for (block, label) in blocks {
                if *label != LedgerLabel::Invalid {
                    bodies.entry(block.clone()).or_default().push(tx.clone());
                }
            }
        }

        Self {
            ledger,
            bodies,
            seen_blocks: HashSet::new(),
            seen_txs: HashSet::new(),
            counts: Cell::new(QueryCounts::default()),
            unpins: Vec::new(),
            idx: 0,
        }
    }

    /// Record that `event`, at position `idx` in the log, is about to be
    /// dispatched, making whatever it introduces known.
    pub fn announce(&mut self, idx: usize, event: &ChainEvent) {
        self.idx = idx;
        match event {
            ChainEvent::NewTransaction { value } => {
                self.seen_txs.insert(value.clone());
            }
            ChainEvent::NewBlock { block_hash, .. } => {
                self.seen_blocks.insert(block_hash.clone());
            }
            ChainEvent::Finalized { .. } => {}
        }
    }

    pub fn counts(&self) -> QueryCounts {
        self.counts.get()
    }

    pub fn unpins(&self) -> &[UnpinRecord] {
        &self.unpins
    }

    pub fn into_unpins(self) -> Vec<UnpinRecord> {
        self.unpins
    }

    fn check_block(&self, hash: &BlockHash) -> Result<(), OracleError> {
        if self.seen_blocks.contains(hash) {
            Ok(())
        } else {
            Err(OracleError::UnknownBlock { hash: hash.clone() })
        }
    }

    fn check_tx(&self, tx: &TxId) -> Result<(), OracleError> {
        if self.seen_txs.contains(tx) {
            Ok(())
        } else {
            Err(OracleError::UnknownTransaction { tx: tx.clone() })
        }
    }

    fn label(&self, hash: &BlockHash, tx: &TxId) -> Option<LedgerLabel> {
        self.ledger.get(tx).and_then(|blocks| blocks.get(hash)).copied()
    }

    fn count(&self, f: impl FnOnce(&mut QueryCounts)) {
        let mut counts = self.counts.get();
        f(&mut counts);
        self.counts.set(counts);
    }
}

impl ChainQuery for ReplayOracle<'_> {
    fn get_body(&self, hash: &BlockHash) -> Result<Vec<TxId>, OracleError> {
        self.check_block(hash)?;
        self.count(|c| c.get_body += 1);
        Ok(self.bodies.get(hash).cloned().unwrap_or_default())
    }

    fn is_tx_valid(&self, hash: &BlockHash, tx: &TxId) -> Result<bool, OracleError> {
        self.check_block(hash)?;
        self.check_tx(tx)?;
        self.count(|c| c.is_tx_valid += 1);
        // No label at all counts as valid
        Ok(self.label(hash, tx) != Some(LedgerLabel::Invalid))
    }

    fn is_tx_successful(&self, hash: &BlockHash, tx: &TxId) -> Result<bool, OracleError> {
        self.check_block(hash)?;
        self.check_tx(tx)?;
        let in_body = self.bodies.get(hash).is_some_and(|body| body.contains(tx));
        if !in_body {
            return Err(OracleError::TransactionNotInBlock {
                hash: hash.clone(),
                tx: tx.clone(),
            });
        }
        self.count(|c| c.is_tx_successful += 1);
        Ok(self.label(hash, tx) == Some(LedgerLabel::Ok))
    }

    fn unpin(&mut self, blocks: &BTreeSet<BlockHash>) {
        debug!(idx = self.idx, count = blocks.len(), "Unpin");
        self.unpins.push(UnpinRecord {
            idx: self.idx,
            blocks: blocks.iter().cloned().collect(),
        });
    }
}
