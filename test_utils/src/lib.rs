//! Test doubles for driving a [`TrackingEngine`] without a recorded fixture.
//!
//! [`ScriptedChain`] is a strict oracle: it only answers about blocks and
//! transactions it has seen announced through [`ScriptedChain::announce`],
//! and counts every successful query. [`RecordingObserver`] keeps the emitted
//! lifecycle signals in order.

use std::cell::Cell;
use std::collections::{BTreeSet, HashMap, HashSet};

use lifecycle_common::{
    BlockHash, ChainEvent, ChainQuery, LifecycleObserver, OracleError, Outcome, Settled,
    TrackingEngine, TxId,
};

/// Successful query counts, per kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Calls {
    pub get_body: u64,
    pub is_tx_valid: u64,
    pub is_tx_successful: u64,
}

/// Oracle backed by hand-written block contents.
#[derive(Debug, Default)]
pub struct ScriptedChain {
    bodies: HashMap<BlockHash, Vec<(TxId, Outcome)>>,
    announced_blocks: HashSet<BlockHash>,
    announced_txs: HashSet<TxId>,
    calls: Cell<Calls>,
    unpins: Vec<BTreeSet<BlockHash>>,
}

impl ScriptedChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Define the contents of a block. Blocks never defined have empty bodies.
    pub fn with_block(mut self, hash: &str, txs: &[(&str, Outcome)]) -> Self {
        self.bodies.insert(
            BlockHash::from(hash),
            txs.iter().map(|(tx, outcome)| (TxId::from(*tx), *outcome)).collect(),
        );
        self
    }

    /// Mark the entity an event introduces as known, before the engine sees it.
    pub fn announce(&mut self, event: &ChainEvent) {
        match event {
            ChainEvent::NewTransaction { value } => {
                self.announced_txs.insert(value.clone());
            }
            ChainEvent::NewBlock { block_hash, .. } => {
                self.announced_blocks.insert(block_hash.clone());
            }
            ChainEvent::Finalized { .. } => {}
        }
    }

    pub fn calls(&self) -> Calls {
        self.calls.get()
    }

    pub fn unpins(&self) -> &[BTreeSet<BlockHash>] {
        &self.unpins
    }

    fn check_block(&self, hash: &BlockHash) -> Result<(), OracleError> {
        if self.announced_blocks.contains(hash) {
            Ok(())
        } else {
            Err(OracleError::UnknownBlock { hash: hash.clone() })
        }
    }

    fn check_tx(&self, tx: &TxId) -> Result<(), OracleError> {
        if self.announced_txs.contains(tx) {
            Ok(())
        } else {
            Err(OracleError::UnknownTransaction { tx: tx.clone() })
        }
    }

    fn outcome(&self, hash: &BlockHash, tx: &TxId) -> Option<Outcome> {
        self.bodies.get(hash)?.iter().find(|(t, _)| t == tx).map(|(_, outcome)| *outcome)
    }

    fn count(&self, f: impl FnOnce(&mut Calls)) {
        let mut calls = self.calls.get();
        f(&mut calls);
        self.calls.set(calls);
    }
}

impl ChainQuery for ScriptedChain {
    fn get_body(&self, hash: &BlockHash) -> Result<Vec<TxId>, OracleError> {
        self.check_block(hash)?;
        self.count(|c| c.get_body += 1);
        Ok(self
            .bodies
            .get(hash)
            .map(|txs| txs.iter().map(|(tx, _)| tx.clone()).collect())
            .unwrap_or_default())
    }

    fn is_tx_valid(&self, hash: &BlockHash, tx: &TxId) -> Result<bool, OracleError> {
        self.check_block(hash)?;
        self.check_tx(tx)?;
        self.count(|c| c.is_tx_valid += 1);
        Ok(!matches!(self.outcome(hash, tx), Some(Outcome::Invalid)))
    }

    fn is_tx_successful(&self, hash: &BlockHash, tx: &TxId) -> Result<bool, OracleError> {
        self.check_block(hash)?;
        self.check_tx(tx)?;
        let outcome = self.outcome(hash, tx).ok_or_else(|| OracleError::TransactionNotInBlock {
            hash: hash.clone(),
            tx: tx.clone(),
        })?;
        self.count(|c| c.is_tx_successful += 1);
        Ok(matches!(outcome, Outcome::Valid { successful: true }))
    }

    fn unpin(&mut self, blocks: &BTreeSet<BlockHash>) {
        self.unpins.push(blocks.clone());
    }
}

/// A lifecycle signal as observed by [`RecordingObserver`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal {
    Settled(TxId, Settled),
    Done(TxId, Settled),
}

impl Signal {
    pub fn settled(tx: &str, state: Settled) -> Self {
        Signal::Settled(TxId::from(tx), state)
    }

    pub fn done(tx: &str, state: Settled) -> Self {
        Signal::Done(TxId::from(tx), state)
    }
}

/// Output sink that records every signal in emission order.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    pub signals: Vec<Signal>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drain the recorded signals, leaving the recorder empty.
    pub fn take(&mut self) -> Vec<Signal> {
        std::mem::take(&mut self.signals)
    }
}

impl LifecycleObserver for RecordingObserver {
    fn tx_settled(&mut self, tx: &TxId, state: &Settled) {
        self.signals.push(Signal::Settled(tx.clone(), state.clone()));
    }

    fn tx_done(&mut self, tx: &TxId, state: &Settled) {
        self.signals.push(Signal::Done(tx.clone(), state.clone()));
    }
}

/// Announce and dispatch each event in order, stopping at the first error.
pub fn drive<E: TrackingEngine>(
    engine: &mut E,
    chain: &mut ScriptedChain,
    output: &mut RecordingObserver,
    events: &[ChainEvent],
) -> Result<(), E::Error> {
    for event in events {
        chain.announce(event);
        engine.handle_event(event, chain, output)?;
    }
    Ok(())
}

/// `Outcome::Valid { successful: true }`
pub const OK: Outcome = Outcome::Valid { successful: true };

/// `Outcome::Valid { successful: false }`
pub const KO: Outcome = Outcome::Valid { successful: false };

/// `Outcome::Invalid`
pub const INVALID: Outcome = Outcome::Invalid;
