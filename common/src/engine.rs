//! Output sink and engine contracts

use crate::events::ChainEvent;
use crate::oracle::ChainQuery;
use crate::types::{Settled, TxId};

/// Receiver for transaction lifecycle signals.
///
/// Signals are delivered synchronously from inside the event handler that
/// triggers them, so their order is the handler's iteration order.
pub trait LifecycleObserver {
    /// The transaction was matched to a block with the given outcome.
    fn tx_settled(&mut self, tx: &TxId, state: &Settled);

    /// The block the transaction settled in is final.
    fn tx_done(&mut self, tx: &TxId, state: &Settled);
}

/// A transaction tracking engine driven one event at a time.
///
/// The oracle and the output sink are lent for the duration of each call,
/// so every engine instance and every oracle keeps its own state.
pub trait TrackingEngine {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Process a single event, emitting any resulting lifecycle signals.
    fn handle_event(
        &mut self,
        event: &ChainEvent,
        chain: &mut dyn ChainQuery,
        output: &mut dyn LifecycleObserver,
    ) -> Result<(), Self::Error>;
}
