//! Output sink that records lifecycle signals for scoring

use lifecycle_common::{LifecycleObserver, Settled, TxId};

use crate::fixture::{OutputEvent, SignalKind};

/// Records every emitted signal, tagged with the current event index.
#[derive(Debug, Default)]
pub struct TraceRecorder {
    idx: usize,
    events: Vec<OutputEvent>,
}

impl TraceRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the index of the event about to be dispatched.
    pub fn set_event_index(&mut self, idx: usize) {
        self.idx = idx;
    }

    pub fn events(&self) -> &[OutputEvent] {
        &self.events
    }

    pub fn into_events(self) -> Vec<OutputEvent> {
        self.events
    }

    fn push(&mut self, kind: SignalKind, tx: &TxId, state: &Settled) {
        self.events.push(OutputEvent {
            idx: self.idx,
            kind,
            transaction: tx.clone(),
            state: state.clone(),
        });
    }
}

impl LifecycleObserver for TraceRecorder {
    fn tx_settled(&mut self, tx: &TxId, state: &Settled) {
        self.push(SignalKind::Settled, tx, state);
    }

    fn tx_done(&mut self, tx: &TxId, state: &Settled) {
        self.push(SignalKind::Done, tx, state);
    }
}
