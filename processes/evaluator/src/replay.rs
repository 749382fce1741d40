//! Drives a recorded event log through a tracking engine

use anyhow::{Context, Result};
use lifecycle_common::TrackingEngine;
use tracing::{debug_span, info};

use crate::fixture::{ReplayInput, ReplayRecord};
use crate::recorder::TraceRecorder;
use crate::replay_oracle::ReplayOracle;
use crate::scoring::{score, ScoreReport};

/// Replays one input against any number of candidate engines.
#[derive(Debug, Clone)]
pub struct Evaluator {
    input: ReplayInput,
}

impl Evaluator {
    pub fn new(input: ReplayInput) -> Self {
        Self { input }
    }

    pub fn input(&self) -> &ReplayInput {
        &self.input
    }

    /// Feed every event, in order, through `engine` and record what it does.
    ///
    /// Each run gets its own oracle and recorder. An engine error aborts the
    /// run.
    pub fn run<E: TrackingEngine>(&self, engine: &mut E) -> Result<ReplayRecord> {
        let mut oracle = ReplayOracle::new(&self.input.transactions);
        let mut recorder = TraceRecorder::new();

        for (idx, event) in self.input.events.iter().enumerate() {
            let _span = debug_span!("event", idx).entered();
            oracle.announce(idx, event);
            recorder.set_event_index(idx);
            engine
                .handle_event(event, &mut oracle, &mut recorder)
                .with_context(|| format!("Engine failed on event {idx}: {event:?}"))?;
        }

        let n_calls = oracle.counts();
        info!(
            events = self.input.events.len(),
            signals = recorder.events().len(),
            unpins = oracle.unpins().len(),
            get_body = n_calls.get_body,
            is_tx_valid = n_calls.is_tx_valid,
            is_tx_successful = n_calls.is_tx_successful,
            "Replay complete"
        );

        Ok(ReplayRecord {
            unpins: oracle.into_unpins(),
            output_events: recorder.into_events(),
            n_calls,
        })
    }

    /// Run `engine` and score its record against `expected`.
    pub fn evaluate<E: TrackingEngine>(
        &self,
        engine: &mut E,
        expected: &ReplayRecord,
    ) -> Result<ScoreReport> {
        let actual = self.run(engine)?;
        Ok(score(&actual, expected))
    }
}
