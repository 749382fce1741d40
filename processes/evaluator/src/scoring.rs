//! Scoring of a replay record against the expected one.
//!
//! The trace must match exactly or nothing is awarded. A matching trace earns
//! the base score, each query counter at or below the expected value earns a
//! bonus, and an unpin sequence matching call for call earns the final bonus.

use std::collections::BTreeSet;
use std::fmt;

use lifecycle_common::BlockHash;
use tracing::{info, warn};

use crate::fixture::{OutputEvent, ReplayRecord};

pub const BASE_SCORE: f64 = 7.0;
pub const QUERY_BONUS: f64 = 0.5;
pub const UNPIN_BONUS: f64 = 1.5;
pub const MAX_SCORE: f64 = BASE_SCORE + 3.0 * QUERY_BONUS + UNPIN_BONUS;

/// Which oracle query a counter refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
    GetBody,
    IsTxValid,
    IsTxSuccessful,
}

impl fmt::Display for QueryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryKind::GetBody => write!(f, "getBody"),
            QueryKind::IsTxValid => write!(f, "isTxValid"),
            QueryKind::IsTxSuccessful => write!(f, "isTxSuccessful"),
        }
    }
}

/// Why credit was withheld.
#[derive(Debug, Clone, PartialEq)]
pub enum Diagnostic {
    /// First position where the traces differ. `expected` is `None` when the
    /// candidate emitted more signals than expected.
    TraceMismatch {
        index: usize,
        expected: Option<OutputEvent>,
        received: Option<OutputEvent>,
    },

    /// The candidate trace is a strict prefix of the expected one.
    MissingEvents { expected: usize, received: usize },

    /// More queries of one kind than the expected run made.
    RedundantQueries {
        query: QueryKind,
        expected: u64,
        received: u64,
    },

    /// A different number of `unpin` calls.
    UnpinCountMismatch { expected: usize, received: usize },

    /// The first `unpin` call whose block set differs.
    UnpinMismatch {
        index: usize,
        expected: BTreeSet<BlockHash>,
        received: BTreeSet<BlockHash>,
    },
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::TraceMismatch {
                index,
                expected,
                received,
            } => write!(
                f,
                "trace differs at {index}: expected {expected:?}, received {received:?}"
            ),
            Diagnostic::MissingEvents { expected, received } => {
                write!(f, "missing events: expected {expected}, received {received}")
            }
            Diagnostic::RedundantQueries {
                query,
                expected,
                received,
            } => write!(
                f,
                "unnecessary `{query}` calls detected ({received} > {expected})"
            ),
            Diagnostic::UnpinCountMismatch { expected, received } => write!(
                f,
                "unpin call count differs: expected {expected}, received {received}"
            ),
            Diagnostic::UnpinMismatch {
                index,
                expected,
                received,
            } => write!(
                f,
                "unpin call {index} differs: expected {expected:?}, received {received:?}"
            ),
        }
    }
}

/// Final score and the reasons for any missing credit.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreReport {
    pub score: f64,
    pub diagnostics: Vec<Diagnostic>,
}

impl ScoreReport {
    fn finish(score: f64, diagnostics: Vec<Diagnostic>) -> Self {
        for diagnostic in &diagnostics {
            warn!("{diagnostic}");
        }
        Self { score, diagnostics }
    }

    pub fn is_perfect(&self) -> bool {
        self.diagnostics.is_empty()
    }
}

/// Score `actual` against `expected`.
pub fn score(actual: &ReplayRecord, expected: &ReplayRecord) -> ScoreReport {
    let mut diagnostics = Vec::new();

    // Every emitted signal must match, position by position
    for (index, received) in actual.output_events.iter().enumerate() {
        let expected_event = expected.output_events.get(index);
        if expected_event != Some(received) {
            diagnostics.push(Diagnostic::TraceMismatch {
                index,
                expected: expected_event.cloned(),
                received: Some(received.clone()),
            });
            return ScoreReport::finish(0.0, diagnostics);
        }
    }
    if actual.output_events.len() < expected.output_events.len() {
        diagnostics.push(Diagnostic::MissingEvents {
            expected: expected.output_events.len(),
            received: actual.output_events.len(),
        });
        return ScoreReport::finish(0.0, diagnostics);
    }

    let mut result = BASE_SCORE;

    let counters = [
        (
            QueryKind::GetBody,
            actual.n_calls.get_body,
            expected.n_calls.get_body,
        ),
        (
            QueryKind::IsTxValid,
            actual.n_calls.is_tx_valid,
            expected.n_calls.is_tx_valid,
        ),
        (
            QueryKind::IsTxSuccessful,
            actual.n_calls.is_tx_successful,
            expected.n_calls.is_tx_successful,
        ),
    ];
    for (query, received, expected) in counters {
        if received <= expected {
            result += QUERY_BONUS;
        } else {
            diagnostics.push(Diagnostic::RedundantQueries {
                query,
                expected,
                received,
            });
        }
    }

    if actual.unpins.len() != expected.unpins.len() {
        diagnostics.push(Diagnostic::UnpinCountMismatch {
            expected: expected.unpins.len(),
            received: actual.unpins.len(),
        });
        return ScoreReport::finish(result, diagnostics);
    }

    for (index, (received, wanted)) in actual.unpins.iter().zip(&expected.unpins).enumerate() {
        let received: BTreeSet<BlockHash> = received.blocks.iter().cloned().collect();
        let wanted: BTreeSet<BlockHash> = wanted.blocks.iter().cloned().collect();
        if received != wanted {
            diagnostics.push(Diagnostic::UnpinMismatch {
                index,
                expected: wanted,
                received,
            });
            return ScoreReport::finish(result, diagnostics);
        }
    }

    info!("Perfect unpinning");
    result += UNPIN_BONUS;
    ScoreReport::finish(result, diagnostics)
}
