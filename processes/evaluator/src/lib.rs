//! Replay evaluator for transaction tracking engines.
//!
//! Wraps a ledger fixture as a [`ChainQuery`](lifecycle_common::ChainQuery)
//! oracle, feeds a recorded event log through a candidate engine, records
//! what the engine emits and asks, and scores the result against an expected
//! record.

pub mod evaluator_config;
pub mod fixture;
pub mod recorder;
pub mod replay;
pub mod replay_oracle;
pub mod scoring;

pub use fixture::{LedgerLabel, OutputEvent, QueryCounts, ReplayInput, ReplayRecord, UnpinRecord};
pub use replay::Evaluator;
pub use scoring::{score, Diagnostic, ScoreReport};
