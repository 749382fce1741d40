//! Fixture file formats: the replay input and the recorded result.

use std::fs;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use lifecycle_common::{BlockHash, ChainEvent, Settled, TxId};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

/// Outcome of a transaction in one block, as written in the ledger table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LedgerLabel {
    Invalid,
    Ok,
    Ko,
}

/// Ledger table: transaction -> block -> label, in file order.
pub type LedgerFixture = IndexMap<TxId, IndexMap<BlockHash, LedgerLabel>>;

/// Replay input file: the ledger and the ordered event log.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayInput {
    pub transactions: LedgerFixture,
    pub events: Vec<ChainEvent>,
}

/// Which lifecycle signal an [`OutputEvent`] records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignalKind {
    // Recorded fixtures spell it this way
    #[serde(rename = "setted", alias = "settled")]
    Settled,
    #[serde(rename = "done")]
    Done,
}

/// One emitted signal, tagged with the index of the event that triggered it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputEvent {
    pub idx: usize,
    #[serde(rename = "type")]
    pub kind: SignalKind,
    pub transaction: TxId,
    pub state: Settled,
}

/// One `unpin` call, tagged with the index of the event that triggered it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnpinRecord {
    pub idx: usize,
    pub blocks: Vec<BlockHash>,
}

/// Number of successful queries of each kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryCounts {
    pub get_body: u64,
    pub is_tx_valid: u64,
    pub is_tx_successful: u64,
}

/// Everything observable about one run; also the expected-output file format.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayRecord {
    pub unpins: Vec<UnpinRecord>,
    pub output_events: Vec<OutputEvent>,
    pub n_calls: QueryCounts,
}

/// Failures reading or writing fixture files.
#[derive(Debug, thiserror::Error)]
pub enum FixtureError {
    #[error("failed to access {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

fn load<T: DeserializeOwned>(path: &Path) -> Result<T, FixtureError> {
    let content = fs::read_to_string(path).map_err(|source| FixtureError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&content).map_err(|source| FixtureError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Load a replay input (ledger plus event log) from a JSON file.
pub fn load_input(path: &Path) -> Result<ReplayInput, FixtureError> {
    load(path)
}

/// Load an expected record from a JSON file.
pub fn load_record(path: &Path) -> Result<ReplayRecord, FixtureError> {
    load(path)
}

/// Write a record as pretty-printed JSON.
pub fn save_record(path: &Path, record: &ReplayRecord) -> Result<(), FixtureError> {
    let serialized = serde_json::to_string_pretty(record).map_err(|source| FixtureError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    fs::write(path, serialized).map_err(|source| FixtureError::Io {
        path: path.to_path_buf(),
        source,
    })
}
