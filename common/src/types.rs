//! Core type definitions shared by the tracker and the evaluator

use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque block identifier
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlockHash(String);

/// Opaque transaction identifier
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TxId(String);

macro_rules! string_id {
    ($name:ident) => {
        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }
    };
}

string_id!(BlockHash);
string_id!(TxId);

/// Result of executing a transaction in a particular block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Outcome {
    /// Included but rejected by the ledger rules
    Invalid,

    /// Included and applied
    Valid { successful: bool },
}

impl Outcome {
    pub fn is_valid(&self) -> bool {
        matches!(self, Outcome::Valid { .. })
    }
}

/// Settlement of a transaction: the block it was matched to and its outcome.
///
/// Serialises flat, e.g. `{"blockHash":"b1","type":"valid","successful":true}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settled {
    pub block_hash: BlockHash,

    #[serde(flatten)]
    pub outcome: Outcome,
}

impl Settled {
    pub fn invalid(block_hash: BlockHash) -> Self {
        Self {
            block_hash,
            outcome: Outcome::Invalid,
        }
    }

    pub fn valid(block_hash: BlockHash, successful: bool) -> Self {
        Self {
            block_hash,
            outcome: Outcome::Valid { successful },
        }
    }
}

impl fmt::Display for Settled {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.outcome {
            Outcome::Invalid => write!(f, "{} invalid", self.block_hash),
            Outcome::Valid { successful: true } => write!(f, "{} ok", self.block_hash),
            Outcome::Valid { successful: false } => write!(f, "{} ko", self.block_hash),
        }
    }
}
