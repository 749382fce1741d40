//! Incoming chain events, in the order they are observed

use serde::{Deserialize, Serialize};

use crate::types::{BlockHash, TxId};

/// One entry of the event log.
///
/// Wire format is tagged on `type`, matching the recorded fixtures:
/// `{"type":"newBlock","blockHash":"b1","parent":"genesis"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ChainEvent {
    /// A transaction was broadcast and should be tracked
    NewTransaction { value: TxId },

    /// A block was announced on top of `parent`
    #[serde(rename_all = "camelCase")]
    NewBlock { block_hash: BlockHash, parent: BlockHash },

    /// `block_hash` and all of its ancestors are final
    #[serde(rename_all = "camelCase")]
    Finalized { block_hash: BlockHash },
}

impl ChainEvent {
    pub fn new_transaction(tx: impl Into<TxId>) -> Self {
        ChainEvent::NewTransaction { value: tx.into() }
    }

    pub fn new_block(hash: impl Into<BlockHash>, parent: impl Into<BlockHash>) -> Self {
        ChainEvent::NewBlock {
            block_hash: hash.into(),
            parent: parent.into(),
        }
    }

    pub fn finalized(hash: impl Into<BlockHash>) -> Self {
        ChainEvent::Finalized {
            block_hash: hash.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_recorded_event_log() {
        let log = r#"[
            {"type":"newTransaction","value":"t1"},
            {"type":"newBlock","blockHash":"b1","parent":"genesis"},
            {"type":"finalized","blockHash":"b1"}
        ]"#;
        let events: Vec<ChainEvent> = serde_json::from_str(log).unwrap();
        assert_eq!(
            events,
            vec![
                ChainEvent::new_transaction("t1"),
                ChainEvent::new_block("b1", "genesis"),
                ChainEvent::finalized("b1"),
            ]
        );
    }
}
