//! Chain query oracle contract.
//!
//! The oracle answers questions about blocks and transactions the engine has
//! already been told about. Asking about anything else is a contract
//! violation and is reported as an [`OracleError`].

use std::collections::BTreeSet;

use crate::types::{BlockHash, TxId};

/// Contract violations raised by a [`ChainQuery`] implementation.
///
/// These always indicate a defect in the caller and are never retried.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OracleError {
    /// The block was never announced by a `newBlock` event.
    #[error("unknown block: {hash}")]
    UnknownBlock { hash: BlockHash },

    /// The transaction was never announced by a `newTransaction` event.
    #[error("unknown transaction: {tx}")]
    UnknownTransaction { tx: TxId },

    /// Success was queried for a transaction the block does not contain.
    #[error("transaction {tx} not in block {hash}")]
    TransactionNotInBlock { hash: BlockHash, tx: TxId },
}

/// Queries about announced blocks and transactions.
///
/// All queries are pure and repeatable. `unpin` is a one-way hint with no
/// acknowledgement.
pub trait ChainQuery {
    /// Ordered transaction ids included in the block.
    fn get_body(&self, hash: &BlockHash) -> Result<Vec<TxId>, OracleError>;

    /// Whether the transaction is valid in the context of the block.
    fn is_tx_valid(&self, hash: &BlockHash, tx: &TxId) -> Result<bool, OracleError>;

    /// Whether the transaction executed successfully in the block.
    fn is_tx_successful(&self, hash: &BlockHash, tx: &TxId) -> Result<bool, OracleError>;

    /// Release any state retained for the given blocks.
    fn unpin(&mut self, blocks: &BTreeSet<BlockHash>);
}
