//! Pending transaction queue, ordered by arrival.

use std::collections::BTreeMap;

use lifecycle_common::TxId;

/// FIFO of unsettled transactions keyed by arrival index.
///
/// Keying by arrival index lets a reverted transaction re-enter at the
/// position it first arrived in.
#[derive(Debug, Default)]
pub struct PendingQueue {
    queue: BTreeMap<u64, TxId>,
}

impl PendingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, arrival: u64, tx: TxId) {
        self.queue.insert(arrival, tx);
    }

    pub fn remove(&mut self, arrival: u64) -> Option<TxId> {
        self.queue.remove(&arrival)
    }

    /// Pending transactions in arrival order.
    pub fn iter(&self) -> impl Iterator<Item = (u64, &TxId)> {
        self.queue.iter().map(|(arrival, tx)| (*arrival, tx))
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reinserted_entry_keeps_arrival_position() {
        let mut queue = PendingQueue::new();
        queue.insert(0, TxId::from("t0"));
        queue.insert(1, TxId::from("t1"));
        queue.insert(2, TxId::from("t2"));

        assert_eq!(queue.remove(1), Some(TxId::from("t1")));
        queue.insert(1, TxId::from("t1"));

        let order: Vec<&str> = queue.iter().map(|(_, tx)| tx.as_str()).collect();
        assert_eq!(order, vec!["t0", "t1", "t2"]);
    }
}
