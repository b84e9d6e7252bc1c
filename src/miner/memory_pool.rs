use crate::crypto::hash::{Hashable, H256};
use crate::transaction::Transaction;
use std::collections::BTreeMap;
use std::collections::HashMap;

/// Pending transactions, handed out in arrival order.
#[derive(Debug)]
pub struct MemoryPool {
    /// Number of transactions ever inserted
    counter: u64,
    /// By-hash storage
    by_hash: HashMap<H256, Entry>,
    /// Storage for order by storage index, it is equivalent to FIFO
    by_storage_index: BTreeMap<u64, H256>,
    /// Maximum number of transactions held
    size_limit: usize,
}

#[derive(Debug, Clone)]
pub struct Entry {
    pub transaction: Transaction,
    pub hash: H256,
    storage_index: u64,
}

impl MemoryPool {
    pub fn new(size_limit: usize) -> Self {
        Self {
            counter: 0,
            by_hash: HashMap::new(),
            by_storage_index: BTreeMap::new(),
            size_limit,
        }
    }

    /// Queue a transaction. Returns false if it is already queued or the pool is full.
    pub fn insert(&mut self, tx: Transaction) -> bool {
        if self.by_hash.len() >= self.size_limit {
            return false;
        }
        let hash = tx.hash();
        if self.by_hash.contains_key(&hash) {
            return false;
        }
        let entry = Entry {
            transaction: tx,
            hash,
            storage_index: self.counter,
        };
        self.counter += 1;
        self.by_storage_index.insert(entry.storage_index, entry.hash);
        self.by_hash.insert(entry.hash, entry);
        true
    }

    pub fn get(&self, h: &H256) -> Option<&Entry> {
        self.by_hash.get(h)
    }

    pub fn remove(&mut self, h: &H256) -> Option<Entry> {
        let entry = self.by_hash.remove(h)?;
        self.by_storage_index.remove(&entry.storage_index);
        Some(entry)
    }

    pub fn contains(&self, h: &H256) -> bool {
        self.by_hash.contains_key(h)
    }

    pub fn len(&self) -> usize {
        self.by_hash.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_hash.is_empty()
    }

    /// get n transaction by fifo
    pub fn get_transactions(&self, n: usize) -> Vec<Transaction> {
        self.by_storage_index
            .values()
            .take(n)
            .filter_map(|hash| self.by_hash.get(hash))
            .map(|entry| entry.transaction.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::sign::KeyPair;

    fn transactions(n: u64) -> Vec<Transaction> {
        let keypair = KeyPair::generate();
        (0..n)
            .map(|nonce| Transaction::sign(&keypair, nonce, H256([1; 32]), 1, 0, vec![]))
            .collect()
    }

    #[test]
    fn fifo() {
        let mut pool = MemoryPool::new(100);
        let txs = transactions(20);
        for tx in txs.iter() {
            assert!(pool.insert(tx.clone()));
        }
        assert_eq!(pool.len(), 20);
        assert_eq!(pool.get_transactions(15)[..], txs[..15]);
        assert_eq!(pool.get_transactions(25).len(), 20);

        pool.remove(&txs[0].hash()).unwrap();
        pool.remove(&txs[5].hash()).unwrap();
        assert!(pool.remove(&txs[5].hash()).is_none());
        let left = pool.get_transactions(3);
        assert_eq!(left, vec![txs[1].clone(), txs[2].clone(), txs[3].clone()]);
        assert!(!pool.contains(&txs[5].hash()));
        assert_eq!(pool.get(&txs[6].hash()).unwrap().transaction, txs[6]);
    }

    #[test]
    fn duplicates_and_limit() {
        let mut pool = MemoryPool::new(2);
        let txs = transactions(3);
        assert!(pool.is_empty());
        assert!(pool.insert(txs[0].clone()));
        assert!(!pool.insert(txs[0].clone()));
        assert!(pool.insert(txs[1].clone()));
        assert!(!pool.insert(txs[2].clone()));
        assert_eq!(pool.len(), 2);
        pool.remove(&txs[0].hash());
        assert!(pool.insert(txs[2].clone()));
        assert_eq!(pool.get_transactions(2), vec![txs[1].clone(), txs[2].clone()]);
    }
}
