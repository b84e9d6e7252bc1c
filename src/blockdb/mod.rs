use crate::block::Block;
use crate::crypto::hash::H256;
use std::collections::HashMap;
use std::sync::{Mutex, RwLock};

/// In-memory index of known blocks by hash.
#[derive(Debug, Default)]
pub struct BlockDatabase {
    blocks: RwLock<HashMap<H256, Block>>,
    count: Mutex<u64>,
}

impl BlockDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a block and return its hash. Inserting a known block is a no-op.
    pub fn insert(&self, block: &Block) -> H256 {
        let hash = block.hash();
        let mut blocks = self.blocks.write().unwrap();
        if !blocks.contains_key(&hash) {
            blocks.insert(hash, block.clone());
            let mut count = self.count.lock().unwrap();
            *count += 1;
        }
        hash
    }

    pub fn get(&self, hash: &H256) -> Option<Block> {
        let blocks = self.blocks.read().unwrap();
        blocks.get(hash).cloned()
    }

    pub fn contains(&self, hash: &H256) -> bool {
        let blocks = self.blocks.read().unwrap();
        blocks.contains_key(hash)
    }

    pub fn num_blocks(&self) -> u64 {
        let count = self.count.lock().unwrap();
        return *count;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::StateDatabase;
    use std::sync::Arc;

    #[test]
    fn insert_and_get() {
        let db = BlockDatabase::new();
        let state_db = Arc::new(StateDatabase::new());
        let test_block = Block::genesis(&state_db, H256::from(1u64), &[]);
        let hash = db.insert(&test_block);
        assert_eq!(hash, test_block.hash());
        let got = db.get(&hash).unwrap();
        assert_eq!(got.hash(), test_block.hash());
        assert!(db.contains(&hash));
        assert_eq!(db.num_blocks(), 1);

        // a second insert of the same block is not counted
        db.insert(&test_block);
        assert_eq!(db.num_blocks(), 1);
        assert!(db.get(&H256([1; 32])).is_none());
    }
}
