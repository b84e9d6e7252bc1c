use crate::crypto::hash::H256;

// Maximum number of uncle headers referenced by one block
pub const MAX_UNCLES: usize = 2;

// Reward credited to the coinbase of every block
pub const BLOCK_REWARD: u64 = 1500;
// Extra reward credited to the coinbase for each uncle it includes
pub const NEPHEW_REWARD: u64 = BLOCK_REWARD / 32;
// Uncle reward is BLOCK_REWARD * (FACTOR + uncle.number - block.number) / FACTOR
pub const UNCLE_DEPTH_PENALTY_FACTOR: u64 = 8;

// Nonces tried per call to the miner before control returns to the scheduler
pub const DEFAULT_MINING_STEPS: u64 = 1000;

// Layers of account changes kept on top of a full state snapshot before it is collapsed
pub const MAX_SNAPSHOT_DEPTH: usize = 64;

// Maximum number of pending transactions kept by the memory pool
pub const DEFAULT_MEMPOOL_SIZE: usize = 50000;

lazy_static! {
    pub static ref DEFAULT_DIFFICULTY: H256 = H256::from(131072u64);
}

/// Parameters of block staging and mining.
#[derive(Debug, Clone)]
pub struct MinerConfig {
    /// Nonces tried per mining quantum.
    pub steps: u64,
    pub block_reward: u64,
    pub nephew_reward: u64,
}

impl MinerConfig {
    pub fn new(steps: u64, block_reward: u64) -> Self {
        Self {
            steps,
            block_reward,
            nephew_reward: block_reward / 32,
        }
    }
}

impl Default for MinerConfig {
    fn default() -> Self {
        Self {
            steps: DEFAULT_MINING_STEPS,
            block_reward: BLOCK_REWARD,
            nephew_reward: NEPHEW_REWARD,
        }
    }
}
