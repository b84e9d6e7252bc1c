//! Block staging, transaction admission and proof-of-work search on one candidate block.
//!
//! A [`Miner`] owns a single candidate block built on top of a parent. Transactions are applied
//! to the state as it was before block rewards were credited; the rewards are then re-applied.
//! This works because finalization only touches reward balances, so pointing the block back at
//! the root captured before the last finalization exactly undoes it.
//!
//! A miner is meant to be driven by one thread. [`Miner::mine`] does a bounded amount of work
//! and returns, so the caller can interleave mining with admitting transactions or with checking
//! for a new chain head, in which case the miner is simply dropped.

pub mod memory_pool;
pub mod worker;

use crate::block::header::Header;
use crate::block::Block;
use crate::blockdb::BlockDatabase;
use crate::config::MAX_UNCLES;
use crate::crypto::hash::{Hashable, H256};
use crate::crypto::pow::{self, PowHasher};
use crate::execution::{ExecutionError, Executor};
use crate::state::{State, StateError};
use crate::transaction::{Address, Transaction};
use byteorder::{BigEndian, ByteOrder};
use log::{debug, trace};
use std::sync::Arc;
use std::time::SystemTime;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MinerError {
    #[error("transaction execution failed: {0}")]
    Execution(ExecutionError),
    #[error(transparent)]
    State(#[from] StateError),
    #[error("block is already sealed")]
    AlreadySealed,
    #[error("block difficulty is zero")]
    ZeroDifficulty,
    #[error("every nonce has been tried")]
    NoncesExhausted,
}

pub type Result<T> = std::result::Result<T, MinerError>;

pub struct Miner<E: Executor> {
    block: Block,
    /// State before the most recent finalization. Holding the view keeps its root restorable.
    pre_finalize_state: State,
    /// Next nonce to try.
    nonce: u64,
    /// Set once `u64::MAX` has been tried without success.
    exhausted: bool,
    sealed: bool,
    executor: E,
    hasher: Arc<dyn PowHasher>,
    blockdb: Arc<BlockDatabase>,
}

impl<E: Executor> Miner<E> {
    /// Stage a child of `parent` mined by `coinbase`, referencing at most two of `uncles`.
    pub fn new(
        parent: &Block,
        uncles: &[Header],
        coinbase: Address,
        executor: E,
        hasher: &Arc<dyn PowHasher>,
        blockdb: &Arc<BlockDatabase>,
    ) -> Result<Self> {
        let timestamp = staging_timestamp(get_time(), parent.header.timestamp);
        let uncles: Vec<Header> = uncles.iter().take(MAX_UNCLES).cloned().collect();
        let mut block = Block::init_from_parent(parent, coinbase, vec![], timestamp, uncles)?;
        let pre_finalize_state = block.state().clone();
        executor.finalize(&mut block);
        debug!(
            "Mining block {} with hash {} and difficulty {}",
            block.header.number,
            block.hash(),
            block.header.difficulty()
        );
        Ok(Miner {
            block,
            pre_finalize_state,
            nonce: 0,
            exhausted: false,
            sealed: false,
            executor,
            hasher: Arc::clone(hasher),
            blockdb: Arc::clone(blockdb),
        })
    }

    /// Try to include `transaction` in the block. Returns whether it was included. An ineligible
    /// transaction is not an error and leaves the state exactly as it was.
    pub fn add_transaction(&mut self, transaction: &Transaction) -> Result<bool> {
        if self.sealed {
            return Err(MinerError::AlreadySealed);
        }
        let old_state_root = self.block.state_root();
        // revert finalization
        self.block.set_state_root(self.pre_finalize_state.root())?;
        let tx_hash = transaction.hash();
        let (success, output) = match self.executor.apply_transaction(&mut self.block, transaction)
        {
            Ok(result) => result,
            Err(ExecutionError::Invalid(e)) => {
                debug!("Invalid transaction {}: {}", tx_hash, e);
                (false, vec![])
            }
            Err(e) => return Err(MinerError::Execution(e)),
        };

        // finalize again on top of whatever the attempt left behind
        self.pre_finalize_state = self.block.state().clone();
        self.executor.finalize(&mut self.block);

        if !success {
            debug!("Transaction {} not applied", tx_hash);
            assert_eq!(
                old_state_root,
                self.block.state_root(),
                "rejected transaction {} changed the state",
                tx_hash
            );
            return Ok(false);
        }
        assert!(
            self.block.get_transactions().contains(transaction),
            "applied transaction {} missing from the block",
            tx_hash
        );
        debug!(
            "Transaction {} applied to block {}, output {} bytes",
            tx_hash,
            self.block.header.number,
            output.len()
        );
        assert_ne!(
            old_state_root,
            self.block.state_root(),
            "applied transaction {} did not change the state",
            tx_hash
        );
        Ok(true)
    }

    /// Transactions included in the block so far, in order.
    pub fn get_transactions(&self) -> &[Transaction] {
        self.block.get_transactions()
    }

    /// Look up an included transaction by hash.
    pub fn find_transaction(&self, hash: &H256) -> Option<&Transaction> {
        self.get_transactions().iter().find(|tx| tx.hash() == *hash)
    }

    /// Try the next `steps` nonces. Returns the sealed block if one of them solves the puzzle;
    /// otherwise the search resumes after the last tried nonce on the next call. Once the whole
    /// nonce space has been tried, further calls fail with `NoncesExhausted` and the block has to
    /// be staged again.
    pub fn mine(&mut self, steps: u64) -> Result<Option<Block>> {
        if self.sealed {
            return Err(MinerError::AlreadySealed);
        }
        let difficulty = self.block.header.difficulty();
        if difficulty.is_zero() {
            return Err(MinerError::ZeroDifficulty);
        }
        if self.exhausted {
            return Err(MinerError::NoncesExhausted);
        }
        if steps == 0 {
            return Ok(None);
        }
        let target = pow::pow_target(difficulty);
        let header_bytes = self.block.header.encode_without_nonce();
        // H(header_bytes) does not depend on the nonce
        let seed = self.hasher.digest(&header_bytes);
        let mut buffer = [0u8; 32 + pow::NONCE_LENGTH];
        buffer[..32].copy_from_slice(seed.as_ref());

        let last = self.nonce.saturating_add(steps - 1);
        for nonce in self.nonce..=last {
            BigEndian::write_u64(&mut buffer[32..], nonce);
            let value = self.hasher.digest(&buffer);
            if pow::meets_target(&value, &target) {
                self.block.header.nonce = pow::encode_nonce(nonce);
                assert!(
                    self.block.header.check_pow(&*self.hasher),
                    "sealed block fails its own proof of work"
                );
                assert!(
                    self.block.get_parent(&self.blockdb).is_some(),
                    "sealed block has unknown parent {}",
                    self.block.header.parent_hash
                );
                debug!(
                    "Nonce {} found for block {} with hash {}",
                    nonce,
                    self.block.header.number,
                    self.block.hash()
                );
                self.nonce = nonce;
                self.sealed = true;
                return Ok(Some(self.block.clone()));
            }
        }
        trace!(
            "No nonce in [{}, {}] for block {}",
            self.nonce,
            last,
            self.block.header.number
        );
        match last.checked_add(1) {
            Some(next) => self.nonce = next,
            None => {
                self.nonce = last;
                self.exhausted = true;
            }
        }
        Ok(None)
    }

    pub fn header(&self) -> &Header {
        &self.block.header
    }

    pub fn state_root(&self) -> H256 {
        self.block.state_root()
    }

    /// Read-only view of the block's current state.
    pub fn state(&self) -> &State {
        self.block.state()
    }

    pub fn pre_finalize_state_root(&self) -> H256 {
        self.pre_finalize_state.root()
    }

    /// The next nonce `mine` will try, or the winning nonce once sealed. Stays at `u64::MAX` once
    /// every nonce has been tried.
    pub fn nonce_cursor(&self) -> u64 {
        self.nonce
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }
}

/// Timestamp of a block staged at `now` on a parent stamped `parent_timestamp`. Always strictly
/// after the parent, even if the local clock lags behind it.
fn staging_timestamp(now: u64, parent_timestamp: u64) -> u64 {
    std::cmp::max(now, parent_timestamp.saturating_add(1))
}

/// Get the current UNIX timestamp in seconds
fn get_time() -> u64 {
    match SystemTime::now().duration_since(SystemTime::UNIX_EPOCH) {
        Ok(v) => v.as_secs(),
        Err(e) => {
            log::warn!("Error parsing time: {:?}", e);
            0
        }
    }
}
