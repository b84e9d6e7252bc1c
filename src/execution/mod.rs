//! Transaction execution and block finalization.

use crate::block::Block;
use crate::config::{MinerConfig, UNCLE_DEPTH_PENALTY_FACTOR};
use crate::crypto::hash::Hashable;
use crate::state::{Account, StateError};
use crate::transaction::Transaction;
use log::trace;
use thiserror::Error;

/// Reasons a transaction is not eligible for inclusion. A rejected transaction leaves the state
/// untouched.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InvalidTransaction {
    #[error("signature does not match the sender")]
    BadSignature,
    #[error("bad nonce: expected {expected}, got {got}")]
    BadNonce { expected: u64, got: u64 },
    #[error("insufficient balance: required {required}, available {available}")]
    InsufficientBalance { required: u64, available: u64 },
}

#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("invalid transaction: {0}")]
    Invalid(#[from] InvalidTransaction),
    #[error(transparent)]
    State(#[from] StateError),
}

/// Mutates a block's state by applying transactions and rewards.
pub trait Executor: Send {
    /// Apply `transaction` on top of the block's current state. On success the transaction is
    /// appended to the block and its effects are committed to the state root.
    fn apply_transaction(
        &self,
        block: &mut Block,
        transaction: &Transaction,
    ) -> Result<(bool, Vec<u8>), ExecutionError>;

    /// Credit the block and uncle rewards and commit the new state root. Only reward balances
    /// are touched, so restoring the root that was current before this call undoes it.
    fn finalize(&self, block: &mut Block);
}

/// Executes value transfers between accounts.
#[derive(Debug, Clone)]
pub struct AccountExecutor {
    block_reward: u64,
    nephew_reward: u64,
}

impl AccountExecutor {
    pub fn new(config: &MinerConfig) -> Self {
        Self {
            block_reward: config.block_reward,
            nephew_reward: config.nephew_reward,
        }
    }

    /// Reward for an uncle at `uncle_number` referenced by the block at `block_number`. Never
    /// more than the block reward, whatever height the uncle claims.
    pub fn uncle_reward(&self, uncle_number: u64, block_number: u64) -> u64 {
        let depth_factor = UNCLE_DEPTH_PENALTY_FACTOR
            .saturating_add(uncle_number)
            .saturating_sub(block_number)
            .min(UNCLE_DEPTH_PENALTY_FACTOR);
        let reward = u128::from(self.block_reward) * u128::from(depth_factor)
            / u128::from(UNCLE_DEPTH_PENALTY_FACTOR);
        reward as u64
    }
}

impl Default for AccountExecutor {
    fn default() -> Self {
        Self::new(&MinerConfig::default())
    }
}

impl Executor for AccountExecutor {
    fn apply_transaction(
        &self,
        block: &mut Block,
        transaction: &Transaction,
    ) -> Result<(bool, Vec<u8>), ExecutionError> {
        // every check happens before the first write
        if !transaction.verify_signature() {
            return Err(InvalidTransaction::BadSignature.into());
        }
        let sender = transaction.sender_address();
        let account = block.state().account(&sender);
        if transaction.nonce != account.nonce {
            return Err(InvalidTransaction::BadNonce {
                expected: account.nonce,
                got: transaction.nonce,
            }
            .into());
        }
        let required = transaction.value.checked_add(transaction.fee);
        let required = match required {
            Some(r) if r <= account.balance => r,
            _ => {
                return Err(InvalidTransaction::InsufficientBalance {
                    required: required.unwrap_or(u64::max_value()),
                    available: account.balance,
                }
                .into())
            }
        };

        let coinbase = block.header.coinbase;
        let state = block.state_mut();
        state.set_account(
            sender,
            Account {
                nonce: account.nonce + 1,
                balance: account.balance - required,
            },
        );
        state.add_balance(&transaction.recipient, transaction.value);
        state.add_balance(&coinbase, transaction.fee);
        block.push_transaction(transaction.clone());
        let root = block.commit_state();
        trace!(
            "Applied transaction {} in block {}, new state root {}",
            transaction.hash(),
            block.header.number,
            root
        );
        Ok((true, transaction.data.clone()))
    }

    fn finalize(&self, block: &mut Block) {
        let number = block.header.number;
        let coinbase = block.header.coinbase;
        let uncle_rewards: Vec<_> = block
            .uncles
            .iter()
            .map(|uncle| (uncle.coinbase, self.uncle_reward(uncle.number, number)))
            .collect();
        let reward = self
            .block_reward
            .saturating_add(self.nephew_reward.saturating_mul(uncle_rewards.len() as u64));
        let state = block.state_mut();
        state.add_balance(&coinbase, reward);
        for (uncle_coinbase, uncle_reward) in uncle_rewards.iter() {
            state.add_balance(uncle_coinbase, *uncle_reward);
        }
        block.commit_state();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BLOCK_REWARD, NEPHEW_REWARD};
    use crate::crypto::hash::H256;
    use crate::crypto::sign::KeyPair;
    use crate::state::StateDatabase;
    use std::sync::Arc;

    fn funded_child(keypair: &KeyPair, funds: u64) -> Block {
        let db = Arc::new(StateDatabase::new());
        let genesis = Block::genesis(&db, H256::from(1u64), &[(keypair.address(), funds)]);
        Block::init_from_parent(&genesis, H256([0xcc; 32]), vec![], 1, vec![]).unwrap()
    }

    #[test]
    fn transfer() {
        let alice = KeyPair::generate();
        let bob = KeyPair::generate();
        let mut block = funded_child(&alice, 100);
        let before = block.state_root();
        let tx = Transaction::sign(&alice, 0, bob.address(), 60, 5, b"memo".to_vec());
        let (success, output) = AccountExecutor::default()
            .apply_transaction(&mut block, &tx)
            .unwrap();
        assert!(success);
        assert_eq!(output, b"memo".to_vec());
        assert_ne!(block.state_root(), before);
        assert_eq!(block.get_transactions(), &[tx][..]);
        let state = block.state();
        assert_eq!(state.balance(&alice.address()), 35);
        assert_eq!(state.nonce(&alice.address()), 1);
        assert_eq!(state.balance(&bob.address()), 60);
        assert_eq!(state.balance(&H256([0xcc; 32])), 5);
    }

    #[test]
    fn transfer_to_self() {
        let alice = KeyPair::generate();
        let mut block = funded_child(&alice, 100);
        let tx = Transaction::sign(&alice, 0, alice.address(), 60, 5, vec![]);
        AccountExecutor::default()
            .apply_transaction(&mut block, &tx)
            .unwrap();
        assert_eq!(block.state().balance(&alice.address()), 95);
    }

    #[test]
    fn rejections_leave_state_alone() {
        let alice = KeyPair::generate();
        let bob = KeyPair::generate();
        let mut block = funded_child(&alice, 100);
        let before = block.state_root();
        let executor = AccountExecutor::default();

        let tx = Transaction::sign(&alice, 0, bob.address(), 100, 1, vec![]);
        match executor.apply_transaction(&mut block, &tx) {
            Err(ExecutionError::Invalid(InvalidTransaction::InsufficientBalance {
                required,
                available,
            })) => {
                assert_eq!(required, 101);
                assert_eq!(available, 100);
            }
            other => panic!("unexpected result {:?}", other),
        }

        let tx = Transaction::sign(&alice, 3, bob.address(), 1, 1, vec![]);
        match executor.apply_transaction(&mut block, &tx) {
            Err(ExecutionError::Invalid(InvalidTransaction::BadNonce { expected, got })) => {
                assert_eq!(expected, 0);
                assert_eq!(got, 3);
            }
            other => panic!("unexpected result {:?}", other),
        }

        let mut tx = Transaction::sign(&alice, 0, bob.address(), 1, 1, vec![]);
        tx.recipient = alice.address();
        match executor.apply_transaction(&mut block, &tx) {
            Err(ExecutionError::Invalid(InvalidTransaction::BadSignature)) => {}
            other => panic!("unexpected result {:?}", other),
        }

        let tx = Transaction::sign(&alice, 0, bob.address(), u64::max_value(), 1, vec![]);
        assert!(executor.apply_transaction(&mut block, &tx).is_err());

        assert_eq!(block.state_root(), before);
        assert!(!block.state().is_dirty());
        assert!(block.get_transactions().is_empty());
    }

    #[test]
    fn finalize_rewards_coinbase() {
        let alice = KeyPair::generate();
        let mut block = funded_child(&alice, 100);
        let before = block.state_root();
        AccountExecutor::default().finalize(&mut block);
        assert_ne!(block.state_root(), before);
        assert_eq!(block.state().balance(&H256([0xcc; 32])), BLOCK_REWARD);
        assert!(block.get_transactions().is_empty());

        // restoring the previous root undoes the rewards
        block.set_state_root(before).unwrap();
        assert_eq!(block.state().balance(&H256([0xcc; 32])), 0);
    }

    #[test]
    fn finalize_rewards_uncles() {
        let db = Arc::new(StateDatabase::new());
        let genesis = Block::genesis(&db, H256::from(1u64), &[]);
        let parent =
            Block::init_from_parent(&genesis, H256([0xaa; 32]), vec![], 1, vec![]).unwrap();
        let uncle =
            Block::init_from_parent(&genesis, H256([0xbb; 32]), vec![], 2, vec![]).unwrap();
        let mut block = Block::init_from_parent(
            &parent,
            H256([0xcc; 32]),
            vec![],
            3,
            vec![uncle.header.clone()],
        )
        .unwrap();
        let executor = AccountExecutor::default();
        executor.finalize(&mut block);
        let state = block.state();
        assert_eq!(
            state.balance(&H256([0xcc; 32])),
            BLOCK_REWARD + NEPHEW_REWARD
        );
        // uncle at height 1 referenced from height 2
        assert_eq!(state.balance(&H256([0xbb; 32])), BLOCK_REWARD * 7 / 8);
        assert_eq!(executor.uncle_reward(1, 2), BLOCK_REWARD * 7 / 8);
    }

    #[test]
    fn uncle_reward_is_bounded() {
        let executor = AccountExecutor::default();
        assert_eq!(executor.uncle_reward(u64::max_value() / 100, 2), BLOCK_REWARD);
        assert_eq!(executor.uncle_reward(u64::max_value(), 0), BLOCK_REWARD);
        assert_eq!(executor.uncle_reward(5, 5), BLOCK_REWARD);
        assert_eq!(executor.uncle_reward(1, 9), 0);
        assert_eq!(executor.uncle_reward(0, u64::max_value()), 0);

        let rich = AccountExecutor::new(&MinerConfig::new(10, u64::max_value()));
        assert_eq!(
            rich.uncle_reward(3, 4),
            (u128::from(u64::max_value()) * 7 / 8) as u64
        );
        assert_eq!(rich.uncle_reward(100, 4), u64::max_value());
    }

    #[test]
    fn finalize_is_deterministic() {
        let alice = KeyPair::generate();
        let mut first = funded_child(&alice, 100);
        let mut second = first.clone();
        let executor = AccountExecutor::default();
        executor.finalize(&mut first);
        executor.finalize(&mut second);
        assert_eq!(first.state_root(), second.state_root());
    }
}
