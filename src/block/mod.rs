pub mod header;

use crate::blockdb::BlockDatabase;
use crate::crypto::hash::{Hashable, H256};
use crate::crypto::merkle::MerkleTree;
use crate::state::{State, StateDatabase, StateError};
use crate::transaction::{Address, Transaction};
use header::Header;
use std::sync::Arc;

/// A block together with a view of the account state it commits to.
#[derive(Debug, Clone)]
pub struct Block {
    pub header: Header,
    pub transactions: Vec<Transaction>,
    pub uncles: Vec<Header>,
    state: State,
}

impl Block {
    /// Create a genesis block whose state credits the given allocations.
    pub fn genesis(
        db: &Arc<StateDatabase>,
        difficulty: H256,
        allocations: &[(Address, u64)],
    ) -> Block {
        let mut state = State::new(db);
        for (address, value) in allocations {
            state.add_balance(address, *value);
        }
        let state_root = state.commit();
        let header = Header {
            parent_hash: H256::default(),
            uncles_hash: H256::default(),
            coinbase: H256::default(),
            state_root,
            tx_list_root: H256::default(),
            difficulty,
            number: 0,
            timestamp: 0,
            extra_data: vec![],
            nonce: [0; 8],
        };
        Block {
            header,
            transactions: vec![],
            uncles: vec![],
            state,
        }
    }

    /// Create an unsealed child of `parent` that starts from the parent's post-state.
    pub fn init_from_parent(
        parent: &Block,
        coinbase: Address,
        extra_data: Vec<u8>,
        timestamp: u64,
        uncles: Vec<Header>,
    ) -> Result<Block, StateError> {
        let state = State::at(parent.state.database(), parent.header.state_root)?;
        let header = Header {
            parent_hash: parent.hash(),
            uncles_hash: MerkleTree::new(&uncles).root(),
            coinbase,
            state_root: state.root(),
            tx_list_root: H256::default(),
            difficulty: parent.header.difficulty,
            number: parent.header.number + 1,
            timestamp,
            extra_data,
            nonce: [0; 8],
        };
        Ok(Block {
            header,
            transactions: vec![],
            uncles,
            state,
        })
    }

    pub fn hash(&self) -> H256 {
        self.header.hash()
    }

    pub fn get_transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut State {
        &mut self.state
    }

    pub fn state_root(&self) -> H256 {
        self.header.state_root
    }

    /// Point the block at a committed state root, discarding uncommitted state changes.
    pub fn set_state_root(&mut self, root: H256) -> Result<(), StateError> {
        self.state.set_root(root)?;
        self.header.state_root = root;
        Ok(())
    }

    /// Commit pending state changes and record the new root in the header.
    pub fn commit_state(&mut self) -> H256 {
        let root = self.state.commit();
        self.header.state_root = root;
        root
    }

    /// Append a transaction and update the transaction root.
    pub fn push_transaction(&mut self, transaction: Transaction) {
        self.transactions.push(transaction);
        self.header.tx_list_root = MerkleTree::new(&self.transactions).root();
    }

    pub fn get_parent(&self, blockdb: &BlockDatabase) -> Option<Block> {
        blockdb.get(&self.header.parent_hash)
    }
}
