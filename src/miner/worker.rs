//! Background mining thread.
//!
//! The thread keeps one [`Miner`] staged on the current head, feeds it pending transactions and
//! mines it in quanta of a configurable number of nonces. Between quanta it drains its control
//! and update channels, so a new head or a shutdown is noticed within one quantum.

use super::memory_pool::MemoryPool;
use super::{Miner, MinerError};
use crate::block::Block;
use crate::blockdb::BlockDatabase;
use crate::config::MinerConfig;
use crate::crypto::hash::{Hashable, H256};
use crate::crypto::pow::PowHasher;
use crate::execution::AccountExecutor;
use crate::transaction::{Address, Transaction};
use crossbeam::channel::{unbounded, Receiver, Sender, TryRecvError};
use log::{debug, error, info};
use std::sync::{Arc, Mutex};
use std::thread;

enum ControlSignal {
    Start(u64), // number of nonces tried between checks of the channels
    Step,
    Exit,
}

pub enum ContextUpdateSignal {
    // A new block became the head; mining restarts on top of it
    NewHead(H256),
    // A transaction arrived; it is queued and offered to the current miner
    NewTransaction(Transaction),
}

enum OperatingState {
    Paused,
    Run(u64),
    Step,
    ShutDown,
}

pub struct Context {
    blockdb: Arc<BlockDatabase>,
    mempool: Arc<Mutex<MemoryPool>>,
    config: MinerConfig,
    hasher: Arc<dyn PowHasher>,
    coinbase: Address,
    /// Hash of the block the next block is built on
    head: H256,
    miner: Option<Miner<AccountExecutor>>,
    /// Channel for receiving control signal
    control_chan: Receiver<ControlSignal>,
    /// Channel for notifying miner of new content
    context_update_chan: Receiver<ContextUpdateSignal>,
    /// Channel the sealed blocks are sent to
    block_sink: Sender<Block>,
    operating_state: OperatingState,
}

#[derive(Clone)]
pub struct Handle {
    // Channel for sending signal to the miner thread
    control_chan: Sender<ControlSignal>,
    context_update_chan: Sender<ContextUpdateSignal>,
}

pub fn new(
    blockdb: &Arc<BlockDatabase>,
    mempool: &Arc<Mutex<MemoryPool>>,
    config: &MinerConfig,
    hasher: &Arc<dyn PowHasher>,
    coinbase: Address,
    head: H256,
    block_sink: Sender<Block>,
) -> (Context, Handle) {
    let (signal_chan_sender, signal_chan_receiver) = unbounded();
    let (update_chan_sender, update_chan_receiver) = unbounded();

    let ctx = Context {
        blockdb: Arc::clone(blockdb),
        mempool: Arc::clone(mempool),
        config: config.clone(),
        hasher: Arc::clone(hasher),
        coinbase,
        head,
        miner: None,
        control_chan: signal_chan_receiver,
        context_update_chan: update_chan_receiver,
        block_sink,
        operating_state: OperatingState::Paused,
    };

    let handle = Handle {
        control_chan: signal_chan_sender,
        context_update_chan: update_chan_sender,
    };

    (ctx, handle)
}

impl Handle {
    pub fn exit(&self) {
        self.control_chan.send(ControlSignal::Exit).unwrap();
    }

    /// Mine continuously, checking the channels every `steps` nonces.
    pub fn start(&self, steps: u64) {
        self.control_chan.send(ControlSignal::Start(steps)).unwrap();
    }

    /// Mine until one block is sealed, then pause.
    pub fn step(&self) {
        self.control_chan.send(ControlSignal::Step).unwrap();
    }

    pub fn new_head(&self, hash: H256) {
        self.context_update_chan
            .send(ContextUpdateSignal::NewHead(hash))
            .unwrap();
    }

    pub fn add_transaction(&self, transaction: Transaction) {
        self.context_update_chan
            .send(ContextUpdateSignal::NewTransaction(transaction))
            .unwrap();
    }
}

impl Context {
    pub fn start(mut self) {
        thread::Builder::new()
            .name("miner".to_string())
            .spawn(move || {
                self.miner_loop();
            })
            .unwrap();
        info!("Miner initialized into paused mode");
    }

    fn handle_control_signal(&mut self, signal: ControlSignal) {
        match signal {
            ControlSignal::Exit => {
                info!("Miner shutting down");
                self.operating_state = OperatingState::ShutDown;
            }
            ControlSignal::Start(steps) => {
                info!("Miner starting in continuous mode with {} steps", steps);
                self.operating_state = OperatingState::Run(steps);
            }
            ControlSignal::Step => {
                info!("Miner starting in stepping mode");
                self.operating_state = OperatingState::Step;
            }
        }
    }

    fn miner_loop(&mut self) {
        loop {
            // check and react to control signals
            match self.operating_state {
                OperatingState::Paused => {
                    match self.control_chan.recv() {
                        Ok(signal) => self.handle_control_signal(signal),
                        Err(_) => self.operating_state = OperatingState::ShutDown,
                    }
                    continue;
                }
                OperatingState::ShutDown => {
                    return;
                }
                _ => match self.control_chan.try_recv() {
                    Ok(signal) => {
                        self.handle_control_signal(signal);
                    }
                    Err(TryRecvError::Empty) => {}
                    Err(TryRecvError::Disconnected) => panic!("Miner control channel detached"),
                },
            }
            if let OperatingState::ShutDown = self.operating_state {
                return;
            }

            // check and react to update signals
            let mut new_transactions = vec![];
            for sig in self.context_update_chan.try_iter() {
                match sig {
                    ContextUpdateSignal::NewHead(hash) => {
                        if hash != self.head {
                            self.head = hash;
                            self.miner = None;
                        }
                    }
                    ContextUpdateSignal::NewTransaction(tx) => {
                        let mut mempool = self.mempool.lock().unwrap();
                        if mempool.insert(tx.clone()) {
                            new_transactions.push(tx);
                        }
                    }
                }
            }

            if self.miner.is_none() {
                // staging admits everything in the pool, new arrivals included
                if !self.stage() {
                    self.operating_state = OperatingState::Paused;
                    continue;
                }
            } else {
                for tx in new_transactions.iter() {
                    if !self.admit(tx) {
                        self.operating_state = OperatingState::Paused;
                        break;
                    }
                }
                if let OperatingState::Paused = self.operating_state {
                    continue;
                }
            }

            let steps = match self.operating_state {
                OperatingState::Run(steps) => steps,
                _ => self.config.steps,
            };
            let result = match self.miner.as_mut() {
                Some(miner) => miner.mine(steps),
                None => continue,
            };
            match result {
                Ok(Some(block)) => self.on_sealed(block),
                Ok(None) => {}
                Err(MinerError::NoncesExhausted) => {
                    info!("Nonces exhausted for block on {}, staging again", self.head);
                    self.miner = None;
                }
                Err(e) => {
                    error!("Mining block on {} failed: {}", self.head, e);
                    self.miner = None;
                    self.operating_state = OperatingState::Paused;
                }
            }
        }
    }

    /// Stage a fresh block on the head and offer it every pooled transaction in arrival order.
    /// Returns false if mining cannot continue.
    fn stage(&mut self) -> bool {
        let parent = match self.blockdb.get(&self.head) {
            Some(parent) => parent,
            None => {
                error!("Head block {} is not in the block database", self.head);
                return false;
            }
        };
        let miner = Miner::new(
            &parent,
            &[],
            self.coinbase,
            AccountExecutor::new(&self.config),
            &self.hasher,
            &self.blockdb,
        );
        match miner {
            Ok(miner) => self.miner = Some(miner),
            Err(e) => {
                error!("Failed to stage block on {}: {}", self.head, e);
                return false;
            }
        }
        let pending = {
            let mempool = self.mempool.lock().unwrap();
            mempool.get_transactions(mempool.len())
        };
        for tx in pending.iter() {
            if !self.admit(tx) {
                return false;
            }
        }
        debug!(
            "Staged block on {} with {} transactions",
            self.head,
            self.miner.as_ref().map_or(0, |m| m.get_transactions().len())
        );
        true
    }

    /// Offer one transaction to the current miner. A rejected transaction is dropped from the
    /// pool unless its nonce is still ahead of the sender's account. Returns false on an
    /// unrecoverable error.
    fn admit(&mut self, tx: &Transaction) -> bool {
        let miner = match self.miner.as_mut() {
            Some(miner) => miner,
            None => return true,
        };
        match miner.add_transaction(tx) {
            Ok(true) => true,
            Ok(false) => {
                let expected = miner.state().nonce(&tx.sender_address());
                if tx.nonce > expected {
                    debug!(
                        "Keeping transaction {} with nonce {}, sender is at {}",
                        tx.hash(),
                        tx.nonce,
                        expected
                    );
                } else {
                    debug!("Dropping rejected transaction {}", tx.hash());
                    self.mempool.lock().unwrap().remove(&tx.hash());
                }
                true
            }
            Err(e) => {
                error!("Failed to add transaction {}: {}", tx.hash(), e);
                self.miner = None;
                false
            }
        }
    }

    fn on_sealed(&mut self, block: Block) {
        let hash = self.blockdb.insert(&block);
        {
            let mut mempool = self.mempool.lock().unwrap();
            for tx in block.get_transactions() {
                mempool.remove(&tx.hash());
            }
        }
        info!(
            "Mined block {} at height {} with {} transactions",
            hash,
            block.header.number,
            block.get_transactions().len()
        );
        self.head = hash;
        self.miner = None;
        if self.block_sink.send(block).is_err() {
            info!("Block receiver dropped, miner shutting down");
            self.operating_state = OperatingState::ShutDown;
            return;
        }
        // if we are stepping, pause the miner loop
        if let OperatingState::Step = self.operating_state {
            self.operating_state = OperatingState::Paused;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::pow::Sha256;
    use crate::crypto::sign::KeyPair;
    use crate::state::StateDatabase;
    use crossbeam::channel::RecvTimeoutError;
    use std::time::Duration;

    fn setup(
        difficulty: H256,
        allocations: &[(Address, u64)],
    ) -> (Arc<BlockDatabase>, Arc<Mutex<MemoryPool>>, Block) {
        let state_db = Arc::new(StateDatabase::new());
        let genesis = Block::genesis(&state_db, difficulty, allocations);
        let blockdb = Arc::new(BlockDatabase::new());
        blockdb.insert(&genesis);
        (blockdb, Arc::new(Mutex::new(MemoryPool::new(100))), genesis)
    }

    #[test]
    fn step_mines_one_block() {
        let (blockdb, mempool, genesis) = setup(H256::from(2u64), &[]);
        let hasher: Arc<dyn PowHasher> = Arc::new(Sha256);
        let (sink, blocks) = unbounded();
        let (ctx, handle) = new(
            &blockdb,
            &mempool,
            &MinerConfig::new(10, 100),
            &hasher,
            H256([5; 32]),
            genesis.hash(),
            sink,
        );
        ctx.start();
        handle.step();
        let block = blocks.recv_timeout(Duration::from_secs(30)).unwrap();
        assert_eq!(block.header.parent_hash, genesis.hash());
        assert!(block.header.check_pow(&Sha256));
        assert!(blockdb.contains(&block.hash()));
        assert_eq!(block.state().balance(&H256([5; 32])), 100);

        // paused after one block
        match blocks.recv_timeout(Duration::from_millis(200)) {
            Err(RecvTimeoutError::Timeout) => {}
            other => panic!("unexpected result {:?}", other.map(|b| b.hash())),
        }
        handle.exit();
    }

    #[test]
    fn pending_transactions_are_mined() {
        let alice = KeyPair::generate();
        let bob = KeyPair::generate();
        let (blockdb, mempool, genesis) = setup(H256::from(2u64), &[(alice.address(), 100)]);
        let hasher: Arc<dyn PowHasher> = Arc::new(Sha256);
        let (sink, blocks) = unbounded();
        let (ctx, handle) = new(
            &blockdb,
            &mempool,
            &MinerConfig::default(),
            &hasher,
            H256([5; 32]),
            genesis.hash(),
            sink,
        );
        let good = Transaction::sign(&alice, 0, bob.address(), 30, 1, vec![]);
        let broke = Transaction::sign(&alice, 1, bob.address(), 1000, 1, vec![]);
        handle.add_transaction(good.clone());
        handle.add_transaction(broke.clone());
        ctx.start();
        handle.step();
        let block = blocks.recv_timeout(Duration::from_secs(30)).unwrap();
        handle.exit();

        assert_eq!(block.get_transactions(), &[good][..]);
        assert_eq!(block.state().balance(&bob.address()), 30);
        let mempool = mempool.lock().unwrap();
        assert!(mempool.is_empty());
    }

    #[test]
    fn early_nonce_waits_for_its_predecessor() {
        let alice = KeyPair::generate();
        let bob = KeyPair::generate();
        let (blockdb, mempool, genesis) = setup(H256::from(2u64), &[(alice.address(), 100)]);
        let hasher: Arc<dyn PowHasher> = Arc::new(Sha256);
        let (sink, blocks) = unbounded();
        let (ctx, handle) = new(
            &blockdb,
            &mempool,
            &MinerConfig::default(),
            &hasher,
            H256([5; 32]),
            genesis.hash(),
            sink,
        );
        let first = Transaction::sign(&alice, 0, bob.address(), 10, 0, vec![]);
        let second = Transaction::sign(&alice, 1, bob.address(), 20, 0, vec![]);
        let stale = Transaction::sign(&alice, 0, bob.address(), 99, 0, vec![]);
        handle.add_transaction(second.clone());
        handle.add_transaction(first.clone());
        ctx.start();
        handle.step();
        let block = blocks.recv_timeout(Duration::from_secs(30)).unwrap();
        assert_eq!(block.get_transactions(), &[first][..]);
        {
            let mempool = mempool.lock().unwrap();
            assert_eq!(mempool.get_transactions(10), vec![second.clone()]);
        }

        handle.add_transaction(stale);
        handle.step();
        let block = blocks.recv_timeout(Duration::from_secs(30)).unwrap();
        handle.exit();
        assert_eq!(block.get_transactions(), &[second][..]);
        assert_eq!(block.state().balance(&bob.address()), 30);
        assert!(mempool.lock().unwrap().is_empty());
    }

    #[test]
    fn continuous_mining_extends_the_chain() {
        let (blockdb, mempool, genesis) = setup(H256::from(2u64), &[]);
        let hasher: Arc<dyn PowHasher> = Arc::new(Sha256);
        let (sink, blocks) = unbounded();
        let (ctx, handle) = new(
            &blockdb,
            &mempool,
            &MinerConfig::default(),
            &hasher,
            H256([5; 32]),
            genesis.hash(),
            sink,
        );
        ctx.start();
        handle.start(10);
        let first = blocks.recv_timeout(Duration::from_secs(30)).unwrap();
        let second = blocks.recv_timeout(Duration::from_secs(30)).unwrap();
        handle.exit();
        assert_eq!(second.header.parent_hash, first.hash());
        assert_eq!(second.header.number, 2);
        assert!(second.header.timestamp > first.header.timestamp);
    }
}
