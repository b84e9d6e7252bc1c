//! Account state.
//!
//! A [`StateDatabase`] maps state roots to snapshots of the account table. A root is the SHA256
//! of the table's canonical encoding, so equal contents always have equal roots and a committed
//! root can be revisited for as long as some [`State`] still holds it. Snapshots are layered: a
//! commit stores only the accounts it changed on top of its parent snapshot, and a chain deeper
//! than [`MAX_SNAPSHOT_DEPTH`] is collapsed into a fresh full table. The database keeps weak
//! references only, so a snapshot is released together with the last view that reaches it.

use crate::config::MAX_SNAPSHOT_DEPTH;
use crate::crypto::hash::H256;
use crate::transaction::Address;
use bincode::serialize;
use log::trace;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, RwLock, Weak};
use thiserror::Error;

pub type Accounts = BTreeMap<Address, Account>;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Account {
    pub nonce: u64,
    pub balance: u64,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StateError {
    #[error("state root {0} is not in the state database")]
    MissingRoot(H256),
}

fn root_of(accounts: &Accounts) -> H256 {
    ring::digest::digest(&ring::digest::SHA256, &serialize(accounts).unwrap()).into()
}

/// One committed version of the account table.
#[derive(Debug)]
struct Snapshot {
    root: H256,
    /// Accounts written by this version. The whole table when there is no parent.
    changes: Accounts,
    parent: Option<Arc<Snapshot>>,
    /// Number of layers below this one.
    depth: usize,
}

impl Snapshot {
    fn get(&self, address: &Address) -> Option<Account> {
        let mut layer = self;
        loop {
            if let Some(account) = layer.changes.get(address) {
                return Some(*account);
            }
            match &layer.parent {
                Some(parent) => layer = &**parent,
                None => return None,
            }
        }
    }

    /// The full account table of this version.
    fn flatten(&self) -> Accounts {
        let mut layers = vec![];
        let mut layer = self;
        loop {
            layers.push(layer);
            match &layer.parent {
                Some(parent) => layer = &**parent,
                None => break,
            }
        }
        let mut accounts = Accounts::new();
        for layer in layers.iter().rev() {
            for (address, account) in layer.changes.iter() {
                accounts.insert(*address, *account);
            }
        }
        accounts
    }
}

/// Content-addressed index of the account snapshots still in use.
#[derive(Debug)]
pub struct StateDatabase {
    snapshots: RwLock<HashMap<H256, Weak<Snapshot>>>,
    /// Index size at which released entries are swept next
    sweep_at: Mutex<usize>,
}

const MIN_SWEEP: usize = 64;

impl Default for StateDatabase {
    fn default() -> Self {
        Self {
            snapshots: RwLock::new(HashMap::new()),
            sweep_at: Mutex::new(MIN_SWEEP),
        }
    }
}

impl StateDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a snapshot, or return the live one already stored under the same root.
    fn insert(&self, snapshot: Snapshot) -> Arc<Snapshot> {
        let mut snapshots = self.snapshots.write().unwrap();
        if let Some(existing) = snapshots.get(&snapshot.root).and_then(Weak::upgrade) {
            return existing;
        }
        let root = snapshot.root;
        let snapshot = Arc::new(snapshot);
        snapshots.insert(root, Arc::downgrade(&snapshot));

        let mut sweep_at = self.sweep_at.lock().unwrap();
        if snapshots.len() >= *sweep_at {
            snapshots.retain(|_, s| s.strong_count() > 0);
            *sweep_at = std::cmp::max(snapshots.len() * 2, MIN_SWEEP);
            trace!("Swept state database, {} snapshots live", snapshots.len());
        }
        snapshot
    }

    fn get(&self, root: &H256) -> Option<Arc<Snapshot>> {
        let snapshots = self.snapshots.read().unwrap();
        snapshots.get(root).and_then(Weak::upgrade)
    }

    pub fn contains(&self, root: &H256) -> bool {
        self.get(root).is_some()
    }

    /// Number of snapshots still reachable from some state view.
    pub fn len(&self) -> usize {
        let snapshots = self.snapshots.read().unwrap();
        snapshots.values().filter(|s| s.strong_count() > 0).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A view of the account state at one root, plus uncommitted writes.
#[derive(Debug, Clone)]
pub struct State {
    db: Arc<StateDatabase>,
    base: Arc<Snapshot>,
    pending: Accounts,
}

impl State {
    /// An empty state, committed to `db`.
    pub fn new(db: &Arc<StateDatabase>) -> Self {
        let changes = Accounts::new();
        let base = db.insert(Snapshot {
            root: root_of(&changes),
            changes,
            parent: None,
            depth: 0,
        });
        State {
            db: Arc::clone(db),
            base,
            pending: Accounts::new(),
        }
    }

    /// A view of a committed root that is still held elsewhere.
    pub fn at(db: &Arc<StateDatabase>, root: H256) -> Result<Self, StateError> {
        let base = db.get(&root).ok_or(StateError::MissingRoot(root))?;
        Ok(State {
            db: Arc::clone(db),
            base,
            pending: Accounts::new(),
        })
    }

    pub fn database(&self) -> &Arc<StateDatabase> {
        &self.db
    }

    /// Root of the last committed (or restored) snapshot.
    pub fn root(&self) -> H256 {
        self.base.root
    }

    /// Move this view to a committed root, discarding uncommitted changes.
    pub fn set_root(&mut self, root: H256) -> Result<(), StateError> {
        if root != self.base.root {
            self.base = self.db.get(&root).ok_or(StateError::MissingRoot(root))?;
        }
        self.pending.clear();
        Ok(())
    }

    /// Whether there are changes not yet committed.
    pub fn is_dirty(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn account(&self, address: &Address) -> Account {
        self.pending
            .get(address)
            .cloned()
            .or_else(|| self.base.get(address))
            .unwrap_or_default()
    }

    pub fn balance(&self, address: &Address) -> u64 {
        self.account(address).balance
    }

    pub fn nonce(&self, address: &Address) -> u64 {
        self.account(address).nonce
    }

    pub fn set_account(&mut self, address: Address, account: Account) {
        self.pending.insert(address, account);
    }

    pub fn add_balance(&mut self, address: &Address, value: u64) {
        let mut account = self.account(address);
        account.balance = account.balance.saturating_add(value);
        self.set_account(*address, account);
    }

    /// Hash the current account table, store the changes, and move the root to it.
    pub fn commit(&mut self) -> H256 {
        if self.pending.is_empty() {
            return self.base.root;
        }
        let mut accounts = self.base.flatten();
        for (address, account) in self.pending.iter() {
            accounts.insert(*address, *account);
        }
        let root = root_of(&accounts);
        if root == self.base.root {
            self.pending.clear();
            return root;
        }
        let changes = std::mem::replace(&mut self.pending, Accounts::new());
        let snapshot = if self.base.depth >= MAX_SNAPSHOT_DEPTH {
            Snapshot {
                root,
                changes: accounts,
                parent: None,
                depth: 0,
            }
        } else {
            Snapshot {
                root,
                changes,
                parent: Some(Arc::clone(&self.base)),
                depth: self.base.depth + 1,
            }
        };
        self.base = self.db.insert(snapshot);
        trace!("Committed state root {}", root);
        root
    }
}
