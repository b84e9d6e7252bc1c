use crate::crypto::hash::{Hashable, H256};
use crate::crypto::pow::{self, PowHasher, NONCE_LENGTH};
use crate::transaction::Address;
use bigint::uint::U256;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Header {
    /// Hash of the parent block.
    pub parent_hash: H256,
    /// Merkle root of the uncle headers.
    pub uncles_hash: H256,
    /// Address credited with the block reward and transaction fees.
    pub coinbase: Address,
    pub state_root: H256,
    /// Merkle root of the included transactions.
    pub tx_list_root: H256,
    /// Mining difficulty, a big endian integer.
    pub difficulty: H256,
    pub number: u64,
    /// Block creation time in seconds since the UNIX epoch.
    pub timestamp: u64,
    pub extra_data: Vec<u8>,
    /// Proof of work nonce, a big endian integer.
    pub nonce: [u8; NONCE_LENGTH],
}

/// Every header field except the nonce, in header order.
#[derive(Serialize)]
struct UnsealedHeader<'a> {
    parent_hash: &'a H256,
    uncles_hash: &'a H256,
    coinbase: &'a Address,
    state_root: &'a H256,
    tx_list_root: &'a H256,
    difficulty: &'a H256,
    number: u64,
    timestamp: u64,
    extra_data: &'a [u8],
}

impl Header {
    /// Canonical encoding of the header with the nonce left out. This is the input of the
    /// proof-of-work puzzle.
    pub fn encode_without_nonce(&self) -> Vec<u8> {
        let unsealed = UnsealedHeader {
            parent_hash: &self.parent_hash,
            uncles_hash: &self.uncles_hash,
            coinbase: &self.coinbase,
            state_root: &self.state_root,
            tx_list_root: &self.tx_list_root,
            difficulty: &self.difficulty,
            number: self.number,
            timestamp: self.timestamp,
            extra_data: &self.extra_data,
        };
        bincode::serialize(&unsealed).unwrap()
    }

    pub fn difficulty(&self) -> U256 {
        (&self.difficulty).into()
    }

    /// Whether the nonce solves the proof-of-work puzzle for this header.
    pub fn check_pow(&self, hasher: &dyn PowHasher) -> bool {
        let difficulty = self.difficulty();
        if difficulty.is_zero() {
            return false;
        }
        let value = pow::pow_value(hasher, &self.encode_without_nonce(), &self.nonce);
        pow::meets_target(&value, &pow::pow_target(difficulty))
    }
}

impl Hashable for Header {
    fn hash(&self) -> H256 {
        let serialized = bincode::serialize(self).unwrap();
        let digest = ring::digest::digest(&ring::digest::SHA256, &serialized);
        return digest.into();
    }
}

impl std::fmt::Display for Header {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "number: {}; parent_hash: {}; timestamp: {}; self_hash: {}",
            self.number,
            self.parent_hash,
            self.timestamp,
            self.hash()
        )?;
        Ok(())
    }
}
