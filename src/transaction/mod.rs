use crate::crypto::hash::{Hashable, H256};
use crate::crypto::sign::{KeyPair, PubKey, Signature};
use bincode::serialize;

/// A blockchain address, i.e. the SHA256 of an account's public key.
pub type Address = H256;

/// A value transfer between two accounts. The sender pays `value + fee`; the fee goes to the
/// coinbase of the block that includes the transaction.
#[derive(Serialize, Deserialize, Debug, Hash, Clone, PartialEq, Eq)]
pub struct Transaction {
    /// Must equal the number of transactions the sender has applied so far.
    pub nonce: u64,
    pub recipient: Address,
    pub value: u64,
    pub fee: u64,
    /// Opaque payload, returned as the execution output.
    pub data: Vec<u8>,
    pub sender: PubKey,
    pub signature: Signature,
}

/// The signed portion of a transaction.
#[derive(Serialize)]
struct UnsignedTransaction<'a> {
    nonce: u64,
    recipient: &'a Address,
    value: u64,
    fee: u64,
    data: &'a [u8],
    sender: &'a PubKey,
}

impl Transaction {
    /// Create a transaction signed by `keypair`.
    pub fn sign(
        keypair: &KeyPair,
        nonce: u64,
        recipient: Address,
        value: u64,
        fee: u64,
        data: Vec<u8>,
    ) -> Self {
        let mut tx = Transaction {
            nonce,
            recipient,
            value,
            fee,
            data,
            sender: keypair.public_key(),
            signature: Signature::default(),
        };
        tx.signature = keypair.sign(&tx.signing_bytes());
        tx
    }

    fn signing_bytes(&self) -> Vec<u8> {
        let unsigned = UnsignedTransaction {
            nonce: self.nonce,
            recipient: &self.recipient,
            value: self.value,
            fee: self.fee,
            data: &self.data,
            sender: &self.sender,
        };
        serialize(&unsigned).unwrap()
    }

    pub fn sender_address(&self) -> Address {
        self.sender.address()
    }

    pub fn verify_signature(&self) -> bool {
        self.sender.verify(&self.signing_bytes(), &self.signature)
    }
}

impl Hashable for Transaction {
    fn hash(&self) -> H256 {
        return ring::digest::digest(&ring::digest::SHA256, &serialize(self).unwrap()).into();
    }
}
