//! Proof-of-work primitives.
//!
//! The proof-of-work value of a header is `BE(H(H(header_without_nonce) || nonce))`, where the
//! nonce is encoded as 8 big endian bytes and `BE` reads a digest as a big endian integer. A
//! header is sealed when that value is strictly below `2^256 / difficulty`.

use super::hash::H256;
use bigint::uint::U256;
use byteorder::{BigEndian, ByteOrder};
use sha3::{Digest, Keccak256 as Keccak256Hasher};

/// Width of an encoded nonce in bytes.
pub const NONCE_LENGTH: usize = 8;

/// The hash primitive used by the proof-of-work puzzle.
///
/// A handle implementing this trait is created by the host and handed to every miner, so the
/// primitive has a single owner and is never materialized lazily.
pub trait PowHasher: Send + Sync {
    fn digest(&self, data: &[u8]) -> H256;
}

/// Keccak-256, the primitive used on the wire.
#[derive(Debug, Default, Clone, Copy)]
pub struct Keccak256;

impl PowHasher for Keccak256 {
    fn digest(&self, data: &[u8]) -> H256 {
        let mut raw_hash: [u8; 32] = [0; 32];
        raw_hash.copy_from_slice(&Keccak256Hasher::digest(data));
        raw_hash.into()
    }
}

/// SHA-256, mainly useful for private test networks.
#[derive(Debug, Default, Clone, Copy)]
pub struct Sha256;

impl PowHasher for Sha256 {
    fn digest(&self, data: &[u8]) -> H256 {
        ring::digest::digest(&ring::digest::SHA256, data).into()
    }
}

/// Encode a nonce as fixed-width big endian bytes.
pub fn encode_nonce(nonce: u64) -> [u8; NONCE_LENGTH] {
    let mut buffer = [0; NONCE_LENGTH];
    BigEndian::write_u64(&mut buffer, nonce);
    buffer
}

/// Compute `2^256 / difficulty`.
///
/// Returns `None` when the target is `2^256` itself (difficulty one), which does not fit in 256
/// bits and is met by every hash. The difficulty must not be zero.
pub fn pow_target(difficulty: U256) -> Option<U256> {
    assert!(!difficulty.is_zero(), "difficulty must be positive");
    let one = U256::from(1u64);
    if difficulty == one {
        return None;
    }
    // 2^256 = (2^256 - 1) + 1 = q * difficulty + r + 1
    let max = U256::max_value();
    let quotient = max / difficulty;
    let remainder = max % difficulty;
    if remainder + one == difficulty {
        Some(quotient + one)
    } else {
        Some(quotient)
    }
}

/// Whether a proof-of-work value falls strictly below the target.
pub fn meets_target(value: &H256, target: &Option<U256>) -> bool {
    match target {
        None => true,
        Some(target) => U256::from(value) < *target,
    }
}

/// Compute the proof-of-work value of an encoded header and a nonce.
pub fn pow_value(hasher: &dyn PowHasher, header_bytes: &[u8], nonce: &[u8; NONCE_LENGTH]) -> H256 {
    let seed = hasher.digest(header_bytes);
    let mut buffer = [0u8; 32 + NONCE_LENGTH];
    buffer[..32].copy_from_slice(seed.as_ref());
    buffer[32..].copy_from_slice(nonce);
    hasher.digest(&buffer)
}
