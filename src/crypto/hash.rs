use bigint::uint::U256;

/// An object that can be meaningfully hashed.
pub trait Hashable {
    /// Hashes the object using SHA256.
    fn hash(&self) -> H256;
}

/// A 256-bit hash, stored big endian.
#[derive(Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize, Clone, Hash, Default, Copy)]
pub struct H256(pub [u8; 32]);

impl Hashable for H256 {
    fn hash(&self) -> H256 {
        return ring::digest::digest(&ring::digest::SHA256, &self.0).into();
    }
}

impl H256 {
    /// Whether every byte of the hash is zero.
    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|b| *b == 0)
    }
}

impl AsRef<[u8]> for H256 {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl std::convert::From<[u8; 32]> for H256 {
    fn from(input: [u8; 32]) -> H256 {
        return H256(input);
    }
}

impl std::convert::From<&[u8; 32]> for H256 {
    fn from(input: &[u8; 32]) -> H256 {
        return H256(*input);
    }
}

impl std::convert::From<&H256> for [u8; 32] {
    fn from(input: &H256) -> [u8; 32] {
        return input.0;
    }
}

impl std::convert::From<ring::digest::Digest> for H256 {
    fn from(input: ring::digest::Digest) -> H256 {
        let mut raw_hash: [u8; 32] = [0; 32];
        raw_hash[0..32].copy_from_slice(input.as_ref());
        return raw_hash.into();
    }
}

impl std::convert::From<&H256> for U256 {
    fn from(input: &H256) -> U256 {
        U256::from_big_endian(&input.0)
    }
}

impl std::convert::From<U256> for H256 {
    fn from(input: U256) -> H256 {
        let mut buffer: [u8; 32] = [0; 32];
        input.to_big_endian(&mut buffer);
        return H256(buffer);
    }
}

impl std::convert::From<u64> for H256 {
    fn from(input: u64) -> H256 {
        U256::from(input).into()
    }
}

impl std::fmt::Display for H256 {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        for byte_idx in 0..32 {
            write!(f, "{:>02x}", &self.0[byte_idx])?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for H256 {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "{:>02x}{:>02x}..{:>02x}{:>02x}",
            &self.0[0], &self.0[1], &self.0[30], &self.0[31]
        )
    }
}
