use super::hash::H256;
use byteorder::{BigEndian, ByteOrder};
use ed25519_dalek::{Keypair, Signer, Verifier};
use rand::rngs::OsRng;
use std::convert::TryFrom;

/// An Ed25519 signature.
#[derive(Serialize, Deserialize, Hash, Clone, Default, PartialEq, Eq)]
pub struct Signature([u128; 4]); // big endian u512

impl std::convert::From<&[u8; 64]> for Signature {
    fn from(input: &[u8; 64]) -> Signature {
        let u1 = BigEndian::read_u128(&input[0..16]);
        let u2 = BigEndian::read_u128(&input[16..32]);
        let u3 = BigEndian::read_u128(&input[32..48]);
        let u4 = BigEndian::read_u128(&input[48..64]);
        return Signature([u1, u2, u3, u4]);
    }
}

impl std::convert::From<&Signature> for [u8; 64] {
    fn from(input: &Signature) -> [u8; 64] {
        let mut buffer: [u8; 64] = [0; 64];
        BigEndian::write_u128(&mut buffer[0..16], input.0[0]);
        BigEndian::write_u128(&mut buffer[16..32], input.0[1]);
        BigEndian::write_u128(&mut buffer[32..48], input.0[2]);
        BigEndian::write_u128(&mut buffer[48..64], input.0[3]);
        return buffer;
    }
}

impl std::fmt::Debug for Signature {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let buffer: [u8; 64] = self.into();
        write!(f, "{}", hex::encode(&buffer[..]))
    }
}

/// An Ed25519 public key.
#[derive(Serialize, Deserialize, Hash, Clone, Copy, Default, PartialEq, Eq)]
pub struct PubKey(pub [u8; 32]);

impl PubKey {
    /// The address owned by this key, i.e. the SHA256 of the key bytes.
    pub fn address(&self) -> H256 {
        ring::digest::digest(&ring::digest::SHA256, &self.0).into()
    }

    /// Check a signature over `message` made by this key.
    pub fn verify(&self, message: &[u8], signature: &Signature) -> bool {
        let public = match ed25519_dalek::PublicKey::from_bytes(&self.0) {
            Ok(k) => k,
            Err(_) => return false,
        };
        let raw: [u8; 64] = signature.into();
        let signature = match ed25519_dalek::Signature::try_from(&raw[..]) {
            Ok(s) => s,
            Err(_) => return false,
        };
        public.verify(message, &signature).is_ok()
    }
}

impl std::fmt::Debug for PubKey {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", hex::encode(&self.0))
    }
}

/// An Ed25519 key pair used to sign transactions.
pub struct KeyPair {
    inner: Keypair,
}

impl KeyPair {
    pub fn generate() -> Self {
        let mut csprng = OsRng;
        Self {
            inner: Keypair::generate(&mut csprng),
        }
    }

    pub fn to_bytes(&self) -> [u8; 64] {
        self.inner.to_bytes()
    }

    pub fn public_key(&self) -> PubKey {
        PubKey(self.inner.public.to_bytes())
    }

    pub fn address(&self) -> H256 {
        self.public_key().address()
    }

    pub fn sign(&self, message: &[u8]) -> Signature {
        let raw = self.inner.sign(message).to_bytes();
        (&raw).into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_and_verify() {
        let keypair = KeyPair::generate();
        let message = b"pay 10 to bob";
        let signature = keypair.sign(message);
        assert!(keypair.public_key().verify(message, &signature));
        assert!(!keypair.public_key().verify(b"pay 11 to bob", &signature));
        let other = KeyPair::generate();
        assert!(!other.public_key().verify(message, &signature));
    }

    #[test]
    fn signature_bytes() {
        let keypair = KeyPair::generate();
        let signature = keypair.sign(b"hello");
        let raw: [u8; 64] = (&signature).into();
        let back: Signature = (&raw).into();
        assert_eq!(back, signature);
    }
}
