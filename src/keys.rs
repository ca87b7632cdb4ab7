use rand::RngCore;
use secp256k1::{PublicKey, Secp256k1, SecretKey};

use crate::core::store::Address;
use crate::utils::address_from_pub_key;

/// A simulated account: a secp256k1 public key and the address derived from it. Messages are
/// never signed, so the secret key is dropped once the public key is derived.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimAccount {
    pub public_key: PublicKey,
    pub address: Address,
}

impl SimAccount {
    pub fn from_secret_key(secret_key: SecretKey) -> Self {
        let secp = Secp256k1::new();
        let public_key = PublicKey::from_secret_key(&secp, &secret_key);
        Self {
            address: address_from_pub_key(&public_key),
            public_key,
        }
    }

    /// Hex-encoded compressed public key, as carried in `MsgCreateValidator`.
    pub fn pub_key_hex(&self) -> String {
        hex::encode(self.public_key.serialize())
    }
}

/// Draws 32 bytes until they form a valid secret key (out-of-range draws are astronomically rare).
pub fn random_secret_key<R: RngCore>(rng: &mut R) -> SecretKey {
    loop {
        let mut bytes = [0u8; 32];
        rng.fill_bytes(&mut bytes);
        if let Ok(key) = SecretKey::from_slice(&bytes) {
            return key;
        }
    }
}

/// Derives `count` accounts from `rng`. The same RNG state yields the same accounts.
pub fn generate_accounts<R: RngCore>(rng: &mut R, count: usize) -> Vec<SimAccount> {
    (0..count)
        .map(|_| SimAccount::from_secret_key(random_secret_key(rng)))
        .collect()
}
