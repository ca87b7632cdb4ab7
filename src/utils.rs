use secp256k1::PublicKey;
use sha2::{Digest, Sha256};

use crate::core::store::Address;
use crate::error::{Result, StakingError};

/// Length of an address in bytes before hex encoding.
pub const ADDRESS_LEN: usize = 20;

/// Derives an address from a public key: hex of the first 20 bytes of SHA-256 of the
/// compressed key.
pub fn address_from_pub_key(public_key: &PublicKey) -> Address {
    let digest = Sha256::digest(public_key.serialize());
    hex::encode(&digest[..ADDRESS_LEN])
}

/// Parses a hex-encoded compressed or uncompressed secp256k1 public key.
pub fn decode_pub_key(pub_key_hex: &str) -> Result<PublicKey> {
    let bytes = hex::decode(pub_key_hex)
        .map_err(|e| StakingError::Crypto(format!("Invalid public key hex: {}", e)))?;
    Ok(PublicKey::from_slice(&bytes)?)
}

/// True for 40 lowercase hex characters.
pub fn is_valid_address(address: &str) -> bool {
    address.len() == ADDRESS_LEN * 2
        && address
            .chars()
            .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
}
