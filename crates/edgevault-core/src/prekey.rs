//! One-time prekey material.
//!
//! A prekey is an X25519 keypair addressed by a [`KeyId`] inside one
//! identity's keyspace. The public half is advertised; the private half is
//! handed out exactly once, at consumption, and zeroized on drop.

use std::fmt;

use serde::{Deserialize, Serialize};
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::{
    codec::{CodecError, decode_key_array, encode_key},
    env::Environment,
    payloads::WirePrekey,
};

/// Prekey identifier, unique within one identity's keyspace.
pub type KeyId = u32;

/// Length of X25519 public and private keys.
pub const KEY_LEN: usize = 32;

/// Private half of a prekey. Zeroized on drop, redacted in `Debug`.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop, Serialize, Deserialize)]
pub struct PrivateKey([u8; KEY_LEN]);

impl PrivateKey {
    /// Wrap raw private key bytes.
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// Raw private key bytes.
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }

    /// Public key derived from this private key.
    pub fn public_key(&self) -> [u8; KEY_LEN] {
        let secret = StaticSecret::from(self.0);
        PublicKey::from(&secret).to_bytes()
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PrivateKey(<redacted>)")
    }
}

/// Public half of a prekey, safe to advertise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PublicPrekey {
    /// Key id.
    pub key_id: KeyId,
    /// X25519 public key.
    pub public_key: [u8; KEY_LEN],
}

impl PublicPrekey {
    /// Wire form with a base64 public key.
    pub fn to_wire(&self) -> WirePrekey {
        WirePrekey { key_id: self.key_id, public_key: encode_key(&self.public_key) }
    }

    /// Parse the wire form. Fails with [`CodecError`] on malformed keys.
    pub fn from_wire(wire: &WirePrekey) -> Result<Self, CodecError> {
        Ok(Self { key_id: wire.key_id, public_key: decode_key_array(&wire.public_key)? })
    }
}

/// A full prekey: public and private halves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrekeyPair {
    /// Key id.
    pub key_id: KeyId,
    /// X25519 public key.
    pub public_key: [u8; KEY_LEN],
    /// X25519 private key.
    pub private_key: PrivateKey,
}

impl PrekeyPair {
    /// Generate a fresh keypair from the environment's RNG.
    ///
    /// Deterministic under a seeded environment.
    pub fn generate<E: Environment>(env: &E, key_id: KeyId) -> Self {
        let mut seed = [0u8; KEY_LEN];
        env.random_bytes(&mut seed);
        let private_key = PrivateKey::from_bytes(seed);
        seed.zeroize();

        Self { key_id, public_key: private_key.public_key(), private_key }
    }

    /// Public half only.
    pub fn public(&self) -> PublicPrekey {
        PublicPrekey { key_id: self.key_id, public_key: self.public_key }
    }

    /// Whether `public_key` is the key derived from `private_key`.
    pub fn public_matches(&self) -> bool {
        self.private_key.public_key() == self.public_key
    }

    /// Base64 public key.
    pub fn public_key_base64(&self) -> String {
        encode_key(&self.public_key)
    }

    /// Base64 private key.
    pub fn private_key_base64(&self) -> String {
        encode_key(self.private_key.as_bytes())
    }

    /// Rebuild a pair from the base64 halves returned by consumption.
    pub fn from_wire(
        key_id: KeyId,
        public_key: &str,
        private_key: &str,
    ) -> Result<Self, CodecError> {
        let public_key = decode_key_array(public_key)?;
        let private_key = PrivateKey::from_bytes(decode_key_array(private_key)?);
        Ok(Self { key_id, public_key, private_key })
    }
}
