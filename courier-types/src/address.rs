//! Addresses and public key material for Courier.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::CourierError;

/// Number of SHA-256 bytes kept in an address fingerprint.
pub const FINGERPRINT_LEN: usize = 20;

const FINGERPRINT_DOMAIN: &[u8] = b"courier-address-v1";

/// Public half of an identity: what others need to verify and seal.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PublicKeys {
    /// Ed25519 verifying key.
    pub signing: [u8; 32],
    /// X25519 public key used to seal content keys.
    pub encryption: [u8; 32],
}

impl PublicKeys {
    /// Parse public keys from their hex encodings.
    pub fn from_hex(signing: &str, encryption: &str) -> Result<Self, CourierError> {
        Ok(Self {
            signing: decode_key(signing)?,
            encryption: decode_key(encryption)?,
        })
    }

    /// Hex fingerprint of these keys, used as the canonical address string.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(FINGERPRINT_DOMAIN);
        hasher.update(self.signing);
        hasher.update(self.encryption);
        let digest = hasher.finalize();
        hex::encode(&digest[..FINGERPRINT_LEN])
    }
}

impl fmt::Debug for PublicKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PublicKeys")
            .field("signing", &hex::encode(&self.signing[..8]))
            .field("encryption", &hex::encode(&self.encryption[..8]))
            .finish()
    }
}

fn decode_key(encoded: &str) -> Result<[u8; 32], CourierError> {
    let bytes = hex::decode(encoded.trim()).map_err(|e| CourierError::InvalidKey(e.to_string()))?;
    bytes.try_into().map_err(|b: Vec<u8>| {
        CourierError::InvalidKey(format!("expected 32 bytes, got {}", b.len()))
    })
}

/// A reference to a Courier identity.
///
/// An address always has a fingerprint. It may additionally carry the public
/// keys behind that fingerprint, the network location of the server holding
/// its mail, and a human-readable alias. An address with both keys and a
/// location is *directly reachable*: a reply can be sealed and delivered
/// without asking a routing directory.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    fingerprint: String,
    keys: Option<PublicKeys>,
    location: Option<String>,
    alias: Option<String>,
}

impl Address {
    /// Create an address from public keys.
    pub fn from_keys(keys: PublicKeys) -> Self {
        Self {
            fingerprint: keys.fingerprint(),
            keys: Some(keys),
            location: None,
            alias: None,
        }
    }

    /// Create a bare address that only knows its fingerprint.
    pub fn from_fingerprint(fingerprint: impl Into<String>) -> Self {
        Self {
            fingerprint: fingerprint.into(),
            keys: None,
            location: None,
            alias: None,
        }
    }

    /// Set the network location. Empty strings clear it.
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        let location = location.into();
        self.location = (!location.is_empty()).then_some(location);
        self
    }

    /// Set the alias. Empty strings clear it.
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        let alias = alias.into();
        self.alias = (!alias.is_empty()).then_some(alias);
        self
    }

    /// Attach public keys when none are present.
    ///
    /// Keys that do not hash to this address's fingerprint are refused.
    pub fn with_keys(mut self, keys: PublicKeys) -> Result<Self, CourierError> {
        if keys.fingerprint() != self.fingerprint {
            return Err(CourierError::SignerMismatch);
        }
        self.keys.get_or_insert(keys);
        Ok(self)
    }

    /// The canonical address string.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Public keys, if known.
    pub fn keys(&self) -> Option<&PublicKeys> {
        self.keys.as_ref()
    }

    /// Network location of the mail server, if known.
    pub fn location(&self) -> Option<&str> {
        self.location.as_deref()
    }

    /// Human-readable alias, if any.
    pub fn alias(&self) -> Option<&str> {
        self.alias.as_deref()
    }

    /// Whether a reply can be delivered without a directory lookup.
    pub fn can_send(&self) -> bool {
        self.location.is_some() && self.keys.is_some()
    }

    /// Whether the carried keys (if any) hash to the carried fingerprint.
    pub fn is_consistent(&self) -> bool {
        self.keys
            .map_or(true, |keys| keys.fingerprint() == self.fingerprint)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.fingerprint)
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let short = self.fingerprint.get(..8).unwrap_or(&self.fingerprint);
        let mut s = f.debug_struct("Address");
        s.field("fingerprint", &short);
        if let Some(alias) = &self.alias {
            s.field("alias", alias);
        }
        if let Some(location) = &self.location {
            s.field("location", location);
        }
        s.field("has_keys", &self.keys.is_some()).finish()
    }
}
