//! A node's private identity: signs payloads, opens envelopes sealed to it.

use ed25519_dalek::{Signer, SigningKey};
use std::fmt;
use x25519_dalek::{PublicKey as X25519PublicKey, StaticSecret};
use zeroize::Zeroizing;

use crate::payload::signing_input;
use crate::seal::{self, random_bytes};
use crate::{
    Address, CourierError, Envelope, Header, Payload, PublicKeys, SignedPayload, WireMessage,
};

/// Length of the exported secret: Ed25519 seed followed by X25519 secret.
pub const SECRET_KEY_LEN: usize = 64;

/// Private keys plus the public address derived from them.
///
/// Shared read-only between connections; all operations take `&self`.
pub struct Identity {
    signing: SigningKey,
    encryption: StaticSecret,
    keys: PublicKeys,
    address: Address,
}

impl Identity {
    /// Generate a fresh identity from OS randomness.
    pub fn generate() -> Result<Self, CourierError> {
        let secret = Zeroizing::new(random_bytes::<SECRET_KEY_LEN>()?);
        Self::from_secret_bytes(secret.as_slice())
    }

    /// Restore an identity from [`Identity::secret_bytes`] output.
    pub fn from_secret_bytes(bytes: &[u8]) -> Result<Self, CourierError> {
        if bytes.len() != SECRET_KEY_LEN {
            return Err(CourierError::InvalidKey(format!(
                "expected {SECRET_KEY_LEN} secret bytes, got {}",
                bytes.len()
            )));
        }

        let mut seed = Zeroizing::new([0u8; 32]);
        seed.copy_from_slice(&bytes[..32]);
        let signing = SigningKey::from_bytes(&seed);

        let mut dh = Zeroizing::new([0u8; 32]);
        dh.copy_from_slice(&bytes[32..]);
        let encryption = StaticSecret::from(*dh);

        let keys = PublicKeys {
            signing: signing.verifying_key().to_bytes(),
            encryption: X25519PublicKey::from(&encryption).to_bytes(),
        };

        Ok(Self {
            signing,
            encryption,
            keys,
            address: Address::from_keys(keys),
        })
    }

    /// Export the secret keys for persistence.
    pub fn secret_bytes(&self) -> Zeroizing<[u8; SECRET_KEY_LEN]> {
        let mut out = Zeroizing::new([0u8; SECRET_KEY_LEN]);
        out[..32].copy_from_slice(self.signing.as_bytes());
        out[32..].copy_from_slice(self.encryption.as_bytes());
        out
    }

    /// Advertise a network location in this identity's address.
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.address = self.address.with_location(location);
        self
    }

    /// Advertise an alias in this identity's address.
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.address = self.address.with_alias(alias);
        self
    }

    /// The public address of this identity.
    pub fn address(&self) -> &Address {
        &self.address
    }

    /// The public keys of this identity.
    pub fn public_keys(&self) -> PublicKeys {
        self.keys
    }

    /// Sign an encoded payload.
    pub fn sign(&self, payload: &Payload) -> Result<SignedPayload, CourierError> {
        let bytes = payload.to_bytes()?;
        let signature = self.signing.sign(&signing_input(&bytes));
        Ok(SignedPayload {
            signer: self.public_keys(),
            signature: signature.to_bytes().to_vec(),
            payload: bytes,
        })
    }

    /// Build, sign and encode a typed message from this identity to `to`.
    pub fn sign_message<M: WireMessage>(
        &self,
        to: &Address,
        message: &M,
    ) -> Result<SignedPayload, CourierError> {
        let header = Header::new(self.address.clone(), to.clone());
        self.sign(&Payload::from_message(header, message)?)
    }

    /// Open an envelope sealed to this identity.
    ///
    /// Returns the signed payload without verifying it; callers must check
    /// [`SignedPayload::verify`] before trusting its contents.
    pub fn decrypt(&self, envelope: &Envelope) -> Result<SignedPayload, CourierError> {
        envelope.check_version()?;
        let sealed = envelope
            .recipients
            .get(self.address.fingerprint())
            .ok_or_else(|| CourierError::NotAddressed(self.address.to_string()))?;

        let content_key = seal::unseal_key(sealed, &self.encryption)?;
        let plaintext = seal::decrypt(&content_key, &envelope.nonce, &envelope.body)?;
        SignedPayload::from_bytes(&plaintext)
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("address", &self.address)
            .field("secret", &"[REDACTED]")
            .finish()
    }
}
