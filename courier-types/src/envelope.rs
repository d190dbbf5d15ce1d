//! Envelope - the outer wire unit for all Courier traffic.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::seal::{self, NONCE_SIZE};
use crate::{Address, CourierError, SignedPayload};

/// Current envelope format version.
pub const ENVELOPE_VERSION: u8 = 1;

/// A content key wrapped for one recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedKey {
    /// X25519 ephemeral public key used for this recipient
    pub ephemeral_public: [u8; 32],
    /// Nonce used to wrap the content key
    pub nonce: [u8; NONCE_SIZE],
    /// Wrapped content key (key + 16 byte tag)
    pub wrapped_key: Vec<u8>,
}

/// The envelope wraps a signed payload for transport.
///
/// A *sealed* envelope carries one [`SealedKey`] per recipient, keyed by the
/// recipient's fingerprint, and its body is ciphertext. An envelope without
/// recipients carries its signed payload in the clear; nodes use this for
/// wire errors, which must be readable before the peer's keys are known.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Envelope format version (currently 1)
    pub version: u8,
    /// Recipient fingerprint -> sealed content key
    pub recipients: BTreeMap<String, SealedKey>,
    /// Body nonce (zero for plaintext envelopes)
    pub nonce: [u8; NONCE_SIZE],
    /// Ciphertext of the signed payload, or the plaintext encoding of it
    pub body: Vec<u8>,
}

impl Envelope {
    /// Seal a signed payload to every address in `recipients`.
    pub fn seal(signed: &SignedPayload, recipients: &[Address]) -> Result<Self, CourierError> {
        if recipients.is_empty() {
            return Err(CourierError::NoRecipients);
        }

        let content_key = seal::random_content_key()?;
        let mut sealed = BTreeMap::new();
        for recipient in recipients {
            let keys = recipient
                .keys()
                .ok_or_else(|| CourierError::MissingEncryptionKey(recipient.to_string()))?;
            sealed.insert(
                recipient.fingerprint().to_string(),
                seal::seal_key(&content_key, &keys.encryption)?,
            );
        }

        let (nonce, body) = seal::encrypt(&content_key, &signed.to_bytes()?)?;
        Ok(Self {
            version: ENVELOPE_VERSION,
            recipients: sealed,
            nonce,
            body,
        })
    }

    /// Wrap a signed payload without encryption.
    pub fn plain(signed: &SignedPayload) -> Result<Self, CourierError> {
        Ok(Self {
            version: ENVELOPE_VERSION,
            recipients: BTreeMap::new(),
            nonce: [0u8; NONCE_SIZE],
            body: signed.to_bytes()?,
        })
    }

    /// Whether the body is ciphertext.
    pub fn is_sealed(&self) -> bool {
        !self.recipients.is_empty()
    }

    /// Whether this envelope carries an entry for `fingerprint`.
    pub fn is_addressed_to(&self, fingerprint: &str) -> bool {
        self.recipients.contains_key(fingerprint)
    }

    /// Read the signed payload of a plaintext envelope.
    pub fn open_plain(&self) -> Result<SignedPayload, CourierError> {
        self.check_version()?;
        if self.is_sealed() {
            return Err(CourierError::Crypto(
                "envelope is sealed; open it with the recipient identity".into(),
            ));
        }
        SignedPayload::from_bytes(&self.body)
    }

    pub(crate) fn check_version(&self) -> Result<(), CourierError> {
        if self.version != ENVELOPE_VERSION {
            return Err(CourierError::UnsupportedVersion(self.version));
        }
        Ok(())
    }

    /// Serialize to MessagePack bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, CourierError> {
        rmp_serde::to_vec(self).map_err(CourierError::Serialization)
    }

    /// Deserialize from MessagePack bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CourierError> {
        rmp_serde::from_slice(bytes).map_err(CourierError::Deserialization)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{message_type, Header, Identity, Payload};

    fn signed_by(identity: &Identity, to: &Address) -> SignedPayload {
        let payload = Payload::new(
            message_type::MAIL,
            Header::new(identity.address().clone(), to.clone()),
            b"hello".to_vec(),
        );
        identity.sign(&payload).unwrap()
    }

    #[test]
    fn sealed_envelope_lists_recipients() {
        let alice = Identity::generate().unwrap();
        let bob = Identity::generate().unwrap();
        let carol = Identity::generate().unwrap();

        let signed = signed_by(&alice, bob.address());
        let envelope =
            Envelope::seal(&signed, &[bob.address().clone(), carol.address().clone()]).unwrap();

        assert!(envelope.is_sealed());
        assert!(envelope.is_addressed_to(bob.address().fingerprint()));
        assert!(envelope.is_addressed_to(carol.address().fingerprint()));
        assert!(!envelope.is_addressed_to(alice.address().fingerprint()));
    }

    #[test]
    fn seal_requires_recipient_keys() {
        let alice = Identity::generate().unwrap();
        let bare = Address::from_fingerprint("00ff");
        let signed = signed_by(&alice, &bare);

        assert!(matches!(
            Envelope::seal(&signed, &[bare]),
            Err(CourierError::MissingEncryptionKey(_))
        ));
        assert!(matches!(
            Envelope::seal(&signed, &[]),
            Err(CourierError::NoRecipients)
        ));
    }

    #[test]
    fn plain_envelope_opens_without_keys() {
        let alice = Identity::generate().unwrap();
        let signed = signed_by(&alice, alice.address());
        let envelope = Envelope::plain(&signed).unwrap();

        assert!(!envelope.is_sealed());
        let bytes = envelope.to_bytes().unwrap();
        let opened = Envelope::from_bytes(&bytes).unwrap().open_plain().unwrap();
        assert_eq!(opened, signed);
        assert!(opened.verify());
    }

    #[test]
    fn sealed_body_is_not_plaintext() {
        let alice = Identity::generate().unwrap();
        let bob = Identity::generate().unwrap();
        let signed = signed_by(&alice, bob.address());
        let envelope = Envelope::seal(&signed, &[bob.address().clone()]).unwrap();

        assert!(envelope.open_plain().is_err());
        assert_ne!(envelope.body, signed.to_bytes().unwrap());
    }

    #[test]
    fn unknown_version_rejected() {
        let alice = Identity::generate().unwrap();
        let mut envelope = Envelope::plain(&signed_by(&alice, alice.address())).unwrap();
        envelope.version = 9;
        assert!(matches!(
            envelope.open_plain(),
            Err(CourierError::UnsupportedVersion(9))
        ));
    }

    #[test]
    fn garbage_fails_to_decode() {
        assert!(Envelope::from_bytes(&[0xc1, 0x00, 0x13]).is_err());
        assert!(Envelope::from_bytes(&[]).is_err());
    }
}
