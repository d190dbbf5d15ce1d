//! The signed inner layer of an envelope.

use ed25519_dalek::{Signature, VerifyingKey};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{Address, CourierError, PublicKeys, WireMessage};

/// Domain separator prepended to payload bytes before signing.
pub(crate) const SIGNATURE_DOMAIN: &[u8] = b"courier-payload-v1";

/// Routing header of a payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    /// Sender address
    pub from: Address,
    /// Recipient address
    pub to: Address,
    /// Unix timestamp (seconds) at creation
    pub timestamp: u64,
}

impl Header {
    /// Create a header stamped with the current time.
    pub fn new(from: Address, to: Address) -> Self {
        Self {
            from,
            to,
            timestamp: std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0),
        }
    }
}

/// A typed message body plus its header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payload {
    /// Type tag (see [`crate::message_type`])
    pub message_type: String,
    /// Routing header
    pub header: Header,
    /// Encoded message body
    pub body: Vec<u8>,
}

impl Payload {
    /// Create a payload from an already-encoded body.
    pub fn new(message_type: impl Into<String>, header: Header, body: Vec<u8>) -> Self {
        Self {
            message_type: message_type.into(),
            header,
            body,
        }
    }

    /// Create a payload by encoding a typed message.
    pub fn from_message<M: WireMessage>(header: Header, message: &M) -> Result<Self, CourierError> {
        Ok(Self::new(M::MESSAGE_TYPE, header, message.to_body()?))
    }

    /// Decode the body as `M`, checking the type tag first.
    pub fn decode<M: WireMessage>(&self) -> Result<M, CourierError> {
        if self.message_type != M::MESSAGE_TYPE {
            return Err(CourierError::UnexpectedType {
                expected: M::MESSAGE_TYPE,
                actual: self.message_type.clone(),
            });
        }
        M::from_body(&self.body)
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

/// Encoded payload bytes with the signer's keys and signature.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedPayload {
    /// Keys of the signer
    pub signer: PublicKeys,
    /// Ed25519 signature over the domain separator and `payload`
    pub signature: Vec<u8>,
    /// MessagePack-encoded [`Payload`]
    pub payload: Vec<u8>,
}

impl SignedPayload {
    /// Check the signature against the signer's key.
    pub fn verify(&self) -> bool {
        let Ok(key) = VerifyingKey::from_bytes(&self.signer.signing) else {
            return false;
        };
        let Ok(signature) = Signature::from_slice(&self.signature) else {
            return false;
        };
        key.verify_strict(&signing_input(&self.payload), &signature)
            .is_ok()
    }

    /// Decode the payload and bind its sender to the signer.
    ///
    /// The header's `from` must name the signer's fingerprint. When the
    /// sender address was sent without keys, the signer's keys are attached
    /// so replies can be sealed to it. Call [`SignedPayload::verify`] first.
    pub fn unpack(&self) -> Result<Payload, CourierError> {
        let mut payload = Payload::from_bytes(&self.payload)?;
        if !payload.header.from.is_consistent()
            || payload.header.from.fingerprint() != self.signer.fingerprint()
        {
            return Err(CourierError::SignerMismatch);
        }
        payload.header.from = payload.header.from.with_keys(self.signer)?;
        Ok(payload)
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

impl fmt::Debug for SignedPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignedPayload")
            .field("signer", &self.signer.fingerprint())
            .field("payload_len", &self.payload.len())
            .finish_non_exhaustive()
    }
}

pub(crate) fn signing_input(payload: &[u8]) -> Vec<u8> {
    let mut input = Vec::with_capacity(SIGNATURE_DOMAIN.len() + payload.len());
    input.extend_from_slice(SIGNATURE_DOMAIN);
    input.extend_from_slice(payload);
    input
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{message_type, Identity, TransferMessage};

    #[test]
    fn signed_payload_verifies() {
        let alice = Identity::generate().unwrap();
        let payload = Payload::new(
            message_type::MAIL,
            Header::new(alice.address().clone(), alice.address().clone()),
            b"body".to_vec(),
        );
        let signed = alice.sign(&payload).unwrap();
        assert!(signed.verify());
        assert_eq!(signed.unpack().unwrap(), payload);
    }

    #[test]
    fn tampered_payload_fails_verification() {
        let alice = Identity::generate().unwrap();
        let payload = Payload::new(
            message_type::MAIL,
            Header::new(alice.address().clone(), alice.address().clone()),
            b"body".to_vec(),
        );
        let mut signed = alice.sign(&payload).unwrap();
        let last = signed.payload.len() - 1;
        signed.payload[last] ^= 0xff;
        assert!(!signed.verify());
    }

    #[test]
    fn swapped_signer_fails_verification() {
        let alice = Identity::generate().unwrap();
        let mallory = Identity::generate().unwrap();
        let payload = Payload::new(
            message_type::MAIL,
            Header::new(alice.address().clone(), alice.address().clone()),
            vec![],
        );
        let mut signed = alice.sign(&payload).unwrap();
        signed.signer = mallory.public_keys();
        assert!(!signed.verify());
    }

    #[test]
    fn short_signature_fails_verification() {
        let alice = Identity::generate().unwrap();
        let payload = Payload::new(
            message_type::MAIL,
            Header::new(alice.address().clone(), alice.address().clone()),
            vec![],
        );
        let mut signed = alice.sign(&payload).unwrap();
        signed.signature.truncate(10);
        assert!(!signed.verify());
    }

    #[test]
    fn unpack_rejects_spoofed_sender() {
        let alice = Identity::generate().unwrap();
        let bob = Identity::generate().unwrap();
        // Alice signs a payload claiming to be from Bob.
        let payload = Payload::new(
            message_type::MAIL,
            Header::new(bob.address().clone(), alice.address().clone()),
            vec![],
        );
        let signed = alice.sign(&payload).unwrap();
        assert!(signed.verify());
        assert!(matches!(signed.unpack(), Err(CourierError::SignerMismatch)));
    }

    #[test]
    fn unpack_attaches_signer_keys_to_bare_sender() {
        let alice = Identity::generate().unwrap();
        let bare_from = Address::from_fingerprint(alice.address().fingerprint())
            .with_alias("alice@example.org");
        let payload = Payload::new(
            message_type::MAIL,
            Header::new(bare_from, alice.address().clone()),
            vec![],
        );
        let unpacked = alice.sign(&payload).unwrap().unpack().unwrap();
        assert_eq!(unpacked.header.from.keys(), Some(&alice.public_keys()));
        assert_eq!(unpacked.header.from.alias(), Some("alice@example.org"));
        assert!(!unpacked.header.from.can_send());
    }

    #[test]
    fn decode_checks_type_tag() {
        let alice = Identity::generate().unwrap();
        let header = Header::new(alice.address().clone(), alice.address().clone());
        let request = TransferMessage {
            name: "hello".into(),
            author: alice.address().clone(),
            data: false,
        };
        let payload = Payload::from_message(header, &request).unwrap();
        assert_eq!(payload.message_type, message_type::TRANSFER);
        assert_eq!(payload.decode::<TransferMessage>().unwrap(), request);

        let mut wrong = payload.clone();
        wrong.message_type = message_type::MAIL.into();
        assert!(matches!(
            wrong.decode::<TransferMessage>(),
            Err(CourierError::UnexpectedType { .. })
        ));
    }
}
