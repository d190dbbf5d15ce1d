//! Content-key sealing and body encryption.
//!
//! ```text
//! per recipient:
//!   shared      = x25519(ephemeral_sk, recipient_pk)
//!   wrap_key    = HKDF-SHA256(shared, "courier-seal-v1")
//!   wrapped_key = XChaCha20-Poly1305(wrap_key, content_key)
//! body:
//!   ciphertext  = XChaCha20-Poly1305(content_key, signed_payload)
//! ```

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    Key, XChaCha20Poly1305, XNonce,
};
use hkdf::Hkdf;
use sha2::Sha256;
use x25519_dalek::{PublicKey as X25519PublicKey, StaticSecret};
use zeroize::Zeroizing;

use crate::envelope::SealedKey;
use crate::CourierError;

/// Nonce size for XChaCha20-Poly1305 (192 bits = 24 bytes).
pub(crate) const NONCE_SIZE: usize = 24;

/// Key size for XChaCha20-Poly1305 (256 bits = 32 bytes).
pub(crate) const KEY_SIZE: usize = 32;

const HKDF_INFO: &[u8] = b"courier-seal-v1";

pub(crate) fn random_bytes<const N: usize>() -> Result<[u8; N], CourierError> {
    let mut bytes = [0u8; N];
    getrandom::getrandom(&mut bytes)
        .map_err(|e| CourierError::Crypto(format!("randomness unavailable: {e}")))?;
    Ok(bytes)
}

pub(crate) fn random_content_key() -> Result<Zeroizing<[u8; KEY_SIZE]>, CourierError> {
    Ok(Zeroizing::new(random_bytes::<KEY_SIZE>()?))
}

/// Encrypt `plaintext` under `key`, returning the fresh nonce and ciphertext.
pub(crate) fn encrypt(
    key: &[u8; KEY_SIZE],
    plaintext: &[u8],
) -> Result<([u8; NONCE_SIZE], Vec<u8>), CourierError> {
    let nonce = random_bytes::<NONCE_SIZE>()?;
    let cipher = XChaCha20Poly1305::new(Key::from_slice(key));
    let ciphertext = cipher
        .encrypt(XNonce::from_slice(&nonce), plaintext)
        .map_err(|e| CourierError::Crypto(format!("encryption failed: {e}")))?;
    Ok((nonce, ciphertext))
}

pub(crate) fn decrypt(
    key: &[u8; KEY_SIZE],
    nonce: &[u8; NONCE_SIZE],
    ciphertext: &[u8],
) -> Result<Vec<u8>, CourierError> {
    let cipher = XChaCha20Poly1305::new(Key::from_slice(key));
    cipher
        .decrypt(XNonce::from_slice(nonce), ciphertext)
        .map_err(|_| CourierError::DecryptionFailed)
}

/// Wrap a content key for the holder of `recipient`'s X25519 secret.
pub(crate) fn seal_key(
    content_key: &[u8; KEY_SIZE],
    recipient: &[u8; 32],
) -> Result<SealedKey, CourierError> {
    let ephemeral = StaticSecret::from(random_bytes::<32>()?);
    let ephemeral_public = X25519PublicKey::from(&ephemeral);
    let shared = ephemeral.diffie_hellman(&X25519PublicKey::from(*recipient));
    let wrap_key = derive_key(shared.as_bytes())?;

    let (nonce, wrapped_key) = encrypt(&wrap_key, content_key)?;
    Ok(SealedKey {
        ephemeral_public: *ephemeral_public.as_bytes(),
        nonce,
        wrapped_key,
    })
}

/// Recover a content key with our X25519 secret.
pub(crate) fn unseal_key(
    sealed: &SealedKey,
    secret: &StaticSecret,
) -> Result<Zeroizing<[u8; KEY_SIZE]>, CourierError> {
    let shared = secret.diffie_hellman(&X25519PublicKey::from(sealed.ephemeral_public));
    let wrap_key = derive_key(shared.as_bytes())?;

    let key = Zeroizing::new(decrypt(&wrap_key, &sealed.nonce, &sealed.wrapped_key)?);
    if key.len() != KEY_SIZE {
        return Err(CourierError::InvalidKey(format!(
            "unsealed content key has {} bytes",
            key.len()
        )));
    }
    let mut content_key = Zeroizing::new([0u8; KEY_SIZE]);
    content_key.copy_from_slice(&key);
    Ok(content_key)
}

fn derive_key(shared_secret: &[u8]) -> Result<Zeroizing<[u8; KEY_SIZE]>, CourierError> {
    let hkdf = Hkdf::<Sha256>::new(None, shared_secret);
    let mut output = Zeroizing::new([0u8; KEY_SIZE]);
    hkdf.expand(HKDF_INFO, &mut output[..])
        .map_err(|e| CourierError::Crypto(format!("key derivation failed: {e}")))?;
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_encrypt_decrypt() {
        let key = random_content_key().unwrap();
        let (nonce, ct) = encrypt(&key, b"mail body").unwrap();
        assert_ne!(ct.as_slice(), b"mail body");
        assert_eq!(decrypt(&key, &nonce, &ct).unwrap(), b"mail body");
    }

    #[test]
    fn body_decrypt_with_wrong_key_fails() {
        let key = random_content_key().unwrap();
        let other = random_content_key().unwrap();
        let (nonce, ct) = encrypt(&key, b"mail body").unwrap();
        assert!(matches!(
            decrypt(&other, &nonce, &ct),
            Err(CourierError::DecryptionFailed)
        ));
    }

    #[test]
    fn sealed_key_opens_only_for_recipient() {
        let recipient = StaticSecret::from([7u8; 32]);
        let recipient_public = X25519PublicKey::from(&recipient);
        let stranger = StaticSecret::from([9u8; 32]);

        let content_key = random_content_key().unwrap();
        let sealed = seal_key(&content_key, recipient_public.as_bytes()).unwrap();

        let opened = unseal_key(&sealed, &recipient).unwrap();
        assert_eq!(*opened, *content_key);
        assert!(unseal_key(&sealed, &stranger).is_err());
    }
}
