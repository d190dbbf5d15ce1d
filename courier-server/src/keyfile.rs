//! Persistent node identity.
//!
//! The identity file holds the 64 secret bytes as a single line of hex.

use crate::error::NodeError;
use courier_types::{CourierError, Identity};
use std::path::Path;
use zeroize::Zeroizing;

/// Load the identity at `path`, generating and saving one if it is missing.
pub fn load_or_create(path: &Path) -> Result<Identity, NodeError> {
    if path.exists() {
        return load(path);
    }

    let identity = Identity::generate()?;
    save(path, &identity)?;
    tracing::info!(
        "Generated node identity {} at {}",
        identity.address(),
        path.display()
    );
    Ok(identity)
}

/// Load an existing identity file.
pub fn load(path: &Path) -> Result<Identity, NodeError> {
    let encoded = Zeroizing::new(std::fs::read_to_string(path)?);
    let secret = Zeroizing::new(
        hex::decode(encoded.trim())
            .map_err(|e| CourierError::InvalidKey(format!("{}: {}", path.display(), e)))?,
    );
    Ok(Identity::from_secret_bytes(&secret)?)
}

/// Write `identity` to `path`, readable only by the owner on Unix.
pub fn save(path: &Path, identity: &Identity) -> Result<(), NodeError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let encoded = Zeroizing::new(hex::encode(identity.secret_bytes().as_slice()));
    std::fs::write(path, encoded.as_bytes())?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn creates_then_reloads_same_identity() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("keys").join("courier.key");

        let first = load_or_create(&path).unwrap();
        assert!(path.exists());
        let second = load_or_create(&path).unwrap();

        assert_eq!(first.address(), second.address());
    }

    #[test]
    fn rejects_corrupt_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("courier.key");
        std::fs::write(&path, "not hex").unwrap();

        assert!(matches!(load(&path), Err(NodeError::Identity(_))));
    }

    #[test]
    fn rejects_short_key() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("courier.key");
        std::fs::write(&path, hex::encode([7u8; 32])).unwrap();

        assert!(matches!(load(&path), Err(NodeError::Identity(_))));
    }

    #[cfg(unix)]
    #[test]
    fn key_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempdir().unwrap();
        let path = dir.path().join("courier.key");
        load_or_create(&path).unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
