//! Per-request scratch workspaces.
//!
//! Every verification request gets an exclusively-owned directory under the
//! configured scratch root. The directory name is random and unguessable, so
//! concurrent requests never collide and need no locking. All derived files
//! (the three uploads, the keyring, whatever gpg writes into its home
//! directory) live inside and disappear together when the workspace is
//! released.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{Error, Result};

pub(crate) const PUBLIC_KEY_FILE: &str = "public.key";
pub(crate) const SIGNATURE_FILE: &str = "signature.sig";
pub(crate) const PAYLOAD_FILE: &str = "payload.bin";
const KEYRING_FILE: &str = "keyring.gpg";

/// An exclusively-owned, single-use directory bound to one verification
/// request.
///
/// Dropping a `Workspace` removes the directory tree, so early returns and
/// panics cannot leak scratch state. [`Workspace::release`] is the explicit
/// form that also logs removal races instead of swallowing them.
#[derive(Debug)]
pub struct Workspace {
    dir: tempfile::TempDir,
}

impl Workspace {
    /// Create a fresh workspace under `root`.
    ///
    /// The root must already exist; the only failure mode is the filesystem
    /// denying creation.
    pub fn create(root: &Path) -> Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix("vouch-")
            .tempdir_in(root)
            .map_err(|source| Error::Workspace { source })?;
        debug!(workspace = %dir.path().display(), "workspace created");
        Ok(Self { dir })
    }

    /// Absolute path of the workspace directory.
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Where the uploaded public key is materialized.
    pub fn public_key_path(&self) -> PathBuf {
        self.path().join(PUBLIC_KEY_FILE)
    }

    /// Where the uploaded detached signature is materialized.
    pub fn signature_path(&self) -> PathBuf {
        self.path().join(SIGNATURE_FILE)
    }

    /// Where the uploaded payload is materialized.
    pub fn payload_path(&self) -> PathBuf {
        self.path().join(PAYLOAD_FILE)
    }

    /// The per-request keyring the import step creates.
    pub fn keyring_path(&self) -> PathBuf {
        self.path().join(KEYRING_FILE)
    }

    /// Remove the workspace tree.
    ///
    /// Removal races (the tree vanishing underneath us) are logged and
    /// tolerated; a request must never fail because cleanup did.
    pub fn release(self) {
        let path = self.dir.path().to_path_buf();
        match self.dir.close() {
            Ok(()) => debug!(workspace = %path.display(), "workspace released"),
            Err(err) => {
                warn!(workspace = %path.display(), error = %err, "workspace removal failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_is_collision_free() {
        let root = tempfile::tempdir().unwrap();
        let a = Workspace::create(root.path()).unwrap();
        let b = Workspace::create(root.path()).unwrap();

        assert_ne!(a.path(), b.path());
        assert!(a.path().is_dir());
        assert!(b.path().is_dir());
        assert!(a.path().starts_with(root.path()));
    }

    #[test]
    fn test_create_fails_without_root() {
        let root = tempfile::tempdir().unwrap();
        let missing = root.path().join("does-not-exist");
        let result = Workspace::create(&missing);
        assert!(matches!(result, Err(Error::Workspace { .. })));
    }

    #[test]
    fn test_release_removes_tree() {
        let root = tempfile::tempdir().unwrap();
        let ws = Workspace::create(root.path()).unwrap();
        let path = ws.path().to_path_buf();
        std::fs::write(ws.payload_path(), b"content").unwrap();

        ws.release();
        assert!(!path.exists());
    }

    #[test]
    fn test_drop_is_a_backstop() {
        let root = tempfile::tempdir().unwrap();
        let path = {
            let ws = Workspace::create(root.path()).unwrap();
            ws.path().to_path_buf()
        };
        assert!(!path.exists());
    }

    #[test]
    fn test_release_tolerates_removal_race() {
        let root = tempfile::tempdir().unwrap();
        let ws = Workspace::create(root.path()).unwrap();
        std::fs::remove_dir_all(ws.path()).unwrap();
        // Must not panic or return an error.
        ws.release();
    }

    #[test]
    fn test_canonical_paths_live_inside() {
        let root = tempfile::tempdir().unwrap();
        let ws = Workspace::create(root.path()).unwrap();
        for path in [
            ws.public_key_path(),
            ws.signature_path(),
            ws.payload_path(),
            ws.keyring_path(),
        ] {
            assert!(path.starts_with(ws.path()));
        }
    }
}
