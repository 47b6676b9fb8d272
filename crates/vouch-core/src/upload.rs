//! Materialization of uploaded files into a workspace.
//!
//! The transport hands over each upload either fully buffered in memory or
//! already spooled to a temp file (large parts are spooled while the body
//! streams in). Both shapes land in the workspace under their canonical
//! names before any gpg step runs.

use std::path::{Path, PathBuf};

use bytes::Bytes;
use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::{Error, Result};
use crate::workspace::{Workspace, PAYLOAD_FILE, PUBLIC_KEY_FILE, SIGNATURE_FILE};

/// One uploaded file, as the transport captured it.
#[derive(Debug)]
pub enum UploadedFile {
    /// Bytes held in memory.
    Buffered(Bytes),
    /// Bytes already written to a temp file by the transport.
    Spooled(NamedTempFile),
}

/// The three uploads of one verification request.
#[derive(Debug)]
pub struct VerificationRequest {
    /// The public key to verify against.
    pub public_key: UploadedFile,
    /// The detached signature.
    pub signature: UploadedFile,
    /// The payload the signature covers.
    pub payload: UploadedFile,
}

/// Write all three uploads into their canonical workspace locations.
///
/// The writes run concurrently and the call resolves only once every one of
/// them has completed. On failure the caller releases the workspace, which
/// reclaims any partial writes.
pub async fn materialize(workspace: &Workspace, request: VerificationRequest) -> Result<()> {
    futures::try_join!(
        write_upload(request.public_key, workspace.public_key_path(), PUBLIC_KEY_FILE),
        write_upload(request.signature, workspace.signature_path(), SIGNATURE_FILE),
        write_upload(request.payload, workspace.payload_path(), PAYLOAD_FILE),
    )?;
    Ok(())
}

async fn write_upload(upload: UploadedFile, dest: PathBuf, file: &'static str) -> Result<()> {
    let outcome = match upload {
        UploadedFile::Buffered(bytes) => tokio::fs::write(&dest, bytes).await,
        UploadedFile::Spooled(spool) => move_spooled(spool, &dest).await,
    };
    outcome.map_err(|source| Error::Materialize { file, source })
}

/// Move a spooled upload into place.
///
/// A rename is enough when the spool directory shares a filesystem with the
/// workspace; otherwise fall back to a copy and let the spool file clean
/// itself up.
async fn move_spooled(spool: NamedTempFile, dest: &Path) -> std::io::Result<()> {
    match spool.persist(dest) {
        Ok(_) => Ok(()),
        Err(persist) => {
            debug!(error = %persist.error, "rename failed, copying spool");
            tokio::fs::copy(persist.file.path(), dest).await?;
            Ok(())
        }
    }
}
