//! Error types for the verification pipeline.

/// Coarse classification of a pipeline failure, used by transports to decide
/// whether the requester or the service is at fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// The verification tool rejected the uploaded material.
    ClientInput,
    /// The service itself failed (filesystem, subprocess, deadline).
    Infrastructure,
}

/// Pipeline errors.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The scratch workspace could not be created.
    #[error("workspace setup failed: {source}")]
    Workspace {
        #[source]
        source: std::io::Error,
    },

    /// An uploaded file could not be written into the workspace.
    #[error("failed to materialize {file}: {source}")]
    Materialize {
        file: &'static str,
        #[source]
        source: std::io::Error,
    },

    /// gpg refused to import the uploaded public key.
    #[error("key import rejected: {stderr}")]
    ImportRejected { stderr: String },

    /// gpg rejected the verify invocation outright (exit status 2 or higher).
    ///
    /// A cryptographically bad signature is not this error; gpg reports that
    /// with exit status 1 and the pipeline turns it into a negative outcome.
    #[error("verification rejected: {stderr}")]
    VerifyRejected { stderr: String },

    /// gpg could not be spawned, or its output could not be collected.
    #[error("gpg invocation failed: {message}")]
    Invocation { message: String },

    /// A gpg step exceeded its deadline and was killed.
    #[error("gpg step timed out after {timeout:?}")]
    Timeout { timeout: std::time::Duration },
}

impl Error {
    /// Classify the error for transport status mapping.
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::ImportRejected { .. } | Self::VerifyRejected { .. } => ErrorClass::ClientInput,
            Self::Workspace { .. }
            | Self::Materialize { .. }
            | Self::Invocation { .. }
            | Self::Timeout { .. } => ErrorClass::Infrastructure,
        }
    }

    /// Raw tool diagnostics, when the failing step produced any.
    pub fn diagnostics(&self) -> Option<&str> {
        match self {
            Self::ImportRejected { stderr } | Self::VerifyRejected { stderr } => Some(stderr),
            _ => None,
        }
    }
}

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, Error>;
