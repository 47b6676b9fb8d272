//! Detached OpenPGP signature verification on top of the external `gpg`
//! binary.
//!
//! A verification request carries three uploaded files: a public key, a
//! detached signature, and the payload the signature covers. Each request
//! gets an exclusively-owned scratch workspace; gpg runs twice inside it
//! (import the key, then verify the signature) with an isolated keyring and
//! home directory, and its diagnostic text is interpreted into a
//! verified/not-verified outcome with the signer's fingerprint. The
//! workspace is destroyed when the request ends, on every path.
//!
//! # Quick start
//!
//! ```no_run
//! use bytes::Bytes;
//! use vouch_core::{UploadedFile, VerificationRequest, Verifier, VerifierConfig};
//!
//! # async fn example() -> vouch_core::Result<()> {
//! let verifier = Verifier::new(VerifierConfig::default());
//!
//! let request = VerificationRequest {
//!     public_key: UploadedFile::Buffered(Bytes::from_static(b"...key...")),
//!     signature: UploadedFile::Buffered(Bytes::from_static(b"...sig...")),
//!     payload: UploadedFile::Buffered(Bytes::from_static(b"...payload...")),
//! };
//!
//! let outcome = verifier.verify(request).await?;
//! println!("verified: {} ({:?})", outcome.verified, outcome.fingerprint);
//! # Ok(())
//! # }
//! ```
//!
//! A cryptographically bad signature is a successful run with
//! `verified == false`; errors are reserved for rejected inputs and
//! infrastructure failures, classified by [`Error::class`].

pub mod error;
pub mod gpg;
pub mod interpret;
pub mod pipeline;
pub mod upload;
pub mod workspace;

pub use error::{Error, ErrorClass, Result};
pub use gpg::{GpgInvoker, GpgOutput};
pub use interpret::{interpret, Outcome};
pub use pipeline::{Verifier, VerifierConfig};
pub use upload::{materialize, UploadedFile, VerificationRequest};
pub use workspace::Workspace;
