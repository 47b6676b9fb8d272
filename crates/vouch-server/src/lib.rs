//! HTTP front door for detached OpenPGP signature verification.
//!
//! The server accepts `POST /verify` with three multipart parts
//! (`public_key`, `signature_file`, `hash_file`) and answers with the
//! interpreted verification outcome. All verification semantics live in
//! [`vouch_core`]; this crate only decodes uploads, maps pipeline errors to
//! statuses, and serves the contract the browser client relies on.

pub mod routes;

pub use routes::{app, AppState};
