//! HTTP routes and handlers.
//!
//! The transport is the single place that maps pipeline failures to HTTP
//! statuses: missing parts are rejected before any workspace exists, tool
//! rejections become 400 with the raw diagnostics attached, infrastructure
//! failures become 500, and an over-limit body is cut off with 413.

use std::convert::Infallible;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::{Buf, BytesMut};
use futures::TryStreamExt;
use serde::Serialize;
use tempfile::NamedTempFile;
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, info, warn};
use warp::http::StatusCode;
use warp::multipart::{FormData, Part};
use warp::reply::{Json, WithStatus};
use warp::Filter;

use vouch_core::{ErrorClass, UploadedFile, VerificationRequest, Verifier};

const PUBLIC_KEY_PART: &str = "public_key";
const SIGNATURE_PART: &str = "signature_file";
const PAYLOAD_PART: &str = "hash_file";

/// Shared server state.
#[derive(Debug)]
pub struct AppState {
    /// The verification pipeline.
    pub verifier: Verifier,
    /// Directory where oversized multipart parts are spooled. Should share a
    /// filesystem with the verifier's scratch root so materialization can
    /// rename instead of copy.
    pub spool_dir: PathBuf,
    /// Parts beyond this many bytes are spooled to disk while streaming.
    pub spool_threshold: usize,
}

/// The verify route plus rejection handling and permissive CORS.
///
/// `POST /verify` is the only endpoint; everything else 404s.
/// `max_body_bytes` caps the combined multipart body; requests declaring
/// more are refused with the fixed over-limit message.
pub fn app(
    state: Arc<AppState>,
    max_body_bytes: u64,
) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    let cors = warp::cors()
        .allow_any_origin()
        .allow_methods(vec!["POST", "OPTIONS"])
        .allow_headers(vec!["content-type"]);

    verify_route(state, max_body_bytes)
        .recover(handle_rejection)
        .with(cors)
}

/// `POST /verify` with a multipart body.
fn verify_route(
    state: Arc<AppState>,
    max_body_bytes: u64,
) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    warp::path("verify")
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::body::content_length_limit(max_body_bytes))
        .and(warp::multipart::form().max_length(max_body_bytes))
        .and(with_state(state))
        .and_then(handle_verify)
}

/// Inject state into handlers.
fn with_state(
    state: Arc<AppState>,
) -> impl Filter<Extract = (Arc<AppState>,), Error = Infallible> + Clone {
    warp::any().map(move || state.clone())
}

/// Success body of `POST /verify`.
#[derive(Debug, Serialize)]
struct VerifyBody {
    verified: bool,
    fingerprint: Option<String>,
    gpg_output: String,
}

/// Error body of `POST /verify`.
#[derive(Debug, Serialize)]
struct ErrorBody {
    error: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

fn reply_error(
    status: StatusCode,
    error: &'static str,
    details: Option<String>,
) -> WithStatus<Json> {
    warp::reply::with_status(warp::reply::json(&ErrorBody { error, details }), status)
}

/// Handle one verification request.
async fn handle_verify(
    form: FormData,
    state: Arc<AppState>,
) -> Result<WithStatus<Json>, Infallible> {
    let uploads = match collect_uploads(form, &state).await {
        Ok(uploads) => uploads,
        Err(CollectError::Body(err)) => {
            warn!(error = %err, "rejecting malformed multipart body");
            return Ok(reply_error(
                StatusCode::BAD_REQUEST,
                "Malformed multipart body",
                Some(err.to_string()),
            ));
        }
        Err(CollectError::Spool(err)) => {
            error!(error = %err, "failed to spool an uploaded part");
            return Ok(reply_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error",
                Some(err.to_string()),
            ));
        }
    };

    // Validated before any workspace is created.
    let Some(request) = uploads.into_request() else {
        debug!("rejecting request with missing parts");
        return Ok(reply_error(
            StatusCode::BAD_REQUEST,
            "Missing required files",
            None,
        ));
    };

    match state.verifier.verify(request).await {
        Ok(outcome) => {
            info!(verified = outcome.verified, "verify request complete");
            Ok(warp::reply::with_status(
                warp::reply::json(&VerifyBody {
                    verified: outcome.verified,
                    fingerprint: outcome.fingerprint,
                    gpg_output: outcome.diagnostics,
                }),
                StatusCode::OK,
            ))
        }
        Err(err) => match err.class() {
            ErrorClass::ClientInput => {
                warn!(error = %err, "gpg rejected the uploaded files");
                Ok(reply_error(
                    StatusCode::BAD_REQUEST,
                    "Verification failed",
                    err.diagnostics().map(str::to_string),
                ))
            }
            ErrorClass::Infrastructure => {
                error!(error = %err, "verification pipeline failed");
                Ok(reply_error(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error",
                    Some(err.to_string()),
                ))
            }
        },
    }
}

/// The required parts of a verify request, as collected so far.
#[derive(Default)]
struct CollectedUploads {
    public_key: Option<UploadedFile>,
    signature: Option<UploadedFile>,
    payload: Option<UploadedFile>,
}

impl CollectedUploads {
    fn slot(&mut self, name: &str) -> Option<&mut Option<UploadedFile>> {
        match name {
            PUBLIC_KEY_PART => Some(&mut self.public_key),
            SIGNATURE_PART => Some(&mut self.signature),
            PAYLOAD_PART => Some(&mut self.payload),
            _ => None,
        }
    }

    fn into_request(self) -> Option<VerificationRequest> {
        Some(VerificationRequest {
            public_key: self.public_key?,
            signature: self.signature?,
            payload: self.payload?,
        })
    }
}

enum CollectError {
    /// The multipart body could not be decoded.
    Body(warp::Error),
    /// Spooling an oversized part to disk failed.
    Spool(std::io::Error),
}

/// Stream the multipart body, capturing the three known parts and draining
/// anything else. Part order is not significant.
async fn collect_uploads(
    form: FormData,
    state: &AppState,
) -> Result<CollectedUploads, CollectError> {
    let mut uploads = CollectedUploads::default();
    let mut form = Box::pin(form);

    while let Some(part) = form.try_next().await.map_err(CollectError::Body)? {
        match uploads.slot(part.name()) {
            Some(slot) => {
                *slot = Some(read_part(part, state).await?);
            }
            None => {
                debug!(part = part.name(), "draining unexpected multipart part");
                drain_part(part).await?;
            }
        }
    }

    Ok(uploads)
}

/// Read one part, buffering it in memory up to the spool threshold and
/// spilling to a temp file beyond it.
async fn read_part(part: Part, state: &AppState) -> Result<UploadedFile, CollectError> {
    let mut buffered = BytesMut::new();
    let mut spool: Option<(NamedTempFile, tokio::fs::File)> = None;
    let mut stream = Box::pin(part.stream());

    while let Some(mut chunk) = stream.try_next().await.map_err(CollectError::Body)? {
        let bytes = chunk.copy_to_bytes(chunk.remaining());
        match spool.as_mut() {
            Some((_, file)) => {
                file.write_all(&bytes).await.map_err(CollectError::Spool)?;
            }
            None => {
                buffered.extend_from_slice(&bytes);
                if buffered.len() > state.spool_threshold {
                    let (guard, mut file) = open_spool(&state.spool_dir).await?;
                    file.write_all(&buffered).await.map_err(CollectError::Spool)?;
                    buffered.clear();
                    spool = Some((guard, file));
                }
            }
        }
    }

    match spool {
        Some((guard, mut file)) => {
            file.flush().await.map_err(CollectError::Spool)?;
            drop(file);
            Ok(UploadedFile::Spooled(guard))
        }
        None => Ok(UploadedFile::Buffered(buffered.freeze())),
    }
}

/// Create a spool file and an async handle writing to it.
async fn open_spool(dir: &Path) -> Result<(NamedTempFile, tokio::fs::File), CollectError> {
    let guard = tempfile::Builder::new()
        .prefix("vouch-part-")
        .tempfile_in(dir)
        .map_err(CollectError::Spool)?;
    let file = tokio::fs::File::create(guard.path())
        .await
        .map_err(CollectError::Spool)?;
    Ok((guard, file))
}

/// Consume a part fully so the form stream can advance past it.
async fn drain_part(part: Part) -> Result<(), CollectError> {
    let mut stream = Box::pin(part.stream());
    while stream
        .try_next()
        .await
        .map_err(CollectError::Body)?
        .is_some()
    {}
    Ok(())
}

/// Map rejections to the transport contract. The over-limit body text is
/// part of the public contract.
async fn handle_rejection(err: warp::Rejection) -> Result<impl warp::Reply, Infallible> {
    let (status, message) = if err.is_not_found() {
        (StatusCode::NOT_FOUND, "Not found")
    } else if err.find::<warp::reject::PayloadTooLarge>().is_some() {
        (StatusCode::PAYLOAD_TOO_LARGE, "File size exceeds 2GB limit")
    } else if err.find::<warp::reject::LengthRequired>().is_some() {
        (StatusCode::LENGTH_REQUIRED, "Content length required")
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        (StatusCode::METHOD_NOT_ALLOWED, "Method not allowed")
    } else {
        warn!(?err, "rejecting request");
        (StatusCode::BAD_REQUEST, "Bad request")
    };
    Ok(warp::reply::with_status(message, status))
}
