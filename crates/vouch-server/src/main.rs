//! Server binary: CLI parsing, logging init, serve loop.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use vouch_core::{Verifier, VerifierConfig};
use vouch_server::{app, AppState};

#[derive(Debug, Parser)]
#[command(
    name = "vouch-server",
    about = "Detached OpenPGP signature verification service",
    version
)]
struct Cli {
    /// Address to bind to.
    #[arg(long, env = "VOUCH_BIND", default_value = "127.0.0.1:5001")]
    bind: SocketAddr,

    /// Path of the gpg binary.
    #[arg(long, env = "VOUCH_GPG_PATH", default_value = "gpg")]
    gpg_path: PathBuf,

    /// Directory for per-request workspaces and upload spooling
    /// (the system temp directory when unset).
    #[arg(long, env = "VOUCH_SCRATCH_DIR")]
    scratch_dir: Option<PathBuf>,

    /// Maximum combined size of an upload body, in bytes.
    #[arg(long, env = "VOUCH_MAX_BODY_BYTES", default_value_t = 2 * 1024 * 1024 * 1024)]
    max_body_bytes: u64,

    /// Hard deadline for each gpg step, in seconds.
    #[arg(long, env = "VOUCH_STEP_TIMEOUT_SECS", default_value_t = 60)]
    step_timeout_secs: u64,

    /// Multipart parts beyond this many bytes are spooled to disk.
    #[arg(long, env = "VOUCH_SPOOL_THRESHOLD_BYTES", default_value_t = 256 * 1024)]
    spool_threshold_bytes: usize,

    /// Log filter directives (falls back to RUST_LOG, then "info").
    #[arg(long, env = "VOUCH_LOG")]
    log_filter: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_filter.as_deref());

    let scratch_dir = match cli.scratch_dir {
        Some(dir) => dir,
        None => std::env::temp_dir(),
    };
    tokio::fs::create_dir_all(&scratch_dir)
        .await
        .with_context(|| format!("creating scratch directory {}", scratch_dir.display()))?;

    let verifier = Verifier::new(VerifierConfig {
        gpg_path: cli.gpg_path,
        scratch_dir: scratch_dir.clone(),
        step_timeout_secs: cli.step_timeout_secs,
    });
    let state = Arc::new(AppState {
        verifier,
        spool_dir: scratch_dir,
        spool_threshold: cli.spool_threshold_bytes,
    });

    info!(
        bind = %cli.bind,
        gpg = %state.verifier.config().gpg_path.display(),
        max_body_bytes = cli.max_body_bytes,
        step_timeout_secs = cli.step_timeout_secs,
        "vouch server listening"
    );
    warp::serve(app(state, cli.max_body_bytes))
        .run(cli.bind)
        .await;

    Ok(())
}

fn init_tracing(filter: Option<&str>) {
    let filter = match filter {
        Some(directives) => EnvFilter::new(directives),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
