//! The verification pipeline.
//!
//! One request runs the stage sequence workspace → materialize → import →
//! verify → interpret. The workspace is released on every path out, so no
//! request can leave scratch state behind.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use tracing::info;

use crate::error::Result;
use crate::gpg::GpgInvoker;
use crate::interpret::{interpret, Outcome};
use crate::upload::{materialize, VerificationRequest};
use crate::workspace::Workspace;

/// Pipeline configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VerifierConfig {
    /// Path of the gpg binary to invoke.
    pub gpg_path: PathBuf,
    /// Existing directory under which per-request workspaces are created.
    pub scratch_dir: PathBuf,
    /// Hard deadline for each gpg step, in seconds.
    pub step_timeout_secs: u64,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            gpg_path: PathBuf::from("gpg"),
            scratch_dir: std::env::temp_dir(),
            step_timeout_secs: 60,
        }
    }
}

/// Runs verification requests, one isolated workspace per request.
#[derive(Debug, Clone)]
pub struct Verifier {
    config: VerifierConfig,
    invoker: GpgInvoker,
}

impl Verifier {
    /// Build a verifier from `config`.
    pub fn new(config: VerifierConfig) -> Self {
        let invoker = GpgInvoker::new(
            config.gpg_path.clone(),
            Duration::from_secs(config.step_timeout_secs),
        );
        Self { config, invoker }
    }

    /// The configuration this verifier runs with.
    pub fn config(&self) -> &VerifierConfig {
        &self.config
    }

    /// Run one verification request to completion.
    ///
    /// The request's workspace is released on success and on every error;
    /// drop of the workspace guard covers cancellation as well.
    pub async fn verify(&self, request: VerificationRequest) -> Result<Outcome> {
        let workspace = Workspace::create(&self.config.scratch_dir)?;
        let outcome = self.run_stages(&workspace, request).await;
        workspace.release();
        outcome
    }

    async fn run_stages(
        &self,
        workspace: &Workspace,
        request: VerificationRequest,
    ) -> Result<Outcome> {
        materialize(workspace, request).await?;
        self.invoker.import(workspace).await?;
        let output = self.invoker.verify(workspace).await?;

        let outcome = interpret(&output.stderr);
        info!(
            verified = outcome.verified,
            fingerprint = outcome.fingerprint.as_deref().unwrap_or("-"),
            "verification finished"
        );
        Ok(outcome)
    }
}
