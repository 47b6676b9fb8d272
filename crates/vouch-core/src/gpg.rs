//! GnuPG subprocess invocation.
//!
//! Each step spawns one fresh `gpg` process pinned to the request workspace:
//! workspace-local keyring, workspace home directory, working directory set
//! to the workspace, no flag that implies network access. `LC_ALL=C` keeps
//! the diagnostic text stable for the interpreter. Steps run under a hard
//! deadline; an overdue child is killed rather than awaited.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::workspace::Workspace;

/// Captured output of one completed gpg step.
#[derive(Debug)]
pub struct GpgOutput {
    /// Exit code of the process.
    pub exit_code: i32,
    /// Full standard output.
    pub stdout: String,
    /// Full standard error. gpg writes its human-readable diagnostics here.
    pub stderr: String,
}

/// Invoker for the external gpg binary.
#[derive(Debug, Clone)]
pub struct GpgInvoker {
    gpg_path: PathBuf,
    step_timeout: Duration,
}

impl GpgInvoker {
    /// Create an invoker for the binary at `gpg_path` with a per-step
    /// deadline of `step_timeout`.
    pub fn new(gpg_path: PathBuf, step_timeout: Duration) -> Self {
        Self {
            gpg_path,
            step_timeout,
        }
    }

    /// Import the uploaded public key into the workspace keyring.
    ///
    /// Any non-zero exit means gpg rejected the key material.
    pub async fn import(&self, workspace: &Workspace) -> Result<GpgOutput> {
        let mut cmd = self.workspace_command(workspace);
        cmd.arg("--import").arg(workspace.public_key_path());

        let output = self.run(cmd, "key import").await?;
        if output.exit_code != 0 {
            return Err(Error::ImportRejected {
                stderr: output.stderr,
            });
        }
        Ok(output)
    }

    /// Verify the detached signature against the payload.
    ///
    /// gpg exits 1 for a well-formed but cryptographically bad signature, so
    /// exit codes 0 and 1 both carry an interpretable result. Higher codes
    /// mean gpg rejected the invocation itself.
    pub async fn verify(&self, workspace: &Workspace) -> Result<GpgOutput> {
        let mut cmd = self.workspace_command(workspace);
        cmd.arg("--verify")
            .arg(workspace.signature_path())
            .arg(workspace.payload_path());

        let output = self.run(cmd, "signature verify").await?;
        match output.exit_code {
            0 | 1 => Ok(output),
            code => {
                warn!(code, "gpg rejected the verify invocation");
                Err(Error::VerifyRejected {
                    stderr: output.stderr,
                })
            }
        }
    }

    /// A command pinned to `workspace`: isolated keyring, isolated home
    /// directory, stable diagnostics, no stdin.
    fn workspace_command(&self, workspace: &Workspace) -> Command {
        let mut cmd = Command::new(&self.gpg_path);
        cmd.arg("--batch")
            .arg("--no-tty")
            .arg("--no-default-keyring")
            .arg("--keyring")
            .arg(workspace.keyring_path())
            .arg("--homedir")
            .arg(workspace.path())
            .current_dir(workspace.path())
            .env("LC_ALL", "C")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    /// Spawn the command, collect its output under the step deadline.
    ///
    /// On deadline expiry the in-flight child is dropped, which kills it
    /// (`kill_on_drop`) and leaves reaping to the runtime.
    async fn run(&self, mut cmd: Command, step: &'static str) -> Result<GpgOutput> {
        let child = cmd.spawn().map_err(|err| Error::Invocation {
            message: format!("spawning gpg for {step}: {err}"),
        })?;

        let output = match tokio::time::timeout(self.step_timeout, child.wait_with_output()).await
        {
            Ok(Ok(output)) => output,
            Ok(Err(err)) => {
                return Err(Error::Invocation {
                    message: format!("collecting {step} output: {err}"),
                });
            }
            Err(_elapsed) => {
                warn!(step, timeout = ?self.step_timeout, "gpg step overdue, killed");
                return Err(Error::Timeout {
                    timeout: self.step_timeout,
                });
            }
        };

        let Some(exit_code) = output.status.code() else {
            return Err(Error::Invocation {
                message: format!("{step} terminated by signal"),
            });
        };

        debug!(step, exit_code, "gpg step finished");
        Ok(GpgOutput {
            exit_code,
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;

    use super::*;

    fn write_stub(dir: &Path, script: &str) -> PathBuf {
        let path = dir.join("gpg");
        std::fs::write(&path, script).unwrap();
        let mut perms = std::fs::metadata(&path).unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&path, perms).unwrap();
        path
    }

    fn invoker(stub: PathBuf) -> GpgInvoker {
        GpgInvoker::new(stub, Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_import_rejection_carries_stderr() {
        let bin = tempfile::tempdir().unwrap();
        let root = tempfile::tempdir().unwrap();
        let stub = write_stub(
            bin.path(),
            "#!/bin/sh\necho 'gpg: no valid OpenPGP data found.' >&2\nexit 2\n",
        );
        let ws = Workspace::create(root.path()).unwrap();

        let err = invoker(stub).import(&ws).await.unwrap_err();
        match err {
            Error::ImportRejected { stderr } => {
                assert!(stderr.contains("no valid OpenPGP data"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_verify_exit_one_is_a_result() {
        let bin = tempfile::tempdir().unwrap();
        let root = tempfile::tempdir().unwrap();
        let stub = write_stub(
            bin.path(),
            "#!/bin/sh\necho 'gpg: BAD signature from \"Tester\"' >&2\nexit 1\n",
        );
        let ws = Workspace::create(root.path()).unwrap();

        let output = invoker(stub).verify(&ws).await.unwrap();
        assert_eq!(output.exit_code, 1);
        assert!(output.stderr.contains("BAD signature"));
    }

    #[tokio::test]
    async fn test_verify_exit_two_is_rejected() {
        let bin = tempfile::tempdir().unwrap();
        let root = tempfile::tempdir().unwrap();
        let stub = write_stub(
            bin.path(),
            "#!/bin/sh\necho 'gpg: verify signatures failed: Unknown system error' >&2\nexit 2\n",
        );
        let ws = Workspace::create(root.path()).unwrap();

        let err = invoker(stub).verify(&ws).await.unwrap_err();
        assert!(matches!(err, Error::VerifyRejected { .. }));
    }

    #[tokio::test]
    async fn test_spawn_failure_is_invocation_error() {
        let root = tempfile::tempdir().unwrap();
        let ws = Workspace::create(root.path()).unwrap();
        let invoker = GpgInvoker::new(
            PathBuf::from("/nonexistent/gpg-binary"),
            Duration::from_secs(5),
        );

        let err = invoker.import(&ws).await.unwrap_err();
        assert!(matches!(err, Error::Invocation { .. }));
    }

    #[tokio::test]
    async fn test_signal_termination_is_invocation_error() {
        let bin = tempfile::tempdir().unwrap();
        let root = tempfile::tempdir().unwrap();
        let stub = write_stub(bin.path(), "#!/bin/sh\nkill -KILL $$\n");
        let ws = Workspace::create(root.path()).unwrap();

        let err = invoker(stub).verify(&ws).await.unwrap_err();
        assert!(matches!(err, Error::Invocation { .. }));
    }

    #[tokio::test]
    async fn test_slow_step_times_out() {
        let bin = tempfile::tempdir().unwrap();
        let root = tempfile::tempdir().unwrap();
        let stub = write_stub(bin.path(), "#!/bin/sh\nsleep 5\n");
        let ws = Workspace::create(root.path()).unwrap();
        let invoker = GpgInvoker::new(stub, Duration::from_millis(250));

        let started = std::time::Instant::now();
        let err = invoker.verify(&ws).await.unwrap_err();

        assert!(matches!(err, Error::Timeout { .. }));
        // The call must return at the deadline, not when the child would
        // have finished.
        assert!(started.elapsed() < Duration::from_secs(3));
    }
}
