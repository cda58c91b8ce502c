//! Subprocess secret backend.
//!
//! Resolves references by running `<helper> read <reference>` (the 1Password
//! CLI by default) and capturing stdout. One process per resolution; the
//! helper authenticates on its own (desktop app integration, service account
//! token in its environment, ...).

use super::types::{ProcessError, ResolveError, SecretResolver};
use crate::infra::context::Context;
use async_trait::async_trait;
use std::process::Stdio;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tracing::{debug, warn};

/// Helper binary looked up on the command search path by default.
pub const DEFAULT_HELPER: &str = "op";

/// Resolves secrets by shelling out to a helper CLI.
#[derive(Debug, Clone)]
pub struct OpCliResolver {
    helper: String,
    envs: Vec<(String, String)>,
}

impl OpCliResolver {
    pub fn new() -> Self {
        Self::with_helper(DEFAULT_HELPER)
    }

    /// Use a specific helper binary (name on the search path, or a path).
    pub fn with_helper(helper: impl Into<String>) -> Self {
        Self {
            helper: helper.into(),
            envs: Vec::new(),
        }
    }

    /// Set an extra environment variable for the helper (e.g. `OP_ACCOUNT`).
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    pub fn helper(&self) -> &str {
        &self.helper
    }

    async fn read(&self, ctx: &Context, reference: &str) -> Result<String, ResolveError> {
        let process_err = |source: ProcessError| ResolveError::Process {
            reference: reference.to_string(),
            source,
        };

        let mut cmd = Command::new(&self.helper);
        cmd.arg("read").arg(reference);
        cmd.envs(self.envs.iter().cloned());

        // No stdin: an interactive sign-in prompt must fail, not hang.
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| {
            process_err(if e.kind() == std::io::ErrorKind::NotFound {
                ProcessError::NotFound(self.helper.clone())
            } else {
                ProcessError::Spawn {
                    helper: self.helper.clone(),
                    source: e,
                }
            })
        })?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let outcome = {
            let run = async { tokio::join!(child.wait(), read_all(stdout), read_all(stderr)) };
            tokio::select! {
                biased;
                reason = ctx.done() => Err(reason),
                finished = run => Ok(finished),
            }
        };

        let (status, stdout, stderr) = match outcome {
            Ok(finished) => finished,
            Err(reason) => {
                // Kill and reap so nothing outlives the cancelled call.
                if let Err(e) = child.kill().await {
                    warn!("Failed to kill secret helper '{}': {}", self.helper, e);
                }
                return Err(ResolveError::Interrupted {
                    reference: reference.to_string(),
                    source: reason,
                });
            }
        };

        let status = status.map_err(|e| process_err(ProcessError::Io(e)))?;
        let stdout = stdout.map_err(|e| process_err(ProcessError::Io(e)))?;
        let stderr = stderr.map_err(|e| process_err(ProcessError::Io(e)))?;

        if !status.success() {
            let stderr = String::from_utf8_lossy(&stderr);
            // Only the first line: helpers tend to dump usage or paths after it.
            let message = stderr
                .lines()
                .map(str::trim)
                .find(|l| !l.is_empty())
                .unwrap_or("no error output")
                .to_string();
            warn!(
                "Secret helper '{}' exited with {} for {}",
                self.helper, status, reference
            );
            return Err(process_err(ProcessError::Exited {
                status,
                stderr: message,
            }));
        }

        String::from_utf8(stdout).map_err(|e| process_err(ProcessError::InvalidOutput(e)))
    }
}

impl Default for OpCliResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SecretResolver for OpCliResolver {
    fn name(&self) -> &str {
        "op-cli"
    }

    async fn resolve(&self, ctx: &Context, reference: &str) -> Result<String, ResolveError> {
        if let Some(reason) = ctx.err() {
            return Err(ResolveError::Interrupted {
                reference: reference.to_string(),
                source: reason,
            });
        }
        debug!("Resolving {} via '{} read'", reference, self.helper);
        self.read(ctx, reference).await
    }
}

async fn read_all<R: AsyncRead + Unpin>(pipe: Option<R>) -> std::io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        pipe.read_to_end(&mut buf).await?;
    }
    Ok(buf)
}
