//! Core types for secret resolution.

use async_trait::async_trait;
use std::fmt;
use std::process::ExitStatus;

use crate::infra::context::{Context, ContextError};

/// The URI scheme every secret reference starts with.
pub const REFERENCE_SCHEME: &str = "op://";

// ============================================================================
// Resolver Trait
// ============================================================================

/// A backend that turns a secret reference into the secret value.
///
/// Implementations must be safe to call concurrently: one resolver instance is
/// shared by every hook invocation of a decode pass. Resolution must stop the
/// underlying work (process, request) when `ctx` ends, not just ignore it.
#[async_trait]
pub trait SecretResolver: Send + Sync + fmt::Debug {
    /// Display name for logging.
    fn name(&self) -> &str;

    /// Resolve `reference` (e.g. `op://vault/item/field`) to its secret value.
    async fn resolve(&self, ctx: &Context, reference: &str) -> Result<String, ResolveError>;
}

// ============================================================================
// Errors
// ============================================================================

/// A reference could not be resolved. Never carries the secret itself.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("secret helper failed to resolve {reference}: {source}")]
    Process {
        reference: String,
        #[source]
        source: ProcessError,
    },

    #[error("secrets API failed to resolve {reference}: {source}")]
    Api {
        reference: String,
        #[source]
        source: ConnectError,
    },

    #[error("resolution of {reference} interrupted: {source}")]
    Interrupted {
        reference: String,
        #[source]
        source: ContextError,
    },

    #[error("resolver failed for {reference}: {message}")]
    Backend { reference: String, message: String },
}

impl ResolveError {
    /// The reference that failed.
    pub fn reference(&self) -> &str {
        match self {
            ResolveError::Process { reference, .. }
            | ResolveError::Api { reference, .. }
            | ResolveError::Interrupted { reference, .. }
            | ResolveError::Backend { reference, .. } => reference,
        }
    }

    /// Whether the failure came from the context ending rather than the backend.
    pub fn is_interrupted(&self) -> bool {
        matches!(
            self,
            ResolveError::Interrupted { .. }
                | ResolveError::Api {
                    source: ConnectError::Interrupted(_),
                    ..
                }
        )
    }
}

/// Failure of the external helper process.
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("helper `{0}` not found on the command search path")]
    NotFound(String),

    #[error("failed to start helper `{helper}`")]
    Spawn {
        helper: String,
        #[source]
        source: std::io::Error,
    },

    #[error("helper exited with {status}: {stderr}")]
    Exited { status: ExitStatus, stderr: String },

    #[error("helper wrote non-UTF-8 output")]
    InvalidOutput(#[source] std::string::FromUtf8Error),

    #[error("i/o error talking to helper")]
    Io(#[source] std::io::Error),
}

/// Failure of the remote secrets API. Raw response bodies are never exposed.
#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    #[error("invalid secrets service host: {0}")]
    InvalidHost(String),

    #[error("service token is not a valid header value")]
    InvalidToken,

    #[error("network error talking to the secrets service")]
    Network(#[source] reqwest::Error),

    #[error("malformed response from the secrets service")]
    InvalidResponse(#[source] reqwest::Error),

    #[error("secrets service rejected the token")]
    Unauthorized,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("secrets service error: status {0}")]
    ServerError(u16),

    #[error("unexpected secrets service response: status {0}")]
    UnexpectedStatus(u16),

    #[error("invalid secret reference: {0}")]
    InvalidReference(String),

    #[error(transparent)]
    Interrupted(#[from] ContextError),
}
