//! Secret loader: delimiters plus a resolver, exposed as a decode hook.
//!
//! ```no_run
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! use opsecret::decode::decode;
//! use opsecret::infra::context::Context;
//! use opsecret::infra::secrets::Loader;
//!
//! #[derive(serde::Deserialize)]
//! struct Db {
//!     password: String,
//! }
//!
//! let raw = serde_json::json!({"password": "{{ op://Private/db/password }}"});
//! let ctx = Context::background();
//! let db: Db = decode(raw, &Loader::default().hook(ctx)).await?;
//! # Ok(())
//! # }
//! ```

use super::connect::{ConnectConfig, ConnectResolver};
use super::extract::{extract, Extraction, DEFAULT_PREFIX, DEFAULT_SUFFIX};
use super::op_cli::OpCliResolver;
use super::types::{ConnectError, ResolveError, SecretResolver};
use crate::decode::{DecodeHook, Kind};
use crate::infra::context::Context;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, trace};

// ============================================================================
// Builder
// ============================================================================

/// Mutable staging area for a [`Loader`].
#[derive(Debug, Clone)]
pub struct LoaderBuilder {
    prefix: String,
    suffix: String,
    resolver: Arc<dyn SecretResolver>,
}

impl LoaderBuilder {
    /// Empty delimiters and the `op` CLI backend.
    pub fn new() -> Self {
        Self {
            prefix: String::new(),
            suffix: String::new(),
            resolver: Arc::new(OpCliResolver::new()),
        }
    }

    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.set_prefix(prefix);
        self
    }

    pub fn suffix(mut self, suffix: impl Into<String>) -> Self {
        self.set_suffix(suffix);
        self
    }

    pub fn resolver(mut self, resolver: impl SecretResolver + 'static) -> Self {
        self.set_resolver(Arc::new(resolver));
        self
    }

    pub fn set_prefix(&mut self, prefix: impl Into<String>) {
        self.prefix = prefix.into();
    }

    pub fn set_suffix(&mut self, suffix: impl Into<String>) {
        self.suffix = suffix.into();
    }

    pub fn set_resolver(&mut self, resolver: Arc<dyn SecretResolver>) {
        self.resolver = resolver;
    }

    pub fn build(self) -> Loader {
        Loader {
            prefix: Arc::from(self.prefix),
            suffix: Arc::from(self.suffix),
            resolver: self.resolver,
        }
    }
}

impl Default for LoaderBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// One configuration step applied to a [`LoaderBuilder`].
pub type LoaderOption = Box<dyn FnOnce(&mut LoaderBuilder) + Send>;

pub fn with_prefix(prefix: impl Into<String>) -> LoaderOption {
    let prefix = prefix.into();
    Box::new(move |b| b.set_prefix(prefix))
}

pub fn with_suffix(suffix: impl Into<String>) -> LoaderOption {
    let suffix = suffix.into();
    Box::new(move |b| b.set_suffix(suffix))
}

pub fn with_cli_resolver(resolver: OpCliResolver) -> LoaderOption {
    with_resolver(Arc::new(resolver))
}

pub fn with_connect_resolver(resolver: ConnectResolver) -> LoaderOption {
    with_resolver(Arc::new(resolver))
}

/// Use any backend, e.g. a test double.
pub fn with_resolver(resolver: Arc<dyn SecretResolver>) -> LoaderOption {
    Box::new(move |b| b.set_resolver(resolver))
}

// ============================================================================
// Loader
// ============================================================================

/// Immutable delimiter pair and backend. Clones share the backend.
#[derive(Debug, Clone)]
pub struct Loader {
    prefix: Arc<str>,
    suffix: Arc<str>,
    resolver: Arc<dyn SecretResolver>,
}

impl Loader {
    /// Apply `options` in order to a fresh [`LoaderBuilder`].
    pub fn new(options: impl IntoIterator<Item = LoaderOption>) -> Self {
        let mut builder = LoaderBuilder::new();
        for option in options {
            option(&mut builder);
        }
        builder.build()
    }

    pub fn builder() -> LoaderBuilder {
        LoaderBuilder::new()
    }

    /// `{{ ... }}` delimiters with the Connect backend, verified up front.
    pub async fn with_connect(ctx: &Context, config: ConnectConfig) -> Result<Self, ConnectError> {
        let resolver = ConnectResolver::connect(ctx, config).await?;
        Ok(Self::new([
            with_prefix(DEFAULT_PREFIX),
            with_suffix(DEFAULT_SUFFIX),
            with_connect_resolver(resolver),
        ]))
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn suffix(&self) -> &str {
        &self.suffix
    }

    pub fn resolver(&self) -> &dyn SecretResolver {
        self.resolver.as_ref()
    }

    /// Classify a value with this loader's delimiters.
    pub fn extract<'a>(&self, value: &'a str) -> Extraction<'a> {
        extract(value, &self.prefix, &self.suffix)
    }

    /// Replace `value` with its secret if it is a reference.
    ///
    /// Non-references come back as [`extract`] returns them.
    pub async fn resolve_value(&self, ctx: &Context, value: &str) -> Result<String, ResolveError> {
        match self.extract(value) {
            Extraction::PassThrough(text) => {
                trace!("Value is not a secret reference");
                Ok(text.to_string())
            }
            Extraction::Reference(reference) => {
                debug!(
                    "Resolving secret reference {} via '{}'",
                    reference,
                    self.resolver.name()
                );
                self.resolver.resolve(ctx, reference).await
            }
        }
    }

    /// A decode hook bound to `ctx`.
    pub fn hook(&self, ctx: Context) -> SecretHook {
        SecretHook {
            loader: self.clone(),
            ctx,
        }
    }
}

impl Default for Loader {
    /// `{{ ... }}` delimiters with the `op` CLI backend.
    fn default() -> Self {
        Self::new([with_prefix(DEFAULT_PREFIX), with_suffix(DEFAULT_SUFFIX)])
    }
}

// ============================================================================
// Hook
// ============================================================================

/// Decode hook that swaps secret references for their values.
///
/// Only text sources are inspected; every other kind is returned untouched.
#[derive(Debug, Clone)]
pub struct SecretHook {
    loader: Loader,
    ctx: Context,
}

impl SecretHook {
    pub fn loader(&self) -> &Loader {
        &self.loader
    }

    pub fn context(&self) -> &Context {
        &self.ctx
    }
}

#[async_trait]
impl DecodeHook for SecretHook {
    type Error = ResolveError;

    async fn call(&self, from: Kind, _to: Kind, data: Value) -> Result<Value, ResolveError> {
        if from != Kind::String {
            return Ok(data);
        }
        match data {
            Value::String(value) => self
                .loader
                .resolve_value(&self.ctx, &value)
                .await
                .map(Value::String),
            other => Ok(other),
        }
    }
}
