//! Secret references in configuration values.
//!
//! A value such as `{{ op://vault/item/field }}` is recognized by the
//! extractor, resolved through a [`SecretResolver`] backend and substituted
//! by the [`SecretHook`] while a configuration tree is decoded.
//!
//! Backends:
//! - [`OpCliResolver`]: runs `op read <reference>` per secret
//! - [`ConnectResolver`]: calls a 1Password Connect server

pub mod connect;
pub mod extract;
pub mod loader;
pub mod op_cli;
pub mod types;

pub use connect::{ConnectConfig, ConnectResolver, SecretReference};
pub use extract::{extract, Extraction, DEFAULT_PREFIX, DEFAULT_SUFFIX};
pub use loader::{
    with_cli_resolver, with_connect_resolver, with_prefix, with_resolver, with_suffix, Loader,
    LoaderBuilder, LoaderOption, SecretHook,
};
pub use op_cli::OpCliResolver;
pub use types::{ConnectError, ProcessError, ResolveError, SecretResolver, REFERENCE_SCHEME};
