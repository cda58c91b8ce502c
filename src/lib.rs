pub mod cli;
pub mod config;
pub mod decode;
pub mod infra;
pub mod logging;

pub use decode::{apply_hook, decode, DecodeError, DecodeHook, Kind};
pub use infra::context::{Context, ContextError};
pub use infra::secrets::{Loader, ResolveError, SecretHook, SecretResolver};
