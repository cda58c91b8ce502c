mod io;

pub use io::*;

use crate::infra::context::Context;
use crate::infra::secrets::{
    with_prefix, with_resolver, with_suffix, ConnectConfig, ConnectError, ConnectResolver,
    Loader, OpCliResolver, SecretResolver, DEFAULT_PREFIX, DEFAULT_SUFFIX,
};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Default per-decode resolution timeout.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Integration identity reported to the secrets service by default.
pub const DEFAULT_INTEGRATION_NAME: &str = "opsecret";

/// How secret references are recognized and resolved.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    #[serde(default = "default_prefix")]
    pub prefix: String,
    #[serde(default = "default_suffix")]
    pub suffix: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub backend: BackendSettings,
}

/// Which resolver backend to build.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum BackendSettings {
    #[serde(rename_all = "camelCase")]
    Cli {
        #[serde(default = "default_helper")]
        helper: String,
        /// Passed to the helper as `OP_ACCOUNT`.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        account: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    Connect {
        host: String,
        #[serde(skip_serializing)]
        token: String,
        #[serde(default = "default_integration_name")]
        integration_name: String,
        #[serde(default = "default_integration_version")]
        integration_version: String,
    },
}

impl std::fmt::Debug for BackendSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendSettings::Cli { helper, account } => f
                .debug_struct("Cli")
                .field("helper", helper)
                .field("account", account)
                .finish(),
            BackendSettings::Connect {
                host,
                integration_name,
                integration_version,
                ..
            } => f
                .debug_struct("Connect")
                .field("host", host)
                .field("token", &"<redacted>")
                .field("integration_name", integration_name)
                .field("integration_version", integration_version)
                .finish(),
        }
    }
}

fn default_prefix() -> String {
    DEFAULT_PREFIX.to_string()
}

fn default_suffix() -> String {
    DEFAULT_SUFFIX.to_string()
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_helper() -> String {
    crate::infra::secrets::op_cli::DEFAULT_HELPER.to_string()
}

fn default_integration_name() -> String {
    DEFAULT_INTEGRATION_NAME.to_string()
}

fn default_integration_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

impl Default for BackendSettings {
    fn default() -> Self {
        BackendSettings::Cli {
            helper: default_helper(),
            account: None,
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            prefix: default_prefix(),
            suffix: default_suffix(),
            timeout_secs: default_timeout_secs(),
            backend: BackendSettings::default(),
        }
    }
}

impl Settings {
    /// Load settings from an optional file, then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut settings = match path {
            Some(path) => {
                info!("Loading settings from {}", path.display());
                serde_json::from_value(read_document(path)?)?
            }
            None => Settings::default(),
        };
        settings.apply_env_overrides();
        Ok(settings)
    }

    /// Apply overrides from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from `lookup` (an environment-like key/value source).
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(prefix) = lookup("OPSECRET_PREFIX") {
            self.prefix = prefix;
        }

        if let Some(suffix) = lookup("OPSECRET_SUFFIX") {
            self.suffix = suffix;
        }

        if let Some(secs) = lookup("OPSECRET_TIMEOUT_SECS") {
            if let Ok(secs) = secs.parse() {
                self.timeout_secs = secs;
            }
        }

        if let (Some(host), Some(token)) = (lookup("OP_CONNECT_HOST"), lookup("OP_CONNECT_TOKEN")) {
            let (integration_name, integration_version) = match &self.backend {
                BackendSettings::Connect {
                    integration_name,
                    integration_version,
                    ..
                } => (integration_name.clone(), integration_version.clone()),
                BackendSettings::Cli { .. } => {
                    (default_integration_name(), default_integration_version())
                }
            };
            self.backend = BackendSettings::Connect {
                host,
                token,
                integration_name,
                integration_version,
            };
        }

        if let Some(path) = lookup("OPSECRET_OP_PATH") {
            if let BackendSettings::Cli { helper, .. } = &mut self.backend {
                *helper = path;
            }
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Build the configured backend. The Connect backend is verified here.
    pub async fn build_resolver(&self, ctx: &Context) -> Result<Arc<dyn SecretResolver>, ConnectError> {
        match &self.backend {
            BackendSettings::Cli { helper, account } => {
                let mut resolver = OpCliResolver::with_helper(helper.clone());
                if let Some(account) = account {
                    resolver = resolver.env("OP_ACCOUNT", account.clone());
                }
                Ok(Arc::new(resolver))
            }
            BackendSettings::Connect {
                host,
                token,
                integration_name,
                integration_version,
            } => {
                let resolver = ConnectResolver::connect(
                    ctx,
                    ConnectConfig {
                        host: host.clone(),
                        token: token.clone(),
                        integration_name: integration_name.clone(),
                        integration_version: integration_version.clone(),
                    },
                )
                .await?;
                Ok(Arc::new(resolver))
            }
        }
    }

    /// Build a [`Loader`] from these settings.
    pub async fn build_loader(&self, ctx: &Context) -> Result<Loader, ConnectError> {
        let resolver = self.build_resolver(ctx).await?;
        Ok(Loader::new([
            with_prefix(self.prefix.clone()),
            with_suffix(self.suffix.clone()),
            with_resolver(resolver),
        ]))
    }
}
