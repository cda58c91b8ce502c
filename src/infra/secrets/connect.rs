//! Remote secrets API backend (1Password Connect).
//!
//! Holds one long-lived HTTP client bound to a service token and an
//! integration identity. The client is verified when it is built, so a bad
//! token or an unreachable server fails at startup rather than on the first
//! secret.
//!
//! A reference `op://<vault>/<item>/[<section>/]<field>` is resolved in three
//! requests: vault lookup, item lookup, item fetch. Vaults and items match by
//! id or name/title, sections and fields by id or label.

use super::types::{ConnectError, ResolveError, SecretResolver, REFERENCE_SCHEME};
use crate::infra::context::{run_with_context, Context};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};

/// Connect timeout for the HTTP client. Request deadlines come from the context.
const CONNECT_TIMEOUT_SECS: u64 = 10;

/// Everything needed to build a [`ConnectResolver`].
#[derive(Clone)]
pub struct ConnectConfig {
    /// Base URL of the Connect server, e.g. `http://localhost:8080`.
    pub host: String,
    /// Service credential, sent as a bearer token.
    pub token: String,
    pub integration_name: String,
    pub integration_version: String,
}

impl std::fmt::Debug for ConnectConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectConfig")
            .field("host", &self.host)
            .field("token", &"<redacted>")
            .field("integration_name", &self.integration_name)
            .field("integration_version", &self.integration_version)
            .finish()
    }
}

// ============================================================================
// Reference parsing
// ============================================================================

/// The parts of an `op://` reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SecretReference<'a> {
    pub vault: &'a str,
    pub item: &'a str,
    pub section: Option<&'a str>,
    pub field: &'a str,
}

impl<'a> SecretReference<'a> {
    pub fn parse(reference: &'a str) -> Result<Self, ConnectError> {
        let invalid = |why: &str| ConnectError::InvalidReference(format!("{reference}: {why}"));

        let rest = reference
            .strip_prefix(REFERENCE_SCHEME)
            .ok_or_else(|| invalid("missing op:// scheme"))?;

        let parts: Vec<&str> = rest.split('/').collect();
        if parts.iter().any(|p| p.is_empty()) {
            return Err(invalid("empty path segment"));
        }

        match parts[..] {
            [vault, item, field] => Ok(Self {
                vault,
                item,
                section: None,
                field,
            }),
            [vault, item, section, field] => Ok(Self {
                vault,
                item,
                section: Some(section),
                field,
            }),
            _ => Err(invalid("expected op://<vault>/<item>/[<section>/]<field>")),
        }
    }
}

// ============================================================================
// API response types
// ============================================================================

#[derive(Debug, Deserialize)]
struct Vault {
    id: String,
    #[serde(default)]
    name: String,
}

#[derive(Debug, Deserialize)]
struct ItemSummary {
    id: String,
    #[serde(default)]
    title: String,
}

#[derive(Debug, Deserialize)]
struct Item {
    #[serde(default)]
    sections: Vec<Section>,
    #[serde(default)]
    fields: Vec<Field>,
}

#[derive(Debug, Deserialize)]
struct Section {
    id: String,
    #[serde(default)]
    label: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Field {
    #[serde(default)]
    id: String,
    #[serde(default)]
    label: Option<String>,
    #[serde(default)]
    value: Option<String>,
    #[serde(default)]
    section: Option<FieldSection>,
}

#[derive(Debug, Deserialize)]
struct FieldSection {
    id: String,
}

impl Field {
    fn is_named(&self, name: &str) -> bool {
        self.id == name || self.label.as_deref() == Some(name)
    }
}

// ============================================================================
// Resolver
// ============================================================================

/// Resolves secrets through a 1Password Connect server.
#[derive(Debug, Clone)]
pub struct ConnectResolver {
    http: reqwest::Client,
    base_url: String,
}

impl ConnectResolver {
    /// Build the client and verify the token against the server.
    ///
    /// Fails if the host is malformed, the token is unusable, the server is
    /// unreachable, or the token is rejected.
    pub async fn connect(ctx: &Context, config: ConnectConfig) -> Result<Self, ConnectError> {
        let base_url = config.host.trim_end_matches('/').to_owned();
        let parsed =
            url::Url::parse(&base_url).map_err(|e| ConnectError::InvalidHost(e.to_string()))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ConnectError::InvalidHost(format!(
                "unsupported scheme '{}'",
                parsed.scheme()
            )));
        }

        if config.token.trim().is_empty() {
            return Err(ConnectError::InvalidToken);
        }
        let mut auth = HeaderValue::from_str(&format!("Bearer {}", config.token))
            .map_err(|_| ConnectError::InvalidToken)?;
        auth.set_sensitive(true);
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, auth);

        let http = reqwest::Client::builder()
            .user_agent(format!(
                "{}/{}",
                config.integration_name, config.integration_version
            ))
            .default_headers(headers)
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()
            .map_err(ConnectError::Network)?;

        let resolver = Self { http, base_url };
        let vaults = resolver.list_vaults(ctx).await?;
        info!(
            "Connected to secrets service at {} ({} vault(s) visible)",
            resolver.base_url,
            vaults.len()
        );
        Ok(resolver)
    }

    async fn get<T: DeserializeOwned>(
        &self,
        ctx: &Context,
        path: &str,
        what: String,
    ) -> Result<T, ConnectError> {
        let url = format!("{}{}", self.base_url, path);
        run_with_context(self.fetch(&url, what), ctx).await?
    }

    async fn fetch<T: DeserializeOwned>(&self, url: &str, what: String) -> Result<T, ConnectError> {
        let resp = self
            .http
            .get(url)
            .send()
            .await
            .map_err(ConnectError::Network)?;

        match resp.status().as_u16() {
            200 => resp.json::<T>().await.map_err(ConnectError::InvalidResponse),
            401 | 403 => Err(ConnectError::Unauthorized),
            404 => Err(ConnectError::NotFound(what)),
            status @ 500..=599 => Err(ConnectError::ServerError(status)),
            other => Err(ConnectError::UnexpectedStatus(other)),
        }
    }

    async fn list_vaults(&self, ctx: &Context) -> Result<Vec<Vault>, ConnectError> {
        self.get(ctx, "/v1/vaults", "vaults endpoint".into()).await
    }

    async fn find_vault(&self, ctx: &Context, name: &str) -> Result<String, ConnectError> {
        self.list_vaults(ctx)
            .await?
            .into_iter()
            .find(|v| v.id == name || v.name == name)
            .map(|v| v.id)
            .ok_or_else(|| ConnectError::NotFound(format!("vault '{name}'")))
    }

    async fn find_item(
        &self,
        ctx: &Context,
        vault_id: &str,
        title: &str,
    ) -> Result<String, ConnectError> {
        let items: Vec<ItemSummary> = self
            .get(
                ctx,
                &format!("/v1/vaults/{vault_id}/items"),
                format!("vault {vault_id}"),
            )
            .await?;
        items
            .into_iter()
            .find(|i| i.id == title || i.title == title)
            .map(|i| i.id)
            .ok_or_else(|| ConnectError::NotFound(format!("item '{title}'")))
    }

    async fn get_item(
        &self,
        ctx: &Context,
        vault_id: &str,
        item_id: &str,
    ) -> Result<Item, ConnectError> {
        self.get(
            ctx,
            &format!("/v1/vaults/{vault_id}/items/{item_id}"),
            format!("item {item_id} in vault {vault_id}"),
        )
        .await
    }

    /// Fetch the secret a parsed reference points at.
    async fn lookup(&self, ctx: &Context, reference: &str) -> Result<String, ConnectError> {
        let parsed = SecretReference::parse(reference)?;
        let vault_id = self.find_vault(ctx, parsed.vault).await?;
        let item_id = self.find_item(ctx, &vault_id, parsed.item).await?;
        let item = self.get_item(ctx, &vault_id, &item_id).await?;
        select_field(item, &parsed)
    }
}

fn select_field(item: Item, reference: &SecretReference<'_>) -> Result<String, ConnectError> {
    let section_id = match reference.section {
        Some(name) => Some(
            item.sections
                .iter()
                .find(|s| s.id == name || s.label.as_deref() == Some(name))
                .map(|s| s.id.clone())
                .ok_or_else(|| ConnectError::NotFound(format!("section '{name}'")))?,
        ),
        None => None,
    };

    let field = item
        .fields
        .into_iter()
        .filter(|f| match &section_id {
            Some(id) => f.section.as_ref().is_some_and(|s| &s.id == id),
            None => true,
        })
        .find(|f| f.is_named(reference.field))
        .ok_or_else(|| ConnectError::NotFound(format!("field '{}'", reference.field)))?;

    field
        .value
        .ok_or_else(|| ConnectError::NotFound(format!("value of field '{}'", reference.field)))
}

#[async_trait]
impl SecretResolver for ConnectResolver {
    fn name(&self) -> &str {
        "connect"
    }

    async fn resolve(&self, ctx: &Context, reference: &str) -> Result<String, ResolveError> {
        debug!("Resolving {} via {}", reference, self.base_url);
        self.lookup(ctx, reference)
            .await
            .map_err(|source| ResolveError::Api {
                reference: reference.to_string(),
                source,
            })
    }
}
