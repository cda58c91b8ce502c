//! End-to-end tests for the secret decode hook.
//!
//! Configuration trees are decoded into typed structs with the hook in place,
//! using an in-process resolver double and, on Unix, a scripted `op` helper.

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use serde::Deserialize;
use serde_json::json;
use std::sync::{Arc, Mutex};

use opsecret::decode::{apply_hook, decode, DecodeError, DecodeHook, Kind};
use opsecret::infra::context::Context;
use opsecret::infra::secrets::{
    with_prefix, with_resolver, with_suffix, Loader, ResolveError, SecretResolver,
};

// ============================================================================
// Resolver doubles
// ============================================================================

/// Maps `op://vault/<name>` to `secret-<name>` and records every call.
#[derive(Debug, Default)]
struct FakeVault {
    calls: Mutex<Vec<String>>,
}

#[async_trait]
impl SecretResolver for FakeVault {
    fn name(&self) -> &str {
        "fake"
    }

    async fn resolve(&self, _ctx: &Context, reference: &str) -> Result<String, ResolveError> {
        self.calls.lock().unwrap().push(reference.to_string());
        match reference.strip_prefix("op://vault/") {
            Some(name) => Ok(format!("secret-{name}")),
            None => Err(ResolveError::Backend {
                reference: reference.to_string(),
                message: "no such vault".into(),
            }),
        }
    }
}

/// Fails every resolution.
#[derive(Debug)]
struct Broken;

#[async_trait]
impl SecretResolver for Broken {
    fn name(&self) -> &str {
        "broken"
    }

    async fn resolve(&self, _ctx: &Context, reference: &str) -> Result<String, ResolveError> {
        Err(ResolveError::Backend {
            reference: reference.to_string(),
            message: "vault offline".into(),
        })
    }
}

fn loader(resolver: Arc<dyn SecretResolver>) -> Loader {
    Loader::new([with_prefix("{{"), with_suffix("}}"), with_resolver(resolver)])
}

// ============================================================================
// Decoding
// ============================================================================

#[derive(Debug, Deserialize, PartialEq)]
struct AppConfig {
    name: String,
    database: Database,
    api_keys: Vec<String>,
    template: String,
    replicas: u32,
    debug: bool,
}

#[derive(Debug, Deserialize, PartialEq)]
struct Database {
    host: String,
    password: String,
}

#[tokio::test]
async fn decodes_nested_config() {
    let vault = Arc::new(FakeVault::default());
    let hook = loader(vault.clone()).hook(Context::background());

    let config: AppConfig = decode(
        json!({
            "name": "billing",
            "database": {"host": "db.internal", "password": "{{ op://vault/db }}"},
            "api_keys": ["{{op://vault/stripe}}", "literal-key"],
            "template": "{{ .Release.Name }}",
            "replicas": 3,
            "debug": false
        }),
        &hook,
    )
    .await
    .unwrap();

    assert_eq!(
        config,
        AppConfig {
            name: "billing".into(),
            database: Database {
                host: "db.internal".into(),
                password: "secret-db".into(),
            },
            api_keys: vec!["secret-stripe".into(), "literal-key".into()],
            template: ".Release.Name".into(),
            replicas: 3,
            debug: false,
        }
    );

    let mut calls = vault.calls.lock().unwrap().clone();
    calls.sort();
    assert_eq!(calls, vec!["op://vault/db", "op://vault/stripe"]);
}

#[tokio::test]
async fn failure_aborts_whole_decode() {
    let hook = loader(Arc::new(Broken)).hook(Context::background());

    let result: Result<Database, DecodeError> = decode(
        json!({"host": "db.internal", "password": "{{op://vault/item}}"}),
        &hook,
    )
    .await;

    let err = result.unwrap_err();
    assert_eq!(err.path(), Some("password"));

    let source = std::error::Error::source(&err).expect("hook error is the source");
    let resolve = source
        .downcast_ref::<ResolveError>()
        .expect("source is a ResolveError");
    assert_eq!(resolve.reference(), "op://vault/item");
}

#[tokio::test]
async fn non_references_pass_through_untouched() {
    let hook = loader(Arc::new(Broken)).hook(Context::background());

    let input = json!({
        "plain": "value",
        "spaced": "  keep my spaces  ",
        "half": "{{op://vault/item",
        "count": 7,
        "ratio": 0.5,
        "flag": true,
        "nothing": null
    });
    let out = apply_hook(input.clone(), &hook).await.unwrap();
    assert_eq!(out, input);
}

#[tokio::test]
async fn hook_gates_on_declared_kind() {
    let vault = Arc::new(FakeVault::default());
    let hook = loader(vault.clone()).hook(Context::background());

    let data = json!("{{op://vault/x}}");
    for kind in [Kind::Number, Kind::Bool, Kind::Null, Kind::Array, Kind::Object] {
        let out = hook.call(kind, Kind::String, data.clone()).await.unwrap();
        assert_eq!(out, data);
    }
    assert!(vault.calls.lock().unwrap().is_empty());

    let out = hook.call(Kind::String, Kind::String, data).await.unwrap();
    assert_eq!(out, json!("secret-x"));
}

#[tokio::test]
async fn custom_delimiters() {
    let vault = Arc::new(FakeVault::default());
    let hook = Loader::builder()
        .prefix("${")
        .suffix("}")
        .resolver(FakeVaultHandle(vault.clone()))
        .build()
        .hook(Context::background());

    let out = apply_hook(
        json!({"a": "${op://vault/a}", "b": "{{op://vault/b}}"}),
        &hook,
    )
    .await
    .unwrap();
    assert_eq!(out, json!({"a": "secret-a", "b": "{{op://vault/b}}"}));
}

/// Shares a `FakeVault` with the test while handing ownership to the builder.
#[derive(Debug)]
struct FakeVaultHandle(Arc<FakeVault>);

#[async_trait]
impl SecretResolver for FakeVaultHandle {
    fn name(&self) -> &str {
        self.0.name()
    }

    async fn resolve(&self, ctx: &Context, reference: &str) -> Result<String, ResolveError> {
        self.0.resolve(ctx, reference).await
    }
}

#[tokio::test]
async fn hooks_run_concurrently_on_one_loader() {
    let vault = Arc::new(FakeVault::default());
    let loader = loader(vault.clone());
    let ctx = Context::background();

    let mut tasks = Vec::new();
    for i in 0..16 {
        let hook = loader.hook(ctx.clone());
        tasks.push(tokio::spawn(async move {
            hook.call(
                Kind::String,
                Kind::String,
                json!(format!("{{{{op://vault/k{i}}}}}")),
            )
            .await
        }));
    }

    for (i, task) in tasks.into_iter().enumerate() {
        let out = task.await.unwrap().unwrap();
        assert_eq!(out, json!(format!("secret-k{i}")));
    }
    assert_eq!(vault.calls.lock().unwrap().len(), 16);
}

// ============================================================================
// Scripted helper (Unix only)
// ============================================================================

#[cfg(unix)]
mod helper_process {
    use super::*;
    use opsecret::infra::secrets::{with_cli_resolver, OpCliResolver};
    use pretty_assertions::assert_eq;
    use std::os::unix::fs::PermissionsExt;
    use std::time::Duration;

    fn fake_op(dir: &std::path::Path, body: &str) -> OpCliResolver {
        let path = dir.join("op");
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        OpCliResolver::with_helper(path.to_string_lossy().into_owned())
    }

    #[tokio::test]
    async fn decodes_through_op_read() {
        let dir = tempfile::tempdir().unwrap();
        let op = fake_op(
            dir.path(),
            r#"[ "$1" = read ] || exit 2
case "$2" in
  op://vault/db/password) printf 'hunter2' ;;
  *) echo "[ERROR] \"$2\" isn't a secret reference" >&2; exit 1 ;;
esac"#,
        );
        let hook = Loader::new([with_prefix("{{"), with_suffix("}}"), with_cli_resolver(op)])
            .hook(Context::background());

        let db: Database = decode(
            json!({"host": "db", "password": "{{ op://vault/db/password }}"}),
            &hook,
        )
        .await
        .unwrap();
        assert_eq!(db.password, "hunter2");

        let err = decode::<Database, _>(
            json!({"host": "db", "password": "{{ op://vault/other/password }}"}),
            &hook,
        )
        .await
        .unwrap_err();
        assert_eq!(err.path(), Some("password"));
    }

    #[tokio::test]
    async fn deadline_bounds_the_whole_decode() {
        let dir = tempfile::tempdir().unwrap();
        let op = fake_op(dir.path(), "exec sleep 30");
        let ctx = Context::background().with_timeout(Duration::from_millis(200));
        let hook = Loader::new([with_prefix("{{"), with_suffix("}}"), with_cli_resolver(op)])
            .hook(ctx);

        let started = std::time::Instant::now();
        let err = apply_hook(json!({"password": "{{op://vault/db/password}}"}), &hook)
            .await
            .unwrap_err();
        assert!(started.elapsed() < Duration::from_secs(10));

        let source = std::error::Error::source(&err).unwrap();
        let resolve = source.downcast_ref::<ResolveError>().unwrap();
        assert!(resolve.is_interrupted());
    }
}
