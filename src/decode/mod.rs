//! Hook-driven decoding of configuration trees.
//!
//! A [`DecodeHook`] sees every scalar leaf of a `serde_json::Value` tree
//! before the tree is deserialized into the target type, and may replace it.
//! Any hook error aborts the whole decode; there is no partial result.

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::fmt;

/// The kind of a value as seen by a hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    Null,
    Bool,
    Number,
    String,
    Array,
    Object,
}

impl Kind {
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Null => Kind::Null,
            Value::Bool(_) => Kind::Bool,
            Value::Number(_) => Kind::Number,
            Value::String(_) => Kind::String,
            Value::Array(_) => Kind::Array,
            Value::Object(_) => Kind::Object,
        }
    }

    pub fn is_scalar(self) -> bool {
        !matches!(self, Kind::Array | Kind::Object)
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Kind::Null => "null",
            Kind::Bool => "bool",
            Kind::Number => "number",
            Kind::String => "string",
            Kind::Array => "array",
            Kind::Object => "object",
        };
        f.write_str(name)
    }
}

/// A per-field transformation applied while decoding.
///
/// `from` is the declared kind of the source data, `to` the kind of the
/// target field. Returning `data` unchanged is the no-op.
#[async_trait]
pub trait DecodeHook: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    async fn call(&self, from: Kind, to: Kind, data: Value) -> Result<Value, Self::Error>;
}

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("decode hook failed at `{path}`")]
    Hook {
        path: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("failed to deserialize decoded value")]
    Deserialize(#[from] serde_json::Error),
}

impl DecodeError {
    /// Dotted path of the field whose hook failed.
    pub fn path(&self) -> Option<&str> {
        match self {
            DecodeError::Hook { path, .. } => Some(path),
            DecodeError::Deserialize(_) => None,
        }
    }
}

/// Run `hook` over every leaf of `input`, then deserialize the result into `T`.
pub async fn decode<T, H>(input: Value, hook: &H) -> Result<T, DecodeError>
where
    T: DeserializeOwned,
    H: DecodeHook,
{
    let value = apply_hook(input, hook).await?;
    Ok(serde_json::from_value(value)?)
}

/// Run `hook` over every leaf of `input` and return the rewritten tree.
///
/// Leaves are visited depth-first in document order, one at a time. The tree
/// carries no schema, so hooks are called with `to == from`.
pub async fn apply_hook<H: DecodeHook>(input: Value, hook: &H) -> Result<Value, DecodeError> {
    walk(input, hook, String::new()).await
}

fn walk<'a, H: DecodeHook>(
    value: Value,
    hook: &'a H,
    path: String,
) -> BoxFuture<'a, Result<Value, DecodeError>> {
    walk_value(value, hook, path).boxed()
}

async fn walk_value<H: DecodeHook>(
    value: Value,
    hook: &H,
    path: String,
) -> Result<Value, DecodeError> {
    match value {
        Value::Object(map) => {
            let mut out = Map::with_capacity(map.len());
            for (key, child) in map {
                let child_path = if path.is_empty() {
                    key.clone()
                } else {
                    format!("{path}.{key}")
                };
                out.insert(key, walk(child, hook, child_path).await?);
            }
            Ok(Value::Object(out))
        }
        Value::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for (idx, child) in items.into_iter().enumerate() {
                out.push(walk(child, hook, format!("{path}[{idx}]")).await?);
            }
            Ok(Value::Array(out))
        }
        leaf => {
            let kind = Kind::of(&leaf);
            hook.call(kind, kind, leaf)
                .await
                .map_err(|e| DecodeError::Hook {
                    path,
                    source: Box::new(e),
                })
        }
    }
}
