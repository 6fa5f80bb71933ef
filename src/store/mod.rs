//! Path-addressed JSON tree store.
//!
//! Every piece of application state lives in one tree (`/users/{uid}`,
//! `/mealPrices`, `/notice`, ...). Plain writes are last-writer-wins; the
//! balance-affecting paths go through [`TreeStore::transaction`], an
//! apply-if-unchanged primitive that re-runs a pure callback against the
//! latest value until its write lands.

use std::fmt;

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::sync::broadcast;

pub mod memory;
pub mod postgres;
pub mod tree;

pub use memory::MemoryStore;

/// Upper bound on optimistic retries before a transaction gives up.
pub const DEFAULT_MAX_RETRIES: u32 = 25;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid path {path:?}: {reason}")]
    InvalidPath { path: String, reason: &'static str },

    #[error("operation not supported on {0}")]
    Unsupported(NodePath),

    #[error("transaction on {path} gave up after {attempts} attempts")]
    TooManyRetries { path: NodePath, attempts: u32 },

    #[error("malformed value: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("store lock poisoned")]
    Poisoned,
}

/// A validated `/a/b/c` location in the tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodePath {
    segments: Vec<String>,
}

impl NodePath {
    pub fn root() -> Self {
        Self { segments: Vec::new() }
    }

    pub fn parse(raw: &str) -> Result<Self, StoreError> {
        let mut path = Self::root();
        for seg in raw.split('/').filter(|s| !s.is_empty()) {
            path = path.child(seg).map_err(|e| match e {
                StoreError::InvalidPath { reason, .. } => StoreError::InvalidPath {
                    path: raw.to_string(),
                    reason,
                },
                other => other,
            })?;
        }
        Ok(path)
    }

    pub fn child(&self, segment: impl AsRef<str>) -> Result<Self, StoreError> {
        let segment = segment.as_ref();
        if segment.is_empty() {
            return Err(StoreError::InvalidPath {
                path: format!("{}/", self),
                reason: "empty segment",
            });
        }
        if segment
            .chars()
            .any(|c| matches!(c, '.' | '#' | '$' | '[' | ']' | '/') || c.is_control())
        {
            return Err(StoreError::InvalidPath {
                path: format!("{}/{}", self, segment),
                reason: "segment contains a forbidden character",
            });
        }
        let mut segments = self.segments.clone();
        segments.push(segment.to_string());
        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }
}

impl fmt::Display for NodePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            return f.write_str("/");
        }
        for seg in &self.segments {
            write!(f, "/{}", seg)?;
        }
        Ok(())
    }
}

/// Decision returned by a transaction callback.
#[derive(Debug, Clone, PartialEq)]
pub enum TxOutcome {
    /// Write this value (`Value::Null` removes the node).
    Commit(Value),
    /// Leave the node untouched.
    Abort,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TxResult {
    pub committed: bool,
    /// Written value on commit, the value the callback last saw on abort.
    pub snapshot: Option<Value>,
}

/// Callback handed to [`TreeStore::transaction`]. It is invoked once per
/// attempt with the current value and must not depend on anything read
/// outside of its argument.
pub type TxFn<'a> = &'a (dyn Fn(Option<Value>) -> TxOutcome + Send + Sync);

#[async_trait]
pub trait TreeStore: Send + Sync {
    async fn get(&self, path: &NodePath) -> Result<Option<Value>, StoreError>;

    async fn set(&self, path: &NodePath, value: Value) -> Result<(), StoreError>;

    /// Shallow merge: each key of `children` replaces that child; `null` removes it.
    async fn update(&self, path: &NodePath, children: Map<String, Value>) -> Result<(), StoreError>;

    async fn remove(&self, path: &NodePath) -> Result<(), StoreError> {
        self.set(path, Value::Null).await
    }

    async fn transaction(&self, path: &NodePath, apply: TxFn<'_>) -> Result<TxResult, StoreError>;

    /// Feed of paths written through this store instance.
    fn subscribe(&self) -> broadcast::Receiver<NodePath>;
}

/// Convenience for typed reads.
pub async fn get_as<T: serde::de::DeserializeOwned>(
    store: &dyn TreeStore,
    path: &NodePath,
) -> Result<Option<T>, StoreError> {
    match store.get(path).await? {
        Some(v) => Ok(Some(serde_json::from_value(v)?)),
        None => Ok(None),
    }
}
