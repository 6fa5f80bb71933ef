use anyhow::Context;
use async_trait::async_trait;
use serde_json::{Map, Value};
use sqlx::PgPool;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use super::{tree, NodePath, StoreError, TreeStore, TxFn, TxOutcome, TxResult};

/// Top-level keys whose children are stored as separate documents.
const COLLECTIONS: &[&str] = &["users", "accounts", "accountEmails"];

/// Tree store backed by one `tree_nodes` row per document. Writes are
/// optimistic: a row is only replaced if its `version` still matches the
/// version that was read.
pub struct PgTreeStore {
    db: PgPool,
    changes: broadcast::Sender<NodePath>,
    max_retries: u32,
}

/// Where a path lands in the row layout.
#[derive(Debug, PartialEq)]
enum Location<'a> {
    /// Inside (or at) a single document row.
    Document { key: String, inner: &'a [String] },
    /// At a collection root, spanning many rows.
    Collection { prefix: String },
}

fn locate(path: &NodePath) -> Result<Location<'_>, StoreError> {
    let segs = path.segments();
    let Some(first) = segs.first() else {
        return Err(StoreError::Unsupported(path.clone()));
    };
    if COLLECTIONS.contains(&first.as_str()) {
        if segs.len() == 1 {
            return Ok(Location::Collection {
                prefix: format!("{}/", first),
            });
        }
        return Ok(Location::Document {
            key: format!("{}/{}", first, segs[1]),
            inner: &segs[2..],
        });
    }
    Ok(Location::Document {
        key: first.clone(),
        inner: &segs[1..],
    })
}

impl PgTreeStore {
    pub fn new(db: PgPool, max_retries: u32) -> Self {
        let (changes, _) = broadcast::channel(256);
        Self {
            db,
            changes,
            max_retries: max_retries.max(1),
        }
    }

    async fn read_doc(&self, key: &str) -> Result<Option<(Value, i64)>, StoreError> {
        let row = sqlx::query_as::<_, (Value, i64)>(
            r#"SELECT body, version FROM tree_nodes WHERE doc_key = $1"#,
        )
        .bind(key)
        .fetch_optional(&self.db)
        .await?;
        Ok(row)
    }

    /// Replace a document if it is still at `expected`; `None` means it must
    /// not exist yet. Returns false when another writer got there first.
    async fn write_doc(&self, key: &str, expected: Option<i64>, body: &Value) -> Result<bool, StoreError> {
        let affected = match (expected, body.is_null()) {
            (None, true) => return Ok(true),
            (None, false) => sqlx::query(
                r#"
                INSERT INTO tree_nodes (doc_key, body, version)
                VALUES ($1, $2, 1)
                ON CONFLICT (doc_key) DO NOTHING
                "#,
            )
            .bind(key)
            .bind(body)
            .execute(&self.db)
            .await?
            .rows_affected(),
            (Some(version), true) => {
                sqlx::query(r#"DELETE FROM tree_nodes WHERE doc_key = $1 AND version = $2"#)
                    .bind(key)
                    .bind(version)
                    .execute(&self.db)
                    .await?
                    .rows_affected()
            }
            (Some(version), false) => sqlx::query(
                r#"
                UPDATE tree_nodes
                   SET body = $2, version = version + 1, updated_at = now()
                 WHERE doc_key = $1 AND version = $3
                "#,
            )
            .bind(key)
            .bind(body)
            .bind(version)
            .execute(&self.db)
            .await?
            .rows_affected(),
        };
        Ok(affected == 1)
    }

    /// Optimistic read-modify-write of one document. `edit` receives the
    /// current value at `inner` and decides what to write there.
    async fn modify<F>(&self, path: &NodePath, edit: F) -> Result<TxResult, StoreError>
    where
        F: Fn(Option<Value>) -> TxOutcome + Send + Sync,
    {
        let (key, inner) = match locate(path)? {
            Location::Document { key, inner } => (key, inner),
            Location::Collection { .. } => return Err(StoreError::Unsupported(path.clone())),
        };

        for attempt in 1..=self.max_retries {
            let (mut body, version) = match self.read_doc(&key).await? {
                Some((body, version)) => (body, Some(version)),
                None => (Value::Null, None),
            };
            let current = tree::get_at(&body, inner).cloned();
            let next = match edit(current.clone()) {
                TxOutcome::Abort => {
                    return Ok(TxResult {
                        committed: false,
                        snapshot: current,
                    })
                }
                TxOutcome::Commit(next) => next,
            };
            tree::set_at(&mut body, inner, next);

            if self.write_doc(&key, version, &body).await? {
                let _ = self.changes.send(path.clone());
                return Ok(TxResult {
                    committed: true,
                    snapshot: tree::get_at(&body, inner).cloned(),
                });
            }
            debug!(%path, attempt, "document version moved; retrying");
        }
        warn!(%path, attempts = self.max_retries, "transaction retries exhausted");
        Err(StoreError::TooManyRetries {
            path: path.clone(),
            attempts: self.max_retries,
        })
    }
}

pub async fn connect(database_url: &str, max_retries: u32) -> anyhow::Result<PgTreeStore> {
    let db = sqlx::postgres::PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await
        .context("connect to database")?;

    if let Err(e) = sqlx::migrate!("./migrations").run(&db).await {
        warn!(error = %e, "migration failed; continuing");
    }
    Ok(PgTreeStore::new(db, max_retries))
}

#[async_trait]
impl TreeStore for PgTreeStore {
    async fn get(&self, path: &NodePath) -> Result<Option<Value>, StoreError> {
        match locate(path)? {
            Location::Document { key, inner } => Ok(self
                .read_doc(&key)
                .await?
                .and_then(|(body, _)| tree::get_at(&body, inner).cloned())),
            Location::Collection { prefix } => {
                let rows = sqlx::query_as::<_, (String, Value)>(
                    r#"
                    SELECT doc_key, body
                      FROM tree_nodes
                     WHERE left(doc_key, length($1)) = $1
                     ORDER BY doc_key
                    "#,
                )
                .bind(&prefix)
                .fetch_all(&self.db)
                .await?;
                let map: Map<String, Value> = rows
                    .into_iter()
                    .map(|(key, body)| (key[prefix.len()..].to_string(), body))
                    .collect();
                Ok((!map.is_empty()).then_some(Value::Object(map)))
            }
        }
    }

    async fn set(&self, path: &NodePath, value: Value) -> Result<(), StoreError> {
        self.modify(path, |_| TxOutcome::Commit(value.clone())).await?;
        Ok(())
    }

    async fn update(&self, path: &NodePath, children: Map<String, Value>) -> Result<(), StoreError> {
        self.modify(path, |current| {
            let mut node = current.unwrap_or(Value::Null);
            tree::merge_at(&mut node, &[], children.clone());
            TxOutcome::Commit(node)
        })
        .await?;
        Ok(())
    }

    async fn transaction(&self, path: &NodePath, apply: TxFn<'_>) -> Result<TxResult, StoreError> {
        self.modify(path, apply).await
    }

    fn subscribe(&self) -> broadcast::Receiver<NodePath> {
        self.changes.subscribe()
    }
}
