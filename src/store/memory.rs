use std::sync::RwLock;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use super::{tree, NodePath, StoreError, TreeStore, TxFn, TxOutcome, TxResult, DEFAULT_MAX_RETRIES};

/// Process-local tree. The lock is never held across an await or while a
/// transaction callback runs.
pub struct MemoryStore {
    root: RwLock<Value>,
    changes: broadcast::Sender<NodePath>,
    max_retries: u32,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_RETRIES)
    }
}

impl MemoryStore {
    pub fn new(max_retries: u32) -> Self {
        let (changes, _) = broadcast::channel(256);
        Self {
            root: RwLock::new(Value::Null),
            changes,
            max_retries: max_retries.max(1),
        }
    }

    fn read_node(&self, path: &NodePath) -> Result<Option<Value>, StoreError> {
        let root = self.root.read().map_err(|_| StoreError::Poisoned)?;
        Ok(tree::get_at(&root, path.segments()).cloned())
    }

    /// Synchronous write; safe to call from inside a transaction callback.
    pub(crate) fn write_node(&self, path: &NodePath, value: Value) -> Result<(), StoreError> {
        let mut root = self.root.write().map_err(|_| StoreError::Poisoned)?;
        tree::set_at(&mut root, path.segments(), value);
        drop(root);
        self.notify(path);
        Ok(())
    }

    fn notify(&self, path: &NodePath) {
        // no receivers is fine
        let _ = self.changes.send(path.clone());
    }
}

#[async_trait]
impl TreeStore for MemoryStore {
    async fn get(&self, path: &NodePath) -> Result<Option<Value>, StoreError> {
        self.read_node(path)
    }

    async fn set(&self, path: &NodePath, value: Value) -> Result<(), StoreError> {
        self.write_node(path, value)
    }

    async fn update(&self, path: &NodePath, children: Map<String, Value>) -> Result<(), StoreError> {
        let mut root = self.root.write().map_err(|_| StoreError::Poisoned)?;
        tree::merge_at(&mut root, path.segments(), children);
        drop(root);
        self.notify(path);
        Ok(())
    }

    async fn transaction(&self, path: &NodePath, apply: TxFn<'_>) -> Result<TxResult, StoreError> {
        for attempt in 1..=self.max_retries {
            let current = self.read_node(path)?;
            let next = match apply(current.clone()) {
                TxOutcome::Abort => {
                    debug!(%path, attempt, "transaction aborted by callback");
                    return Ok(TxResult {
                        committed: false,
                        snapshot: current,
                    });
                }
                TxOutcome::Commit(next) => next,
            };

            let mut root = self.root.write().map_err(|_| StoreError::Poisoned)?;
            if tree::get_at(&root, path.segments()) != current.as_ref() {
                drop(root);
                debug!(%path, attempt, "node changed since read; retrying");
                continue;
            }
            tree::set_at(&mut root, path.segments(), next);
            let snapshot = tree::get_at(&root, path.segments()).cloned();
            drop(root);
            self.notify(path);
            return Ok(TxResult {
                committed: true,
                snapshot,
            });
        }
        warn!(%path, attempts = self.max_retries, "transaction retries exhausted");
        Err(StoreError::TooManyRetries {
            path: path.clone(),
            attempts: self.max_retries,
        })
    }

    fn subscribe(&self) -> broadcast::Receiver<NodePath> {
        self.changes.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn p(raw: &str) -> NodePath {
        NodePath::parse(raw).unwrap()
    }

    #[tokio::test]
    async fn set_get_update_remove() {
        let store = MemoryStore::default();
        store
            .set(&p("/users/u1"), json!({"name": "Rahim", "balance": 0}))
            .await
            .unwrap();
        let mut patch = Map::new();
        patch.insert("status".into(), json!("blocked"));
        store.update(&p("/users/u1"), patch).await.unwrap();

        assert_eq!(
            store.get(&p("/users/u1")).await.unwrap(),
            Some(json!({"name": "Rahim", "balance": 0, "status": "blocked"}))
        );
        assert_eq!(store.get(&p("/users/u1/status")).await.unwrap(), Some(json!("blocked")));

        store.remove(&p("/users/u1")).await.unwrap();
        assert_eq!(store.get(&p("/users")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn abort_leaves_node_untouched() {
        let store = MemoryStore::default();
        store.set(&p("/counter"), json!(3)).await.unwrap();
        let res = store
            .transaction(&p("/counter"), &|_| TxOutcome::Abort)
            .await
            .unwrap();
        assert!(!res.committed);
        assert_eq!(res.snapshot, Some(json!(3)));
        assert_eq!(store.get(&p("/counter")).await.unwrap(), Some(json!(3)));
    }

    #[tokio::test]
    async fn conflicting_write_forces_a_retry_with_fresh_data() {
        let store = Arc::new(MemoryStore::default());
        store.set(&p("/users/u1/balance"), json!(100)).await.unwrap();

        let calls = AtomicU32::new(0);
        let inner = store.clone();
        let res = store
            .transaction(&p("/users/u1"), &|current| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                if n == 0 {
                    // another writer lands between our read and our write
                    inner.write_node(&p("/users/u1/balance"), json!(500)).unwrap();
                }
                let balance = current
                    .as_ref()
                    .and_then(|v| v.get("balance"))
                    .and_then(Value::as_f64)
                    .unwrap_or(0.0);
                TxOutcome::Commit(json!({"balance": balance + 1.0}))
            })
            .await
            .unwrap();

        assert!(res.committed);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(store.get(&p("/users/u1/balance")).await.unwrap(), Some(json!(501.0)));
    }

    #[tokio::test]
    async fn gives_up_after_max_retries() {
        let store = Arc::new(MemoryStore::new(3));
        let inner = store.clone();
        let calls = AtomicU32::new(0);
        let err = store
            .transaction(&p("/n"), &|_| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                inner.write_node(&p("/n"), json!(n)).unwrap();
                TxOutcome::Commit(json!("mine"))
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::TooManyRetries { attempts: 3, .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_increments_are_not_lost() {
        let store = Arc::new(MemoryStore::new(1_000));
        let mut handles = Vec::new();
        for _ in 0..32 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .transaction(&p("/counter"), &|cur| {
                        let n = cur.and_then(|v| v.as_i64()).unwrap_or(0);
                        TxOutcome::Commit(json!(n + 1))
                    })
                    .await
                    .unwrap()
            }));
        }
        for h in handles {
            assert!(h.await.unwrap().committed);
        }
        assert_eq!(store.get(&p("/counter")).await.unwrap(), Some(json!(32)));
    }

    #[tokio::test]
    async fn subscribers_see_written_paths() {
        let store = MemoryStore::default();
        let mut rx = store.subscribe();
        store.set(&p("/notice/text"), json!("Water off at 9")).await.unwrap();
        assert_eq!(rx.recv().await.unwrap(), p("/notice/text"));
    }
}
