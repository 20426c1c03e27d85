//! Persistent content cache and the concurrent miss resolver.
//!
//! [`ContentCache::get_or_calc`] is the heart of every crawl: cache hits are
//! answered from storage, misses are computed on the shared [`WorkerPool`]
//! under one batch deadline, and whatever was stored by the end of the batch
//! is returned in input order. A key that fails, times out or is deferred
//! stays a miss, so the next crawl simply tries it again.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::task::{self, JoinSet};
use tokio::time::{Instant, timeout_at};
use tracing::{Instrument, debug, debug_span, info, instrument, warn};

use centipede_shared::{CentipedeError, Result};
use centipede_storage::Storage;

use crate::pool::WorkerPool;

/// Per-key outcome report of one [`ContentCache::resolve`] call.
#[derive(Debug)]
pub struct Resolution<V> {
    /// One slot per input key, in input order.
    pub values: Vec<Option<V>>,
    /// Keys computed and stored by this call.
    pub stored: Vec<String>,
    /// Keys whose compute failed (or whose result could not be stored).
    pub failed: Vec<String>,
    /// Keys whose compute asked not to be cached yet.
    pub deferred: Vec<String>,
    /// Keys still unresolved when the batch deadline passed.
    pub timed_out: Vec<String>,
}

impl<V> Resolution<V> {
    fn with_capacity(n: usize) -> Self {
        Self {
            values: Vec::with_capacity(n),
            stored: Vec::new(),
            failed: Vec::new(),
            deferred: Vec::new(),
            timed_out: Vec::new(),
        }
    }
}

/// Key/value cache over one storage namespace.
#[derive(Clone)]
pub struct ContentCache {
    storage: Arc<Storage>,
    namespace: String,
    pool: WorkerPool,
    deadline: Duration,
}

impl ContentCache {
    pub fn new(
        storage: Arc<Storage>,
        namespace: impl Into<String>,
        pool: WorkerPool,
        deadline: Duration,
    ) -> Self {
        Self {
            storage,
            namespace: namespace.into(),
            pool,
            deadline,
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    /// Point lookup.
    pub async fn get<V: DeserializeOwned>(&self, key: &str) -> Result<Option<V>> {
        let Some(raw) = self.storage.get(&self.namespace, key).await? else {
            return Ok(None);
        };
        serde_json::from_str(&raw).map(Some).map_err(|e| {
            CentipedeError::Serialization(format!("cached value for '{key}' is unreadable: {e}"))
        })
    }

    /// Persist one value. An existing record for `key` is overwritten.
    pub async fn store<V: Serialize>(&self, key: &str, value: &V) -> Result<()> {
        let raw = serde_json::to_string(value)
            .map_err(|e| CentipedeError::Serialization(e.to_string()))?;
        self.storage.put(&self.namespace, key, &raw).await
    }

    /// Number of records in this cache's namespace.
    pub async fn len(&self) -> Result<u64> {
        self.storage.count(&self.namespace).await
    }

    /// Resolve `(key, argument)` pairs, computing and storing the misses.
    ///
    /// `compute` is called once per miss; the future it returns runs on the
    /// worker pool. Tasks still unfinished when the batch deadline passes are
    /// aborted. Keys must be unique.
    #[instrument(skip_all, fields(namespace = %self.namespace, keys = items.len()))]
    pub async fn resolve<A, V, F, Fut>(
        &self,
        items: Vec<(String, A)>,
        compute: F,
    ) -> Result<Resolution<V>>
    where
        V: Serialize + DeserializeOwned + Send + 'static,
        F: Fn(String, A) -> Fut,
        Fut: Future<Output = Result<V>> + Send + 'static,
    {
        let keys: Vec<String> = items.iter().map(|(key, _)| key.clone()).collect();
        let mut unique = HashSet::with_capacity(keys.len());
        if let Some(dup) = keys.iter().find(|key| !unique.insert(key.as_str())) {
            return Err(CentipedeError::validation(format!(
                "duplicate cache key '{dup}' in one batch"
            )));
        }

        let mut report = Resolution::with_capacity(keys.len());
        let mut misses = Vec::new();
        let mut set = JoinSet::new();
        let mut task_keys: HashMap<task::Id, String> = HashMap::new();

        for (key, arg) in items {
            // A record that no longer reads as `V` is a miss; the compute
            // overwrites it.
            match self.get::<V>(&key).await {
                Ok(Some(_)) => continue,
                Ok(None) => {}
                Err(e @ CentipedeError::Serialization(_)) => {
                    warn!(key = %key, error = %e, "recomputing unreadable cache record");
                }
                Err(e) => return Err(e),
            }
            let task = compute(key.clone(), arg);
            let span = debug_span!("compute", key = %key);
            let task_key = key.clone();
            let handle = self.pool.spawn_into(&mut set, async move {
                (task_key, task.instrument(span).await)
            });
            task_keys.insert(handle.id(), key.clone());
            misses.push(key);
        }

        debug!(hits = keys.len() - misses.len(), misses = misses.len(), "partitioned batch");

        let mut pending: HashSet<String> = misses.iter().cloned().collect();
        let deadline = Instant::now() + self.deadline;

        loop {
            match timeout_at(deadline, set.join_next()).await {
                Ok(Some(Ok((key, outcome)))) => {
                    pending.remove(&key);
                    self.settle(key, outcome, &mut report).await;
                }
                Ok(Some(Err(e))) => {
                    if let Some(key) = task_keys.remove(&e.id()) {
                        warn!(key = %key, error = %e, "compute task did not complete");
                        pending.remove(&key);
                        report.failed.push(key);
                    }
                }
                Ok(None) => break,
                Err(_) => {
                    set.abort_all();
                    let deadline_ms = self.deadline.as_millis();
                    for key in misses.iter().filter(|k| pending.contains(*k)) {
                        let err = CentipedeError::BatchTimeout {
                            key: key.clone(),
                            deadline_ms,
                        };
                        warn!(error = %err, "abandoning unfinished compute");
                        report.timed_out.push(key.clone());
                    }
                    pending.clear();
                    break;
                }
            }
        }

        for key in &keys {
            let value = match self.get(key).await {
                Ok(value) => value,
                Err(e @ CentipedeError::Serialization(_)) => {
                    warn!(key = %key, error = %e, "ignoring unreadable cache record");
                    None
                }
                Err(e) => return Err(e),
            };
            report.values.push(value);
        }

        info!(
            stored = report.stored.len(),
            failed = report.failed.len(),
            deferred = report.deferred.len(),
            timed_out = report.timed_out.len(),
            "batch resolved"
        );
        Ok(report)
    }

    /// Record the outcome of one finished compute.
    async fn settle<V: Serialize>(
        &self,
        key: String,
        outcome: Result<V>,
        report: &mut Resolution<V>,
    ) {
        match outcome {
            Ok(value) => match self.store_non_empty(&key, &value).await {
                Ok(true) => report.stored.push(key),
                Ok(false) => debug!(key = %key, "computed an empty value, not storing"),
                Err(e) => {
                    warn!(key = %key, error = %e, "failed to store computed value");
                    report.failed.push(key);
                }
            },
            Err(e) if e.is_do_not_cache() => {
                debug!(key = %key, reason = %e, "deferred");
                report.deferred.push(key);
            }
            Err(e) => {
                warn!(key = %key, error = %e, "compute failed");
                report.failed.push(key);
            }
        }
    }

    /// Store `value` unless it serializes to an empty JSON value.
    async fn store_non_empty<V: Serialize>(&self, key: &str, value: &V) -> Result<bool> {
        let json = serde_json::to_value(value)
            .map_err(|e| CentipedeError::Serialization(e.to_string()))?;
        if is_empty(&json) {
            return Ok(false);
        }
        self.storage
            .put(&self.namespace, key, &json.to_string())
            .await?;
        Ok(true)
    }

    /// Values for `items` in input order; absent where unresolved.
    pub async fn get_or_calc<A, V, F, Fut>(
        &self,
        items: Vec<(String, A)>,
        compute: F,
    ) -> Result<Vec<Option<V>>>
    where
        V: Serialize + DeserializeOwned + Send + 'static,
        F: Fn(String, A) -> Fut,
        Fut: Future<Output = Result<V>> + Send + 'static,
    {
        Ok(self.resolve(items, compute).await?.values)
    }

    /// [`get_or_calc`](Self::get_or_calc) for computes that need only the key.
    pub async fn get_or_calc_keys<V, F, Fut>(
        &self,
        keys: Vec<String>,
        compute: F,
    ) -> Result<Vec<Option<V>>>
    where
        V: Serialize + DeserializeOwned + Send + 'static,
        F: Fn(String) -> Fut,
        Fut: Future<Output = Result<V>> + Send + 'static,
    {
        let items = keys.into_iter().map(|key| (key, ())).collect();
        self.get_or_calc(items, |key, ()| compute(key)).await
    }
}

fn is_empty(value: &serde_json::Value) -> bool {
    use serde_json::Value;
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        Value::Bool(_) | Value::Number(_) => false,
    }
}
