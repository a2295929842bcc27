//! Generic, disk-backed key/value cache with optional per-entry TTL.
//!
//! Grounded on `original_source/cache/cache.go`: two logical tables, one for
//! values and one mapping expiry to key, with a periodic sweep deleting
//! expired entries from both. The original backs this with `bbolt`; nothing
//! in this corpus uses `bbolt` or another embedded key/value store, so this
//! reimplements it over `rusqlite` (bundled SQLite), the same way
//! `rust-lang-cargo` reaches for `rusqlite` as its local persistent index.
//! Value encoding uses `bincode`, the way `wasmtime-environ` encodes its own
//! compilation cache entries, with a 1-byte schema version prefix so the
//! on-disk format can change without silently misreading old entries.

use std::marker::PhantomData;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::CoreError;

const SCHEMA_VERSION: u8 = 1;
const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Types usable as cache keys must reduce to a stable byte fingerprint.
pub trait CacheKey {
    fn hash(&self) -> Vec<u8>;
}

/// A disk-backed `K -> V` cache with optional TTL eviction.
///
/// Writers are serialized through the connection's internal mutex; reads go
/// through the same connection since SQLite already serializes access per
/// connection, matching the "writers serialized, concurrent readers" shape
/// the teacher's queue and the upstream bbolt cache both assume.
pub struct Kv<K, V> {
    conn: Arc<Mutex<Connection>>,
    shutdown: Arc<Notify>,
    sweep: Option<JoinHandle<()>>,
    _key: PhantomData<K>,
    _value: PhantomData<V>,
}

impl<K, V> Kv<K, V>
where
    K: CacheKey + Send + Sync + 'static,
    V: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    pub fn open(path: impl AsRef<Path>) -> Result<Self, CoreError> {
        Self::open_with_sweep_interval(path, DEFAULT_SWEEP_INTERVAL)
    }

    pub fn open_with_sweep_interval(
        path: impl AsRef<Path>,
        sweep_interval: Duration,
    ) -> Result<Self, CoreError> {
        let conn = Connection::open(path.as_ref())
            .map_err(|e| CoreError::Cache(format!("open cache file: {e}")))?;
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(|e| CoreError::Cache(format!("enable WAL: {e}")))?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS data (data_key BLOB PRIMARY KEY, value BLOB NOT NULL);
             CREATE TABLE IF NOT EXISTS ttl (expiry INTEGER NOT NULL, data_key BLOB NOT NULL, \
             PRIMARY KEY (expiry, data_key));",
        )
        .map_err(|e| CoreError::Cache(format!("create tables: {e}")))?;

        let conn = Arc::new(Mutex::new(conn));
        let shutdown = Arc::new(Notify::new());
        let sweep = Some(spawn_sweep(conn.clone(), shutdown.clone(), sweep_interval));

        Ok(Kv {
            conn,
            shutdown,
            sweep,
            _key: PhantomData,
            _value: PhantomData,
        })
    }

    pub async fn get(&self, key: &K) -> Result<Option<V>, CoreError> {
        let conn = self.conn.clone();
        let hash = key.hash();
        let raw: Option<Vec<u8>> = tokio::task::spawn_blocking(move || -> Result<_, CoreError> {
            let conn = conn.lock().expect("cache connection poisoned");
            conn.query_row(
                "SELECT value FROM data WHERE data_key = ?1",
                params![hash],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| CoreError::Cache(format!("get: {e}")))
        })
        .await
        .map_err(|e| CoreError::Cache(format!("get task: {e}")))??;

        raw.map(|bytes| decode_value(&bytes)).transpose()
    }

    pub async fn set(&self, key: &K, value: &V, ttl: Option<Duration>) -> Result<(), CoreError> {
        let conn = self.conn.clone();
        let hash = key.hash();
        let encoded = encode_value(value)?;
        let expiry = ttl.map(|d| chrono::Utc::now().timestamp() + d.as_secs() as i64);

        tokio::task::spawn_blocking(move || -> Result<(), CoreError> {
            let mut conn = conn.lock().expect("cache connection poisoned");
            let tx = conn
                .transaction()
                .map_err(|e| CoreError::Cache(format!("begin set: {e}")))?;
            tx.execute(
                "INSERT INTO data (data_key, value) VALUES (?1, ?2) \
                 ON CONFLICT(data_key) DO UPDATE SET value = excluded.value",
                params![hash, encoded],
            )
            .map_err(|e| CoreError::Cache(format!("set value: {e}")))?;
            if let Some(expiry) = expiry {
                tx.execute(
                    "INSERT INTO ttl (expiry, data_key) VALUES (?1, ?2)",
                    params![expiry, hash],
                )
                .map_err(|e| CoreError::Cache(format!("set ttl: {e}")))?;
            }
            tx.commit()
                .map_err(|e| CoreError::Cache(format!("commit set: {e}")))
        })
        .await
        .map_err(|e| CoreError::Cache(format!("set task: {e}")))?
    }

    /// Stops the background sweep task and waits for it to exit. The
    /// underlying connection is dropped with `self`.
    pub async fn close(mut self) {
        self.shutdown.notify_one();
        if let Some(handle) = self.sweep.take() {
            let _ = handle.await;
        }
    }
}

fn encode_value<V: Serialize>(value: &V) -> Result<Vec<u8>, CoreError> {
    let mut out = Vec::with_capacity(64);
    out.push(SCHEMA_VERSION);
    bincode::serialize_into(&mut out, value)
        .map_err(|e| CoreError::Cache(format!("encode value: {e}")))?;
    Ok(out)
}

fn decode_value<V: DeserializeOwned>(bytes: &[u8]) -> Result<V, CoreError> {
    let Some((&version, rest)) = bytes.split_first() else {
        return Err(CoreError::Cache("empty cache entry".to_string()));
    };
    if version != SCHEMA_VERSION {
        return Err(CoreError::Cache(format!(
            "unsupported cache entry schema version {version}"
        )));
    }
    bincode::deserialize(rest).map_err(|e| CoreError::Cache(format!("decode value: {e}")))
}

fn spawn_sweep(
    conn: Arc<Mutex<Connection>>,
    shutdown: Arc<Notify>,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await; // first tick fires immediately, skip it
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let conn = conn.clone();
                    let result = tokio::task::spawn_blocking(move || sweep_expired(&conn)).await;
                    match result {
                        Ok(Err(e)) => warn!(error = %e, "cache sweep failed"),
                        Err(e) => warn!(error = %e, "cache sweep task panicked"),
                        Ok(Ok(removed)) if removed > 0 => debug!(removed, "cache sweep removed expired entries"),
                        Ok(Ok(_)) => {}
                    }
                }
                _ = shutdown.notified() => break,
            }
        }
    })
}

fn sweep_expired(conn: &Mutex<Connection>) -> Result<usize, CoreError> {
    let now = chrono::Utc::now().timestamp();
    let mut conn = conn.lock().expect("cache connection poisoned");
    let tx = conn
        .transaction()
        .map_err(|e| CoreError::Cache(format!("begin sweep: {e}")))?;
    let expired_keys: Vec<Vec<u8>> = {
        let mut stmt = tx
            .prepare("SELECT data_key FROM ttl WHERE expiry <= ?1")
            .map_err(|e| CoreError::Cache(format!("prepare sweep: {e}")))?;
        let rows = stmt
            .query_map(params![now], |row| row.get(0))
            .map_err(|e| CoreError::Cache(format!("query sweep: {e}")))?;
        rows.collect::<Result<_, _>>()
            .map_err(|e| CoreError::Cache(format!("collect sweep rows: {e}")))?
    };
    for key in &expired_keys {
        tx.execute("DELETE FROM data WHERE data_key = ?1", params![key])
            .map_err(|e| CoreError::Cache(format!("sweep delete value: {e}")))?;
    }
    tx.execute("DELETE FROM ttl WHERE expiry <= ?1", params![now])
        .map_err(|e| CoreError::Cache(format!("sweep delete ttl: {e}")))?;
    tx.commit()
        .map_err(|e| CoreError::Cache(format!("commit sweep: {e}")))?;
    Ok(expired_keys.len())
}
