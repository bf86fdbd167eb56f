//! File-backed, TTL-aware memoization for WHOIS and threat-intel results.
//!
//! Entries live one-per-file under
//! `<cache_dir>/<namespace>/<sha256[0:2]>/<sha256>.entry` and are written
//! with a temp-file-then-rename so readers never observe a torn entry.
//! TTLs are enforced on read; an expired entry is deleted on the spot.
//! Concurrent fetches of the same key collapse into a single flight.

use std::collections::HashMap;
use std::fs;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::scan::errors::CacheIoError;

/// On-disk shape of one entry. Self-contained: the TTL travels with the
/// payload so a reader needs no out-of-band state.
#[derive(Serialize, Deserialize)]
struct Envelope {
    created_at: i64,
    ttl_seconds: u64,
    payload: serde_json::Value,
}

/// Counters exposed for the end-of-scan summary.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub writes: u64,
    pub evictions: u64,
}

pub struct FileCache {
    root: PathBuf,
    hits: AtomicU64,
    misses: AtomicU64,
    writes: AtomicU64,
    evictions: AtomicU64,
    flights: tokio::sync::Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl FileCache {
    pub fn new(root: impl Into<PathBuf>) -> FileCache {
        FileCache {
            root: root.into(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            writes: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            flights: tokio::sync::Mutex::new(HashMap::new()),
        }
    }

    fn entry_path(&self, namespace: &str, key: &str) -> PathBuf {
        let digest = hex::encode(Sha256::digest(key.as_bytes()));
        self.root
            .join(namespace)
            .join(&digest[..2])
            .join(format!("{}.entry", digest))
    }

    /// Fetch `key` from `namespace`. `Ok(None)` is a miss (absent or
    /// expired); `Err` means the cache itself misbehaved and the caller
    /// should fall back to a direct fetch.
    pub fn get<T: DeserializeOwned>(
        &self,
        namespace: &str,
        key: &str,
    ) -> Result<Option<T>, CacheIoError> {
        let path = self.entry_path(namespace, key);
        let raw = match fs::read(&path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                return Ok(None);
            }
            Err(err) => return Err(err.into()),
        };

        let envelope: Envelope = serde_json::from_slice(&raw)?;
        let age = Utc::now().timestamp() - envelope.created_at;
        if age < 0 || age as u64 > envelope.ttl_seconds {
            let _ = fs::remove_file(&path);
            self.evictions.fetch_add(1, Ordering::Relaxed);
            self.misses.fetch_add(1, Ordering::Relaxed);
            return Ok(None);
        }

        let value = serde_json::from_value(envelope.payload)?;
        self.hits.fetch_add(1, Ordering::Relaxed);
        Ok(Some(value))
    }

    /// Store `value` under `(namespace, key)` for `ttl_seconds`.
    pub fn put<T: Serialize>(
        &self,
        namespace: &str,
        key: &str,
        value: &T,
        ttl_seconds: u64,
    ) -> Result<(), CacheIoError> {
        let path = self.entry_path(namespace, key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let envelope = Envelope {
            created_at: Utc::now().timestamp(),
            ttl_seconds,
            payload: serde_json::to_value(value)?,
        };

        let tmp = path.with_extension(format!("tmp.{}", std::process::id()));
        fs::write(&tmp, serde_json::to_vec(&envelope)?)?;
        fs::rename(&tmp, &path)?;
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Walk the cache root and delete every expired entry. Returns the
    /// number of entries removed.
    pub fn clear_expired(&self) -> Result<u64, CacheIoError> {
        let mut removed = 0;
        let now = Utc::now().timestamp();
        for entry in walk_entries(&self.root)? {
            let expired = match fs::read(&entry)
                .ok()
                .and_then(|raw| serde_json::from_slice::<Envelope>(&raw).ok())
            {
                Some(envelope) => {
                    let age = now - envelope.created_at;
                    age < 0 || age as u64 > envelope.ttl_seconds
                }
                // unreadable entries are garbage, collect them too
                None => true,
            };
            if expired && fs::remove_file(&entry).is_ok() {
                removed += 1;
            }
        }
        self.evictions.fetch_add(removed, Ordering::Relaxed);
        Ok(removed)
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }

    /// Read-through fetch with per-key single-flight.
    ///
    /// `fetch` is invoked only on a miss and only once per key no matter
    /// how many tasks race here; it returns the value together with the
    /// TTL to store it under, or `None` to cache nothing. Cache I/O
    /// errors degrade to a direct fetch with a warning.
    pub async fn get_or_fetch<T, F, Fut>(
        &self,
        namespace: &str,
        key: &str,
        fetch: F,
    ) -> Option<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Option<(T, u64)>>,
    {
        match self.get::<T>(namespace, key) {
            Ok(Some(value)) => return Some(value),
            Ok(None) => {}
            Err(err) => log::warn!("cache read for {}:{} failed: {}", namespace, key, err),
        }

        let flight_key = format!("{}/{}", namespace, key);
        let flight = {
            let mut flights = self.flights.lock().await;
            flights
                .entry(flight_key.clone())
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
                .clone()
        };

        let value = {
            let _guard = flight.lock().await;
            // a concurrent flight may have filled the entry while we waited
            match self.get::<T>(namespace, key) {
                Ok(Some(value)) => Some(value),
                _ => {
                    let fetched = fetch().await;
                    if let Some((ref value, ttl)) = fetched {
                        if let Err(err) = self.put(namespace, key, value, ttl) {
                            log::warn!(
                                "cache write for {}:{} failed: {}",
                                namespace,
                                key,
                                err
                            );
                        }
                    }
                    fetched.map(|(value, _)| value)
                }
            }
        };

        let mut flights = self.flights.lock().await;
        if let Some(entry) = flights.get(&flight_key) {
            // ours plus the map's reference: nobody else is in flight
            if Arc::strong_count(entry) <= 2 {
                flights.remove(&flight_key);
            }
        }

        value
    }
}

fn walk_entries(root: &Path) -> Result<Vec<PathBuf>, CacheIoError> {
    let mut found = Vec::new();
    if !root.exists() {
        return Ok(found);
    }
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.is_dir() {
                stack.push(path);
            } else if path.extension().map_or(false, |ext| ext == "entry") {
                found.push(path);
            }
        }
    }
    Ok(found)
}
