//! TTL cache entry for one remote resource
//!
//! Each account tracks a fixed set of named datasets (profile, liked
//! songs, playlists, devices, categories). A dataset holds the raw
//! payload from its last refresh plus an expiry stamp; reads serve the
//! cached payload while fresh and refetch otherwise. Refreshes replace
//! the whole slot in one swap, so a reader never observes a partially
//! written payload.

use parking_lot::Mutex;
use serde_json::Value;
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::api::ApiError;

struct Slot {
    data: Value,
    expires_at: Instant,
}

/// A named, TTL-expiring cache entry
pub struct Dataset {
    name: &'static str,
    ttl: Duration,
    slot: Mutex<Option<Slot>>,
}

impl Dataset {
    pub fn new(name: &'static str, ttl: Duration) -> Self {
        Self {
            name,
            ttl,
            slot: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Cached payload regardless of freshness, None before first fetch
    pub fn data(&self) -> Option<Value> {
        self.slot.lock().as_ref().map(|slot| slot.data.clone())
    }

    /// Cached payload only while unexpired
    pub fn fresh_data(&self) -> Option<Value> {
        let slot = self.slot.lock();
        match slot.as_ref() {
            Some(slot) if Instant::now() < slot.expires_at => Some(slot.data.clone()),
            _ => None,
        }
    }

    /// True when empty or past the expiry stamp
    pub fn is_expired(&self) -> bool {
        let slot = self.slot.lock();
        match slot.as_ref() {
            Some(slot) => Instant::now() >= slot.expires_at,
            None => true,
        }
    }

    /// Replace the payload and restart the TTL clock
    pub fn update(&self, data: Value) {
        let mut slot = self.slot.lock();
        *slot = Some(Slot {
            data,
            expires_at: Instant::now() + self.ttl,
        });
    }

    /// Read the dataset, refetching through `fetch` when forced, empty,
    /// or expired. The caller serializes overlapping force-refreshes of
    /// the same dataset.
    pub async fn read<F, Fut>(&self, force: bool, fetch: F) -> Result<Value, ApiError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Value, ApiError>>,
    {
        if !force {
            if let Some(data) = self.fresh_data() {
                debug!("using cached `{}` dataset", self.name);
                return Ok(data);
            }
        }

        debug!("refreshing `{}` dataset", self.name);
        let data = fetch().await?;
        self.update(data.clone());
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_read_fetches_once_within_ttl() {
        let dataset = Dataset::new("test", Duration::from_secs(60));
        let fetches = AtomicU32::new(0);

        for _ in 0..2 {
            let data = dataset
                .read(false, || {
                    fetches.fetch_add(1, Ordering::SeqCst);
                    async { Ok(json!([1, 2, 3])) }
                })
                .await
                .unwrap();
            assert_eq!(data, json!([1, 2, 3]));
        }

        assert_eq!(fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_read_force_always_fetches() {
        let dataset = Dataset::new("test", Duration::from_secs(60));
        let fetches = AtomicU32::new(0);

        for _ in 0..3 {
            dataset
                .read(true, || {
                    fetches.fetch_add(1, Ordering::SeqCst);
                    async { Ok(json!("fresh")) }
                })
                .await
                .unwrap();
        }

        assert_eq!(fetches.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_read_refetches_after_expiry() {
        let dataset = Dataset::new("test", Duration::ZERO);
        let fetches = AtomicU32::new(0);

        for _ in 0..2 {
            dataset
                .read(false, || {
                    fetches.fetch_add(1, Ordering::SeqCst);
                    async { Ok(json!({})) }
                })
                .await
                .unwrap();
        }

        assert_eq!(fetches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failed_fetch_leaves_previous_data() {
        let dataset = Dataset::new("test", Duration::from_secs(60));

        dataset
            .read(false, || async { Ok(json!(["kept"])) })
            .await
            .unwrap();

        let result = dataset
            .read(true, || async {
                Err(ApiError::InvalidResponse("boom".to_string()))
            })
            .await;

        assert!(result.is_err());
        assert_eq!(dataset.data(), Some(json!(["kept"])));
    }

    #[test]
    fn test_empty_dataset_is_expired() {
        let dataset = Dataset::new("test", Duration::from_secs(60));
        assert!(dataset.is_expired());
        assert!(dataset.data().is_none());

        dataset.update(json!(1));
        assert!(!dataset.is_expired());
        assert_eq!(dataset.data(), Some(json!(1)));
    }
}
