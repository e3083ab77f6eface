//! Cache layer that orchestrates caching logic with network fetching.

use chrono::{DateTime, Duration, Utc};
use serde::{de::DeserializeOwned, Serialize};
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, warn};

use super::storage::CacheStorage;
use super::traits::{CacheResult, QueryKey};

/// Cache layer that manages caching logic and network fetching.
///
/// Storage failures never reach the caller: a failed read is a miss and a
/// failed write is logged and dropped.
#[derive(Clone)]
pub struct CacheLayer {
  storage: Arc<dyn CacheStorage>,
  /// How long before cached data is considered stale
  stale_time: Duration,
}

impl CacheLayer {
  /// Create a new cache layer with the given storage backend.
  pub fn new(storage: impl CacheStorage + 'static) -> Self {
    Self {
      storage: Arc::new(storage),
      stale_time: Duration::minutes(5),
    }
  }

  /// Set the stale time for cached data.
  pub fn with_stale_time(mut self, stale_time: Duration) -> Self {
    self.stale_time = stale_time;
    self
  }

  /// Check if cached data is stale based on cached_at timestamp.
  fn is_stale(&self, cached_at: DateTime<Utc>) -> bool {
    Utc::now() - cached_at > self.stale_time
  }

  /// Fetch a value with cache-first strategy.
  ///
  /// 1. Check cache - if fresh, return immediately
  /// 2. If stale/missing, fetch from network
  /// 3. On network failure, return stale cache (offline mode)
  /// 4. Update cache with new data
  pub async fn fetch<K, T, E, F, Fut>(&self, key: &K, fetcher: F) -> Result<CacheResult<T>, E>
  where
    K: QueryKey,
    T: Serialize + DeserializeOwned,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
  {
    let hash = key.cache_hash();

    if let Some((cached, cached_at)) = self.read::<T>(&hash) {
      if !self.is_stale(cached_at) {
        debug!(key = %key.description(), "cache hit");
        return Ok(CacheResult::from_cache(cached, cached_at));
      }

      // Cache is stale, try to fetch from network
      return match fetcher().await {
        Ok(data) => {
          self.write(&hash, &key.description(), &data);
          Ok(CacheResult::from_network(data))
        }
        Err(_) => {
          warn!(key = %key.description(), "refresh failed, serving stale cache");
          Ok(CacheResult::offline(cached, cached_at))
        }
      };
    }

    // No cache, must fetch from network
    let data = fetcher().await?;
    self.write(&hash, &key.description(), &data);
    Ok(CacheResult::from_network(data))
  }

  /// Drop every cached entry.
  pub fn clear(&self) -> color_eyre::Result<()> {
    self.storage.clear()
  }

  fn read<T: DeserializeOwned>(&self, hash: &str) -> Option<(T, DateTime<Utc>)> {
    let blob = match self.storage.get(hash) {
      Ok(blob) => blob?,
      Err(e) => {
        warn!(error = %e, "cache read failed");
        return None;
      }
    };

    match serde_json::from_slice(&blob.data) {
      Ok(value) => Some((value, blob.cached_at)),
      Err(e) => {
        warn!(error = %e, "discarding undecodable cache entry");
        None
      }
    }
  }

  fn write<T: Serialize>(&self, hash: &str, description: &str, value: &T) {
    let data = match serde_json::to_vec(value) {
      Ok(data) => data,
      Err(e) => {
        warn!(error = %e, "failed to serialize cache entry");
        return;
      }
    };

    if let Err(e) = self.storage.put(hash, description, &data) {
      warn!(error = %e, "cache write failed");
    }
  }
}

#[cfg(test)]
mod tests {
  use super::super::storage::{MemoryStorage, NoopStorage};
  use super::super::traits::CacheSource;
  use super::*;
  use std::sync::atomic::{AtomicU32, Ordering};

  struct Key(&'static str);

  impl QueryKey for Key {
    fn cache_hash(&self) -> String {
      self.0.to_string()
    }

    fn description(&self) -> String {
      self.0.to_string()
    }
  }

  #[tokio::test]
  async fn test_miss_then_hit() {
    let cache = CacheLayer::new(MemoryStorage::new());
    let calls = AtomicU32::new(0);

    for _ in 0..2 {
      let result = cache
        .fetch(&Key("statuses"), || async {
          calls.fetch_add(1, Ordering::SeqCst);
          Ok::<_, String>(vec!["open".to_string()])
        })
        .await
        .unwrap();
      assert_eq!(result.data, vec!["open".to_string()]);
    }

    assert_eq!(calls.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn test_fresh_hit_reports_cache_source() {
    let cache = CacheLayer::new(MemoryStorage::new());
    cache
      .fetch(&Key("k"), || async { Ok::<_, String>(1u32) })
      .await
      .unwrap();
    let result = cache
      .fetch(&Key("k"), || async { Ok::<_, String>(2u32) })
      .await
      .unwrap();
    assert_eq!(result.data, 1);
    assert_eq!(result.source, CacheSource::CacheFresh);
    assert!(result.cached_at.is_some());
  }

  #[tokio::test]
  async fn test_stale_entry_is_refreshed() {
    let storage = MemoryStorage::new();
    storage.insert_at("k", b"1", Utc::now() - Duration::hours(2));
    let cache = CacheLayer::new(storage).with_stale_time(Duration::hours(1));

    let result = cache
      .fetch(&Key("k"), || async { Ok::<_, String>(2u32) })
      .await
      .unwrap();
    assert_eq!(result.data, 2);
    assert_eq!(result.source, CacheSource::Network);

    let again = cache
      .fetch(&Key("k"), || async { Err::<u32, _>("offline".to_string()) })
      .await
      .unwrap();
    assert_eq!(again.data, 2);
    assert_eq!(again.source, CacheSource::CacheFresh);
  }

  #[tokio::test]
  async fn test_stale_entry_served_when_offline() {
    let storage = MemoryStorage::new();
    storage.insert_at("k", b"1", Utc::now() - Duration::hours(2));
    let cache = CacheLayer::new(storage).with_stale_time(Duration::hours(1));

    let result = cache
      .fetch(&Key("k"), || async { Err::<u32, _>("offline".to_string()) })
      .await
      .unwrap();
    assert_eq!(result.data, 1);
    assert_eq!(result.source, CacheSource::Offline);
  }

  #[tokio::test]
  async fn test_miss_propagates_fetch_error() {
    let cache = CacheLayer::new(MemoryStorage::new());
    let err = cache
      .fetch(&Key("k"), || async { Err::<u32, _>("boom".to_string()) })
      .await
      .unwrap_err();
    assert_eq!(err, "boom");
  }

  #[tokio::test]
  async fn test_undecodable_entry_is_a_miss() {
    let storage = MemoryStorage::new();
    storage.insert_at("k", b"not json", Utc::now());
    let cache = CacheLayer::new(storage);

    let result = cache
      .fetch(&Key("k"), || async { Ok::<_, String>(7u32) })
      .await
      .unwrap();
    assert_eq!(result.data, 7);
  }

  #[tokio::test]
  async fn test_noop_storage_always_fetches() {
    let cache = CacheLayer::new(NoopStorage);
    let calls = AtomicU32::new(0);
    for _ in 0..3 {
      cache
        .fetch(&Key("k"), || async {
          calls.fetch_add(1, Ordering::SeqCst);
          Ok::<_, String>(())
        })
        .await
        .unwrap();
    }
    assert_eq!(calls.load(Ordering::SeqCst), 3);
  }

  #[tokio::test]
  async fn test_clear() {
    let cache = CacheLayer::new(MemoryStorage::new());
    cache
      .fetch(&Key("k"), || async { Ok::<_, String>(1u32) })
      .await
      .unwrap();
    cache.clear().unwrap();
    let result = cache
      .fetch(&Key("k"), || async { Ok::<_, String>(2u32) })
      .await
      .unwrap();
    assert_eq!(result.data, 2);
  }
}
