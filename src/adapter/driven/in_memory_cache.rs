use crate::domain::model::{BookingId, EventId, EventStats};
use crate::domain::port::{CacheError, InventoryCache};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// プロセス内の在庫キャッシュ
/// Redisを使わないローカル実行とテストで使用する。
/// `set_available(false)` でキャッシュ障害を再現できる
pub struct InMemoryInventoryCache {
    remaining: Mutex<HashMap<EventId, i64>>,
    stats: Mutex<HashMap<EventId, EventStats>>,
    markers: Mutex<HashMap<BookingId, Instant>>,
    available: AtomicBool,
}

impl InMemoryInventoryCache {
    pub fn new() -> Self {
        Self {
            remaining: Mutex::new(HashMap::new()),
            stats: Mutex::new(HashMap::new()),
            markers: Mutex::new(HashMap::new()),
            available: AtomicBool::new(true),
        }
    }

    /// キャッシュの可用性を切り替える
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// 残席カウンタを削除する（キャッシュの欠落を再現する）
    pub async fn evict_remaining(&self, event_id: EventId) {
        self.remaining.lock().await.remove(&event_id);
    }

    fn ensure_available(&self) -> Result<(), CacheError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(CacheError::Unavailable(
                "in-memory cache is switched off".to_string(),
            ))
        }
    }
}

impl Default for InMemoryInventoryCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl InventoryCache for InMemoryInventoryCache {
    async fn set_remaining(&self, event_id: EventId, remaining: u32) -> Result<(), CacheError> {
        self.ensure_available()?;
        self.remaining
            .lock()
            .await
            .insert(event_id, i64::from(remaining));
        Ok(())
    }

    async fn get_remaining(&self, event_id: EventId) -> Result<Option<i64>, CacheError> {
        self.ensure_available()?;
        Ok(self.remaining.lock().await.get(&event_id).copied())
    }

    async fn decrement_remaining(
        &self,
        event_id: EventId,
        quantity: u32,
    ) -> Result<Option<i64>, CacheError> {
        self.ensure_available()?;
        let mut counters = self.remaining.lock().await;
        Ok(counters.get_mut(&event_id).map(|counter| {
            *counter -= i64::from(quantity);
            *counter
        }))
    }

    async fn increment_remaining(
        &self,
        event_id: EventId,
        quantity: u32,
    ) -> Result<i64, CacheError> {
        self.ensure_available()?;
        let mut counters = self.remaining.lock().await;
        let counter = counters.entry(event_id).or_insert(0);
        *counter += i64::from(quantity);
        Ok(*counter)
    }

    async fn remove_event(&self, event_id: EventId) -> Result<(), CacheError> {
        self.ensure_available()?;
        self.remaining.lock().await.remove(&event_id);
        self.stats.lock().await.remove(&event_id);
        Ok(())
    }

    async fn set_stats(&self, event_id: EventId, stats: &EventStats) -> Result<(), CacheError> {
        self.ensure_available()?;
        self.stats.lock().await.insert(event_id, *stats);
        Ok(())
    }

    async fn get_stats(&self, event_id: EventId) -> Result<Option<EventStats>, CacheError> {
        self.ensure_available()?;
        Ok(self.stats.lock().await.get(&event_id).copied())
    }

    async fn set_pending_marker(
        &self,
        booking_id: BookingId,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        self.ensure_available()?;
        self.markers
            .lock()
            .await
            .insert(booking_id, Instant::now() + ttl);
        Ok(())
    }

    async fn clear_pending_marker(&self, booking_id: BookingId) -> Result<(), CacheError> {
        self.ensure_available()?;
        self.markers.lock().await.remove(&booking_id);
        Ok(())
    }

    async fn has_pending_marker(&self, booking_id: BookingId) -> Result<bool, CacheError> {
        self.ensure_available()?;
        let mut markers = self.markers.lock().await;
        match markers.get(&booking_id) {
            Some(expires_at) if *expires_at > Instant::now() => Ok(true),
            Some(_) => {
                markers.remove(&booking_id);
                Ok(false)
            }
            None => Ok(false),
        }
    }
}

/// 常に利用不可を返すキャッシュ
/// キャッシュなしでも在庫の正しさが保たれることの確認に使う
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledInventoryCache;

impl DisabledInventoryCache {
    fn unavailable<T>() -> Result<T, CacheError> {
        Err(CacheError::Unavailable("cache is disabled".to_string()))
    }
}

#[async_trait]
impl InventoryCache for DisabledInventoryCache {
    async fn set_remaining(&self, _event_id: EventId, _remaining: u32) -> Result<(), CacheError> {
        Self::unavailable()
    }

    async fn get_remaining(&self, _event_id: EventId) -> Result<Option<i64>, CacheError> {
        Self::unavailable()
    }

    async fn decrement_remaining(
        &self,
        _event_id: EventId,
        _quantity: u32,
    ) -> Result<Option<i64>, CacheError> {
        Self::unavailable()
    }

    async fn increment_remaining(
        &self,
        _event_id: EventId,
        _quantity: u32,
    ) -> Result<i64, CacheError> {
        Self::unavailable()
    }

    async fn remove_event(&self, _event_id: EventId) -> Result<(), CacheError> {
        Self::unavailable()
    }

    async fn set_stats(&self, _event_id: EventId, _stats: &EventStats) -> Result<(), CacheError> {
        Self::unavailable()
    }

    async fn get_stats(&self, _event_id: EventId) -> Result<Option<EventStats>, CacheError> {
        Self::unavailable()
    }

    async fn set_pending_marker(
        &self,
        _booking_id: BookingId,
        _ttl: Duration,
    ) -> Result<(), CacheError> {
        Self::unavailable()
    }

    async fn clear_pending_marker(&self, _booking_id: BookingId) -> Result<(), CacheError> {
        Self::unavailable()
    }

    async fn has_pending_marker(&self, _booking_id: BookingId) -> Result<bool, CacheError> {
        Self::unavailable()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_decrement_does_not_create_missing_counter() {
        let cache = InMemoryInventoryCache::new();
        let event_id = EventId::new();

        assert_eq!(cache.decrement_remaining(event_id, 2).await.unwrap(), None);
        assert_eq!(cache.get_remaining(event_id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_decrement_may_go_negative() {
        let cache = InMemoryInventoryCache::new();
        let event_id = EventId::new();
        cache.set_remaining(event_id, 3).await.unwrap();

        assert_eq!(cache.decrement_remaining(event_id, 5).await.unwrap(), Some(-2));
        assert_eq!(cache.increment_remaining(event_id, 5).await.unwrap(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pending_marker_expires() {
        let cache = InMemoryInventoryCache::new();
        let booking_id = BookingId::new();
        cache
            .set_pending_marker(booking_id, Duration::from_secs(60))
            .await
            .unwrap();
        assert!(cache.has_pending_marker(booking_id).await.unwrap());

        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(!cache.has_pending_marker(booking_id).await.unwrap());
    }

    #[tokio::test]
    async fn test_remove_event_drops_counter_and_stats() {
        let cache = InMemoryInventoryCache::new();
        let event_id = EventId::new();
        cache.set_remaining(event_id, 7).await.unwrap();
        cache.set_stats(event_id, &EventStats::default()).await.unwrap();

        cache.remove_event(event_id).await.unwrap();

        assert_eq!(cache.get_remaining(event_id).await.unwrap(), None);
        assert_eq!(cache.get_stats(event_id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_switched_off_cache_reports_unavailable() {
        let cache = InMemoryInventoryCache::new();
        cache.set_available(false);
        let result = cache.get_stats(EventId::new()).await;
        assert!(matches!(result, Err(CacheError::Unavailable(_))));
    }
}
