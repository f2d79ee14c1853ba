use crate::domain::model::{BookingId, EventId, EventStats};
use crate::domain::port::{CacheError, InventoryCache};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use std::time::Duration;

/// カウンタが存在する場合のみ減算する
/// 存在しないキーを DECRBY で作らないようにアトミックに判定する
const DECREMENT_IF_PRESENT: &str = r#"
    if redis.call('EXISTS', KEYS[1]) == 1 then
        return redis.call('DECRBY', KEYS[1], ARGV[1])
    end
    return false
"#;

/// Redis在庫キャッシュ
///
/// キー構成:
/// - `event:remaining:{event_id}` 残席カウンタ
/// - `event:{event_id}:stats` 販売統計（JSON、有効期限なし）
/// - `booking:pending:{booking_id}` 保留タイムアウトマーカー（TTL付き）
#[derive(Clone)]
pub struct RedisInventoryCache {
    conn_manager: ConnectionManager,
}

impl RedisInventoryCache {
    /// Redisへ接続してキャッシュを作成する
    ///
    /// # Arguments
    /// * `redis_url` - 接続URL（例: "redis://127.0.0.1:6379"）
    pub async fn new(redis_url: &str) -> Result<Self, CacheError> {
        let client = Client::open(redis_url).map_err(|e| {
            CacheError::Unavailable(format!("Failed to create Redis client: {}", e))
        })?;

        let conn_manager = ConnectionManager::new(client).await.map_err(|e| {
            CacheError::Unavailable(format!("Failed to create Redis connection manager: {}", e))
        })?;

        Ok(Self { conn_manager })
    }

    fn remaining_key(event_id: EventId) -> String {
        format!("event:remaining:{}", event_id)
    }

    fn stats_key(event_id: EventId) -> String {
        format!("event:{}:stats", event_id)
    }

    fn pending_key(booking_id: BookingId) -> String {
        format!("booking:pending:{}", booking_id)
    }
}

fn unavailable(operation: &str, err: redis::RedisError) -> CacheError {
    CacheError::Unavailable(format!("{} failed: {}", operation, err))
}

#[async_trait]
impl InventoryCache for RedisInventoryCache {
    async fn set_remaining(&self, event_id: EventId, remaining: u32) -> Result<(), CacheError> {
        let mut conn = self.conn_manager.clone();
        let _: () = conn
            .set(Self::remaining_key(event_id), remaining)
            .await
            .map_err(|e| unavailable("SET remaining", e))?;
        Ok(())
    }

    async fn get_remaining(&self, event_id: EventId) -> Result<Option<i64>, CacheError> {
        let mut conn = self.conn_manager.clone();
        conn.get(Self::remaining_key(event_id))
            .await
            .map_err(|e| unavailable("GET remaining", e))
    }

    async fn decrement_remaining(
        &self,
        event_id: EventId,
        quantity: u32,
    ) -> Result<Option<i64>, CacheError> {
        let mut conn = self.conn_manager.clone();
        let left: Option<i64> = redis::Script::new(DECREMENT_IF_PRESENT)
            .key(Self::remaining_key(event_id))
            .arg(quantity)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| unavailable("DECRBY remaining", e))?;

        tracing::debug!(event_id = %event_id, quantity, left = ?left, "Decremented cached seat counter");
        Ok(left)
    }

    async fn increment_remaining(
        &self,
        event_id: EventId,
        quantity: u32,
    ) -> Result<i64, CacheError> {
        let mut conn = self.conn_manager.clone();
        conn.incr(Self::remaining_key(event_id), quantity)
            .await
            .map_err(|e| unavailable("INCRBY remaining", e))
    }

    async fn remove_event(&self, event_id: EventId) -> Result<(), CacheError> {
        let mut conn = self.conn_manager.clone();
        let _: () = conn
            .del(vec![Self::remaining_key(event_id), Self::stats_key(event_id)])
            .await
            .map_err(|e| unavailable("DEL event keys", e))?;
        Ok(())
    }

    async fn set_stats(&self, event_id: EventId, stats: &EventStats) -> Result<(), CacheError> {
        let payload = serde_json::to_string(stats)
            .map_err(|e| CacheError::Corrupted(format!("Failed to encode stats: {}", e)))?;

        let mut conn = self.conn_manager.clone();
        let _: () = conn
            .set(Self::stats_key(event_id), payload)
            .await
            .map_err(|e| unavailable("SET stats", e))?;
        Ok(())
    }

    async fn get_stats(&self, event_id: EventId) -> Result<Option<EventStats>, CacheError> {
        let mut conn = self.conn_manager.clone();
        let payload: Option<String> = conn
            .get(Self::stats_key(event_id))
            .await
            .map_err(|e| unavailable("GET stats", e))?;

        payload
            .map(|json| {
                serde_json::from_str(&json).map_err(|e| {
                    CacheError::Corrupted(format!("Failed to decode stats for {}: {}", event_id, e))
                })
            })
            .transpose()
    }

    async fn set_pending_marker(
        &self,
        booking_id: BookingId,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        // TTLが0秒だとSETEXが失敗するため1秒に切り上げる
        let ttl_seconds = ttl.as_secs().max(1);
        let mut conn = self.conn_manager.clone();
        let _: () = conn
            .set_ex(Self::pending_key(booking_id), 1u8, ttl_seconds)
            .await
            .map_err(|e| unavailable("SETEX pending marker", e))?;
        Ok(())
    }

    async fn clear_pending_marker(&self, booking_id: BookingId) -> Result<(), CacheError> {
        let mut conn = self.conn_manager.clone();
        let _: () = conn
            .del(Self::pending_key(booking_id))
            .await
            .map_err(|e| unavailable("DEL pending marker", e))?;
        Ok(())
    }

    async fn has_pending_marker(&self, booking_id: BookingId) -> Result<bool, CacheError> {
        let mut conn = self.conn_manager.clone();
        conn.exists(Self::pending_key(booking_id))
            .await
            .map_err(|e| unavailable("EXISTS pending marker", e))
    }
}
