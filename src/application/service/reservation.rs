use super::rollback_quietly;
use crate::application::ApplicationError;
use crate::domain::model::EventId;
use crate::domain::port::{log_context, InventoryCache, InventoryStore, Logger, StoreTransaction};
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

const COMPONENT: &str = "ReservationCoordinator";

/// キャッシュによる仮予約の結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeculativeOutcome {
    /// キャッシュ上の残席から減算できた
    Granted,
    /// キャッシュ上で残席不足（減算は補償済み）
    Denied,
    /// キャッシュが利用できない、またはカウンタが存在しない
    Unavailable,
}

/// 座席予約の調整役
/// 正となるストアでの行ロック付き予約と、キャッシュでの高速な仮予約を扱う。
/// ストアがコミットした値でキャッシュを上書きすることで両者を収束させる
pub struct ReservationCoordinator {
    store: Arc<dyn InventoryStore>,
    cache: Arc<dyn InventoryCache>,
    logger: Arc<dyn Logger>,
}

impl ReservationCoordinator {
    /// 新しい調整役を作成
    ///
    /// # Arguments
    /// * `store` - 在庫ストア（正）
    /// * `cache` - 在庫キャッシュ
    /// * `logger` - ロガー
    pub fn new(
        store: Arc<dyn InventoryStore>,
        cache: Arc<dyn InventoryCache>,
        logger: Arc<dyn Logger>,
    ) -> Self {
        Self {
            store,
            cache,
            logger,
        }
    }

    /// 呼び出し元のトランザクション内で座席を予約する
    /// イベント行を排他ロックしたうえで残席を確認し、足りれば減算して書き戻す
    ///
    /// # Returns
    /// * `Ok(true)` - 予約成功
    /// * `Ok(false)` - 残席不足（何も変更していない）
    /// * `Err(ApplicationError::NotFound)` - イベントが存在しない
    pub async fn reserve_authoritative(
        &self,
        tx: &mut dyn StoreTransaction,
        event_id: EventId,
        quantity: u32,
    ) -> Result<bool, ApplicationError> {
        let mut event = tx
            .lock_event(event_id)
            .await?
            .ok_or_else(|| event_not_found(event_id))?;

        if !event.has_available_seats(quantity) {
            self.logger.debug(
                COMPONENT,
                "Not enough seats in store",
                None,
                log_context([
                    ("event_id", event_id.to_string()),
                    ("requested", quantity.to_string()),
                    ("remaining", event.remaining().to_string()),
                ]),
            );
            return Ok(false);
        }

        event.reserve(quantity, Utc::now())?;
        tx.save_event(&event).await?;
        Ok(true)
    }

    /// キャッシュのカウンタで仮予約する
    /// 失敗してもエラーにはせず、呼び出し元はストアでの予約に進める
    pub async fn reserve_speculative(&self, event_id: EventId, quantity: u32) -> SpeculativeOutcome {
        match self.cache.decrement_remaining(event_id, quantity).await {
            Ok(Some(left)) if left >= 0 => SpeculativeOutcome::Granted,
            Ok(Some(left)) => {
                // 負になった分を戻す
                if let Err(e) = self.cache.increment_remaining(event_id, quantity).await {
                    self.logger.warn(
                        COMPONENT,
                        "Failed to compensate speculative decrement",
                        None,
                        log_context([
                            ("event_id", event_id.to_string()),
                            ("error", e.to_string()),
                        ]),
                    );
                }
                self.logger.debug(
                    COMPONENT,
                    "Speculative reservation denied",
                    None,
                    log_context([
                        ("event_id", event_id.to_string()),
                        ("counter_after_decrement", left.to_string()),
                    ]),
                );
                SpeculativeOutcome::Denied
            }
            Ok(None) => {
                self.logger.debug(
                    COMPONENT,
                    "Remaining counter is not cached",
                    None,
                    log_context([("event_id", event_id.to_string())]),
                );
                SpeculativeOutcome::Unavailable
            }
            Err(e) => {
                self.logger.warn(
                    COMPONENT,
                    "Cache unavailable for speculative reservation",
                    None,
                    log_context([
                        ("event_id", event_id.to_string()),
                        ("error", e.to_string()),
                    ]),
                );
                SpeculativeOutcome::Unavailable
            }
        }
    }

    /// キャッシュでの不足判定をストアのコミット済みの値と突き合わせる
    /// ずれていればカウンタをストアの値で上書きする
    ///
    /// # Returns
    /// * `Ok(true)` - ストアには残席があった（行ロック付きの予約へ進める）
    /// * `Ok(false)` - ストアでも残席不足
    /// * `Err(ApplicationError::NotFound)` - イベントが存在しない
    pub async fn confirm_denial(
        &self,
        event_id: EventId,
        quantity: u32,
        correlation_id: Uuid,
    ) -> Result<bool, ApplicationError> {
        let event = self
            .store
            .find_event(event_id)
            .await?
            .ok_or_else(|| event_not_found(event_id))?;

        if event.has_available_seats(quantity) {
            self.logger.warn(
                COMPONENT,
                "Cached counter was below store, resynchronising",
                Some(correlation_id),
                log_context([
                    ("event_id", event_id.to_string()),
                    ("requested", quantity.to_string()),
                    ("remaining", event.remaining().to_string()),
                ]),
            );
            self.sync_cache(event_id).await;
            return Ok(true);
        }
        Ok(false)
    }

    /// 独立したトランザクションで座席を返却し、キャッシュを同期する
    ///
    /// # Returns
    /// * `Ok(u32)` - 実際に返却された枚数（定員で丸めた値）
    pub async fn release(&self, event_id: EventId, quantity: u32) -> Result<u32, ApplicationError> {
        let mut tx = self.store.begin().await?;
        let restored = match self.release_within(tx.as_mut(), event_id, quantity).await {
            Ok(restored) => restored,
            Err(e) => {
                rollback_quietly(tx, self.logger.as_ref(), COMPONENT).await;
                return Err(e);
            }
        };
        tx.commit().await?;

        self.sync_cache(event_id).await;
        Ok(restored)
    }

    /// 呼び出し元のトランザクション内で座席を返却する
    /// 定員を超える分は切り捨てる
    pub async fn release_within(
        &self,
        tx: &mut dyn StoreTransaction,
        event_id: EventId,
        quantity: u32,
    ) -> Result<u32, ApplicationError> {
        let mut event = tx
            .lock_event(event_id)
            .await?
            .ok_or_else(|| event_not_found(event_id))?;

        let restored = event.release(quantity, Utc::now());
        if restored < quantity {
            self.logger.warn(
                COMPONENT,
                "Release clamped to capacity",
                None,
                log_context([
                    ("event_id", event_id.to_string()),
                    ("requested", quantity.to_string()),
                    ("restored", restored.to_string()),
                ]),
            );
        }
        tx.save_event(&event).await?;
        Ok(restored)
    }

    /// ストアの残席数でキャッシュのカウンタを上書きする
    /// 失敗はログに残すだけで呼び出し元には返さない
    pub async fn sync_cache(&self, event_id: EventId) {
        let event = match self.store.find_event(event_id).await {
            Ok(Some(event)) => event,
            Ok(None) => {
                self.logger.debug(
                    COMPONENT,
                    "Skipped cache sync for unknown event",
                    None,
                    log_context([("event_id", event_id.to_string())]),
                );
                return;
            }
            Err(e) => {
                self.logger.warn(
                    COMPONENT,
                    "Failed to read event for cache sync",
                    None,
                    log_context([
                        ("event_id", event_id.to_string()),
                        ("error", e.to_string()),
                    ]),
                );
                return;
            }
        };

        if let Err(e) = self.cache.set_remaining(event_id, event.remaining()).await {
            self.logger.warn(
                COMPONENT,
                "Failed to sync remaining counter",
                None,
                log_context([
                    ("event_id", event_id.to_string()),
                    ("error", e.to_string()),
                ]),
            );
        }
    }
}

fn event_not_found(event_id: EventId) -> ApplicationError {
    ApplicationError::NotFound(format!("イベントが見つかりません: {}", event_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::driven::{InMemoryDatabase, InMemoryInventoryCache, NoopLogger};
    use crate::domain::model::{Event, Money};
    use chrono::Duration;

    struct Fixture {
        db: Arc<InMemoryDatabase>,
        cache: Arc<InMemoryInventoryCache>,
        coordinator: ReservationCoordinator,
    }

    fn fixture() -> Fixture {
        let db = Arc::new(InMemoryDatabase::new());
        let cache = Arc::new(InMemoryInventoryCache::new());
        let coordinator = ReservationCoordinator::new(db.clone(), cache.clone(), Arc::new(NoopLogger));
        Fixture {
            db,
            cache,
            coordinator,
        }
    }

    async fn seed_event(db: &InMemoryDatabase, capacity: u32) -> EventId {
        let now = Utc::now();
        let event = Event::new(
            EventId::new(),
            "Orchestra".to_string(),
            now + Duration::days(3),
            now + Duration::days(3) + Duration::hours(2),
            capacity,
            Money::from_minor(4000).unwrap(),
            now,
        )
        .unwrap();
        db.create_event(&event).await.unwrap();
        event.id()
    }

    #[tokio::test]
    async fn test_reserve_authoritative_decrements_remaining() {
        let f = fixture();
        let event_id = seed_event(&f.db, 10).await;

        let mut tx = f.db.begin().await.unwrap();
        assert!(f.coordinator.reserve_authoritative(tx.as_mut(), event_id, 6).await.unwrap());
        tx.commit().await.unwrap();

        let event = f.db.find_event(event_id).await.unwrap().unwrap();
        assert_eq!(event.remaining(), 4);
    }

    #[tokio::test]
    async fn test_reserve_authoritative_refuses_without_mutation() {
        let f = fixture();
        let event_id = seed_event(&f.db, 5).await;

        let mut tx = f.db.begin().await.unwrap();
        assert!(!f.coordinator.reserve_authoritative(tx.as_mut(), event_id, 6).await.unwrap());
        tx.commit().await.unwrap();

        let event = f.db.find_event(event_id).await.unwrap().unwrap();
        assert_eq!(event.remaining(), 5);
    }

    #[tokio::test]
    async fn test_reserve_authoritative_unknown_event() {
        let f = fixture();
        let mut tx = f.db.begin().await.unwrap();
        let result = f.coordinator.reserve_authoritative(tx.as_mut(), EventId::new(), 1).await;
        assert!(matches!(result, Err(ApplicationError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_speculative_denied_restores_counter() {
        let f = fixture();
        let event_id = EventId::new();
        f.cache.set_remaining(event_id, 3).await.unwrap();

        assert_eq!(f.coordinator.reserve_speculative(event_id, 5).await, SpeculativeOutcome::Denied);
        assert_eq!(f.cache.get_remaining(event_id).await.unwrap(), Some(3));

        assert_eq!(f.coordinator.reserve_speculative(event_id, 3).await, SpeculativeOutcome::Granted);
        assert_eq!(f.cache.get_remaining(event_id).await.unwrap(), Some(0));
    }

    #[tokio::test]
    async fn test_stale_low_counter_is_resynchronised_on_denial() {
        let f = fixture();
        let event_id = seed_event(&f.db, 10).await;
        f.cache.set_remaining(event_id, 4).await.unwrap();

        assert_eq!(f.coordinator.reserve_speculative(event_id, 6).await, SpeculativeOutcome::Denied);
        assert!(f.coordinator.confirm_denial(event_id, 6, Uuid::new_v4()).await.unwrap());
        assert_eq!(f.cache.get_remaining(event_id).await.unwrap(), Some(10));

        assert!(!f.coordinator.confirm_denial(event_id, 11, Uuid::new_v4()).await.unwrap());
    }

    #[tokio::test]
    async fn test_speculative_unavailable_without_counter_or_cache() {
        let f = fixture();
        let event_id = EventId::new();
        assert_eq!(
            f.coordinator.reserve_speculative(event_id, 1).await,
            SpeculativeOutcome::Unavailable
        );
        assert_eq!(f.cache.get_remaining(event_id).await.unwrap(), None);

        f.cache.set_available(false);
        assert_eq!(
            f.coordinator.reserve_speculative(event_id, 1).await,
            SpeculativeOutcome::Unavailable
        );
    }

    #[tokio::test]
    async fn test_release_restores_and_syncs_cache() {
        let f = fixture();
        let event_id = seed_event(&f.db, 10).await;

        let mut tx = f.db.begin().await.unwrap();
        f.coordinator.reserve_authoritative(tx.as_mut(), event_id, 3).await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!(f.coordinator.release(event_id, 3).await.unwrap(), 3);
        assert_eq!(f.db.find_event(event_id).await.unwrap().unwrap().remaining(), 10);
        assert_eq!(f.cache.get_remaining(event_id).await.unwrap(), Some(10));

        // 定員を超えて返却しない
        assert_eq!(f.coordinator.release(event_id, 3).await.unwrap(), 0);
        assert_eq!(f.db.find_event(event_id).await.unwrap().unwrap().remaining(), 10);
    }

    #[tokio::test]
    async fn test_sync_cache_tolerates_cache_outage() {
        let f = fixture();
        let event_id = seed_event(&f.db, 7).await;
        f.cache.set_available(false);

        f.coordinator.sync_cache(event_id).await;

        f.cache.set_available(true);
        assert_eq!(f.cache.get_remaining(event_id).await.unwrap(), None);
        f.coordinator.sync_cache(event_id).await;
        assert_eq!(f.cache.get_remaining(event_id).await.unwrap(), Some(7));
    }
}
