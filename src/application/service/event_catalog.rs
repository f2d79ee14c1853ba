use super::reservation::ReservationCoordinator;
use super::rollback_quietly;
use crate::application::ApplicationError;
use crate::domain::error::DomainError;
use crate::domain::model::{Event, EventId, EventStats, Money};
use crate::domain::port::{
    log_context, BookingLedger, InventoryCache, InventoryStore, Logger, StoreTransaction,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;

const COMPONENT: &str = "EventCatalogService";

/// 1ページで返すイベントの上限
pub const MAX_PAGE_LIMIT: u32 = 100;

/// 新規イベントの内容
#[derive(Debug, Clone)]
pub struct NewEvent {
    pub name: String,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub capacity: u32,
    pub unit_price: Money,
}

/// イベントの変更内容（指定した項目のみ変更する）
#[derive(Debug, Clone, Default)]
pub struct EventChanges {
    pub name: Option<String>,
    pub schedule: Option<(DateTime<Utc>, DateTime<Utc>)>,
    pub capacity: Option<u32>,
    pub unit_price: Option<Money>,
}

/// イベントカタログサービス
/// イベントの登録・変更と、残席数・販売統計の参照を提供する。
/// 参照はキャッシュを優先し、欠落や障害時はストアから読み直してキャッシュを埋める
pub struct EventCatalogService {
    store: Arc<dyn InventoryStore>,
    ledger: Arc<dyn BookingLedger>,
    cache: Arc<dyn InventoryCache>,
    coordinator: Arc<ReservationCoordinator>,
    logger: Arc<dyn Logger>,
}

impl EventCatalogService {
    pub fn new(
        store: Arc<dyn InventoryStore>,
        ledger: Arc<dyn BookingLedger>,
        cache: Arc<dyn InventoryCache>,
        coordinator: Arc<ReservationCoordinator>,
        logger: Arc<dyn Logger>,
    ) -> Self {
        Self {
            store,
            ledger,
            cache,
            coordinator,
            logger,
        }
    }

    /// イベントを登録する
    /// 残席数は定員で始まり、キャッシュのカウンタも初期化する
    pub async fn create_event(&self, new_event: NewEvent) -> Result<Event, ApplicationError> {
        let event = Event::new(
            EventId::new(),
            new_event.name,
            new_event.starts_at,
            new_event.ends_at,
            new_event.capacity,
            new_event.unit_price,
            Utc::now(),
        )?;
        self.store.create_event(&event).await?;

        self.logger.info(
            COMPONENT,
            "Event created",
            None,
            log_context([
                ("event_id", event.id().to_string()),
                ("capacity", event.capacity().to_string()),
            ]),
        );
        self.coordinator.sync_cache(event.id()).await;
        Ok(event)
    }

    /// イベントを変更する
    /// 定員の変更では販売済み枚数を維持し、それを下回る定員は拒否する
    ///
    /// # Returns
    /// * `Ok(Event)` - 変更後のイベント
    /// * `Err(ApplicationError::NotFound)` - イベントが存在しない
    /// * `Err(ApplicationError::Domain)` - 販売済み枚数を下回る定員など
    pub async fn update_event(
        &self,
        event_id: EventId,
        changes: EventChanges,
    ) -> Result<Event, ApplicationError> {
        let mut tx = self.store.begin().await?;
        let event = match Self::apply_changes(tx.as_mut(), event_id, changes).await {
            Ok(event) => event,
            Err(e) => {
                rollback_quietly(tx, self.logger.as_ref(), COMPONENT).await;
                return Err(e);
            }
        };
        tx.commit().await?;

        self.logger.info(
            COMPONENT,
            "Event updated",
            None,
            log_context([
                ("event_id", event_id.to_string()),
                ("capacity", event.capacity().to_string()),
                ("remaining", event.remaining().to_string()),
            ]),
        );
        self.coordinator.sync_cache(event_id).await;
        Ok(event)
    }

    async fn apply_changes(
        tx: &mut dyn StoreTransaction,
        event_id: EventId,
        changes: EventChanges,
    ) -> Result<Event, ApplicationError> {
        let mut event = tx.lock_event(event_id).await?.ok_or_else(|| {
            ApplicationError::NotFound(format!("イベントが見つかりません: {}", event_id))
        })?;

        let now = Utc::now();
        if let Some(name) = changes.name {
            event.rename(name, now)?;
        }
        if let Some((starts_at, ends_at)) = changes.schedule {
            event.reschedule(starts_at, ends_at, now)?;
        }
        if let Some(capacity) = changes.capacity {
            event.change_capacity(capacity, now)?;
        }
        if let Some(unit_price) = changes.unit_price {
            event.reprice(unit_price, now);
        }

        tx.save_event(&event).await?;
        Ok(event)
    }

    /// イベントを取得する
    pub async fn get_event(&self, event_id: EventId) -> Result<Option<Event>, ApplicationError> {
        self.store
            .find_event(event_id)
            .await
            .map_err(ApplicationError::from)
    }

    /// すべてのイベントを開始日時の昇順で取得する
    pub async fn list_events(&self) -> Result<Vec<Event>, ApplicationError> {
        self.store.list_events().await.map_err(ApplicationError::from)
    }

    /// 開始日時の昇順で1ページ分のイベントを取得する
    /// `limit` は [`MAX_PAGE_LIMIT`] で頭打ちにする
    pub async fn list_events_page(
        &self,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Event>, ApplicationError> {
        self.store
            .list_events_page(limit.min(MAX_PAGE_LIMIT), offset)
            .await
            .map_err(ApplicationError::from)
    }

    /// イベントを削除し、残席カウンタと統計をキャッシュから取り除く
    /// 予約は削除しないため、予約が1件でもあるイベントは削除できない
    ///
    /// # Returns
    /// * `Ok(())` - 削除した
    /// * `Err(ApplicationError::NotFound)` - イベントが存在しない
    /// * `Err(ApplicationError::Domain)` - 予約が存在する
    pub async fn delete_event(&self, event_id: EventId) -> Result<(), ApplicationError> {
        let mut tx = self.store.begin().await?;
        if let Err(e) = Self::remove_unbooked(tx.as_mut(), event_id).await {
            rollback_quietly(tx, self.logger.as_ref(), COMPONENT).await;
            return Err(e);
        }
        tx.commit().await?;

        self.logger.info(
            COMPONENT,
            "Event deleted",
            None,
            log_context([("event_id", event_id.to_string())]),
        );
        if let Err(e) = self.cache.remove_event(event_id).await {
            self.logger.warn(
                COMPONENT,
                "Failed to remove cached entries of deleted event",
                None,
                log_context([
                    ("event_id", event_id.to_string()),
                    ("error", e.to_string()),
                ]),
            );
        }
        Ok(())
    }

    async fn remove_unbooked(
        tx: &mut dyn StoreTransaction,
        event_id: EventId,
    ) -> Result<(), ApplicationError> {
        if tx.lock_event(event_id).await?.is_none() {
            return Err(ApplicationError::NotFound(format!(
                "イベントが見つかりません: {}",
                event_id
            )));
        }
        if tx.has_bookings(event_id).await? {
            return Err(DomainError::EventHasBookings(event_id.to_string()).into());
        }
        tx.delete_event(event_id).await?;
        Ok(())
    }

    /// 残席数を取得する
    /// キャッシュにあればその値を返す（一時的にストアとずれることがある）
    pub async fn remaining_seats(&self, event_id: EventId) -> Result<u32, ApplicationError> {
        match self.cache.get_remaining(event_id).await {
            Ok(Some(cached)) => {
                if let Ok(remaining) = u32::try_from(cached) {
                    return Ok(remaining);
                }
            }
            Ok(None) => {}
            Err(e) => {
                self.logger.debug(
                    COMPONENT,
                    "Remaining counter read failed, falling back to store",
                    None,
                    log_context([
                        ("event_id", event_id.to_string()),
                        ("error", e.to_string()),
                    ]),
                );
            }
        }

        let event = self.store.find_event(event_id).await?.ok_or_else(|| {
            ApplicationError::NotFound(format!("イベントが見つかりません: {}", event_id))
        })?;
        if let Err(e) = self.cache.set_remaining(event_id, event.remaining()).await {
            self.logger.debug(
                COMPONENT,
                "Failed to repopulate remaining counter",
                None,
                log_context([("error", e.to_string())]),
            );
        }
        Ok(event.remaining())
    }

    /// 販売統計を取得する
    /// キャッシュにない場合はCONFIRMEDの予約から再計算してキャッシュに保存する
    pub async fn stats(&self, event_id: EventId) -> Result<EventStats, ApplicationError> {
        match self.cache.get_stats(event_id).await {
            Ok(Some(stats)) => return Ok(stats),
            Ok(None) => {}
            Err(e) => {
                self.logger.debug(
                    COMPONENT,
                    "Stats read failed, falling back to ledger",
                    None,
                    log_context([
                        ("event_id", event_id.to_string()),
                        ("error", e.to_string()),
                    ]),
                );
            }
        }

        if self.store.find_event(event_id).await?.is_none() {
            return Err(ApplicationError::NotFound(format!(
                "イベントが見つかりません: {}",
                event_id
            )));
        }

        let stats = self.ledger.confirmed_stats(event_id).await?;
        if let Err(e) = self.cache.set_stats(event_id, &stats).await {
            self.logger.debug(
                COMPONENT,
                "Failed to repopulate stats",
                None,
                log_context([("error", e.to_string())]),
            );
        }
        Ok(stats)
    }
}
