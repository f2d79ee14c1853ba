use super::reservation::{ReservationCoordinator, SpeculativeOutcome};
use super::rollback_quietly;
use crate::application::ApplicationError;
use crate::domain::error::DomainError;
use crate::domain::message::BookingCreated;
use crate::domain::model::{Booking, BookingId, EventId, HolderId, StatusChange};
use crate::domain::port::{
    log_context, BookingLedger, InventoryCache, InventoryStore, Logger, NotificationBus,
    StoreTransaction,
};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

const COMPONENT: &str = "BookingLifecycleService";

/// 予約ライフサイクルの設定
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BookingSettings {
    /// PENDINGの予約を自動キャンセルするまでの時間
    pub auto_cancel_window: Duration,
    /// ストアの前にキャッシュで仮予約するかどうか
    pub speculative_precheck: bool,
}

impl Default for BookingSettings {
    fn default() -> Self {
        Self {
            auto_cancel_window: Duration::from_secs(15 * 60),
            speculative_precheck: false,
        }
    }
}

/// 確定・キャンセルの結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOutcome {
    /// 状態を変更した
    Applied,
    /// 既に目的の状態だった
    AlreadyInState,
}

/// 予約に対する状態遷移
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Transition {
    Confirm,
    Cancel,
}

/// 予約ライフサイクルサービス
/// 予約の作成・確定・キャンセルを、座席の確保と返却と同じトランザクションで行う
pub struct BookingLifecycleService {
    store: Arc<dyn InventoryStore>,
    ledger: Arc<dyn BookingLedger>,
    cache: Arc<dyn InventoryCache>,
    notifications: Arc<dyn NotificationBus>,
    coordinator: Arc<ReservationCoordinator>,
    logger: Arc<dyn Logger>,
    settings: BookingSettings,
}

impl BookingLifecycleService {
    /// 新しいサービスを作成
    ///
    /// # Arguments
    /// * `store` - 在庫ストア
    /// * `ledger` - 予約台帳
    /// * `cache` - 在庫キャッシュ
    /// * `notifications` - 予約作成通知の発行先
    /// * `coordinator` - 座席予約の調整役
    /// * `logger` - ロガー
    /// * `settings` - 自動キャンセル時間などの設定
    pub fn new(
        store: Arc<dyn InventoryStore>,
        ledger: Arc<dyn BookingLedger>,
        cache: Arc<dyn InventoryCache>,
        notifications: Arc<dyn NotificationBus>,
        coordinator: Arc<ReservationCoordinator>,
        logger: Arc<dyn Logger>,
        settings: BookingSettings,
    ) -> Self {
        Self {
            store,
            ledger,
            cache,
            notifications,
            coordinator,
            logger,
            settings,
        }
    }

    pub fn settings(&self) -> BookingSettings {
        self.settings
    }

    /// 予約を作成する
    /// 座席の確保と予約の挿入は同じトランザクションでコミットする。
    /// コミット後のキャッシュ同期・通知・タイムアウトマーカーは失敗してもロールバックしない
    ///
    /// # Returns
    /// * `Ok(BookingId)` - PENDINGで作成された予約のID
    /// * `Err(ApplicationError::CapacityExhausted)` - 残席不足（予約は作成されない）
    /// * `Err(ApplicationError::TransientStoreFailure)` - ロック待ちタイムアウトなど
    pub async fn create_booking(
        &self,
        holder_id: HolderId,
        event_id: EventId,
        quantity: u32,
    ) -> Result<BookingId, ApplicationError> {
        if quantity == 0 {
            return Err(DomainError::InvalidQuantity.into());
        }
        let correlation_id = Uuid::new_v4();

        let mut speculatively_reserved = false;
        if self.settings.speculative_precheck {
            match self.coordinator.reserve_speculative(event_id, quantity).await {
                SpeculativeOutcome::Denied => {
                    // カウンタが実際より低くずれていることがあるため、ストアの値で確かめる
                    if !self
                        .coordinator
                        .confirm_denial(event_id, quantity, correlation_id)
                        .await?
                    {
                        self.logger.info(
                            COMPONENT,
                            "Booking rejected by cached counter",
                            Some(correlation_id),
                            log_context([
                                ("event_id", event_id.to_string()),
                                ("quantity", quantity.to_string()),
                            ]),
                        );
                        return Err(capacity_exhausted(event_id));
                    }
                }
                SpeculativeOutcome::Granted => speculatively_reserved = true,
                SpeculativeOutcome::Unavailable => {}
            }
        }

        let booking = match self.insert_pending_booking(holder_id, event_id, quantity).await {
            Ok(booking) => booking,
            Err(e) => {
                // 仮予約で減らしたカウンタをストアの値に戻す
                if speculatively_reserved {
                    self.coordinator.sync_cache(event_id).await;
                }
                self.logger.info(
                    COMPONENT,
                    "Booking was not created",
                    Some(correlation_id),
                    log_context([
                        ("event_id", event_id.to_string()),
                        ("quantity", quantity.to_string()),
                        ("reason", e.to_string()),
                    ]),
                );
                return Err(e);
            }
        };

        self.logger.info(
            COMPONENT,
            "Booking created",
            Some(correlation_id),
            log_context([
                ("booking_id", booking.id().to_string()),
                ("event_id", event_id.to_string()),
                ("quantity", quantity.to_string()),
            ]),
        );

        self.coordinator.sync_cache(event_id).await;
        self.mark_pending(&booking, correlation_id).await;
        self.notify_created(&booking, correlation_id).await;

        Ok(booking.id())
    }

    /// 予約を取得する
    pub async fn get(&self, booking_id: BookingId) -> Result<Option<Booking>, ApplicationError> {
        self.ledger
            .find_by_id(booking_id)
            .await
            .map_err(ApplicationError::from)
    }

    /// 予約を確定する（冪等）
    ///
    /// # Returns
    /// * `Ok(TransitionOutcome::Applied)` - PENDINGから確定した
    /// * `Ok(TransitionOutcome::AlreadyInState)` - 既に確定済み
    /// * `Err(ApplicationError::Domain)` - キャンセル済みの予約
    pub async fn confirm_booking(
        &self,
        booking_id: BookingId,
    ) -> Result<TransitionOutcome, ApplicationError> {
        self.apply_transition(booking_id, Transition::Confirm).await
    }

    /// 予約をキャンセルし、座席を返却する（冪等）
    /// ステータス変更と座席の返却は同じトランザクションでコミットするため二重返却は起きない
    ///
    /// # Returns
    /// * `Ok(TransitionOutcome::Applied)` - PENDINGからキャンセルした
    /// * `Ok(TransitionOutcome::AlreadyInState)` - 既にキャンセル済み
    /// * `Err(ApplicationError::Domain)` - 確定済みの予約
    pub async fn cancel_booking(
        &self,
        booking_id: BookingId,
    ) -> Result<TransitionOutcome, ApplicationError> {
        self.apply_transition(booking_id, Transition::Cancel).await
    }

    async fn insert_pending_booking(
        &self,
        holder_id: HolderId,
        event_id: EventId,
        quantity: u32,
    ) -> Result<Booking, ApplicationError> {
        let mut tx = self.store.begin().await?;
        match self
            .reserve_and_insert(tx.as_mut(), holder_id, event_id, quantity)
            .await
        {
            Ok(booking) => {
                tx.commit().await?;
                Ok(booking)
            }
            Err(e) => {
                rollback_quietly(tx, self.logger.as_ref(), COMPONENT).await;
                Err(e)
            }
        }
    }

    async fn reserve_and_insert(
        &self,
        tx: &mut dyn StoreTransaction,
        holder_id: HolderId,
        event_id: EventId,
        quantity: u32,
    ) -> Result<Booking, ApplicationError> {
        if !self
            .coordinator
            .reserve_authoritative(tx, event_id, quantity)
            .await?
        {
            return Err(capacity_exhausted(event_id));
        }

        // 単価は同じロックの下で読み、予約に固定する
        let event = tx.lock_event(event_id).await?.ok_or_else(|| {
            ApplicationError::NotFound(format!("イベントが見つかりません: {}", event_id))
        })?;

        let booking = Booking::new(
            self.ledger.next_identity(),
            event_id,
            holder_id,
            quantity,
            event.unit_price(),
            Utc::now(),
        )?;
        tx.insert_booking(&booking).await?;
        Ok(booking)
    }

    async fn apply_transition(
        &self,
        booking_id: BookingId,
        transition: Transition,
    ) -> Result<TransitionOutcome, ApplicationError> {
        let mut tx = self.store.begin().await?;
        let changed = match self
            .transition_within(tx.as_mut(), booking_id, transition)
            .await
        {
            Ok(changed) => changed,
            Err(e) => {
                rollback_quietly(tx, self.logger.as_ref(), COMPONENT).await;
                return Err(e);
            }
        };

        let Some(booking) = changed else {
            rollback_quietly(tx, self.logger.as_ref(), COMPONENT).await;
            return Ok(TransitionOutcome::AlreadyInState);
        };
        tx.commit().await?;

        self.logger.info(
            COMPONENT,
            match transition {
                Transition::Confirm => "Booking confirmed",
                Transition::Cancel => "Booking cancelled",
            },
            None,
            log_context([
                ("booking_id", booking_id.to_string()),
                ("event_id", booking.event_id().to_string()),
                ("quantity", booking.quantity().to_string()),
            ]),
        );

        if transition == Transition::Cancel {
            self.coordinator.sync_cache(booking.event_id()).await;
        }
        self.refresh_stats(booking.event_id()).await;
        self.clear_pending_marker(booking_id).await;

        Ok(TransitionOutcome::Applied)
    }

    /// 予約行をロックして遷移を適用する
    /// 変更がなければ `Ok(None)` を返す
    async fn transition_within(
        &self,
        tx: &mut dyn StoreTransaction,
        booking_id: BookingId,
        transition: Transition,
    ) -> Result<Option<Booking>, ApplicationError> {
        let mut booking = tx.lock_booking(booking_id).await?.ok_or_else(|| {
            ApplicationError::NotFound(format!("予約が見つかりません: {}", booking_id))
        })?;

        let now = Utc::now();
        let change = match transition {
            Transition::Confirm => booking.confirm(now)?,
            Transition::Cancel => booking.cancel(now)?,
        };
        if change == StatusChange::Unchanged {
            return Ok(None);
        }

        tx.save_booking_status(&booking).await?;
        if transition == Transition::Cancel {
            // 予約行のロックを保持したままイベント行をロックする
            self.coordinator
                .release_within(tx, booking.event_id(), booking.quantity())
                .await?;
        }
        Ok(Some(booking))
    }

    /// CONFIRMEDの予約から統計を再計算してキャッシュに保存する
    async fn refresh_stats(&self, event_id: EventId) {
        let stats = match self.ledger.confirmed_stats(event_id).await {
            Ok(stats) => stats,
            Err(e) => {
                self.logger.warn(
                    COMPONENT,
                    "Failed to recompute event stats",
                    None,
                    log_context([
                        ("event_id", event_id.to_string()),
                        ("error", e.to_string()),
                    ]),
                );
                return;
            }
        };

        if let Err(e) = self.cache.set_stats(event_id, &stats).await {
            self.logger.warn(
                COMPONENT,
                "Failed to cache event stats",
                None,
                log_context([
                    ("event_id", event_id.to_string()),
                    ("error", e.to_string()),
                ]),
            );
        }
    }

    async fn mark_pending(&self, booking: &Booking, correlation_id: Uuid) {
        if let Err(e) = self
            .cache
            .set_pending_marker(booking.id(), self.settings.auto_cancel_window)
            .await
        {
            self.logger.warn(
                COMPONENT,
                "Failed to set pending marker",
                Some(correlation_id),
                log_context([
                    ("booking_id", booking.id().to_string()),
                    ("error", e.to_string()),
                ]),
            );
        }
    }

    async fn notify_created(&self, booking: &Booking, correlation_id: Uuid) {
        let message = BookingCreated::from_booking(booking);
        if let Err(e) = self.notifications.publish(&message).await {
            // 確定されなかった予約はスイーパーが回収する
            self.logger.error(
                COMPONENT,
                "Failed to publish booking notification",
                Some(correlation_id),
                log_context([
                    ("booking_id", booking.id().to_string()),
                    ("error", e.to_string()),
                ]),
            );
        }
    }

    pub(crate) async fn clear_pending_marker(&self, booking_id: BookingId) {
        if let Err(e) = self.cache.clear_pending_marker(booking_id).await {
            self.logger.warn(
                COMPONENT,
                "Failed to clear pending marker",
                None,
                log_context([
                    ("booking_id", booking_id.to_string()),
                    ("error", e.to_string()),
                ]),
            );
        }
    }
}

fn capacity_exhausted(event_id: EventId) -> ApplicationError {
    ApplicationError::CapacityExhausted(event_id.to_string())
}
