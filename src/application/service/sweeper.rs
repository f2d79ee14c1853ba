use super::booking_service::{BookingLifecycleService, TransitionOutcome};
use crate::application::ApplicationError;
use crate::domain::error::DomainError;
use crate::domain::port::{log_context, BookingLedger, Logger};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

const COMPONENT: &str = "StaleReservationSweeper";

/// 1回のスイープの結果
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// 期限切れとして検出した予約の数
    pub examined: usize,
    /// このスイープでキャンセルした予約の数
    pub cancelled: usize,
    /// キャンセルに失敗した予約の数（次回のスイープで再試行される）
    pub failed: usize,
}

/// 期限切れ予約のスイーパー
/// 自動キャンセル時間を過ぎたPENDINGの予約をキャンセルして座席を回収する
pub struct StaleReservationSweeper {
    bookings: Arc<BookingLifecycleService>,
    ledger: Arc<dyn BookingLedger>,
    logger: Arc<dyn Logger>,
    auto_cancel_window: chrono::Duration,
    interval: Duration,
}

/// 起動中のスイーパーのハンドル
pub struct SweeperHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SweeperHandle {
    /// 停止を通知し、ループの終了を待つ
    pub async fn stop(self) {
        // 受信側が既に終了していれば送信は失敗するが、その場合も待機するだけでよい
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            tracing::error!(error = %e, "Sweeper task terminated abnormally");
        }
    }
}

impl StaleReservationSweeper {
    /// 新しいスイーパーを作成
    ///
    /// # Arguments
    /// * `bookings` - 予約ライフサイクルサービス（キャンセルに使用）
    /// * `ledger` - 予約台帳（期限切れ予約の検索に使用）
    /// * `logger` - ロガー
    /// * `auto_cancel_window` - PENDINGのまま保持できる時間
    /// * `interval` - スイープ間隔
    pub fn new(
        bookings: Arc<BookingLifecycleService>,
        ledger: Arc<dyn BookingLedger>,
        logger: Arc<dyn Logger>,
        auto_cancel_window: Duration,
        interval: Duration,
    ) -> Self {
        Self {
            bookings,
            ledger,
            logger,
            // 表現できない長さは実質無期限（100年）として扱う
            auto_cancel_window: chrono::Duration::from_std(auto_cancel_window)
                .unwrap_or_else(|_| chrono::Duration::days(36_500)),
            interval,
        }
    }

    /// 期限切れのPENDING予約を一度だけスイープする
    /// 並行して確定・キャンセルされた予約はキャンセル数に含めない
    pub async fn sweep_once(&self, now: DateTime<Utc>) -> Result<SweepReport, ApplicationError> {
        let cutoff = now
            .checked_sub_signed(self.auto_cancel_window)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let stale = self.ledger.find_pending_older_than(cutoff).await?;

        let mut report = SweepReport {
            examined: stale.len(),
            ..SweepReport::default()
        };

        for booking in stale {
            match self.bookings.cancel_booking(booking.id()).await {
                Ok(TransitionOutcome::Applied) => report.cancelled += 1,
                Ok(TransitionOutcome::AlreadyInState) => {}
                // ワーカーが先に確定した
                Err(ApplicationError::Domain(DomainError::InvalidTransition(_))) => {}
                Err(e) => {
                    report.failed += 1;
                    self.logger.warn(
                        COMPONENT,
                        "Failed to cancel stale booking",
                        None,
                        log_context([
                            ("booking_id", booking.id().to_string()),
                            ("error", e.to_string()),
                        ]),
                    );
                }
            }
        }

        if report.examined > 0 {
            self.logger.info(
                COMPONENT,
                "Sweep finished",
                None,
                log_context([
                    ("examined", report.examined.to_string()),
                    ("cancelled", report.cancelled.to_string()),
                    ("failed", report.failed.to_string()),
                ]),
            );
        }
        Ok(report)
    }

    /// 定期スイープを開始する
    /// 処理が間隔を超えた場合、遅れたtickは飛ばす
    pub fn start(self: Arc<Self>) -> SweeperHandle {
        let (shutdown, mut shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // 最初のtickは即座に完了するので読み捨てる
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = self.sweep_once(Utc::now()).await {
                            self.logger.error(
                                COMPONENT,
                                "Sweep failed",
                                None,
                                log_context([("error", e.to_string())]),
                            );
                        }
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }

            self.logger.info(COMPONENT, "Sweeper stopped", None, None);
        });

        SweeperHandle { shutdown, task }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::driven::{
        InMemoryDatabase, InMemoryInventoryCache, InMemoryNotificationBus, NoopLogger,
    };
    use crate::application::service::{BookingSettings, ReservationCoordinator};
    use crate::domain::model::{BookingStatus, Event, EventId, HolderId, Money};
    use crate::domain::port::InventoryStore;

    struct Fixture {
        db: Arc<InMemoryDatabase>,
        bookings: Arc<BookingLifecycleService>,
        sweeper: Arc<StaleReservationSweeper>,
    }

    fn fixture(interval: Duration) -> Fixture {
        let db = Arc::new(InMemoryDatabase::new());
        let cache = Arc::new(InMemoryInventoryCache::new());
        let (bus, _receiver) = InMemoryNotificationBus::new(16);
        let logger: Arc<dyn Logger> = Arc::new(NoopLogger);
        let coordinator = Arc::new(ReservationCoordinator::new(
            db.clone(),
            cache.clone(),
            logger.clone(),
        ));
        let settings = BookingSettings::default();
        let bookings = Arc::new(BookingLifecycleService::new(
            db.clone(),
            db.clone(),
            cache,
            Arc::new(bus),
            coordinator,
            logger.clone(),
            settings,
        ));
        let sweeper = Arc::new(StaleReservationSweeper::new(
            bookings.clone(),
            db.clone(),
            logger,
            settings.auto_cancel_window,
            interval,
        ));
        Fixture {
            db,
            bookings,
            sweeper,
        }
    }

    async fn seed_event(db: &InMemoryDatabase, capacity: u32) -> EventId {
        let now = Utc::now();
        let event = Event::new(
            EventId::new(),
            "Comedy Show".to_string(),
            now + chrono::Duration::days(2),
            now + chrono::Duration::days(2) + chrono::Duration::hours(1),
            capacity,
            Money::from_minor(1000).unwrap(),
            now,
        )
        .unwrap();
        db.create_event(&event).await.unwrap();
        event.id()
    }

    #[tokio::test]
    async fn test_sweep_cancels_only_expired_pending_bookings() {
        let f = fixture(Duration::from_secs(60));
        let event_id = seed_event(&f.db, 10).await;
        let pending = f.bookings.create_booking(HolderId::new(), event_id, 2).await.unwrap();
        let confirmed = f.bookings.create_booking(HolderId::new(), event_id, 3).await.unwrap();
        f.bookings.confirm_booking(confirmed).await.unwrap();

        // 期限内なので何もしない
        let report = f.sweeper.sweep_once(Utc::now()).await.unwrap();
        assert_eq!(report, SweepReport::default());

        let later = Utc::now() + chrono::Duration::minutes(16);
        let report = f.sweeper.sweep_once(later).await.unwrap();
        assert_eq!(report.examined, 1);
        assert_eq!(report.cancelled, 1);
        assert_eq!(report.failed, 0);

        let booking = f.bookings.get(pending).await.unwrap().unwrap();
        assert_eq!(booking.status(), BookingStatus::Cancelled);
        let booking = f.bookings.get(confirmed).await.unwrap().unwrap();
        assert_eq!(booking.status(), BookingStatus::Confirmed);
        assert_eq!(f.db.find_event(event_id).await.unwrap().unwrap().remaining(), 7);

        // 2回目のスイープでは対象がない
        let report = f.sweeper.sweep_once(later).await.unwrap();
        assert_eq!(report.examined, 0);
    }

    #[tokio::test]
    async fn test_start_and_stop() {
        let f = fixture(Duration::from_millis(10));
        let handle = f.sweeper.clone().start();
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.stop().await;
    }
}
