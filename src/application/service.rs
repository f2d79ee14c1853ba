// アプリケーションサービス
// ユースケースごとにドメインモデルとポートを組み合わせる

mod booking_service;
mod confirmation_worker;
mod event_catalog;
mod reservation;
mod sweeper;

pub use booking_service::{BookingLifecycleService, BookingSettings, TransitionOutcome};
pub use confirmation_worker::{ConfirmationWorker, WorkerError};
pub use event_catalog::{EventChanges, EventCatalogService, NewEvent, MAX_PAGE_LIMIT};
pub use reservation::{ReservationCoordinator, SpeculativeOutcome};
pub use sweeper::{StaleReservationSweeper, SweepReport, SweeperHandle};

use crate::domain::port::{log_context, Logger, StoreTransaction};

/// トランザクションをロールバックする
/// 元のエラーを優先して返すため、ロールバック自体の失敗はログに残すだけにする
async fn rollback_quietly(tx: Box<dyn StoreTransaction>, logger: &dyn Logger, component: &str) {
    if let Err(e) = tx.rollback().await {
        logger.warn(
            component,
            "Rollback failed",
            None,
            log_context([("error", e.to_string())]),
        );
    }
}
