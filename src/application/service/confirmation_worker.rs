use super::booking_service::BookingLifecycleService;
use crate::application::ApplicationError;
use crate::domain::message::{BookingCreated, MessageError};
use crate::domain::model::BookingStatus;
use crate::domain::port::{log_context, ConfirmationPolicy, Logger};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};

const COMPONENT: &str = "ConfirmationWorker";

/// 確定ワーカーのエラー
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    /// 通知ペイロードが不正（何も変更していない）
    #[error(transparent)]
    Message(#[from] MessageError),
    /// 確定にもキャンセルにも失敗した
    #[error(transparent)]
    Application(#[from] ApplicationError),
}

/// 確定ワーカー
/// 予約作成通知を受け取り、確定ポリシーに従ってPENDINGの予約を確定またはキャンセルする。
/// 通知は少なくとも1回配送されるため、処理は冪等である
pub struct ConfirmationWorker {
    bookings: Arc<BookingLifecycleService>,
    policy: Arc<dyn ConfirmationPolicy>,
    logger: Arc<dyn Logger>,
}

impl ConfirmationWorker {
    pub fn new(
        bookings: Arc<BookingLifecycleService>,
        policy: Arc<dyn ConfirmationPolicy>,
        logger: Arc<dyn Logger>,
    ) -> Self {
        Self {
            bookings,
            policy,
            logger,
        }
    }

    /// 通知を1件処理する
    ///
    /// # Returns
    /// * `Ok(BookingStatus)` - 処理後の予約ステータス
    /// * `Err(WorkerError::Message)` - ペイロードが不正
    /// * `Err(WorkerError::Application)` - 確定もキャンセルもできなかった
    pub async fn handle_notification(&self, payload: &[u8]) -> Result<BookingStatus, WorkerError> {
        let message = BookingCreated::from_payload(payload)?;
        let booking_id = message.booking_id;

        let status = if self.policy.approve(&message).await {
            match self.bookings.confirm_booking(booking_id).await {
                Ok(_) => BookingStatus::Confirmed,
                Err(e) => {
                    self.logger.warn(
                        COMPONENT,
                        "Confirmation failed, cancelling booking",
                        None,
                        log_context([
                            ("booking_id", booking_id.to_string()),
                            ("error", e.to_string()),
                        ]),
                    );
                    self.bookings.cancel_booking(booking_id).await?;
                    BookingStatus::Cancelled
                }
            }
        } else {
            self.logger.info(
                COMPONENT,
                "Payment declined, cancelling booking",
                None,
                log_context([("booking_id", booking_id.to_string())]),
            );
            self.bookings.cancel_booking(booking_id).await?;
            BookingStatus::Cancelled
        };

        self.bookings.clear_pending_marker(booking_id).await;
        Ok(status)
    }

    /// 通知を受信し続ける
    /// チャネルが閉じるか停止シグナルを受けると終了する
    pub async fn run(
        self: Arc<Self>,
        mut receiver: mpsc::Receiver<Vec<u8>>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        self.logger.info(COMPONENT, "Confirmation worker started", None, None);

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                payload = receiver.recv() => {
                    let Some(payload) = payload else {
                        break;
                    };
                    if let Err(e) = self.handle_notification(&payload).await {
                        self.logger.error(
                            COMPONENT,
                            "Failed to handle booking notification",
                            None,
                            log_context([("error", e.to_string())]),
                        );
                    }
                }
            }
        }

        self.logger.info(COMPONENT, "Confirmation worker stopped", None, None);
    }
}
