use crate::domain::message::{BookingCreated, BOOKING_CREATED_TOPIC};
use crate::domain::port::{NotificationBus, NotificationError};
use async_trait::async_trait;
use tokio::sync::mpsc::{self, error::TrySendError};

/// インメモリ通知バス実装
/// 有界のmpscチャネルでJSONペイロードを確定ワーカーへ渡す。
/// 発行は待たない。キューが満杯なら即座に配送失敗とし、残った予約はスイーパーが回収する
pub struct InMemoryNotificationBus {
    sender: mpsc::Sender<Vec<u8>>,
}

impl InMemoryNotificationBus {
    /// 指定した容量でバスを作成し、受信側を返す
    ///
    /// # Arguments
    /// * `capacity` - キューに保持できる通知の最大数
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<Vec<u8>>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl NotificationBus for InMemoryNotificationBus {
    async fn publish(&self, message: &BookingCreated) -> Result<(), NotificationError> {
        let payload = message.to_payload()?;

        self.sender
            .try_send(payload)
            .map_err(|e| match e {
                TrySendError::Full(_) => NotificationError::DeliveryFailed(format!(
                    "{} queue is full",
                    BOOKING_CREATED_TOPIC
                )),
                TrySendError::Closed(_) => NotificationError::DeliveryFailed(format!(
                    "{} consumer has stopped",
                    BOOKING_CREATED_TOPIC
                )),
            })?;

        tracing::debug!(
            topic = BOOKING_CREATED_TOPIC,
            booking_id = %message.booking_id,
            "Published booking notification"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::{BookingId, EventId, HolderId};

    fn sample_message() -> BookingCreated {
        BookingCreated {
            booking_id: BookingId::new(),
            holder_id: HolderId::new(),
            event_id: EventId::new(),
            quantity: 2,
        }
    }

    #[tokio::test]
    async fn test_published_payload_reaches_receiver() {
        let (bus, mut receiver) = InMemoryNotificationBus::new(4);
        let message = sample_message();

        bus.publish(&message).await.unwrap();

        let payload = receiver.recv().await.unwrap();
        assert_eq!(BookingCreated::from_payload(&payload).unwrap(), message);
    }

    #[tokio::test]
    async fn test_publish_fails_when_consumer_is_gone() {
        let (bus, receiver) = InMemoryNotificationBus::new(4);
        drop(receiver);

        let result = bus.publish(&sample_message()).await;
        assert!(matches!(result, Err(NotificationError::DeliveryFailed(_))));
    }

    #[tokio::test]
    async fn test_publish_fails_immediately_when_queue_is_full() {
        let (bus, mut receiver) = InMemoryNotificationBus::new(1);

        bus.publish(&sample_message()).await.unwrap();
        let result = bus.publish(&sample_message()).await;
        assert!(matches!(result, Err(NotificationError::DeliveryFailed(_))));

        // 空きができれば再び発行できる
        receiver.recv().await.unwrap();
        bus.publish(&sample_message()).await.unwrap();
    }
}
