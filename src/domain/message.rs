use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::model::{Booking, BookingId, EventId, HolderId};

/// 予約作成通知のトピック名
pub const BOOKING_CREATED_TOPIC: &str = "booking.created";

/// メッセージのシリアライゼーションエラー
#[derive(Debug, Error, Clone, PartialEq)]
pub enum MessageError {
    #[error("JSON serialization failed: {0}")]
    SerializationFailed(String),

    #[error("JSON deserialization failed: {message}. Input: {input_preview}")]
    DeserializationFailed {
        message: String,
        input_preview: String,
    },

    #[error("Invalid field value: {field_name}. Reason: {reason}")]
    InvalidFieldValue { field_name: String, reason: String },
}

impl MessageError {
    /// 入力データのプレビューを生成（デバッグ用、最大100文字）
    fn create_input_preview(input: &[u8]) -> String {
        let text = String::from_utf8_lossy(input);
        if text.chars().count() <= 100 {
            text.into_owned()
        } else {
            format!("{}...", text.chars().take(97).collect::<String>())
        }
    }
}

/// 予約作成通知
/// コミット済みの予約を非同期の確定処理へ引き渡す。少なくとも1回配送される
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingCreated {
    pub booking_id: BookingId,
    pub holder_id: HolderId,
    pub event_id: EventId,
    pub quantity: u32,
}

impl BookingCreated {
    /// 予約から通知を作成
    pub fn from_booking(booking: &Booking) -> Self {
        Self {
            booking_id: booking.id(),
            holder_id: booking.holder_id(),
            event_id: booking.event_id(),
            quantity: booking.quantity(),
        }
    }

    /// JSONペイロードへ変換
    pub fn to_payload(&self) -> Result<Vec<u8>, MessageError> {
        serde_json::to_vec(self).map_err(|e| MessageError::SerializationFailed(e.to_string()))
    }

    /// JSONペイロードから復元
    /// 枚数0の通知は不正として扱う
    pub fn from_payload(payload: &[u8]) -> Result<Self, MessageError> {
        let message: Self =
            serde_json::from_slice(payload).map_err(|e| MessageError::DeserializationFailed {
                message: e.to_string(),
                input_preview: MessageError::create_input_preview(payload),
            })?;

        if message.quantity == 0 {
            return Err(MessageError::InvalidFieldValue {
                field_name: "quantity".to_string(),
                reason: "枚数は1以上である必要があります".to_string(),
            });
        }

        Ok(message)
    }
}
