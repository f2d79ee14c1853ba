use crate::domain::error::DomainError;
use crate::domain::model::{Booking, BookingId, BookingStatus, Event, EventId, EventStats};
use serde::{Deserialize, Serialize};

/// 予約作成のレスポンスDTO
#[derive(Serialize, Deserialize)]
pub struct CreateBookingResponse {
    pub booking_id: String,
    pub status: String,
}

/// 予約詳細のレスポンスDTO
#[derive(Serialize, Deserialize)]
pub struct BookingResponse {
    pub booking_id: String,
    pub holder_id: String,
    pub event_id: String,
    pub quantity: u32,
    pub unit_price: i64,
    pub total: i64,
    pub status: String,
    pub created_at: String,
    pub updated_at: String,
}

/// 確定・キャンセルのレスポンスDTO
/// `changed` が false の場合は既に目的の状態だった
#[derive(Serialize, Deserialize)]
pub struct TransitionResponse {
    pub booking_id: String,
    pub status: String,
    pub changed: bool,
}

/// イベントのレスポンスDTO
#[derive(Serialize, Deserialize)]
pub struct EventResponse {
    pub event_id: String,
    pub name: String,
    pub starts_at: String,
    pub ends_at: String,
    pub capacity: u32,
    pub remaining: u32,
    pub sold: u32,
    pub unit_price: i64,
    pub created_at: String,
    pub updated_at: String,
}

/// 残席数のレスポンスDTO
#[derive(Serialize, Deserialize)]
pub struct RemainingSeatsResponse {
    pub event_id: String,
    pub remaining: u32,
}

/// 販売統計のレスポンスDTO
#[derive(Serialize, Deserialize)]
pub struct EventStatsResponse {
    pub event_id: String,
    pub tickets_sold: u64,
    pub revenue: i64,
}

impl BookingResponse {
    /// ドメインオブジェクトからBookingResponseを作成
    pub fn from_booking(booking: &Booking) -> Result<Self, DomainError> {
        Ok(Self {
            booking_id: booking.id().to_string(),
            holder_id: booking.holder_id().to_string(),
            event_id: booking.event_id().to_string(),
            quantity: booking.quantity(),
            unit_price: booking.unit_price().amount(),
            total: booking.total()?.amount(),
            status: booking.status().to_string(),
            created_at: booking.created_at().to_rfc3339(),
            updated_at: booking.updated_at().to_rfc3339(),
        })
    }
}

impl TransitionResponse {
    pub fn new(booking_id: BookingId, status: BookingStatus, changed: bool) -> Self {
        Self {
            booking_id: booking_id.to_string(),
            status: status.to_string(),
            changed,
        }
    }
}

impl EventResponse {
    /// ドメインオブジェクトからEventResponseを作成
    pub fn from_event(event: &Event) -> Self {
        Self {
            event_id: event.id().to_string(),
            name: event.name().to_string(),
            starts_at: event.starts_at().to_rfc3339(),
            ends_at: event.ends_at().to_rfc3339(),
            capacity: event.capacity(),
            remaining: event.remaining(),
            sold: event.sold(),
            unit_price: event.unit_price().amount(),
            created_at: event.created_at().to_rfc3339(),
            updated_at: event.updated_at().to_rfc3339(),
        }
    }
}

impl EventStatsResponse {
    pub fn new(event_id: EventId, stats: &EventStats) -> Self {
        Self {
            event_id: event_id.to_string(),
            tickets_sold: stats.tickets_sold,
            revenue: stats.revenue.amount(),
        }
    }
}
