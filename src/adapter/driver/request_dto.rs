use crate::application::service::{EventChanges, NewEvent, MAX_PAGE_LIMIT};
use crate::domain::error::DomainError;
use crate::domain::model::Money;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 予約作成用のリクエストDTO
/// 保有者の認証は外部で行われる前提で、IDはリクエストから受け取る
#[derive(Serialize, Deserialize)]
pub struct CreateBookingRequest {
    pub holder_id: Uuid,
    pub event_id: Uuid,
    pub quantity: u32,
}

/// イベント登録用のリクエストDTO
#[derive(Serialize, Deserialize)]
pub struct CreateEventRequest {
    pub name: String,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub capacity: u32,
    pub unit_price: i64, // 最小通貨単位
}

/// イベント変更用のリクエストDTO
/// 省略した項目は変更しない。開催期間は開始と終了をそろえて指定する
#[derive(Serialize, Deserialize, Default)]
pub struct UpdateEventRequest {
    pub name: Option<String>,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
    pub capacity: Option<u32>,
    pub unit_price: Option<i64>,
}

/// イベント一覧のページ指定
/// 不正な値は既定値に丸める
#[derive(Serialize, Deserialize, Default)]
pub struct ListEventsQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// 1ページの既定件数
pub const DEFAULT_PAGE_LIMIT: u32 = 20;

impl ListEventsQuery {
    /// `(limit, offset)` を返す
    pub fn page(&self) -> (u32, u32) {
        let limit = match self.limit {
            Some(limit) if limit > 0 => u32::try_from(limit)
                .unwrap_or(MAX_PAGE_LIMIT)
                .min(MAX_PAGE_LIMIT),
            _ => DEFAULT_PAGE_LIMIT,
        };
        let offset = self
            .offset
            .map(|offset| u32::try_from(offset.max(0)).unwrap_or(u32::MAX))
            .unwrap_or(0);
        (limit, offset)
    }
}

impl CreateEventRequest {
    pub fn into_new_event(self) -> Result<NewEvent, DomainError> {
        Ok(NewEvent {
            name: self.name,
            starts_at: self.starts_at,
            ends_at: self.ends_at,
            capacity: self.capacity,
            unit_price: Money::from_minor(self.unit_price)?,
        })
    }
}

impl UpdateEventRequest {
    pub fn into_changes(self) -> Result<EventChanges, DomainError> {
        let schedule = match (self.starts_at, self.ends_at) {
            (Some(starts_at), Some(ends_at)) => Some((starts_at, ends_at)),
            (None, None) => None,
            _ => {
                return Err(DomainError::InvalidSchedule(
                    "starts_at と ends_at は同時に指定してください".to_string(),
                ))
            }
        };
        let unit_price = self.unit_price.map(Money::from_minor).transpose()?;

        Ok(EventChanges {
            name: self.name,
            schedule,
            capacity: self.capacity,
            unit_price,
        })
    }
}
