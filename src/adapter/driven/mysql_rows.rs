// MySQLの行からドメインオブジェクトを再構築する共通処理

use crate::domain::error::DomainError;
use crate::domain::model::{
    Booking, BookingId, BookingStatus, Event, EventId, HolderId, Money,
};
use crate::domain::port::RepositoryError;
use sqlx::mysql::MySqlRow;
use sqlx::Row;

pub(super) const EVENT_COLUMNS: &str =
    "id, name, starts_at, ends_at, capacity, remaining, unit_price, created_at, updated_at";

pub(super) const BOOKING_COLUMNS: &str =
    "id, holder_id, event_id, quantity, unit_price, status, created_at, updated_at";

/// 再構築時のドメインエラーを変換する
/// 不変条件違反は再試行しても解消しないため区別して返す
fn reconstruct_error(what: &str, err: DomainError) -> RepositoryError {
    match err {
        DomainError::InvariantViolation(msg) => RepositoryError::InvariantViolation(msg),
        other => RepositoryError::FetchFailed(format!("{}の再構築に失敗しました: {}", what, other)),
    }
}

fn column<'r, T>(row: &'r MySqlRow, name: &str) -> Result<T, RepositoryError>
where
    T: sqlx::Decode<'r, sqlx::MySql> + sqlx::Type<sqlx::MySql>,
{
    row.try_get(name).map_err(|e| {
        RepositoryError::FetchFailed(format!("列 {} の取得に失敗しました: {}", name, e))
    })
}

pub(super) fn event_from_row(row: &MySqlRow) -> Result<Event, RepositoryError> {
    let id_str: String = column(row, "id")?;
    let id = EventId::from_string(&id_str).map_err(|e| {
        RepositoryError::FetchFailed(format!("イベントIDの解析に失敗しました: {}", e))
    })?;
    let unit_price = Money::from_minor(column(row, "unit_price")?)
        .map_err(|e| reconstruct_error("単価", e))?;

    Event::reconstruct(
        id,
        column(row, "name")?,
        column(row, "starts_at")?,
        column(row, "ends_at")?,
        column(row, "capacity")?,
        column(row, "remaining")?,
        unit_price,
        column(row, "created_at")?,
        column(row, "updated_at")?,
    )
    .map_err(|e| reconstruct_error("イベント", e))
}

pub(super) fn booking_from_row(row: &MySqlRow) -> Result<Booking, RepositoryError> {
    let id_str: String = column(row, "id")?;
    let id = BookingId::from_string(&id_str).map_err(|e| {
        RepositoryError::FetchFailed(format!("予約IDの解析に失敗しました: {}", e))
    })?;
    let holder_str: String = column(row, "holder_id")?;
    let holder_id = HolderId::from_string(&holder_str).map_err(|e| {
        RepositoryError::FetchFailed(format!("保有者IDの解析に失敗しました: {}", e))
    })?;
    let event_str: String = column(row, "event_id")?;
    let event_id = EventId::from_string(&event_str).map_err(|e| {
        RepositoryError::FetchFailed(format!("イベントIDの解析に失敗しました: {}", e))
    })?;
    let status_str: String = column(row, "status")?;
    let status = BookingStatus::from_string(&status_str).map_err(|e| {
        RepositoryError::FetchFailed(format!("予約ステータスの解析に失敗しました: {}", e))
    })?;
    let unit_price = Money::from_minor(column(row, "unit_price")?)
        .map_err(|e| reconstruct_error("単価", e))?;

    Booking::reconstruct(
        id,
        event_id,
        holder_id,
        column(row, "quantity")?,
        unit_price,
        status,
        column(row, "created_at")?,
        column(row, "updated_at")?,
    )
    .map_err(|e| reconstruct_error("予約", e))
}
