use super::mysql_rows::{booking_from_row, BOOKING_COLUMNS};
use crate::adapter::database_error::DatabaseError;
use crate::domain::model::{Booking, BookingId, EventId, EventStats, Money};
use crate::domain::port::{BookingLedger, RepositoryError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{MySql, Pool, Row};

/// MySQL予約台帳
/// 予約の参照と集計を行う。書き込みはトランザクション側で行う
pub struct MySqlBookingLedger {
    pool: Pool<MySql>,
}

impl MySqlBookingLedger {
    pub fn new(pool: Pool<MySql>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BookingLedger for MySqlBookingLedger {
    async fn find_by_id(&self, booking_id: BookingId) -> Result<Option<Booking>, RepositoryError> {
        let sql = format!("SELECT {} FROM bookings WHERE id = ?", BOOKING_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(booking_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| DatabaseError::classify("予約の検索に失敗しました", e))
            .map_err(RepositoryError::from)?;

        row.as_ref().map(booking_from_row).transpose()
    }

    async fn find_pending_older_than(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Booking>, RepositoryError> {
        let sql = format!(
            "SELECT {} FROM bookings WHERE status = 'PENDING' AND created_at < ? \
             ORDER BY created_at ASC",
            BOOKING_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(cutoff)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| DatabaseError::classify("保留中の予約の検索に失敗しました", e))
            .map_err(RepositoryError::from)?;

        rows.iter().map(booking_from_row).collect()
    }

    async fn confirmed_stats(&self, event_id: EventId) -> Result<EventStats, RepositoryError> {
        let row = sqlx::query(
            r#"
            SELECT
                CAST(COALESCE(SUM(quantity), 0) AS SIGNED) AS tickets_sold,
                CAST(COALESCE(SUM(quantity * unit_price), 0) AS SIGNED) AS revenue
            FROM bookings
            WHERE event_id = ? AND status = 'CONFIRMED'
            "#,
        )
        .bind(event_id.to_string())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| DatabaseError::classify("販売実績の集計に失敗しました", e))
        .map_err(RepositoryError::from)?;

        let tickets_sold: i64 = row.get("tickets_sold");
        let revenue: i64 = row.get("revenue");

        let tickets_sold = u64::try_from(tickets_sold).map_err(|_| {
            RepositoryError::InvariantViolation(format!(
                "イベント {} の販売枚数が負です: {}",
                event_id, tickets_sold
            ))
        })?;
        let revenue = Money::from_minor(revenue).map_err(|e| {
            RepositoryError::InvariantViolation(format!(
                "イベント {} の売上が不正です: {}",
                event_id, e
            ))
        })?;

        Ok(EventStats {
            tickets_sold,
            revenue,
        })
    }

    fn next_identity(&self) -> BookingId {
        BookingId::new()
    }
}
