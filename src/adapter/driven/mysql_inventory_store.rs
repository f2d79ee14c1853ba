use super::mysql_rows::{booking_from_row, event_from_row, BOOKING_COLUMNS, EVENT_COLUMNS};
use crate::adapter::database_error::DatabaseError;
use crate::domain::model::{Booking, BookingId, Event, EventId};
use crate::domain::port::{InventoryStore, RepositoryError, StoreTransaction};
use async_trait::async_trait;
use sqlx::{MySql, Pool, Transaction};
use std::time::Duration;

/// MySQL在庫ストア
/// イベント行の `remaining` 列を残席数の正とする
pub struct MySqlInventoryStore {
    pool: Pool<MySql>,
    lock_wait_timeout_seconds: u64,
}

impl MySqlInventoryStore {
    /// 新しいMySQL在庫ストアを作成
    ///
    /// # Arguments
    /// * `pool` - MySQLコネクションプール
    /// * `lock_wait_timeout` - 行ロックの待機上限。1秒未満は1秒に切り上げる
    pub fn new(pool: Pool<MySql>, lock_wait_timeout: Duration) -> Self {
        Self {
            pool,
            lock_wait_timeout_seconds: lock_wait_timeout.as_secs().max(1),
        }
    }
}

#[async_trait]
impl InventoryStore for MySqlInventoryStore {
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, RepositoryError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| DatabaseError::classify("トランザクションの開始に失敗しました", e))
            .map_err(RepositoryError::from)?;

        // 数値のみを埋め込むためプレースホルダーは使わない
        let set_timeout = format!(
            "SET SESSION innodb_lock_wait_timeout = {}",
            self.lock_wait_timeout_seconds
        );
        sqlx::query(&set_timeout)
            .execute(&mut *tx)
            .await
            .map_err(|e| DatabaseError::classify("ロック待機時間の設定に失敗しました", e))
            .map_err(RepositoryError::from)?;

        Ok(Box::new(MySqlStoreTransaction { tx }))
    }

    async fn create_event(&self, event: &Event) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO events
                (id, name, starts_at, ends_at, capacity, remaining, unit_price, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(event.id().to_string())
        .bind(event.name())
        .bind(event.starts_at())
        .bind(event.ends_at())
        .bind(event.capacity())
        .bind(event.remaining())
        .bind(event.unit_price().amount())
        .bind(event.created_at())
        .bind(event.updated_at())
        .execute(&self.pool)
        .await
        .map_err(|e| DatabaseError::classify("イベントの登録に失敗しました", e))
        .map_err(RepositoryError::from)?;

        Ok(())
    }

    async fn find_event(&self, event_id: EventId) -> Result<Option<Event>, RepositoryError> {
        let sql = format!("SELECT {} FROM events WHERE id = ?", EVENT_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(event_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| DatabaseError::classify("イベントの検索に失敗しました", e))
            .map_err(RepositoryError::from)?;

        row.as_ref().map(event_from_row).transpose()
    }

    async fn list_events(&self) -> Result<Vec<Event>, RepositoryError> {
        let sql = format!(
            "SELECT {} FROM events ORDER BY starts_at ASC, id ASC",
            EVENT_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| DatabaseError::classify("イベント一覧の取得に失敗しました", e))
            .map_err(RepositoryError::from)?;

        rows.iter().map(event_from_row).collect()
    }

    async fn list_events_page(
        &self,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Event>, RepositoryError> {
        let sql = format!(
            "SELECT {} FROM events ORDER BY starts_at ASC, id ASC LIMIT ? OFFSET ?",
            EVENT_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| DatabaseError::classify("イベント一覧の取得に失敗しました", e))
            .map_err(RepositoryError::from)?;

        rows.iter().map(event_from_row).collect()
    }
}

/// MySQLのトランザクション
/// `SELECT ... FOR UPDATE` で取得した行ロックはコミットまたはロールバックまで保持される。
/// 破棄された場合はsqlxがロールバックする
pub struct MySqlStoreTransaction {
    tx: Transaction<'static, MySql>,
}

#[async_trait]
impl StoreTransaction for MySqlStoreTransaction {
    async fn lock_event(&mut self, event_id: EventId) -> Result<Option<Event>, RepositoryError> {
        let sql = format!("SELECT {} FROM events WHERE id = ? FOR UPDATE", EVENT_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(event_id.to_string())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| DatabaseError::classify("イベント行のロックに失敗しました", e))
            .map_err(RepositoryError::from)?;

        row.as_ref().map(event_from_row).transpose()
    }

    async fn save_event(&mut self, event: &Event) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            UPDATE events
            SET name = ?, starts_at = ?, ends_at = ?, capacity = ?, remaining = ?,
                unit_price = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(event.name())
        .bind(event.starts_at())
        .bind(event.ends_at())
        .bind(event.capacity())
        .bind(event.remaining())
        .bind(event.unit_price().amount())
        .bind(event.updated_at())
        .bind(event.id().to_string())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| DatabaseError::classify("イベントの更新に失敗しました", e))
        .map_err(RepositoryError::from)?;

        Ok(())
    }

    async fn insert_booking(&mut self, booking: &Booking) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO bookings
                (id, holder_id, event_id, quantity, unit_price, status, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(booking.id().to_string())
        .bind(booking.holder_id().to_string())
        .bind(booking.event_id().to_string())
        .bind(booking.quantity())
        .bind(booking.unit_price().amount())
        .bind(booking.status().to_string())
        .bind(booking.created_at())
        .bind(booking.updated_at())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| DatabaseError::classify("予約の登録に失敗しました", e))
        .map_err(RepositoryError::from)?;

        Ok(())
    }

    async fn lock_booking(
        &mut self,
        booking_id: BookingId,
    ) -> Result<Option<Booking>, RepositoryError> {
        let sql = format!(
            "SELECT {} FROM bookings WHERE id = ? FOR UPDATE",
            BOOKING_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(booking_id.to_string())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| DatabaseError::classify("予約行のロックに失敗しました", e))
            .map_err(RepositoryError::from)?;

        row.as_ref().map(booking_from_row).transpose()
    }

    async fn save_booking_status(&mut self, booking: &Booking) -> Result<(), RepositoryError> {
        sqlx::query("UPDATE bookings SET status = ?, updated_at = ? WHERE id = ?")
            .bind(booking.status().to_string())
            .bind(booking.updated_at())
            .bind(booking.id().to_string())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| DatabaseError::classify("予約ステータスの更新に失敗しました", e))
            .map_err(RepositoryError::from)?;

        Ok(())
    }

    async fn has_bookings(&mut self, event_id: EventId) -> Result<bool, RepositoryError> {
        let found: Option<String> =
            sqlx::query_scalar("SELECT id FROM bookings WHERE event_id = ? LIMIT 1 FOR UPDATE")
                .bind(event_id.to_string())
                .fetch_optional(&mut *self.tx)
                .await
                .map_err(|e| DatabaseError::classify("予約の存在確認に失敗しました", e))
                .map_err(RepositoryError::from)?;

        Ok(found.is_some())
    }

    async fn delete_event(&mut self, event_id: EventId) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM events WHERE id = ?")
            .bind(event_id.to_string())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| DatabaseError::classify("イベントの削除に失敗しました", e))
            .map_err(RepositoryError::from)?;

        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), RepositoryError> {
        let this = *self;
        this.tx
            .commit()
            .await
            .map_err(|e| DatabaseError::classify("コミットに失敗しました", e))
            .map_err(RepositoryError::from)
    }

    async fn rollback(self: Box<Self>) -> Result<(), RepositoryError> {
        let this = *self;
        this.tx
            .rollback()
            .await
            .map_err(|e| DatabaseError::classify("ロールバックに失敗しました", e))
            .map_err(RepositoryError::from)
    }
}
