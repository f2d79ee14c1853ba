use chrono::{DateTime, Utc};

use crate::domain::error::DomainError;
use crate::domain::model::{BookingId, BookingStatus, EventId, HolderId, Money, StatusChange};

/// Booking集約
/// 予約のライフサイクルを管理する。削除はせず、ステータスで論理的に終了させる
#[derive(Debug, Clone, PartialEq)]
pub struct Booking {
    id: BookingId,
    event_id: EventId,
    holder_id: HolderId,
    quantity: u32,
    unit_price: Money,
    status: BookingStatus,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Booking {
    /// 新しい予約を作成
    /// 初期ステータスはPending。単価は作成時点のイベント単価を固定する
    pub fn new(
        id: BookingId,
        event_id: EventId,
        holder_id: HolderId,
        quantity: u32,
        unit_price: Money,
        now: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        if quantity == 0 {
            return Err(DomainError::InvalidQuantity);
        }

        Ok(Self {
            id,
            event_id,
            holder_id,
            quantity,
            unit_price,
            status: BookingStatus::Pending,
            created_at: now,
            updated_at: now,
        })
    }

    /// データベースから取得したデータで予約を再構築
    /// リポジトリでの使用を想定
    #[allow(clippy::too_many_arguments)]
    pub fn reconstruct(
        id: BookingId,
        event_id: EventId,
        holder_id: HolderId,
        quantity: u32,
        unit_price: Money,
        status: BookingStatus,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        if quantity == 0 {
            return Err(DomainError::InvalidQuantity);
        }

        Ok(Self {
            id,
            event_id,
            holder_id,
            quantity,
            unit_price,
            status,
            created_at,
            updated_at,
        })
    }

    pub fn id(&self) -> BookingId {
        self.id
    }

    pub fn event_id(&self) -> EventId {
        self.event_id
    }

    pub fn holder_id(&self) -> HolderId {
        self.holder_id
    }

    pub fn quantity(&self) -> u32 {
        self.quantity
    }

    pub fn unit_price(&self) -> Money {
        self.unit_price
    }

    pub fn status(&self) -> BookingStatus {
        self.status
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// 合計金額（単価 × 枚数）
    pub fn total(&self) -> Result<Money, DomainError> {
        self.unit_price.multiply(self.quantity)
    }

    /// 予約を確定
    /// 既にConfirmedなら何もしない（冪等）
    pub fn confirm(&mut self, now: DateTime<Utc>) -> Result<StatusChange, DomainError> {
        self.transition(BookingStatus::Confirmed, now)
    }

    /// 予約をキャンセル
    /// 既にCancelledなら何もしない（冪等）
    pub fn cancel(&mut self, now: DateTime<Utc>) -> Result<StatusChange, DomainError> {
        self.transition(BookingStatus::Cancelled, now)
    }

    /// 作成から指定日時までに保留期限を過ぎたかどうか
    pub fn is_stale(&self, cutoff: DateTime<Utc>) -> bool {
        self.status == BookingStatus::Pending && self.created_at < cutoff
    }

    fn transition(
        &mut self,
        target: BookingStatus,
        now: DateTime<Utc>,
    ) -> Result<StatusChange, DomainError> {
        let change = self.status.transition_to(target)?;
        if change == StatusChange::Applied {
            self.status = target;
            self.updated_at = now;
        }
        Ok(change)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn pending_booking(quantity: u32) -> Booking {
        Booking::new(
            BookingId::new(),
            EventId::new(),
            HolderId::new(),
            quantity,
            Money::from_minor(1500).unwrap(),
            Utc::now(),
        )
        .unwrap()
    }

    #[test]
    fn test_new_booking_has_pending_status() {
        let booking = pending_booking(2);
        assert_eq!(booking.status(), BookingStatus::Pending);
        assert_eq!(booking.total().unwrap().amount(), 3000);
    }

    #[test]
    fn test_zero_quantity_is_rejected() {
        let result = Booking::new(
            BookingId::new(),
            EventId::new(),
            HolderId::new(),
            0,
            Money::zero(),
            Utc::now(),
        );
        assert_eq!(result.unwrap_err(), DomainError::InvalidQuantity);
    }

    #[test]
    fn test_confirm_twice_is_idempotent() {
        let mut booking = pending_booking(1);
        assert_eq!(booking.confirm(Utc::now()).unwrap(), StatusChange::Applied);
        let updated_at = booking.updated_at();

        assert_eq!(booking.confirm(Utc::now()).unwrap(), StatusChange::Unchanged);
        assert_eq!(booking.status(), BookingStatus::Confirmed);
        assert_eq!(booking.updated_at(), updated_at);
    }

    #[test]
    fn test_cancel_twice_is_idempotent() {
        let mut booking = pending_booking(3);
        assert_eq!(booking.cancel(Utc::now()).unwrap(), StatusChange::Applied);
        assert_eq!(booking.cancel(Utc::now()).unwrap(), StatusChange::Unchanged);
        assert_eq!(booking.status(), BookingStatus::Cancelled);
    }

    #[test]
    fn test_cancel_after_confirm_is_rejected() {
        let mut booking = pending_booking(1);
        booking.confirm(Utc::now()).unwrap();

        let result = booking.cancel(Utc::now());
        assert!(matches!(result, Err(DomainError::InvalidTransition(_))));
        assert_eq!(booking.status(), BookingStatus::Confirmed);
    }

    #[test]
    fn test_is_stale() {
        let booking = pending_booking(1);
        assert!(booking.is_stale(Utc::now() + Duration::minutes(1)));
        assert!(!booking.is_stale(booking.created_at() - Duration::minutes(1)));
    }
}
