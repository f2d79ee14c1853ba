use crate::domain::message::BookingCreated;
use crate::domain::port::ConfirmationPolicy;
use async_trait::async_trait;
use rand::Rng;

/// すべての予約を承認するポリシー
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysApprove;

#[async_trait]
impl ConfirmationPolicy for AlwaysApprove {
    async fn approve(&self, _message: &BookingCreated) -> bool {
        true
    }
}

/// 指定した割合で予約を承認するポリシー
/// 決済ゲートウェイの成功率を模擬する
#[derive(Debug, Clone, Copy)]
pub struct ApprovalRatePolicy {
    approval_rate_percent: u8,
}

impl ApprovalRatePolicy {
    /// 承認率（0〜100%）を指定して作成
    /// 100を超える値は100として扱う
    pub fn new(approval_rate_percent: u8) -> Self {
        Self {
            approval_rate_percent: approval_rate_percent.min(100),
        }
    }

    pub fn approval_rate_percent(&self) -> u8 {
        self.approval_rate_percent
    }
}

#[async_trait]
impl ConfirmationPolicy for ApprovalRatePolicy {
    async fn approve(&self, message: &BookingCreated) -> bool {
        let roll: u8 = rand::thread_rng().gen_range(0..100);
        let approved = roll < self.approval_rate_percent;
        tracing::debug!(
            booking_id = %message.booking_id,
            roll,
            approved,
            "Payment decision"
        );
        approved
    }
}
