use crate::adapter::database_config::{parse_env, ConfigError};
use crate::application::service::BookingSettings;
use std::env;
use std::net::SocketAddr;
use std::time::Duration;

/// 予約処理と実行環境の設定
#[derive(Debug, Clone)]
pub struct BookingConfig {
    /// PENDINGの予約を自動キャンセルするまでの分数
    pub auto_cancel_minutes: u64,
    /// スイーパーの実行間隔（秒）
    pub sweeper_interval_seconds: u64,
    /// 確定ポリシーの承認率（0〜100%）
    pub payment_approval_rate: u8,
    /// キャッシュで仮予約してからストアで予約するかどうか
    pub speculative_precheck: bool,
    /// Redisの接続URL（未設定ならプロセス内キャッシュを使う）
    pub redis_url: Option<String>,
    /// HTTPサーバーの待ち受けアドレス
    pub http_bind: SocketAddr,
    /// 通知キューの容量
    pub notification_queue_capacity: usize,
}

impl BookingConfig {
    /// 環境変数から設定を読み取る
    /// 環境変数が設定されていない場合はデフォルト値を使用
    pub fn from_env() -> Result<Self, ConfigError> {
        let auto_cancel_minutes = parse_env::<u64>("BOOKING_AUTO_CANCEL_MINUTES", "15")?;
        let sweeper_interval_seconds = parse_env::<u64>("SWEEPER_INTERVAL_SECONDS", "60")?;
        let payment_approval_rate = parse_env::<u8>("PAYMENT_APPROVAL_RATE", "100")?;
        let speculative_precheck = parse_env::<bool>("BOOKING_SPECULATIVE_PRECHECK", "false")?;
        let redis_url = env::var("REDIS_URL").ok().filter(|url| !url.trim().is_empty());
        let http_bind = parse_env::<SocketAddr>("HTTP_BIND", "0.0.0.0:8080")?;
        let notification_queue_capacity =
            parse_env::<usize>("NOTIFICATION_QUEUE_CAPACITY", "1024")?;

        if auto_cancel_minutes == 0 {
            return Err(ConfigError::InvalidValue(
                "BOOKING_AUTO_CANCEL_MINUTES must be at least 1".to_string(),
            ));
        }
        if sweeper_interval_seconds == 0 {
            return Err(ConfigError::InvalidValue(
                "SWEEPER_INTERVAL_SECONDS must be at least 1".to_string(),
            ));
        }
        if payment_approval_rate > 100 {
            return Err(ConfigError::InvalidValue(format!(
                "PAYMENT_APPROVAL_RATE must be between 0 and 100: {}",
                payment_approval_rate
            )));
        }
        if notification_queue_capacity == 0 {
            return Err(ConfigError::InvalidValue(
                "NOTIFICATION_QUEUE_CAPACITY must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            auto_cancel_minutes,
            sweeper_interval_seconds,
            payment_approval_rate,
            speculative_precheck,
            redis_url,
            http_bind,
            notification_queue_capacity,
        })
    }

    pub fn auto_cancel_window(&self) -> Duration {
        Duration::from_secs(self.auto_cancel_minutes.saturating_mul(60))
    }

    pub fn sweeper_interval(&self) -> Duration {
        Duration::from_secs(self.sweeper_interval_seconds)
    }

    /// アプリケーション層の設定へ変換
    pub fn booking_settings(&self) -> BookingSettings {
        BookingSettings {
            auto_cancel_window: self.auto_cancel_window(),
            speculative_precheck: self.speculative_precheck,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::ENV_LOCK;

    const VARS: [&str; 7] = [
        "BOOKING_AUTO_CANCEL_MINUTES",
        "SWEEPER_INTERVAL_SECONDS",
        "PAYMENT_APPROVAL_RATE",
        "BOOKING_SPECULATIVE_PRECHECK",
        "REDIS_URL",
        "HTTP_BIND",
        "NOTIFICATION_QUEUE_CAPACITY",
    ];

    fn clear_vars() {
        for name in VARS {
            env::remove_var(name);
        }
    }

    #[test]
    fn test_from_env_with_defaults() {
        let _lock = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        clear_vars();

        let config = BookingConfig::from_env().unwrap();

        assert_eq!(config.auto_cancel_window(), Duration::from_secs(15 * 60));
        assert_eq!(config.sweeper_interval(), Duration::from_secs(60));
        assert_eq!(config.payment_approval_rate, 100);
        assert!(!config.speculative_precheck);
        assert!(config.redis_url.is_none());
        assert_eq!(config.http_bind.port(), 8080);
        assert_eq!(config.notification_queue_capacity, 1024);
    }

    #[test]
    fn test_from_env_with_all_variables() {
        let _lock = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        clear_vars();

        env::set_var("BOOKING_AUTO_CANCEL_MINUTES", "5");
        env::set_var("SWEEPER_INTERVAL_SECONDS", "10");
        env::set_var("PAYMENT_APPROVAL_RATE", "80");
        env::set_var("BOOKING_SPECULATIVE_PRECHECK", "true");
        env::set_var("REDIS_URL", "redis://127.0.0.1:6379");
        env::set_var("HTTP_BIND", "127.0.0.1:9000");
        env::set_var("NOTIFICATION_QUEUE_CAPACITY", "64");

        let config = BookingConfig::from_env().unwrap();
        let settings = config.booking_settings();

        assert_eq!(settings.auto_cancel_window, Duration::from_secs(300));
        assert!(settings.speculative_precheck);
        assert_eq!(config.sweeper_interval(), Duration::from_secs(10));
        assert_eq!(config.payment_approval_rate, 80);
        assert_eq!(config.redis_url.as_deref(), Some("redis://127.0.0.1:6379"));
        assert_eq!(config.http_bind.to_string(), "127.0.0.1:9000");
        assert_eq!(config.notification_queue_capacity, 64);

        clear_vars();
    }

    #[test]
    fn test_approval_rate_above_hundred_is_rejected() {
        let _lock = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        clear_vars();

        env::set_var("PAYMENT_APPROVAL_RATE", "101");
        assert!(matches!(
            BookingConfig::from_env(),
            Err(ConfigError::InvalidValue(_))
        ));

        clear_vars();
    }

    #[test]
    fn test_invalid_flag_is_rejected() {
        let _lock = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        clear_vars();

        env::set_var("BOOKING_SPECULATIVE_PRECHECK", "yes");
        assert!(BookingConfig::from_env().is_err());

        clear_vars();
    }
}
