// Prometheus形式の販売メトリクス
// イベントごとの販売枚数と売上をゲージとして公開する

use crate::application::service::EventCatalogService;
use crate::application::ApplicationError;
use crate::domain::model::{EventId, EventStats};
use metrics::{describe_gauge, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle, PrometheusRecorder};
use std::sync::Arc;

pub const TICKETS_SOLD_METRIC: &str = "tickets_sold_total";
pub const REVENUE_METRIC: &str = "revenue_total";

/// 売上の最小単位から主単位への換算
const MINOR_UNITS_PER_MAJOR: f64 = 100.0;

/// 販売メトリクス
/// グローバルなレコーダーは使わず、自前のPrometheusレコーダーに記録する
pub struct SalesMetrics {
    catalog: Arc<EventCatalogService>,
    recorder: PrometheusRecorder,
    handle: PrometheusHandle,
}

impl SalesMetrics {
    pub fn new(catalog: Arc<EventCatalogService>) -> Self {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();

        metrics::with_local_recorder(&recorder, || {
            describe_gauge!(TICKETS_SOLD_METRIC, "Total tickets sold per event");
            describe_gauge!(
                REVENUE_METRIC,
                "Total revenue from confirmed bookings per event"
            );
        });

        Self {
            catalog,
            recorder,
            handle,
        }
    }

    /// 全イベントの統計を読み直してゲージを更新する
    /// 統計を取得できなかったイベントは前回の値のまま残す
    ///
    /// # Returns
    /// * `Ok(usize)` - 更新したイベント数
    pub async fn refresh(&self) -> Result<usize, ApplicationError> {
        let events = self.catalog.list_events().await?;

        let mut updated = 0;
        for event in events {
            match self.catalog.stats(event.id()).await {
                Ok(stats) => {
                    self.record(event.id(), &stats);
                    updated += 1;
                }
                Err(e) => {
                    tracing::warn!(event_id = %event.id(), error = %e, "Failed to read stats for metrics");
                }
            }
        }
        Ok(updated)
    }

    /// ゲージを更新してPrometheusのテキスト形式で出力する
    pub async fn render(&self) -> Result<String, ApplicationError> {
        self.refresh().await?;
        Ok(self.handle.render())
    }

    fn record(&self, event_id: EventId, stats: &EventStats) {
        let label = event_id.to_string();
        let revenue = stats.revenue.amount() as f64 / MINOR_UNITS_PER_MAJOR;

        metrics::with_local_recorder(&self.recorder, || {
            gauge!(TICKETS_SOLD_METRIC, "event_id" => label.clone()).set(stats.tickets_sold as f64);
            gauge!(REVENUE_METRIC, "event_id" => label).set(revenue);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::driven::{
        InMemoryDatabase, InMemoryInventoryCache, InMemoryNotificationBus, NoopLogger,
    };
    use crate::application::service::{
        BookingLifecycleService, BookingSettings, NewEvent, ReservationCoordinator,
    };
    use crate::domain::model::{HolderId, Money};
    use crate::domain::port::Logger;
    use chrono::{Duration, Utc};

    fn services() -> (BookingLifecycleService, Arc<EventCatalogService>) {
        let db = Arc::new(InMemoryDatabase::new());
        let cache = Arc::new(InMemoryInventoryCache::new());
        let (bus, _receiver) = InMemoryNotificationBus::new(16);
        let logger: Arc<dyn Logger> = Arc::new(NoopLogger);
        let coordinator = Arc::new(ReservationCoordinator::new(
            db.clone(),
            cache.clone(),
            logger.clone(),
        ));
        let bookings = BookingLifecycleService::new(
            db.clone(),
            db.clone(),
            cache.clone(),
            Arc::new(bus),
            coordinator.clone(),
            logger.clone(),
            BookingSettings::default(),
        );
        let catalog = Arc::new(EventCatalogService::new(
            db.clone(),
            db,
            cache,
            coordinator,
            logger,
        ));
        (bookings, catalog)
    }

    #[tokio::test]
    async fn test_render_exposes_confirmed_sales_per_event() {
        let (bookings, catalog) = services();
        let starts_at = Utc::now() + Duration::days(5);
        let event = catalog
            .create_event(NewEvent {
                name: "Ballet".to_string(),
                starts_at,
                ends_at: starts_at + Duration::hours(2),
                capacity: 20,
                unit_price: Money::from_minor(2550).unwrap(),
            })
            .await
            .unwrap();
        let confirmed = bookings.create_booking(HolderId::new(), event.id(), 2).await.unwrap();
        bookings.confirm_booking(confirmed).await.unwrap();
        bookings.create_booking(HolderId::new(), event.id(), 5).await.unwrap();

        let metrics = SalesMetrics::new(catalog);
        let body = metrics.render().await.unwrap();

        let label = format!("{{event_id=\"{}\"}}", event.id());
        assert_eq!(sample(&body, TICKETS_SOLD_METRIC, &label), Some(2.0));
        assert_eq!(sample(&body, REVENUE_METRIC, &label), Some(51.0));
    }

    // 指定したメトリクス行の値を取り出す
    fn sample(body: &str, name: &str, label: &str) -> Option<f64> {
        let prefix = format!("{}{} ", name, label);
        body.lines()
            .find_map(|line| line.strip_prefix(prefix.as_str()))
            .and_then(|value| value.trim().parse().ok())
    }

    #[tokio::test]
    async fn test_refresh_without_events() {
        let (_bookings, catalog) = services();
        let metrics = SalesMetrics::new(catalog);

        assert_eq!(metrics.refresh().await.unwrap(), 0);
    }
}
