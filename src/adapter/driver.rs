// 駆動する側アダプター（REST API、メトリクス）

pub mod request_dto;
pub mod response_dto;
pub mod rest_api;
pub mod sales_metrics;

pub use rest_api::{create_router, AppState};
pub use sales_metrics::SalesMetrics;
