use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::Json,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::adapter::driver::request_dto::{
    CreateBookingRequest, CreateEventRequest, ListEventsQuery, UpdateEventRequest,
};
use crate::adapter::driver::sales_metrics::SalesMetrics;
use crate::adapter::driver::response_dto::{
    BookingResponse, CreateBookingResponse, EventResponse, EventStatsResponse,
    RemainingSeatsResponse, TransitionResponse,
};
use crate::application::service::{BookingLifecycleService, EventCatalogService, TransitionOutcome};
use crate::application::ApplicationError;
use crate::domain::error::DomainError;
use crate::domain::model::{BookingId, BookingStatus, EventId, HolderId};

#[derive(Serialize, Deserialize)]
pub struct ApiError {
    pub error: String,
    pub code: String,
}

type ApiResult<T> = Result<T, (StatusCode, Json<ApiError>)>;

// アプリケーションサービスを含む状態
#[derive(Clone)]
pub struct AppState {
    pub bookings: Arc<BookingLifecycleService>,
    pub catalog: Arc<EventCatalogService>,
    pub metrics: Arc<SalesMetrics>,
}

// REST APIルーターを作成
pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(render_metrics))
        .route("/bookings", post(create_booking))
        .route("/bookings/:booking_id", get(get_booking))
        .route("/bookings/:booking_id/confirm", post(confirm_booking))
        .route("/bookings/:booking_id/cancel", post(cancel_booking))
        .route("/events", post(create_event).get(list_events))
        .route(
            "/events/:event_id",
            get(get_event).put(update_event).delete(delete_event),
        )
        .route("/events/:event_id/remaining", get(get_remaining_seats))
        .route("/events/:event_id/stats", get(get_event_stats))
}

// ヘルスチェックエンドポイント
async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION")
    }))
}

// 予約作成エンドポイント
async fn create_booking(
    State(state): State<AppState>,
    Json(request): Json<CreateBookingRequest>,
) -> ApiResult<(StatusCode, Json<CreateBookingResponse>)> {
    let booking_id = state
        .bookings
        .create_booking(
            HolderId::from_uuid(request.holder_id),
            EventId::from_uuid(request.event_id),
            request.quantity,
        )
        .await
        .map_err(map_application_error)?;

    Ok((
        StatusCode::CREATED,
        Json(CreateBookingResponse {
            booking_id: booking_id.to_string(),
            status: BookingStatus::Pending.to_string(),
        }),
    ))
}

// 予約詳細取得エンドポイント
async fn get_booking(
    State(state): State<AppState>,
    Path(booking_id): Path<Uuid>,
) -> ApiResult<Json<BookingResponse>> {
    let booking = state
        .bookings
        .get(BookingId::from_uuid(booking_id))
        .await
        .map_err(map_application_error)?
        .ok_or_else(|| {
            not_found(
                "指定された予約が見つかりません",
                "BOOKING_NOT_FOUND",
            )
        })?;

    BookingResponse::from_booking(&booking)
        .map(Json)
        .map_err(map_domain_error)
}

// 予約確定エンドポイント
async fn confirm_booking(
    State(state): State<AppState>,
    Path(booking_id): Path<Uuid>,
) -> ApiResult<Json<TransitionResponse>> {
    let booking_id = BookingId::from_uuid(booking_id);
    let outcome = state
        .bookings
        .confirm_booking(booking_id)
        .await
        .map_err(map_application_error)?;

    Ok(Json(TransitionResponse::new(
        booking_id,
        BookingStatus::Confirmed,
        outcome == TransitionOutcome::Applied,
    )))
}

// 予約キャンセルエンドポイント
async fn cancel_booking(
    State(state): State<AppState>,
    Path(booking_id): Path<Uuid>,
) -> ApiResult<Json<TransitionResponse>> {
    let booking_id = BookingId::from_uuid(booking_id);
    let outcome = state
        .bookings
        .cancel_booking(booking_id)
        .await
        .map_err(map_application_error)?;

    Ok(Json(TransitionResponse::new(
        booking_id,
        BookingStatus::Cancelled,
        outcome == TransitionOutcome::Applied,
    )))
}

// イベント登録エンドポイント
async fn create_event(
    State(state): State<AppState>,
    Json(request): Json<CreateEventRequest>,
) -> ApiResult<(StatusCode, Json<EventResponse>)> {
    let new_event = request.into_new_event().map_err(map_domain_error)?;
    let event = state
        .catalog
        .create_event(new_event)
        .await
        .map_err(map_application_error)?;

    Ok((StatusCode::CREATED, Json(EventResponse::from_event(&event))))
}

// メトリクスエンドポイント（Prometheusのテキスト形式）
async fn render_metrics(
    State(state): State<AppState>,
) -> ApiResult<([(header::HeaderName, &'static str); 1], String)> {
    let body = state
        .metrics
        .render()
        .await
        .map_err(map_application_error)?;

    Ok((
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    ))
}

// イベント一覧取得エンドポイント（limit/offsetでページ指定）
async fn list_events(
    State(state): State<AppState>,
    Query(query): Query<ListEventsQuery>,
) -> ApiResult<Json<Vec<EventResponse>>> {
    let (limit, offset) = query.page();
    let events = state
        .catalog
        .list_events_page(limit, offset)
        .await
        .map_err(map_application_error)?;

    Ok(Json(events.iter().map(EventResponse::from_event).collect()))
}

// イベント詳細取得エンドポイント
async fn get_event(
    State(state): State<AppState>,
    Path(event_id): Path<Uuid>,
) -> ApiResult<Json<EventResponse>> {
    let event = state
        .catalog
        .get_event(EventId::from_uuid(event_id))
        .await
        .map_err(map_application_error)?
        .ok_or_else(|| not_found("指定されたイベントが見つかりません", "EVENT_NOT_FOUND"))?;

    Ok(Json(EventResponse::from_event(&event)))
}

// イベント変更エンドポイント
async fn update_event(
    State(state): State<AppState>,
    Path(event_id): Path<Uuid>,
    Json(request): Json<UpdateEventRequest>,
) -> ApiResult<Json<EventResponse>> {
    let changes = request.into_changes().map_err(map_domain_error)?;
    let event = state
        .catalog
        .update_event(EventId::from_uuid(event_id), changes)
        .await
        .map_err(map_application_error)?;

    Ok(Json(EventResponse::from_event(&event)))
}

// イベント削除エンドポイント
async fn delete_event(
    State(state): State<AppState>,
    Path(event_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    state
        .catalog
        .delete_event(EventId::from_uuid(event_id))
        .await
        .map_err(map_application_error)?;

    Ok(StatusCode::NO_CONTENT)
}

// 残席数取得エンドポイント（キャッシュ優先）
async fn get_remaining_seats(
    State(state): State<AppState>,
    Path(event_id): Path<Uuid>,
) -> ApiResult<Json<RemainingSeatsResponse>> {
    let event_id = EventId::from_uuid(event_id);
    let remaining = state
        .catalog
        .remaining_seats(event_id)
        .await
        .map_err(map_application_error)?;

    Ok(Json(RemainingSeatsResponse {
        event_id: event_id.to_string(),
        remaining,
    }))
}

// 販売統計取得エンドポイント
async fn get_event_stats(
    State(state): State<AppState>,
    Path(event_id): Path<Uuid>,
) -> ApiResult<Json<EventStatsResponse>> {
    let event_id = EventId::from_uuid(event_id);
    let stats = state
        .catalog
        .stats(event_id)
        .await
        .map_err(map_application_error)?;

    Ok(Json(EventStatsResponse::new(event_id, &stats)))
}

fn not_found(message: &str, code: &str) -> (StatusCode, Json<ApiError>) {
    (
        StatusCode::NOT_FOUND,
        Json(ApiError {
            error: message.to_string(),
            code: code.to_string(),
        }),
    )
}

// アプリケーションエラーをHTTPエラーにマッピング
fn map_application_error(err: ApplicationError) -> (StatusCode, Json<ApiError>) {
    match err {
        ApplicationError::CapacityExhausted(msg) => (
            StatusCode::CONFLICT,
            Json(ApiError {
                error: format!("残席が不足しています: {}", msg),
                code: "CAPACITY_EXHAUSTED".to_string(),
            }),
        ),
        ApplicationError::NotFound(msg) => (
            StatusCode::NOT_FOUND,
            Json(ApiError {
                error: msg,
                code: "NOT_FOUND".to_string(),
            }),
        ),
        ApplicationError::Domain(domain_err) => map_domain_error(domain_err),
        ApplicationError::TransientStoreFailure(repo_err) => {
            tracing::warn!(error = %repo_err, "Transient store failure");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ApiError {
                    error: format!("{}", repo_err),
                    code: "TRY_AGAIN".to_string(),
                }),
            )
        }
        ApplicationError::Repository(repo_err) => {
            tracing::error!(error = %repo_err, "Repository failure");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiError {
                    error: format!("{}", repo_err),
                    code: "REPOSITORY_ERROR".to_string(),
                }),
            )
        }
        ApplicationError::InvariantViolation(msg) => {
            tracing::error!(error = %msg, "Invariant violation");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiError {
                    error: msg,
                    code: "INVARIANT_VIOLATION".to_string(),
                }),
            )
        }
    }
}

// ドメインエラーを適切なHTTPステータスコードとエラーコードにマッピング
// 現在の状態と衝突するものは409、入力値の誤りは400
fn map_domain_error(domain_err: DomainError) -> (StatusCode, Json<ApiError>) {
    let (status, code) = match &domain_err {
        DomainError::InvalidTransition(_) => (StatusCode::CONFLICT, "INVALID_TRANSITION"),
        DomainError::InsufficientSeats { .. } => (StatusCode::CONFLICT, "INSUFFICIENT_SEATS"),
        DomainError::CapacityBelowSold { .. } => (StatusCode::CONFLICT, "CAPACITY_BELOW_SOLD"),
        DomainError::EventHasBookings(_) => (StatusCode::CONFLICT, "EVENT_HAS_BOOKINGS"),
        DomainError::InvalidQuantity => (StatusCode::BAD_REQUEST, "INVALID_QUANTITY"),
        DomainError::InvalidSchedule(_) => (StatusCode::BAD_REQUEST, "INVALID_SCHEDULE"),
        DomainError::InvalidValue(_) => (StatusCode::BAD_REQUEST, "INVALID_VALUE"),
        DomainError::InvariantViolation(_) => {
            (StatusCode::INTERNAL_SERVER_ERROR, "INVARIANT_VIOLATION")
        }
    };

    (
        status,
        Json(ApiError {
            error: domain_err.to_string(),
            code: code.to_string(),
        }),
    )
}

#[cfg(test)]
mod error_handling_tests {
    use super::*;
    use crate::domain::port::RepositoryError;

    #[test]
    fn test_map_application_error_not_found() {
        let app_error = ApplicationError::NotFound("リソースが見つかりません".to_string());
        let (status, Json(api_error)) = map_application_error(app_error);

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(api_error.code, "NOT_FOUND");
        assert_eq!(api_error.error, "リソースが見つかりません");
    }

    #[test]
    fn test_capacity_exhausted_is_conflict() {
        let (status, Json(api_error)) =
            map_application_error(ApplicationError::CapacityExhausted("event".to_string()));

        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(api_error.code, "CAPACITY_EXHAUSTED");
    }

    #[test]
    fn test_transient_failure_is_service_unavailable() {
        let app_error = ApplicationError::from(RepositoryError::LockWaitTimeout(
            "events".to_string(),
        ));
        let (status, Json(api_error)) = map_application_error(app_error);

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(api_error.code, "TRY_AGAIN");
    }

    #[test]
    fn test_domain_errors_split_between_conflict_and_bad_request() {
        let (conflict, _) = map_domain_error(DomainError::InvalidTransition("x".to_string()));
        let (bad_request, _) = map_domain_error(DomainError::InvalidQuantity);

        assert_eq!(conflict, StatusCode::CONFLICT);
        assert_eq!(bad_request, StatusCode::BAD_REQUEST);
    }
}
