use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, Query, State, WebSocketUpgrade},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Serialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::error;

use dashdrop_core::{RequestService, StoreError};
use dashdrop_realtime::connection;
use dashdrop_types::api::{
    AcceptRequestBody, ApiResult, NotificationQuery, RealtimeQuery, UpdateStatusBody,
};
use dashdrop_types::events::RecordFilter;
use dashdrop_types::models::{NewRequest, Notification, Request};

pub type AppState = Arc<RequestService>;

type Reply<T> = (StatusCode, Json<ApiResult<T>>);

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/requests", post(create_request))
        .route("/requests/open", get(open_requests))
        .route("/requests/{id}", get(get_request))
        .route("/requests/{id}/accept", post(accept_request))
        .route("/requests/{id}/status", post(update_status))
        .route("/requests/{id}/cancel", post(cancel_request))
        .route("/users/{user_id}/notifications", get(list_notifications))
        .route("/notifications/{id}/read", post(mark_read))
        .route("/realtime", get(realtime_upgrade))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn status_for(e: &StoreError) -> StatusCode {
    match e {
        StoreError::NotFound(_) => StatusCode::NOT_FOUND,
        StoreError::Conflict { .. } => StatusCode::CONFLICT,
        StoreError::InvalidTransition { .. } | StoreError::UnknownStatus(_) => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        StoreError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn reply<T: Serialize>(ok: StatusCode, result: Result<T, StoreError>) -> Reply<T> {
    match result {
        Ok(data) => (ok, Json(ApiResult::ok(data))),
        Err(e) => {
            if matches!(e, StoreError::Persistence(_)) {
                error!("Store failure: {:#}", e);
            }
            (status_for(&e), Json(ApiResult::err(e.to_string())))
        }
    }
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "offline": state.is_offline(),
    }))
}

async fn create_request(
    State(state): State<AppState>,
    Json(new): Json<NewRequest>,
) -> Reply<Request> {
    reply(StatusCode::CREATED, state.create_request(new).await)
}

async fn open_requests(State(state): State<AppState>) -> Reply<Vec<Request>> {
    reply(StatusCode::OK, state.open_requests().await)
}

async fn get_request(State(state): State<AppState>, Path(id): Path<String>) -> Reply<Request> {
    let result = state
        .get_request(&id)
        .await
        .and_then(|found| found.ok_or_else(|| StoreError::NotFound(id.clone())));
    reply(StatusCode::OK, result)
}

async fn accept_request(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<AcceptRequestBody>,
) -> Reply<Request> {
    reply(StatusCode::OK, state.accept_request(&id, &body.runner_id).await)
}

async fn update_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<UpdateStatusBody>,
) -> Reply<Request> {
    reply(StatusCode::OK, state.update_status_str(&id, &body.status).await)
}

async fn cancel_request(State(state): State<AppState>, Path(id): Path<String>) -> Reply<Request> {
    reply(StatusCode::OK, state.cancel_request(&id).await)
}

async fn list_notifications(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(query): Query<NotificationQuery>,
) -> Reply<Vec<Notification>> {
    let limit = query.limit.clamp(1, 200);
    reply(StatusCode::OK, state.notifications_for(&user_id, limit).await)
}

async fn mark_read(State(state): State<AppState>, Path(id): Path<String>) -> Reply<bool> {
    let result = state
        .mark_notification_read(&id)
        .await
        .and_then(|found| {
            if found {
                Ok(true)
            } else {
                Err(StoreError::NotFound(id.clone()))
            }
        });
    reply(StatusCode::OK, result)
}

async fn realtime_upgrade(
    State(state): State<AppState>,
    Query(query): Query<RealtimeQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    let Some(manager) = state.realtime().cloned() else {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ApiResult::<()>::err("realtime is not available in offline mode")),
        )
            .into_response();
    };
    let filter = RecordFilter {
        user_id: query.user_id,
    };
    ws.on_upgrade(move |socket| connection::stream_inserts(socket, manager, query.collection, filter))
}
