use axum::{
    extract::{Path, Query, State},
    routing::{delete, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use mesa_core::models::WaitlistEntry;
use mesa_reserve::engine::{ConfirmOutcome, ConfirmRequest, HoldOutcome, HoldSeatsRequest, JoinWaitlistRequest};

use crate::error::ApiError;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/reservations/hold", post(hold))
        .route("/api/reservations", post(confirm))
        .route("/api/reservations/{id}", delete(cancel))
        .route("/api/waitlist", post(join_waitlist))
        .route("/api/waitlist/{table_id}", delete(leave_waitlist))
}

async fn hold(
    State(state): State<AppState>,
    Json(req): Json<HoldSeatsRequest>,
) -> Result<Json<HoldOutcome>, ApiError> {
    Ok(Json(state.reservations.hold_seats(req).await?))
}

async fn confirm(
    State(state): State<AppState>,
    Json(req): Json<ConfirmRequest>,
) -> Result<Json<ConfirmOutcome>, ApiError> {
    Ok(Json(state.reservations.confirm(req).await?))
}

async fn cancel(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    state.reservations.cancel(id).await?;
    Ok(Json(json!({ "success": true })))
}

async fn join_waitlist(
    State(state): State<AppState>,
    Json(req): Json<JoinWaitlistRequest>,
) -> Result<Json<WaitlistEntry>, ApiError> {
    Ok(Json(state.reservations.join_waitlist(req).await?))
}

#[derive(Debug, Deserialize)]
struct LeaveWaitlistQuery {
    #[serde(default, alias = "userId")]
    user_id: String,
}

async fn leave_waitlist(
    State(state): State<AppState>,
    Path(table_id): Path<Uuid>,
    Query(query): Query<LeaveWaitlistQuery>,
) -> Result<Json<Value>, ApiError> {
    state
        .reservations
        .leave_waitlist(table_id, &query.user_id)
        .await?;
    Ok(Json(json!({ "success": true })))
}
