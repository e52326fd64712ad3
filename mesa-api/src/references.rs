use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use mesa_core::models::{BankReference, BankReferenceMethod, BankReferenceStatus};
use mesa_core::store::ReferenceFilters;
use mesa_pay::references::{ReconcileRequest, ReferenceList};

use crate::error::ApiError;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/references", get(list))
        .route("/api/references/{id}/reconcile", post(reconcile))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReferenceQuery {
    status: Option<BankReferenceStatus>,
    method: Option<BankReferenceMethod>,
    from: Option<DateTime<Utc>>,
    to: Option<DateTime<Utc>>,
    page: Option<i64>,
    page_size: Option<i64>,
}

async fn list(
    State(state): State<AppState>,
    Query(query): Query<ReferenceQuery>,
) -> Result<Json<ReferenceList>, ApiError> {
    let filters = ReferenceFilters {
        status: query.status,
        method: query.method,
        from: query.from,
        to: query.to,
        page: query.page,
        page_size: query.page_size,
    };
    Ok(Json(state.references.list(&filters).await?))
}

async fn reconcile(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    Json(req): Json<ReconcileRequest>,
) -> Result<Json<BankReference>, ApiError> {
    let actor_id = headers
        .get("x-actor-id")
        .and_then(|value| value.to_str().ok());
    Ok(Json(state.references.reconcile(id, req, actor_id).await?))
}
