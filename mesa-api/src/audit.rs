use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use mesa_core::models::AuditRecord;
use mesa_core::store::AuditFilters;

use crate::error::ApiError;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/api/audit", get(query))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuditQuery {
    resource_type: Option<String>,
    action: Option<String>,
    actor_id: Option<String>,
    from: Option<DateTime<Utc>>,
    to: Option<DateTime<Utc>>,
    take: Option<i64>,
    skip: Option<i64>,
}

#[derive(Debug, Serialize)]
struct AuditPage {
    data: Vec<AuditRecord>,
    total: i64,
}

async fn query(
    State(state): State<AppState>,
    Query(query): Query<AuditQuery>,
) -> Result<Json<AuditPage>, ApiError> {
    let filters = AuditFilters {
        resource_type: query.resource_type,
        action: query.action,
        actor_id: query.actor_id,
        from: query.from,
        to: query.to,
        take: query.take,
        skip: query.skip,
    };
    let (data, total) = state.audit.query(&filters).await?;
    Ok(Json(AuditPage { data, total }))
}
