use axum::{
    extract::State,
    http::HeaderMap,
    routing::post,
    Json, Router,
};
use serde_json::{json, Value};

use mesa_pay::codi::CodiWebhookRequest;
use mesa_pay::mercadopago::WebhookOutcome;

use crate::error::ApiError;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/webhooks/mercadopago", post(mercadopago))
        .route("/api/webhooks/codi", post(codi))
}

async fn mercadopago(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<Value>,
) -> Result<Json<WebhookOutcome>, ApiError> {
    let signature = headers
        .get("x-signature")
        .and_then(|value| value.to_str().ok());
    Ok(Json(
        state.mercadopago.handle_webhook(&payload, signature).await?,
    ))
}

async fn codi(
    State(state): State<AppState>,
    Json(req): Json<CodiWebhookRequest>,
) -> Result<Json<Value>, ApiError> {
    state.codi.handle_webhook(req).await?;
    Ok(Json(json!({ "success": true })))
}
