use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use mesa_core::models::SpeiReference;
use mesa_pay::codi::{ChargeDetail, ChargeOutcome};
use mesa_pay::mercadopago::{CreatePreferenceRequest, PreferenceOutcome};
use mesa_pay::spei::{ReferenceOutcome, SpeiConfirmRequest};

use crate::error::ApiError;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/payments/mercadopago/preference", post(create_preference))
        .route("/api/payments/mercadopago/{payment_id}", get(payment_status))
        .route("/api/payments/codi/charge", post(create_codi_charge))
        .route("/api/payments/codi/{codi_id}", get(get_codi_charge))
        .route("/api/payments/spei/reference", post(create_spei_reference))
        .route("/api/payments/spei/confirm", post(confirm_spei))
        .route("/api/payments/spei/{reference}", get(spei_receipt))
}

async fn create_preference(
    State(state): State<AppState>,
    Json(req): Json<CreatePreferenceRequest>,
) -> Result<Json<PreferenceOutcome>, ApiError> {
    Ok(Json(state.mercadopago.create_preference(req).await?))
}

async fn payment_status(
    State(state): State<AppState>,
    Path(payment_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    Ok(Json(state.mercadopago.get_payment_status(&payment_id).await?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateCodiChargeRequest {
    order_id: Uuid,
}

async fn create_codi_charge(
    State(state): State<AppState>,
    Json(req): Json<CreateCodiChargeRequest>,
) -> Result<Json<ChargeOutcome>, ApiError> {
    Ok(Json(state.codi.create_charge(req.order_id).await?))
}

async fn get_codi_charge(
    State(state): State<AppState>,
    Path(codi_id): Path<String>,
) -> Result<Json<ChargeDetail>, ApiError> {
    Ok(Json(state.codi.get_charge(&codi_id).await?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateSpeiReferenceRequest {
    order_id: Uuid,
    bank_code: Option<String>,
}

async fn create_spei_reference(
    State(state): State<AppState>,
    Json(req): Json<CreateSpeiReferenceRequest>,
) -> Result<Json<ReferenceOutcome>, ApiError> {
    Ok(Json(
        state.spei.create_reference(req.order_id, req.bank_code).await?,
    ))
}

async fn confirm_spei(
    State(state): State<AppState>,
    Json(req): Json<SpeiConfirmRequest>,
) -> Result<Json<Value>, ApiError> {
    state.spei.confirm(req).await?;
    Ok(Json(json!({ "success": true })))
}

async fn spei_receipt(
    State(state): State<AppState>,
    Path(reference): Path<String>,
) -> Result<Json<SpeiReference>, ApiError> {
    Ok(Json(state.spei.get_receipt(&reference).await?))
}
