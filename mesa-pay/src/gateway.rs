use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use mesa_core::{Error, Result};

const DEFAULT_BASE_URL: &str = "https://api.mercadopago.com";

#[derive(Debug, Clone, Serialize)]
pub struct PreferenceItem {
    pub title: String,
    pub quantity: i32,
    pub unit_price: i64,
    pub currency_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct BackUrls {
    pub success: String,
    pub failure: String,
    pub pending: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PreferenceRequest {
    pub items: Vec<PreferenceItem>,
    pub back_urls: BackUrls,
    pub external_reference: String,
}

#[derive(Debug, Clone)]
pub struct PreferenceResponse {
    pub id: String,
    pub init_point: Option<String>,
    pub sandbox_init_point: Option<String>,
    pub raw: Value,
}

/// Provider-side view of a payment, fetched by id. `external_reference` is
/// the order id round-tripped through preference creation.
#[derive(Debug, Clone)]
pub struct GatewayPayment {
    pub id: String,
    pub status: Option<String>,
    pub external_reference: Option<String>,
    pub raw: Value,
}

/// Outbound MercadoPago calls, behind a trait so the engine is testable
/// without the live API.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_preference(&self, req: &PreferenceRequest) -> Result<PreferenceResponse>;
    async fn get_payment(&self, payment_id: &str) -> Result<GatewayPayment>;
}

pub struct HttpMercadoPagoGateway {
    http: reqwest::Client,
    access_token: String,
    base_url: String,
}

impl HttpMercadoPagoGateway {
    pub fn new(access_token: String, base_url: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            access_token,
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
        }
    }
}

fn payment_from_raw(raw: Value) -> GatewayPayment {
    GatewayPayment {
        id: raw
            .get("id")
            .map(|id| match id {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .unwrap_or_default(),
        status: raw
            .get("status")
            .and_then(Value::as_str)
            .map(str::to_string),
        external_reference: raw
            .get("external_reference")
            .and_then(Value::as_str)
            .map(str::to_string),
        raw,
    }
}

#[async_trait]
impl PaymentGateway for HttpMercadoPagoGateway {
    async fn create_preference(&self, req: &PreferenceRequest) -> Result<PreferenceResponse> {
        let raw: Value = self
            .http
            .post(format!("{}/checkout/preferences", self.base_url))
            .bearer_auth(&self.access_token)
            .json(req)
            .send()
            .await
            .map_err(Error::internal)?
            .error_for_status()
            .map_err(Error::internal)?
            .json()
            .await
            .map_err(Error::internal)?;

        let id = raw
            .get("id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| Error::internal("MercadoPago did not return a preference id"))?;

        Ok(PreferenceResponse {
            id,
            init_point: raw
                .get("init_point")
                .and_then(Value::as_str)
                .map(str::to_string),
            sandbox_init_point: raw
                .get("sandbox_init_point")
                .and_then(Value::as_str)
                .map(str::to_string),
            raw,
        })
    }

    async fn get_payment(&self, payment_id: &str) -> Result<GatewayPayment> {
        let raw: Value = self
            .http
            .get(format!("{}/v1/payments/{payment_id}", self.base_url))
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(Error::internal)?
            .error_for_status()
            .map_err(Error::internal)?
            .json()
            .await
            .map_err(Error::internal)?;

        Ok(payment_from_raw(raw))
    }
}

/// Stand-in used when no access token is configured. Preference creation and
/// payment lookups fail; the CoDi and SPEI rails keep working.
pub struct UnconfiguredGateway;

#[async_trait]
impl PaymentGateway for UnconfiguredGateway {
    async fn create_preference(&self, _req: &PreferenceRequest) -> Result<PreferenceResponse> {
        Err(Error::internal("MercadoPago gateway not configured"))
    }

    async fn get_payment(&self, _payment_id: &str) -> Result<GatewayPayment> {
        Err(Error::internal("MercadoPago gateway not configured"))
    }
}
