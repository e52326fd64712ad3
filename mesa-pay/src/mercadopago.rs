use std::sync::Arc;

use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::Sha256;
use tracing::{info, warn};
use uuid::Uuid;

use mesa_core::clock::Clock;
use mesa_core::events::{self, PaymentStatusEvent};
use mesa_core::models::*;
use mesa_core::store::Store;
use mesa_core::{Error, Result};
use mesa_notify::NotificationBus;

use crate::gateway::{BackUrls, PaymentGateway, PreferenceItem, PreferenceRequest};
use crate::settlement::settle;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePreferenceRequest {
    pub order_id: Uuid,
    pub success_url: String,
    pub failure_url: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreferenceOutcome {
    pub preference_id: String,
    pub init_point: Option<String>,
    pub sandbox_init_point: Option<String>,
    pub payment_attempt_id: Uuid,
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookOutcome {
    pub processed: bool,
}

/// MercadoPago checkout flow: hosted preference creation, status polling, and
/// the webhook reconciliation path. Webhook payloads are never trusted
/// directly; the payment is always re-fetched from the gateway by id.
pub struct MercadoPagoEngine {
    store: Arc<dyn Store>,
    bus: Arc<NotificationBus>,
    gateway: Arc<dyn PaymentGateway>,
    clock: Arc<dyn Clock>,
    webhook_secret: Option<String>,
}

impl MercadoPagoEngine {
    pub fn new(
        store: Arc<dyn Store>,
        bus: Arc<NotificationBus>,
        gateway: Arc<dyn PaymentGateway>,
        clock: Arc<dyn Clock>,
        webhook_secret: Option<String>,
    ) -> Self {
        if webhook_secret.is_none() {
            warn!("MercadoPago webhook secret not configured, signature verification disabled");
        }
        Self {
            store,
            bus,
            gateway,
            clock,
            webhook_secret,
        }
    }

    pub async fn create_preference(&self, req: CreatePreferenceRequest) -> Result<PreferenceOutcome> {
        let order = self
            .store
            .order_by_id(req.order_id)
            .await?
            .ok_or_else(|| Error::not_found("order not found"))?;
        let items = self.store.order_items(order.id).await?;

        let preference_items = if items.is_empty() {
            vec![PreferenceItem {
                title: "Reservation".to_string(),
                quantity: 1,
                unit_price: order.total_amount,
                currency_id: order.currency.clone(),
            }]
        } else {
            items
                .iter()
                .map(|item| PreferenceItem {
                    title: item.description.clone(),
                    quantity: item.quantity,
                    unit_price: item.unit_price,
                    currency_id: order.currency.clone(),
                })
                .collect()
        };

        let response = self
            .gateway
            .create_preference(&PreferenceRequest {
                items: preference_items,
                back_urls: BackUrls {
                    success: req.success_url.clone(),
                    failure: req.failure_url,
                    pending: req.success_url,
                },
                external_reference: order.id.to_string(),
            })
            .await?;

        let attempt_id = Uuid::new_v4();
        let mut tx = self.store.begin().await?;
        tx.insert_payment_attempt(&PaymentAttempt {
            id: attempt_id,
            order_id: order.id,
            provider: PaymentProvider::Mercadopago,
            status: PaymentStatus::Pending,
            amount: order.total_amount,
            external_id: None,
            metadata: json!({ "preferenceId": response.id }),
            created_at: self.clock.now(),
        })
        .await?;
        tx.insert_mercadopago_payment(&MercadoPagoPayment {
            id: Uuid::new_v4(),
            payment_attempt_id: attempt_id,
            preference_id: response.id.clone(),
            init_point: response.init_point.clone(),
            sandbox_init_point: response.sandbox_init_point.clone(),
            status: "pending".to_string(),
            raw_response: response.raw,
        })
        .await?;
        tx.commit().await?;
        info!(order_id = %order.id, preference_id = %response.id, "preference created");

        self.bus
            .emit(
                events::PAYMENT_STATUS,
                &PaymentStatusEvent {
                    order_id: order.id,
                    provider: PaymentProvider::Mercadopago,
                    status: PaymentStatus::Pending,
                    preference_id: Some(response.id.clone()),
                },
            )
            .await?;

        Ok(PreferenceOutcome {
            preference_id: response.id,
            init_point: response.init_point,
            sandbox_init_point: response.sandbox_init_point,
            payment_attempt_id: attempt_id,
        })
    }

    /// Poll the provider and reconcile local state when it has drifted.
    /// Returns the provider's raw payment payload.
    pub async fn get_payment_status(&self, payment_id: &str) -> Result<Value> {
        let payment = self.gateway.get_payment(payment_id).await?;
        let status = map_status(payment.status.as_deref().unwrap_or("pending"));

        if let Some(attempt) = self.store.payment_attempt_by_external_id(payment_id).await? {
            if attempt.status != status {
                settle(self.store.as_ref(), &self.bus, &attempt, status, &payment.raw).await?;
            }
        }

        Ok(payment.raw)
    }

    /// Webhook entry point. The payload only carries a payment id; the
    /// authoritative state comes from re-fetching the payment. A payment seen
    /// for the first time is matched to its order via `external_reference`.
    pub async fn handle_webhook(
        &self,
        payload: &Value,
        signature: Option<&str>,
    ) -> Result<WebhookOutcome> {
        self.verify_signature(payload, signature)?;

        let payment_id = payload
            .get("data")
            .and_then(|data| data.get("id"))
            .and_then(|id| match id {
                Value::String(s) => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .ok_or_else(|| Error::BadRequest("missing payment id in webhook".to_string()))?;

        let payment = self.gateway.get_payment(&payment_id).await?;
        let status = map_status(payment.status.as_deref().unwrap_or("pending"));

        let Some(attempt) = self.store.payment_attempt_by_external_id(&payment_id).await? else {
            return self.record_first_seen(&payment_id, status, &payment).await;
        };

        if attempt.status == status {
            return Ok(WebhookOutcome { processed: false });
        }

        settle(self.store.as_ref(), &self.bus, &attempt, status, &payment.raw).await?;
        Ok(WebhookOutcome { processed: true })
    }

    async fn record_first_seen(
        &self,
        payment_id: &str,
        status: PaymentStatus,
        payment: &crate::gateway::GatewayPayment,
    ) -> Result<WebhookOutcome> {
        let Some(order_id) = payment
            .external_reference
            .as_deref()
            .and_then(|reference| Uuid::parse_str(reference).ok())
        else {
            return Ok(WebhookOutcome { processed: false });
        };
        let Some(order) = self.store.order_by_id(order_id).await? else {
            return Ok(WebhookOutcome { processed: false });
        };

        let mut tx = self.store.begin().await?;
        tx.insert_payment_attempt(&PaymentAttempt {
            id: Uuid::new_v4(),
            order_id: order.id,
            provider: PaymentProvider::Mercadopago,
            status,
            amount: order.total_amount,
            external_id: Some(payment_id.to_string()),
            metadata: payment.raw.clone(),
            created_at: self.clock.now(),
        })
        .await?;
        if status == PaymentStatus::Succeeded {
            tx.update_order_status(order.id, OrderStatus::Paid).await?;
        }
        tx.commit().await?;

        self.bus
            .emit(
                events::PAYMENT_STATUS,
                &PaymentStatusEvent {
                    order_id: order.id,
                    provider: PaymentProvider::Mercadopago,
                    status,
                    preference_id: None,
                },
            )
            .await?;

        Ok(WebhookOutcome { processed: true })
    }

    fn verify_signature(&self, payload: &Value, signature: Option<&str>) -> Result<()> {
        let Some(secret) = self.webhook_secret.as_deref() else {
            return Ok(());
        };
        let Some(signature) = signature else {
            return Err(Error::Unauthorized("missing MercadoPago signature".to_string()));
        };

        let body = serde_json::to_string(payload).map_err(Error::internal)?;
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|_| Error::internal("invalid webhook secret length"))?;
        mac.update(body.as_bytes());
        let expected = hex::encode(mac.finalize().into_bytes());

        if expected != signature {
            return Err(Error::Unauthorized("invalid MercadoPago signature".to_string()));
        }
        Ok(())
    }
}

/// Provider-native status to the canonical attempt status.
pub fn map_status(status: &str) -> PaymentStatus {
    match status {
        "approved" | "success" => PaymentStatus::Succeeded,
        "rejected" | "cancelled" => PaymentStatus::Failed,
        _ => PaymentStatus::Pending,
    }
}
