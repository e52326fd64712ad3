use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use mesa_core::clock::Clock;
use mesa_core::events::{self, PaymentStatusEvent, ReferenceUpdatedEvent, SpeiConfirmedEvent};
use mesa_core::models::*;
use mesa_core::store::Store;
use mesa_core::{Error, Result};
use mesa_notify::NotificationBus;

const REFERENCE_LEN: usize = 18;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferenceOutcome {
    pub reference: String,
    pub payment_attempt_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeiConfirmRequest {
    pub reference: String,
    pub amount: i64,
    pub receipt_url: Option<String>,
}

/// SPEI bank-transfer references. Confirmation is an unconditional settlement:
/// the caller is the authority (a human matching a bank statement), so no
/// provider round trip happens.
pub struct SpeiEngine {
    store: Arc<dyn Store>,
    bus: Arc<NotificationBus>,
    clock: Arc<dyn Clock>,
}

impl SpeiEngine {
    pub fn new(store: Arc<dyn Store>, bus: Arc<NotificationBus>, clock: Arc<dyn Clock>) -> Self {
        Self { store, bus, clock }
    }

    pub async fn create_reference(
        &self,
        order_id: Uuid,
        bank_code: Option<String>,
    ) -> Result<ReferenceOutcome> {
        let order = self
            .store
            .order_by_id(order_id)
            .await?
            .ok_or_else(|| Error::not_found("order not found"))?;

        let reference = new_reference();
        let attempt_id = Uuid::new_v4();
        let now = self.clock.now();

        let mut tx = self.store.begin().await?;
        tx.insert_payment_attempt(&PaymentAttempt {
            id: attempt_id,
            order_id: order.id,
            provider: PaymentProvider::Spei,
            status: PaymentStatus::Pending,
            amount: order.total_amount,
            external_id: None,
            metadata: json!({}),
            created_at: now,
        })
        .await?;
        tx.insert_spei_reference(&SpeiReference {
            id: Uuid::new_v4(),
            payment_attempt_id: attempt_id,
            reference: reference.clone(),
            status: "pending".to_string(),
            receipt_url: None,
            raw_response: json!({ "bankCode": bank_code }),
        })
        .await?;
        tx.insert_bank_reference(&BankReference {
            id: Uuid::new_v4(),
            order_id: order.id,
            method: BankReferenceMethod::Spei,
            reference: reference.clone(),
            status: BankReferenceStatus::Pending,
            amount: order.total_amount,
            receipt_url: None,
            created_at: now,
        })
        .await?;
        tx.commit().await?;
        info!(order_id = %order.id, reference = %reference, "spei reference created");

        self.bus
            .emit(
                events::REFERENCE_UPDATED,
                &ReferenceUpdatedEvent {
                    order_id: order.id,
                    reference_id: None,
                    method: Some("SPEI".to_string()),
                    reference: Some(reference.clone()),
                    status: None,
                },
            )
            .await?;
        self.bus
            .emit(
                events::PAYMENT_STATUS,
                &PaymentStatusEvent {
                    order_id: order.id,
                    provider: PaymentProvider::Spei,
                    status: PaymentStatus::Pending,
                    preference_id: None,
                },
            )
            .await?;

        Ok(ReferenceOutcome {
            reference,
            payment_attempt_id: attempt_id,
        })
    }

    pub async fn confirm(&self, req: SpeiConfirmRequest) -> Result<()> {
        let spei = self
            .store
            .spei_reference_by_value(&req.reference)
            .await?
            .ok_or_else(|| Error::not_found("reference not found"))?;
        let attempt = self
            .store
            .payment_attempt_by_id(spei.payment_attempt_id)
            .await?
            .ok_or_else(|| Error::internal("reference without payment attempt"))?;

        let raw = serde_json::to_value(&req).map_err(Error::internal)?;
        let receipt = req.receipt_url.as_deref();

        let mut tx = self.store.begin().await?;
        tx.update_payment_attempt(attempt.id, PaymentStatus::Succeeded, &raw)
            .await?;
        tx.update_spei_reference(spei.id, "confirmed", receipt).await?;
        tx.update_bank_references_by_reference(&req.reference, BankReferenceStatus::Reconciled, receipt)
            .await?;
        tx.update_order_status(attempt.order_id, OrderStatus::Paid)
            .await?;
        tx.commit().await?;
        info!(order_id = %attempt.order_id, reference = %req.reference, "spei payment confirmed");

        self.bus
            .emit(
                events::SPEI_CONFIRMED,
                &SpeiConfirmedEvent {
                    order_id: attempt.order_id,
                    reference: req.reference.clone(),
                    amount: req.amount,
                },
            )
            .await?;
        self.bus
            .emit(
                events::PAYMENT_STATUS,
                &PaymentStatusEvent {
                    order_id: attempt.order_id,
                    provider: PaymentProvider::Spei,
                    status: PaymentStatus::Succeeded,
                    preference_id: None,
                },
            )
            .await?;
        self.bus
            .emit(
                events::REFERENCE_UPDATED,
                &ReferenceUpdatedEvent {
                    order_id: attempt.order_id,
                    reference_id: None,
                    method: Some("SPEI".to_string()),
                    reference: Some(req.reference),
                    status: Some(BankReferenceStatus::Reconciled.as_str().to_string()),
                },
            )
            .await?;

        Ok(())
    }

    pub async fn get_receipt(&self, reference: &str) -> Result<SpeiReference> {
        self.store
            .spei_reference_by_value(reference)
            .await?
            .ok_or_else(|| Error::not_found("reference not found"))
    }
}

/// 18 uppercase hex characters, no separators, bank-statement friendly.
fn new_reference() -> String {
    Uuid::new_v4().simple().to_string()[..REFERENCE_LEN].to_uppercase()
}
