use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use mesa_core::clock::Clock;
use mesa_core::events::{self, CodiStatusEvent, PaymentStatusEvent};
use mesa_core::models::*;
use mesa_core::store::Store;
use mesa_core::{Error, Result};
use mesa_notify::NotificationBus;

use crate::settlement::settle;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChargeOutcome {
    pub codi_id: String,
    pub qr_data: String,
    pub payment_attempt_id: Uuid,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChargeDetail {
    pub charge: CodiCharge,
    pub payment_attempt: PaymentAttempt,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodiWebhookRequest {
    pub codi_id: String,
    pub status: String,
    pub amount: Option<i64>,
}

/// CoDi QR charges. The charge record keeps the provider's free-text status
/// verbatim; only the payment attempt carries the canonical status.
pub struct CodiEngine {
    store: Arc<dyn Store>,
    bus: Arc<NotificationBus>,
    clock: Arc<dyn Clock>,
}

impl CodiEngine {
    pub fn new(store: Arc<dyn Store>, bus: Arc<NotificationBus>, clock: Arc<dyn Clock>) -> Self {
        Self { store, bus, clock }
    }

    pub async fn create_charge(&self, order_id: Uuid) -> Result<ChargeOutcome> {
        let order = self
            .store
            .order_by_id(order_id)
            .await?
            .ok_or_else(|| Error::not_found("order not found"))?;

        let codi_id = Uuid::new_v4().to_string();
        let qr_data = format!("CODI:{codi_id}");
        let attempt_id = Uuid::new_v4();

        let mut tx = self.store.begin().await?;
        tx.insert_payment_attempt(&PaymentAttempt {
            id: attempt_id,
            order_id: order.id,
            provider: PaymentProvider::Codi,
            status: PaymentStatus::Pending,
            amount: order.total_amount,
            external_id: None,
            metadata: json!({}),
            created_at: self.clock.now(),
        })
        .await?;
        tx.insert_codi_charge(&CodiCharge {
            id: Uuid::new_v4(),
            payment_attempt_id: attempt_id,
            codi_id: codi_id.clone(),
            qr_data: qr_data.clone(),
            status: "pending".to_string(),
            raw_response: json!({}),
        })
        .await?;
        tx.commit().await?;
        info!(order_id = %order.id, codi_id = %codi_id, "codi charge created");

        self.bus
            .emit(
                events::CODI_STATUS,
                &CodiStatusEvent {
                    order_id: order.id,
                    codi_id: codi_id.clone(),
                    status: "pending".to_string(),
                    qr_data: Some(qr_data.clone()),
                },
            )
            .await?;
        self.bus
            .emit(
                events::PAYMENT_STATUS,
                &PaymentStatusEvent {
                    order_id: order.id,
                    provider: PaymentProvider::Codi,
                    status: PaymentStatus::Pending,
                    preference_id: None,
                },
            )
            .await?;

        Ok(ChargeOutcome {
            codi_id,
            qr_data,
            payment_attempt_id: attempt_id,
        })
    }

    pub async fn get_charge(&self, codi_id: &str) -> Result<ChargeDetail> {
        let charge = self
            .store
            .codi_charge_by_codi_id(codi_id)
            .await?
            .ok_or_else(|| Error::not_found("charge not found"))?;
        let payment_attempt = self
            .store
            .payment_attempt_by_id(charge.payment_attempt_id)
            .await?
            .ok_or_else(|| Error::internal("charge without payment attempt"))?;
        Ok(ChargeDetail {
            charge,
            payment_attempt,
        })
    }

    /// Settlement only fires when the mapped status actually changed; the raw
    /// payload lands on the charge record and the provider-native status event
    /// goes out on every webhook either way.
    pub async fn handle_webhook(&self, req: CodiWebhookRequest) -> Result<()> {
        let charge = self
            .store
            .codi_charge_by_codi_id(&req.codi_id)
            .await?
            .ok_or_else(|| Error::not_found("charge not found"))?;
        let attempt = self
            .store
            .payment_attempt_by_id(charge.payment_attempt_id)
            .await?
            .ok_or_else(|| Error::internal("charge without payment attempt"))?;

        let mapped = map_status(&req.status);
        let raw = serde_json::to_value(&req).map_err(Error::internal)?;

        if attempt.status != mapped {
            settle(self.store.as_ref(), &self.bus, &attempt, mapped, &raw).await?;
        }

        let mut tx = self.store.begin().await?;
        tx.update_codi_charge(charge.id, &req.status, &raw).await?;
        tx.commit().await?;

        self.bus
            .emit(
                events::CODI_STATUS,
                &CodiStatusEvent {
                    order_id: attempt.order_id,
                    codi_id: req.codi_id,
                    status: req.status,
                    qr_data: None,
                },
            )
            .await?;

        Ok(())
    }
}

pub fn map_status(status: &str) -> PaymentStatus {
    match status {
        "paid" | "confirmed" => PaymentStatus::Succeeded,
        "failed" | "cancelled" => PaymentStatus::Failed,
        _ => PaymentStatus::Pending,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mesa_core::clock::ManualClock;
    use mesa_store::MemStore;
    use std::sync::Mutex;

    struct Fixture {
        store: Arc<MemStore>,
        bus: Arc<NotificationBus>,
        engine: CodiEngine,
        order_id: Uuid,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(MemStore::new());
        let clock = Arc::new(ManualClock::starting_now());
        let bus = Arc::new(NotificationBus::new(store.clone(), clock.clone()));
        let engine = CodiEngine::new(store.clone(), bus.clone(), clock.clone());

        let order_id = Uuid::new_v4();
        store
            .seed_order(
                Order {
                    id: order_id,
                    reservation_id: Uuid::new_v4(),
                    customer_name: None,
                    customer_email: None,
                    customer_phone: None,
                    total_amount: 12_000,
                    currency: "MXN".to_string(),
                    status: OrderStatus::Pending,
                    created_at: clock.now(),
                },
                vec![],
            )
            .await;

        Fixture {
            store,
            bus,
            engine,
            order_id,
        }
    }

    #[tokio::test]
    async fn create_charge_builds_qr_and_pending_attempt() {
        let fx = fixture().await;
        let outcome = fx.engine.create_charge(fx.order_id).await.unwrap();
        assert_eq!(outcome.qr_data, format!("CODI:{}", outcome.codi_id));

        let detail = fx.engine.get_charge(&outcome.codi_id).await.unwrap();
        assert_eq!(detail.charge.status, "pending");
        assert_eq!(detail.payment_attempt.status, PaymentStatus::Pending);
        assert_eq!(detail.payment_attempt.amount, 12_000);
    }

    #[tokio::test]
    async fn create_charge_for_unknown_order_is_not_found() {
        let fx = fixture().await;
        let err = fx.engine.create_charge(Uuid::new_v4()).await;
        assert!(matches!(err, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn paid_webhook_settles_the_order() {
        let fx = fixture().await;
        let outcome = fx.engine.create_charge(fx.order_id).await.unwrap();

        fx.engine
            .handle_webhook(CodiWebhookRequest {
                codi_id: outcome.codi_id.clone(),
                status: "paid".to_string(),
                amount: Some(12_000),
            })
            .await
            .unwrap();

        let order = fx.store.order_by_id(fx.order_id).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Paid);
        let detail = fx.engine.get_charge(&outcome.codi_id).await.unwrap();
        assert_eq!(detail.charge.status, "paid");
        assert_eq!(detail.payment_attempt.status, PaymentStatus::Succeeded);
    }

    #[tokio::test]
    async fn replayed_webhook_emits_codi_status_but_not_payment_status() {
        let fx = fixture().await;
        let outcome = fx.engine.create_charge(fx.order_id).await.unwrap();

        let payment_events = Arc::new(Mutex::new(0));
        let codi_events = Arc::new(Mutex::new(0));
        let p = payment_events.clone();
        let c = codi_events.clone();
        let _s1 = fx.bus.on(
            events::PAYMENT_STATUS,
            Arc::new(move |_| {
                *p.lock().unwrap() += 1;
                Ok(())
            }),
        );
        let _s2 = fx.bus.on(
            events::CODI_STATUS,
            Arc::new(move |_| {
                *c.lock().unwrap() += 1;
                Ok(())
            }),
        );

        let webhook = CodiWebhookRequest {
            codi_id: outcome.codi_id.clone(),
            status: "paid".to_string(),
            amount: None,
        };
        fx.engine.handle_webhook(webhook.clone()).await.unwrap();
        fx.engine.handle_webhook(webhook).await.unwrap();

        assert_eq!(*payment_events.lock().unwrap(), 1);
        assert_eq!(*codi_events.lock().unwrap(), 2);
    }

    #[tokio::test]
    async fn webhook_for_unknown_charge_is_not_found() {
        let fx = fixture().await;
        let err = fx
            .engine
            .handle_webhook(CodiWebhookRequest {
                codi_id: "missing".to_string(),
                status: "paid".to_string(),
                amount: None,
            })
            .await;
        assert!(matches!(err, Err(Error::NotFound(_))));
    }

    #[test]
    fn status_mapping() {
        assert_eq!(map_status("paid"), PaymentStatus::Succeeded);
        assert_eq!(map_status("confirmed"), PaymentStatus::Succeeded);
        assert_eq!(map_status("failed"), PaymentStatus::Failed);
        assert_eq!(map_status("cancelled"), PaymentStatus::Failed);
        assert_eq!(map_status("anything-else"), PaymentStatus::Pending);
    }
}
