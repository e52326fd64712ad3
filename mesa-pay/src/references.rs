use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use mesa_core::clock::Clock;
use mesa_core::events::{self, ReferenceUpdatedEvent};
use mesa_core::models::*;
use mesa_core::store::{ReferenceFilters, Store};
use mesa_core::{Error, Result};
use mesa_notify::{AuditRecorder, NotificationBus};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferenceList {
    pub data: Vec<BankReferenceDetail>,
    pub pagination: Pagination,
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub total: i64,
    pub page: i64,
    pub page_size: i64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileRequest {
    pub status: BankReferenceStatus,
    pub note: Option<String>,
    pub receipt_url: Option<String>,
}

/// Back-office view over bank references: the paginated reconciliation queue
/// and the manual reconcile action.
pub struct ReferencesEngine {
    store: Arc<dyn Store>,
    bus: Arc<NotificationBus>,
    audit: Arc<AuditRecorder>,
    clock: Arc<dyn Clock>,
}

impl ReferencesEngine {
    pub fn new(
        store: Arc<dyn Store>,
        bus: Arc<NotificationBus>,
        audit: Arc<AuditRecorder>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            bus,
            audit,
            clock,
        }
    }

    pub async fn list(&self, filters: &ReferenceFilters) -> Result<ReferenceList> {
        let (data, total) = self.store.list_bank_references(filters).await?;
        Ok(ReferenceList {
            data,
            pagination: Pagination {
                total,
                page: filters.page(),
                page_size: filters.page_size(),
            },
        })
    }

    pub async fn reconcile(
        &self,
        id: Uuid,
        req: ReconcileRequest,
        actor_id: Option<&str>,
    ) -> Result<BankReference> {
        let reference = self
            .store
            .bank_reference_by_id(id)
            .await?
            .ok_or_else(|| Error::not_found("reference not found"))?;

        let mut tx = self.store.begin().await?;
        tx.update_bank_reference(id, req.status, req.receipt_url.as_deref())
            .await?;
        if req.note.is_some() || req.receipt_url.is_some() {
            tx.insert_reconciliation_note(&ReconciliationNote {
                id: Uuid::new_v4(),
                reference_id: id,
                user_id: actor_id.map(str::to_string),
                note: req.note.clone(),
                receipt_url: req.receipt_url.clone(),
                created_at: self.clock.now(),
            })
            .await?;
        }
        tx.commit().await?;

        self.audit
            .log(
                "bankReference.reconciled",
                "bankReference",
                &id.to_string(),
                Some(json!({
                    "status": req.status,
                    "note": req.note,
                    "receiptUrl": req.receipt_url,
                })),
                actor_id,
            )
            .await?;

        self.bus
            .emit(
                events::REFERENCE_UPDATED,
                &ReferenceUpdatedEvent {
                    order_id: reference.order_id,
                    reference_id: Some(id),
                    method: None,
                    reference: None,
                    status: Some(req.status.as_str().to_string()),
                },
            )
            .await?;

        self.store
            .bank_reference_by_id(id)
            .await?
            .ok_or_else(|| Error::internal("reference vanished after update"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spei::SpeiEngine;
    use mesa_core::clock::ManualClock;
    use mesa_core::store::AuditFilters;
    use mesa_store::MemStore;

    struct Fixture {
        store: Arc<MemStore>,
        spei: SpeiEngine,
        engine: ReferencesEngine,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(MemStore::new());
        let clock = Arc::new(ManualClock::starting_now());
        let bus = Arc::new(NotificationBus::new(store.clone(), clock.clone()));
        let audit = Arc::new(AuditRecorder::new(store.clone()));
        let spei = SpeiEngine::new(store.clone(), bus.clone(), clock.clone());
        let engine = ReferencesEngine::new(store.clone(), bus, audit, clock);
        Fixture {
            store,
            spei,
            engine,
        }
    }

    async fn seed_order(fx: &Fixture, amount: i64) -> Uuid {
        let order_id = Uuid::new_v4();
        fx.store
            .seed_order(
                Order {
                    id: order_id,
                    reservation_id: Uuid::new_v4(),
                    customer_name: None,
                    customer_email: None,
                    customer_phone: None,
                    total_amount: amount,
                    currency: "MXN".to_string(),
                    status: OrderStatus::Pending,
                    created_at: chrono::Utc::now(),
                },
                vec![],
            )
            .await;
        order_id
    }

    #[tokio::test]
    async fn list_paginates_and_includes_order() {
        let fx = fixture().await;
        for _ in 0..3 {
            let order_id = seed_order(&fx, 10_000).await;
            fx.spei.create_reference(order_id, None).await.unwrap();
        }

        let page = fx
            .engine
            .list(&ReferenceFilters {
                page: Some(1),
                page_size: Some(2),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(page.pagination.total, 3);
        assert_eq!(page.data.len(), 2);
        assert!(page.data[0].order.is_some());

        let page = fx
            .engine
            .list(&ReferenceFilters {
                page: Some(2),
                page_size: Some(2),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(page.data.len(), 1);
    }

    #[tokio::test]
    async fn list_filters_by_status() {
        let fx = fixture().await;
        let order_id = seed_order(&fx, 10_000).await;
        let created = fx.spei.create_reference(order_id, None).await.unwrap();
        fx.spei
            .confirm(crate::spei::SpeiConfirmRequest {
                reference: created.reference,
                amount: 10_000,
                receipt_url: None,
            })
            .await
            .unwrap();
        let other_order = seed_order(&fx, 5_000).await;
        fx.spei.create_reference(other_order, None).await.unwrap();

        let pending = fx
            .engine
            .list(&ReferenceFilters {
                status: Some(BankReferenceStatus::Pending),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(pending.pagination.total, 1);
        assert_eq!(pending.data[0].reference.order_id, other_order);
    }

    #[tokio::test]
    async fn reconcile_appends_note_and_audits() {
        let fx = fixture().await;
        let order_id = seed_order(&fx, 10_000).await;
        fx.spei.create_reference(order_id, None).await.unwrap();
        let listed = fx.engine.list(&Default::default()).await.unwrap();
        let reference_id = listed.data[0].reference.id;

        let updated = fx
            .engine
            .reconcile(
                reference_id,
                ReconcileRequest {
                    status: BankReferenceStatus::Rejected,
                    note: Some("amount mismatch".to_string()),
                    receipt_url: None,
                },
                Some("ops-1"),
            )
            .await
            .unwrap();
        assert_eq!(updated.status, BankReferenceStatus::Rejected);

        let listed = fx.engine.list(&Default::default()).await.unwrap();
        assert_eq!(listed.data[0].notes.len(), 1);
        assert_eq!(
            listed.data[0].notes[0].note.as_deref(),
            Some("amount mismatch")
        );
        assert_eq!(listed.data[0].notes[0].user_id.as_deref(), Some("ops-1"));

        let (records, total) = fx
            .store
            .query_audit(&AuditFilters {
                action: Some("bankReference.reconciled".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(total, 1);
        assert_eq!(records[0].actor_id.as_deref(), Some("ops-1"));
    }

    #[tokio::test]
    async fn reconcile_without_note_or_receipt_skips_the_note() {
        let fx = fixture().await;
        let order_id = seed_order(&fx, 10_000).await;
        fx.spei.create_reference(order_id, None).await.unwrap();
        let listed = fx.engine.list(&Default::default()).await.unwrap();
        let reference_id = listed.data[0].reference.id;

        fx.engine
            .reconcile(
                reference_id,
                ReconcileRequest {
                    status: BankReferenceStatus::Reconciled,
                    note: None,
                    receipt_url: None,
                },
                None,
            )
            .await
            .unwrap();

        let listed = fx.engine.list(&Default::default()).await.unwrap();
        assert!(listed.data[0].notes.is_empty());
    }

    #[tokio::test]
    async fn reconcile_unknown_reference_is_not_found() {
        let fx = fixture().await;
        let err = fx
            .engine
            .reconcile(
                Uuid::new_v4(),
                ReconcileRequest {
                    status: BankReferenceStatus::Reconciled,
                    note: None,
                    receipt_url: None,
                },
                None,
            )
            .await;
        assert!(matches!(err, Err(Error::NotFound(_))));
    }
}
