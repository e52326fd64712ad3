use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use mesa_core::models::AuditRecord;
use mesa_core::store::{AuditFilters, NewAuditRecord, Store};
use mesa_core::Result;

/// Append-only audit trail. Records are written outside any transaction,
/// after the state change they describe has committed.
pub struct AuditRecorder {
    store: Arc<dyn Store>,
}

impl AuditRecorder {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn log(
        &self,
        action: &str,
        resource_type: &str,
        resource_id: &str,
        metadata: Option<Value>,
        actor_id: Option<&str>,
    ) -> Result<AuditRecord> {
        debug!(action, resource_type, resource_id, "audit");
        self.store
            .record_audit(&NewAuditRecord {
                action: action.to_string(),
                resource_type: resource_type.to_string(),
                resource_id: resource_id.to_string(),
                metadata,
                actor_id: actor_id.map(str::to_string),
            })
            .await
    }

    pub async fn query(&self, filters: &AuditFilters) -> Result<(Vec<AuditRecord>, i64)> {
        self.store.query_audit(filters).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mesa_store::MemStore;
    use serde_json::json;

    #[tokio::test]
    async fn log_and_query_by_action() {
        let store = Arc::new(MemStore::new());
        let audit = AuditRecorder::new(store);

        audit
            .log("seat.hold", "seat", "t1", Some(json!({"seats": 2})), None)
            .await
            .unwrap();
        audit
            .log("reservation.confirmed", "reservation", "r1", None, Some("admin"))
            .await
            .unwrap();

        let (records, total) = audit
            .query(&AuditFilters {
                action: Some("seat.hold".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(total, 1);
        assert_eq!(records[0].resource_id, "t1");

        let (all, total) = audit.query(&AuditFilters::default()).await.unwrap();
        assert_eq!(total, 2);
        assert_eq!(all.len(), 2);
    }
}
