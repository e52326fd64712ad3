use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use mesa_core::clock::Clock;
use mesa_core::store::Store;
use mesa_core::{Error, Result};

/// Listener callbacks run synchronously inside `emit`, in registration order.
/// Returning `Err` marks the record failed and surfaces to the emitter.
pub type Listener = Arc<dyn Fn(&Value) -> std::result::Result<(), String> + Send + Sync>;

type Registry = Arc<RwLock<HashMap<String, Vec<(u64, Listener)>>>>;

/// Write-ahead notification bus. `emit` journals the event as a pending
/// record, fans out to listeners, then marks the record delivered or failed.
pub struct NotificationBus {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    listeners: Registry,
    next_id: AtomicU64,
    retry_gate: tokio::sync::Mutex<()>,
}

/// Handle returned by [`NotificationBus::on`]; dropping it removes the
/// listener.
pub struct Subscription {
    registry: Registry,
    event: String,
    id: u64,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Ok(mut map) = self.registry.write() {
            if let Some(entries) = map.get_mut(&self.event) {
                entries.retain(|(id, _)| *id != self.id);
            }
        }
    }
}

impl NotificationBus {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            listeners: Arc::new(RwLock::new(HashMap::new())),
            next_id: AtomicU64::new(1),
            retry_gate: tokio::sync::Mutex::new(()),
        }
    }

    /// Register a listener for one event name.
    pub fn on(&self, event: &str, listener: Listener) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut map) = self.listeners.write() {
            map.entry(event.to_string())
                .or_default()
                .push((id, listener));
        }
        Subscription {
            registry: self.listeners.clone(),
            event: event.to_string(),
            id,
        }
    }

    /// Journal the event, fan it out, and record the outcome. A listener
    /// failure is persisted on the record and re-raised to the caller; the
    /// record stays eligible for [`retry_pending`](Self::retry_pending).
    pub async fn emit<T: Serialize>(&self, event: &str, payload: &T) -> Result<()> {
        let payload = serde_json::to_value(payload).map_err(Error::internal)?;
        let record = self.store.enqueue_notification(event, &payload).await?;
        debug!(event, id = %record.id, "notification enqueued");

        match self.dispatch(event, &payload) {
            Ok(()) => {
                self.store
                    .mark_notification_delivered(record.id, self.clock.now())
                    .await
            }
            Err(msg) => {
                warn!(event, id = %record.id, error = %msg, "notification delivery failed");
                self.store.mark_notification_failed(record.id, &msg).await?;
                Err(Error::Internal(format!("notification delivery failed: {msg}")))
            }
        }
    }

    /// Re-run delivery for records still pending or failed, oldest first.
    /// Each record succeeds or fails independently. Returns how many records
    /// were attempted; a concurrent pass in the same process short-circuits
    /// to zero.
    pub async fn retry_pending(&self, limit: i64) -> Result<usize> {
        let Ok(_gate) = self.retry_gate.try_lock() else {
            return Ok(0);
        };

        let records = self.store.undelivered_notifications(limit).await?;
        let attempted = records.len();
        for record in records {
            match self.dispatch(&record.event, &record.payload) {
                Ok(()) => {
                    self.store
                        .mark_notification_delivered(record.id, self.clock.now())
                        .await?;
                }
                Err(msg) => {
                    warn!(event = %record.event, id = %record.id, error = %msg, "redelivery failed");
                    self.store.mark_notification_failed(record.id, &msg).await?;
                }
            }
        }
        Ok(attempted)
    }

    fn dispatch(&self, event: &str, payload: &Value) -> std::result::Result<(), String> {
        let entries: Vec<Listener> = match self.listeners.read() {
            Ok(map) => map
                .get(event)
                .map(|v| v.iter().map(|(_, l)| l.clone()).collect())
                .unwrap_or_default(),
            Err(_) => return Err("listener registry poisoned".to_string()),
        };
        for listener in entries {
            listener(payload)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mesa_core::clock::ManualClock;
    use mesa_core::models::NotificationStatus;
    use mesa_store::MemStore;
    use serde_json::json;
    use std::sync::Mutex;

    fn bus_with_store() -> (Arc<MemStore>, NotificationBus) {
        let store = Arc::new(MemStore::new());
        let clock = Arc::new(ManualClock::starting_now());
        let bus = NotificationBus::new(store.clone(), clock);
        (store, bus)
    }

    #[tokio::test]
    async fn emit_journals_then_marks_delivered() {
        let (store, bus) = bus_with_store();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let _sub = bus.on(
            "seat-status",
            Arc::new(move |payload| {
                sink.lock().unwrap().push(payload.clone());
                Ok(())
            }),
        );

        bus.emit("seat-status", &json!({"seatId": "s1"})).await.unwrap();

        assert_eq!(seen.lock().unwrap().len(), 1);
        let records = store.notification_records().await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, NotificationStatus::Delivered);
        assert!(records[0].delivered_at.is_some());
    }

    #[tokio::test]
    async fn listeners_run_in_registration_order() {
        let (_store, bus) = bus_with_store();
        let order = Arc::new(Mutex::new(Vec::new()));
        let a = order.clone();
        let b = order.clone();
        let _s1 = bus.on(
            "payment-status",
            Arc::new(move |_| {
                a.lock().unwrap().push("first");
                Ok(())
            }),
        );
        let _s2 = bus.on(
            "payment-status",
            Arc::new(move |_| {
                b.lock().unwrap().push("second");
                Ok(())
            }),
        );

        bus.emit("payment-status", &json!({})).await.unwrap();
        assert_eq!(*order.lock().unwrap(), vec!["first", "second"]);
    }

    #[tokio::test]
    async fn failed_delivery_is_recorded_and_retried() {
        let (store, bus) = bus_with_store();
        let healthy = Arc::new(Mutex::new(false));
        let flag = healthy.clone();
        let _sub = bus.on(
            "codi-status",
            Arc::new(move |_| {
                if *flag.lock().unwrap() {
                    Ok(())
                } else {
                    Err("sink unavailable".to_string())
                }
            }),
        );

        let err = bus.emit("codi-status", &json!({"codiId": "c1"})).await;
        assert!(err.is_err());
        let records = store.notification_records().await;
        assert_eq!(records[0].status, NotificationStatus::Failed);
        assert_eq!(records[0].last_error.as_deref(), Some("sink unavailable"));

        *healthy.lock().unwrap() = true;
        let attempted = bus.retry_pending(10).await.unwrap();
        assert_eq!(attempted, 1);
        let records = store.notification_records().await;
        assert_eq!(records[0].status, NotificationStatus::Delivered);
    }

    #[tokio::test]
    async fn overlapping_retry_pass_is_skipped() {
        let (store, bus) = bus_with_store();
        let healthy = Arc::new(Mutex::new(false));
        let flag = healthy.clone();
        let _sub = bus.on(
            "seat-status",
            Arc::new(move |_| {
                if *flag.lock().unwrap() {
                    Ok(())
                } else {
                    Err("sink unavailable".to_string())
                }
            }),
        );
        assert!(bus.emit("seat-status", &json!({"seatId": "s1"})).await.is_err());
        *healthy.lock().unwrap() = true;

        // While one pass holds the gate, a second pass must do nothing.
        let in_flight = bus.retry_gate.try_lock().unwrap();
        assert_eq!(bus.retry_pending(10).await.unwrap(), 0);
        let records = store.notification_records().await;
        assert_eq!(records[0].status, NotificationStatus::Failed);

        drop(in_flight);
        assert_eq!(bus.retry_pending(10).await.unwrap(), 1);
        let records = store.notification_records().await;
        assert_eq!(records[0].status, NotificationStatus::Delivered);
    }

    #[tokio::test]
    async fn dropping_subscription_stops_delivery() {
        let (_store, bus) = bus_with_store();
        let count = Arc::new(Mutex::new(0));
        let sink = count.clone();
        let sub = bus.on(
            "spei-confirmed",
            Arc::new(move |_| {
                *sink.lock().unwrap() += 1;
                Ok(())
            }),
        );

        bus.emit("spei-confirmed", &json!({})).await.unwrap();
        drop(sub);
        bus.emit("spei-confirmed", &json!({})).await.unwrap();

        assert_eq!(*count.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn emit_without_listeners_still_delivers() {
        let (store, bus) = bus_with_store();
        bus.emit("reference-updated", &json!({"orderId": "o1"}))
            .await
            .unwrap();
        let records = store.notification_records().await;
        assert_eq!(records[0].status, NotificationStatus::Delivered);
    }
}
