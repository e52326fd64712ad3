use serde_json::Value;

use mesa_core::events::{self, PaymentStatusEvent};
use mesa_core::models::{OrderStatus, PaymentAttempt, PaymentStatus};
use mesa_core::store::Store;
use mesa_core::Result;
use mesa_notify::NotificationBus;

/// Apply a provider-reported status to an attempt. One transaction covers the
/// attempt update and, on success, flipping the owning order to Paid; the
/// `payment-status` event goes out after the commit. Callers gate on an
/// actual status change, which makes webhook replays no-ops.
pub async fn settle(
    store: &dyn Store,
    bus: &NotificationBus,
    attempt: &PaymentAttempt,
    status: PaymentStatus,
    raw: &Value,
) -> Result<()> {
    let mut tx = store.begin().await?;
    tx.update_payment_attempt(attempt.id, status, raw).await?;
    if status == PaymentStatus::Succeeded {
        tx.update_order_status(attempt.order_id, OrderStatus::Paid)
            .await?;
    }
    tx.commit().await?;

    bus.emit(
        events::PAYMENT_STATUS,
        &PaymentStatusEvent {
            order_id: attempt.order_id,
            provider: attempt.provider,
            status,
            preference_id: None,
        },
    )
    .await
}
