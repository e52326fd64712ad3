use std::sync::Arc;

use chrono::Duration;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use mesa_core::clock::Clock;
use mesa_core::events::{self, SeatStatusEvent};
use mesa_core::models::*;
use mesa_core::store::Store;
use mesa_core::{Error, Result};
use mesa_notify::{AuditRecorder, NotificationBus};

const DEFAULT_HOLD_SECONDS: i64 = 300;
const MIN_HOLD_SECONDS: i64 = 30;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HoldSeatsRequest {
    pub event_id: Uuid,
    pub table_id: Uuid,
    pub seat_ids: Vec<Uuid>,
    pub duration_seconds: Option<i64>,
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HoldOutcome {
    pub holding_token: String,
    pub expires_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmRequest {
    pub token: String,
    pub customer_name: Option<String>,
    pub customer_email: Option<String>,
    pub customer_phone: Option<String>,
    pub total_amount: Option<i64>,
    pub currency: Option<String>,
    pub items: Option<Vec<OrderItemInput>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItemInput {
    pub description: String,
    pub quantity: i32,
    pub unit_price: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmOutcome {
    pub reservation: Reservation,
    pub order: Option<Order>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinWaitlistRequest {
    pub event_id: Uuid,
    pub table_id: Uuid,
    pub user_id: String,
    pub scope: WaitlistScope,
    pub priority: Option<i32>,
    pub notes: Option<String>,
}

/// Seat lifecycle engine. Every state transition runs in one `StoreTx`; the
/// `seat-status` events and audit entries go out only after the commit.
pub struct ReservationEngine {
    store: Arc<dyn Store>,
    bus: Arc<NotificationBus>,
    audit: Arc<AuditRecorder>,
    clock: Arc<dyn Clock>,
}

impl ReservationEngine {
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

    /// Place a timed hold over a set of seats in one table. Seats already
    /// reserved or blocked conflict; a lapsed hold on the same seats is
    /// silently displaced together with its stale seat links.
    pub async fn hold_seats(&self, req: HoldSeatsRequest) -> Result<HoldOutcome> {
        if req.seat_ids.is_empty() {
            return Err(Error::BadRequest("seatIds must not be empty".to_string()));
        }
        let duration = req.duration_seconds.unwrap_or(DEFAULT_HOLD_SECONDS);
        if duration < MIN_HOLD_SECONDS {
            return Err(Error::BadRequest(format!(
                "durationSeconds must be at least {MIN_HOLD_SECONDS}"
            )));
        }

        let now = self.clock.now();
        let expires_at = now + Duration::seconds(duration);

        let mut tx = self.store.begin().await?;

        let seats = tx.seats_in_table(req.table_id, &req.seat_ids).await?;
        if seats.len() != req.seat_ids.len() {
            return Err(Error::not_found("one or more seats were not found"));
        }

        for seat in &seats {
            match seat.status {
                SeatStatus::Reserved | SeatStatus::Blocked => {
                    return Err(Error::conflict(format!("seat {} is not available", seat.id)));
                }
                SeatStatus::Held => {
                    if seat.hold_ends_at.is_some_and(|ends| ends > now) {
                        return Err(Error::conflict(format!("seat {} is already held", seat.id)));
                    }
                }
                SeatStatus::Available => {}
            }
        }

        tx.delete_reservation_seats_for_seats(&req.seat_ids).await?;

        let token = HoldingToken {
            id: Uuid::new_v4(),
            token: Uuid::new_v4().to_string(),
            event_id: req.event_id,
            table_id: req.table_id,
            expires_at,
        };
        tx.insert_holding_token(&token).await?;

        for seat in &seats {
            tx.update_seat_status(seat.id, SeatStatus::Held, Some(expires_at))
                .await?;
            tx.insert_reservation_seat(&ReservationSeat {
                id: Uuid::new_v4(),
                seat_id: seat.id,
                holding_token_id: token.id,
                reservation_id: None,
                status: SeatStatus::Held,
            })
            .await?;
        }

        tx.commit().await?;
        info!(table_id = %req.table_id, seats = seats.len(), "seats held");

        for seat in &seats {
            self.bus
                .emit(
                    events::SEAT_STATUS,
                    &SeatStatusEvent {
                        seat_id: seat.id,
                        table_id: Some(seat.table_id),
                        status: SeatStatus::Held,
                        expires_at: Some(expires_at),
                    },
                )
                .await?;
        }

        self.audit
            .log(
                "seat.hold",
                "seat",
                &req.table_id.to_string(),
                Some(json!({
                    "seatIds": req.seat_ids,
                    "token": token.token,
                    "expiresAt": expires_at,
                })),
                req.user_id.as_deref(),
            )
            .await?;

        Ok(HoldOutcome {
            holding_token: token.token,
            expires_at,
        })
    }

    /// Redeem a holding token into a confirmed reservation. The token must be
    /// unexpired and every linked seat still held. An order is created only
    /// when a positive total is supplied.
    pub async fn confirm(&self, req: ConfirmRequest) -> Result<ConfirmOutcome> {
        let now = self.clock.now();
        let mut tx = self.store.begin().await?;

        let holding = tx
            .holding_token_by_value(&req.token)
            .await?
            .ok_or_else(|| Error::not_found("holding token not found"))?;
        if holding.expires_at < now {
            return Err(Error::conflict("holding token expired"));
        }

        let links = tx.reservation_seats_for_token(holding.id).await?;
        let seat_ids: Vec<Uuid> = links.iter().map(|link| link.seat_id).collect();
        let seats = tx.seats_by_ids(&seat_ids).await?;
        for seat in &seats {
            if seat.status != SeatStatus::Held {
                return Err(Error::conflict(format!("seat {} is no longer held", seat.id)));
            }
        }

        let reservation = Reservation {
            id: Uuid::new_v4(),
            event_id: holding.event_id,
            table_id: holding.table_id,
            holding_token_id: holding.id,
            status: ReservationStatus::Confirmed,
            customer_name: req.customer_name.clone(),
            customer_email: req.customer_email.clone(),
            customer_phone: req.customer_phone.clone(),
            cancelled_at: None,
            created_at: now,
        };
        tx.insert_reservation(&reservation).await?;
        tx.assign_reservation_seats(holding.id, reservation.id, SeatStatus::Reserved)
            .await?;
        for seat_id in &seat_ids {
            tx.update_seat_status(*seat_id, SeatStatus::Reserved, None)
                .await?;
        }

        let total_amount = req.total_amount.unwrap_or(0);
        let order = if total_amount > 0 {
            let order_id = Uuid::new_v4();
            let order = Order {
                id: order_id,
                reservation_id: reservation.id,
                customer_name: req.customer_name,
                customer_email: req.customer_email,
                customer_phone: req.customer_phone,
                total_amount,
                currency: req.currency.unwrap_or_else(|| "MXN".to_string()),
                status: OrderStatus::Pending,
                created_at: now,
            };
            let items: Vec<OrderItem> = req
                .items
                .unwrap_or_default()
                .into_iter()
                .map(|item| OrderItem {
                    id: Uuid::new_v4(),
                    order_id,
                    description: item.description,
                    quantity: item.quantity,
                    unit_price: item.unit_price,
                })
                .collect();
            tx.insert_order(&order, &items).await?;
            Some(order)
        } else {
            None
        };

        tx.commit().await?;
        info!(reservation_id = %reservation.id, seats = seat_ids.len(), "reservation confirmed");

        for seat in &seats {
            self.bus
                .emit(
                    events::SEAT_STATUS,
                    &SeatStatusEvent {
                        seat_id: seat.id,
                        table_id: Some(seat.table_id),
                        status: SeatStatus::Reserved,
                        expires_at: None,
                    },
                )
                .await?;
        }

        self.audit
            .log(
                "reservation.confirmed",
                "reservation",
                &reservation.id.to_string(),
                Some(json!({
                    "seats": seat_ids,
                    "orderId": order.as_ref().map(|o| o.id),
                })),
                None,
            )
            .await?;

        Ok(ConfirmOutcome { reservation, order })
    }

    /// Release a confirmed reservation. Cancelling twice conflicts.
    pub async fn cancel(&self, reservation_id: Uuid) -> Result<()> {
        let mut tx = self.store.begin().await?;

        let reservation = tx
            .reservation_by_id(reservation_id)
            .await?
            .ok_or_else(|| Error::not_found("reservation not found"))?;
        if reservation.status == ReservationStatus::Cancelled {
            return Err(Error::conflict("reservation already cancelled"));
        }

        let links = tx.reservation_seats_for_reservation(reservation_id).await?;
        let seat_ids: Vec<Uuid> = links.iter().map(|link| link.seat_id).collect();

        tx.delete_reservation_seats_for_reservation(reservation_id)
            .await?;
        for seat_id in &seat_ids {
            tx.update_seat_status(*seat_id, SeatStatus::Available, None)
                .await?;
        }
        tx.update_reservation_status(
            reservation_id,
            ReservationStatus::Cancelled,
            Some(self.clock.now()),
        )
        .await?;

        tx.commit().await?;
        info!(reservation_id = %reservation_id, seats = seat_ids.len(), "reservation cancelled");

        for seat_id in &seat_ids {
            self.bus
                .emit(
                    events::SEAT_STATUS,
                    &SeatStatusEvent {
                        seat_id: *seat_id,
                        table_id: None,
                        status: SeatStatus::Available,
                        expires_at: None,
                    },
                )
                .await?;
        }

        self.audit
            .log(
                "reservation.cancelled",
                "reservation",
                &reservation_id.to_string(),
                Some(json!({ "seats": seat_ids })),
                None,
            )
            .await?;

        Ok(())
    }

    /// One waitlist entry per (event, table, user).
    pub async fn join_waitlist(&self, req: JoinWaitlistRequest) -> Result<WaitlistEntry> {
        if req.user_id.is_empty() {
            return Err(Error::BadRequest("userId must not be empty".to_string()));
        }

        let mut tx = self.store.begin().await?;

        if tx
            .waitlist_entry_for_user(Some(req.event_id), req.table_id, &req.user_id)
            .await?
            .is_some()
        {
            return Err(Error::conflict("already on waitlist"));
        }

        let entry = WaitlistEntry {
            id: Uuid::new_v4(),
            event_id: req.event_id,
            table_id: req.table_id,
            user_id: req.user_id.clone(),
            scope: req.scope,
            created_at: self.clock.now(),
        };
        tx.insert_waitlist_entry(&entry).await?;

        if req.priority.is_some() || req.notes.is_some() {
            tx.insert_waitlist_priority(&WaitlistPriority {
                id: Uuid::new_v4(),
                entry_id: entry.id,
                priority: req.priority.unwrap_or(0),
                notes: req.notes,
            })
            .await?;
        }

        tx.commit().await?;

        self.audit
            .log(
                "waitlist.join",
                "waitlist",
                &entry.id.to_string(),
                Some(json!({ "eventId": req.event_id, "tableId": req.table_id })),
                Some(&req.user_id),
            )
            .await?;

        Ok(entry)
    }

    pub async fn leave_waitlist(&self, table_id: Uuid, user_id: &str) -> Result<()> {
        if user_id.is_empty() {
            return Err(Error::Forbidden(
                "userId is required to leave the waitlist".to_string(),
            ));
        }

        let mut tx = self.store.begin().await?;

        let entry = tx
            .waitlist_entry_for_user(None, table_id, user_id)
            .await?
            .ok_or_else(|| Error::not_found("waitlist entry not found"))?;
        tx.delete_waitlist_entry(entry.id).await?;

        tx.commit().await?;

        self.audit
            .log(
                "waitlist.leave",
                "waitlist",
                &entry.id.to_string(),
                Some(json!({ "tableId": table_id })),
                Some(user_id),
            )
            .await?;

        Ok(())
    }
}
