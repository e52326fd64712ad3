//! In-process store used by the test suites and single-node development runs.
//!
//! Transactions clone the current state, apply writes to the clone, and swap
//! it back on commit while holding an owned mutex guard for the whole
//! transaction. That serializes transactions, which gives strictly stronger
//! isolation than the read-committed floor the engines are written against.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use mesa_core::models::*;
use mesa_core::store::*;
use mesa_core::{Error, Result};

#[derive(Debug, Clone, Default)]
struct MemState {
    seats: HashMap<Uuid, Seat>,
    holding_tokens: Vec<HoldingToken>,
    reservation_seats: Vec<ReservationSeat>,
    reservations: HashMap<Uuid, Reservation>,
    orders: HashMap<Uuid, Order>,
    order_items: Vec<OrderItem>,
    payment_attempts: Vec<PaymentAttempt>,
    mercadopago_payments: Vec<MercadoPagoPayment>,
    codi_charges: Vec<CodiCharge>,
    spei_references: Vec<SpeiReference>,
    bank_references: Vec<BankReference>,
    reconciliation_notes: Vec<ReconciliationNote>,
    waitlist_entries: Vec<WaitlistEntry>,
    waitlist_priorities: Vec<WaitlistPriority>,
    notifications: Vec<NotificationRecord>,
    audit: Vec<AuditRecord>,
    venue_events: HashMap<Uuid, VenueEvent>,
    layouts: HashMap<Uuid, Layout>,
    tables: Vec<Table>,
}

#[derive(Clone, Default)]
pub struct MemStore {
    state: Arc<Mutex<MemState>>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    // Seed helpers for tests and local bootstrapping. Layout/table/seat CRUD
    // is owned by an external collaborator in production.

    pub async fn seed_layout(&self, layout: Layout) {
        self.state.lock().await.layouts.insert(layout.id, layout);
    }

    pub async fn seed_venue_event(&self, event: VenueEvent) {
        self.state.lock().await.venue_events.insert(event.id, event);
    }

    pub async fn seed_table(&self, table: Table) {
        self.state.lock().await.tables.push(table);
    }

    pub async fn seed_seat(&self, seat: Seat) {
        self.state.lock().await.seats.insert(seat.id, seat);
    }

    pub async fn seed_order(&self, order: Order, items: Vec<OrderItem>) {
        let mut state = self.state.lock().await;
        state.orders.insert(order.id, order);
        state.order_items.extend(items);
    }

    pub async fn notification_records(&self) -> Vec<NotificationRecord> {
        self.state.lock().await.notifications.clone()
    }
}

fn order_in_request_order<T: Clone>(ids: &[Uuid], mut by_id: HashMap<Uuid, T>) -> Vec<T> {
    ids.iter().filter_map(|id| by_id.remove(id)).collect()
}

#[async_trait]
impl Store for MemStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>> {
        let guard = self.state.clone().lock_owned().await;
        let work = guard.clone();
        Ok(Box::new(MemTx { guard, work }))
    }

    async fn reservation_by_id(&self, id: Uuid) -> Result<Option<Reservation>> {
        Ok(self.state.lock().await.reservations.get(&id).cloned())
    }

    async fn seats_by_ids(&self, seat_ids: &[Uuid]) -> Result<Vec<Seat>> {
        let state = self.state.lock().await;
        let found: HashMap<Uuid, Seat> = seat_ids
            .iter()
            .filter_map(|id| state.seats.get(id).map(|s| (*id, s.clone())))
            .collect();
        Ok(order_in_request_order(seat_ids, found))
    }

    async fn order_by_id(&self, id: Uuid) -> Result<Option<Order>> {
        Ok(self.state.lock().await.orders.get(&id).cloned())
    }

    async fn order_items(&self, order_id: Uuid) -> Result<Vec<OrderItem>> {
        Ok(self
            .state
            .lock()
            .await
            .order_items
            .iter()
            .filter(|i| i.order_id == order_id)
            .cloned()
            .collect())
    }

    async fn payment_attempt_by_id(&self, id: Uuid) -> Result<Option<PaymentAttempt>> {
        Ok(self
            .state
            .lock()
            .await
            .payment_attempts
            .iter()
            .find(|a| a.id == id)
            .cloned())
    }

    async fn payment_attempt_by_external_id(
        &self,
        external_id: &str,
    ) -> Result<Option<PaymentAttempt>> {
        Ok(self
            .state
            .lock()
            .await
            .payment_attempts
            .iter()
            .find(|a| a.external_id.as_deref() == Some(external_id))
            .cloned())
    }

    async fn codi_charge_by_codi_id(&self, codi_id: &str) -> Result<Option<CodiCharge>> {
        Ok(self
            .state
            .lock()
            .await
            .codi_charges
            .iter()
            .find(|c| c.codi_id == codi_id)
            .cloned())
    }

    async fn spei_reference_by_value(&self, reference: &str) -> Result<Option<SpeiReference>> {
        Ok(self
            .state
            .lock()
            .await
            .spei_references
            .iter()
            .find(|r| r.reference == reference)
            .cloned())
    }

    async fn bank_reference_by_id(&self, id: Uuid) -> Result<Option<BankReference>> {
        Ok(self
            .state
            .lock()
            .await
            .bank_references
            .iter()
            .find(|r| r.id == id)
            .cloned())
    }

    async fn list_bank_references(
        &self,
        filters: &ReferenceFilters,
    ) -> Result<(Vec<BankReferenceDetail>, i64)> {
        let state = self.state.lock().await;
        let mut matching: Vec<&BankReference> = state
            .bank_references
            .iter()
            .filter(|r| filters.status.map_or(true, |s| r.status == s))
            .filter(|r| filters.method.map_or(true, |m| r.method == m))
            .filter(|r| filters.from.map_or(true, |from| r.created_at >= from))
            .filter(|r| filters.to.map_or(true, |to| r.created_at <= to))
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let total = matching.len() as i64;
        let skip = ((filters.page() - 1) * filters.page_size()) as usize;
        let details = matching
            .into_iter()
            .skip(skip)
            .take(filters.page_size() as usize)
            .map(|r| BankReferenceDetail {
                reference: r.clone(),
                order: state.orders.get(&r.order_id).cloned(),
                notes: state
                    .reconciliation_notes
                    .iter()
                    .filter(|n| n.reference_id == r.id)
                    .cloned()
                    .collect(),
            })
            .collect();

        Ok((details, total))
    }

    async fn venue_event_by_id(&self, id: Uuid) -> Result<Option<VenueEvent>> {
        Ok(self.state.lock().await.venue_events.get(&id).cloned())
    }

    async fn layout_by_id(&self, id: Uuid) -> Result<Option<Layout>> {
        Ok(self.state.lock().await.layouts.get(&id).cloned())
    }

    async fn tables_for_event(&self, event_id: Uuid, zone_id: Option<Uuid>) -> Result<Vec<Table>> {
        Ok(self
            .state
            .lock()
            .await
            .tables
            .iter()
            .filter(|t| t.event_id == event_id)
            .filter(|t| zone_id.map_or(true, |z| t.zone_id == Some(z)))
            .cloned()
            .collect())
    }

    async fn seat_status_counts(&self, table_ids: &[Uuid]) -> Result<Vec<SeatStatusCount>> {
        let state = self.state.lock().await;
        let mut counts: HashMap<(Uuid, SeatStatus), i64> = HashMap::new();
        for seat in state.seats.values() {
            if table_ids.contains(&seat.table_id) {
                *counts.entry((seat.table_id, seat.status)).or_default() += 1;
            }
        }
        Ok(counts
            .into_iter()
            .map(|((table_id, status), count)| SeatStatusCount {
                table_id,
                status,
                count,
            })
            .collect())
    }

    async fn waitlist_scope_counts(&self, event_id: Uuid) -> Result<Vec<WaitlistScopeCount>> {
        let state = self.state.lock().await;
        let mut counts: HashMap<WaitlistScope, i64> = HashMap::new();
        for entry in state.waitlist_entries.iter().filter(|e| e.event_id == event_id) {
            *counts.entry(entry.scope).or_default() += 1;
        }
        Ok(counts
            .into_iter()
            .map(|(scope, count)| WaitlistScopeCount { scope, count })
            .collect())
    }

    async fn enqueue_notification(
        &self,
        event: &str,
        payload: &Value,
    ) -> Result<NotificationRecord> {
        let record = NotificationRecord {
            id: Uuid::new_v4(),
            event: event.to_string(),
            payload: payload.clone(),
            status: NotificationStatus::Pending,
            attempts: 0,
            last_error: None,
            delivered_at: None,
            created_at: Utc::now(),
        };
        self.state.lock().await.notifications.push(record.clone());
        Ok(record)
    }

    async fn mark_notification_delivered(&self, id: Uuid, at: DateTime<Utc>) -> Result<()> {
        let mut state = self.state.lock().await;
        let record = state
            .notifications
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| Error::not_found(format!("notification {id}")))?;
        record.status = NotificationStatus::Delivered;
        record.delivered_at = Some(at);
        record.attempts += 1;
        record.last_error = None;
        Ok(())
    }

    async fn mark_notification_failed(&self, id: Uuid, error: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        let record = state
            .notifications
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| Error::not_found(format!("notification {id}")))?;
        record.status = NotificationStatus::Failed;
        record.attempts += 1;
        record.last_error = Some(error.to_string());
        Ok(())
    }

    async fn undelivered_notifications(&self, limit: i64) -> Result<Vec<NotificationRecord>> {
        Ok(self
            .state
            .lock()
            .await
            .notifications
            .iter()
            .filter(|r| {
                matches!(
                    r.status,
                    NotificationStatus::Pending | NotificationStatus::Failed
                )
            })
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn record_audit(&self, entry: &NewAuditRecord) -> Result<AuditRecord> {
        let record = AuditRecord {
            id: Uuid::new_v4(),
            action: entry.action.clone(),
            resource_type: entry.resource_type.clone(),
            resource_id: entry.resource_id.clone(),
            metadata: entry.metadata.clone(),
            actor_id: entry.actor_id.clone(),
            created_at: Utc::now(),
        };
        self.state.lock().await.audit.push(record.clone());
        Ok(record)
    }

    async fn query_audit(&self, filters: &AuditFilters) -> Result<(Vec<AuditRecord>, i64)> {
        let state = self.state.lock().await;
        let mut matching: Vec<&AuditRecord> = state
            .audit
            .iter()
            .filter(|r| {
                filters
                    .resource_type
                    .as_deref()
                    .map_or(true, |t| r.resource_type == t)
            })
            .filter(|r| filters.action.as_deref().map_or(true, |a| r.action == a))
            .filter(|r| {
                filters
                    .actor_id
                    .as_deref()
                    .map_or(true, |a| r.actor_id.as_deref() == Some(a))
            })
            .filter(|r| filters.from.map_or(true, |from| r.created_at >= from))
            .filter(|r| filters.to.map_or(true, |to| r.created_at <= to))
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let total = matching.len() as i64;
        let page = matching
            .into_iter()
            .skip(filters.skip() as usize)
            .take(filters.take() as usize)
            .cloned()
            .collect();
        Ok((page, total))
    }
}

struct MemTx {
    guard: OwnedMutexGuard<MemState>,
    work: MemState,
}

#[async_trait]
impl StoreTx for MemTx {
    async fn seats_in_table(&mut self, table_id: Uuid, seat_ids: &[Uuid]) -> Result<Vec<Seat>> {
        let found: HashMap<Uuid, Seat> = seat_ids
            .iter()
            .filter_map(|id| {
                self.work
                    .seats
                    .get(id)
                    .filter(|s| s.table_id == table_id)
                    .map(|s| (*id, s.clone()))
            })
            .collect();
        Ok(order_in_request_order(seat_ids, found))
    }

    async fn seats_by_ids(&mut self, seat_ids: &[Uuid]) -> Result<Vec<Seat>> {
        let found: HashMap<Uuid, Seat> = seat_ids
            .iter()
            .filter_map(|id| self.work.seats.get(id).map(|s| (*id, s.clone())))
            .collect();
        Ok(order_in_request_order(seat_ids, found))
    }

    async fn update_seat_status(
        &mut self,
        seat_id: Uuid,
        status: SeatStatus,
        hold_ends_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let seat = self
            .work
            .seats
            .get_mut(&seat_id)
            .ok_or_else(|| Error::not_found(format!("seat {seat_id}")))?;
        seat.status = status;
        seat.hold_ends_at = hold_ends_at;
        Ok(())
    }

    async fn insert_holding_token(&mut self, token: &HoldingToken) -> Result<()> {
        self.work.holding_tokens.push(token.clone());
        Ok(())
    }

    async fn holding_token_by_value(&mut self, token: &str) -> Result<Option<HoldingToken>> {
        Ok(self
            .work
            .holding_tokens
            .iter()
            .find(|t| t.token == token)
            .cloned())
    }

    async fn insert_reservation_seat(&mut self, link: &ReservationSeat) -> Result<()> {
        self.work.reservation_seats.push(link.clone());
        Ok(())
    }

    async fn reservation_seats_for_token(
        &mut self,
        holding_token_id: Uuid,
    ) -> Result<Vec<ReservationSeat>> {
        Ok(self
            .work
            .reservation_seats
            .iter()
            .filter(|l| l.holding_token_id == holding_token_id)
            .cloned()
            .collect())
    }

    async fn reservation_seats_for_reservation(
        &mut self,
        reservation_id: Uuid,
    ) -> Result<Vec<ReservationSeat>> {
        Ok(self
            .work
            .reservation_seats
            .iter()
            .filter(|l| l.reservation_id == Some(reservation_id))
            .cloned()
            .collect())
    }

    async fn delete_reservation_seats_for_seats(&mut self, seat_ids: &[Uuid]) -> Result<()> {
        self.work
            .reservation_seats
            .retain(|l| !seat_ids.contains(&l.seat_id));
        Ok(())
    }

    async fn delete_reservation_seats_for_reservation(
        &mut self,
        reservation_id: Uuid,
    ) -> Result<()> {
        self.work
            .reservation_seats
            .retain(|l| l.reservation_id != Some(reservation_id));
        Ok(())
    }

    async fn assign_reservation_seats(
        &mut self,
        holding_token_id: Uuid,
        reservation_id: Uuid,
        status: SeatStatus,
    ) -> Result<()> {
        for link in self
            .work
            .reservation_seats
            .iter_mut()
            .filter(|l| l.holding_token_id == holding_token_id)
        {
            link.reservation_id = Some(reservation_id);
            link.status = status;
        }
        Ok(())
    }

    async fn insert_reservation(&mut self, reservation: &Reservation) -> Result<()> {
        self.work
            .reservations
            .insert(reservation.id, reservation.clone());
        Ok(())
    }

    async fn reservation_by_id(&mut self, id: Uuid) -> Result<Option<Reservation>> {
        Ok(self.work.reservations.get(&id).cloned())
    }

    async fn update_reservation_status(
        &mut self,
        id: Uuid,
        status: ReservationStatus,
        cancelled_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let reservation = self
            .work
            .reservations
            .get_mut(&id)
            .ok_or_else(|| Error::not_found(format!("reservation {id}")))?;
        reservation.status = status;
        reservation.cancelled_at = cancelled_at;
        Ok(())
    }

    async fn insert_order(&mut self, order: &Order, items: &[OrderItem]) -> Result<()> {
        self.work.orders.insert(order.id, order.clone());
        self.work.order_items.extend_from_slice(items);
        Ok(())
    }

    async fn update_order_status(&mut self, order_id: Uuid, status: OrderStatus) -> Result<()> {
        let order = self
            .work
            .orders
            .get_mut(&order_id)
            .ok_or_else(|| Error::not_found(format!("order {order_id}")))?;
        order.status = status;
        Ok(())
    }

    async fn insert_payment_attempt(&mut self, attempt: &PaymentAttempt) -> Result<()> {
        self.work.payment_attempts.push(attempt.clone());
        Ok(())
    }

    async fn update_payment_attempt(
        &mut self,
        id: Uuid,
        status: PaymentStatus,
        metadata: &Value,
    ) -> Result<()> {
        let attempt = self
            .work
            .payment_attempts
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or_else(|| Error::not_found(format!("payment attempt {id}")))?;
        attempt.status = status;
        attempt.metadata = metadata.clone();
        Ok(())
    }

    async fn insert_mercadopago_payment(&mut self, record: &MercadoPagoPayment) -> Result<()> {
        self.work.mercadopago_payments.push(record.clone());
        Ok(())
    }

    async fn insert_codi_charge(&mut self, record: &CodiCharge) -> Result<()> {
        self.work.codi_charges.push(record.clone());
        Ok(())
    }

    async fn update_codi_charge(
        &mut self,
        id: Uuid,
        status: &str,
        raw_response: &Value,
    ) -> Result<()> {
        let charge = self
            .work
            .codi_charges
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| Error::not_found(format!("codi charge {id}")))?;
        charge.status = status.to_string();
        charge.raw_response = raw_response.clone();
        Ok(())
    }

    async fn insert_spei_reference(&mut self, record: &SpeiReference) -> Result<()> {
        self.work.spei_references.push(record.clone());
        Ok(())
    }

    async fn update_spei_reference(
        &mut self,
        id: Uuid,
        status: &str,
        receipt_url: Option<&str>,
    ) -> Result<()> {
        let reference = self
            .work
            .spei_references
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| Error::not_found(format!("spei reference {id}")))?;
        reference.status = status.to_string();
        if receipt_url.is_some() {
            reference.receipt_url = receipt_url.map(str::to_string);
        }
        Ok(())
    }

    async fn insert_bank_reference(&mut self, record: &BankReference) -> Result<()> {
        self.work.bank_references.push(record.clone());
        Ok(())
    }

    async fn update_bank_reference(
        &mut self,
        id: Uuid,
        status: BankReferenceStatus,
        receipt_url: Option<&str>,
    ) -> Result<()> {
        let reference = self
            .work
            .bank_references
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| Error::not_found(format!("bank reference {id}")))?;
        reference.status = status;
        if receipt_url.is_some() {
            reference.receipt_url = receipt_url.map(str::to_string);
        }
        Ok(())
    }

    async fn update_bank_references_by_reference(
        &mut self,
        reference: &str,
        status: BankReferenceStatus,
        receipt_url: Option<&str>,
    ) -> Result<()> {
        for row in self
            .work
            .bank_references
            .iter_mut()
            .filter(|r| r.reference == reference)
        {
            row.status = status;
            if receipt_url.is_some() {
                row.receipt_url = receipt_url.map(str::to_string);
            }
        }
        Ok(())
    }

    async fn insert_reconciliation_note(&mut self, note: &ReconciliationNote) -> Result<()> {
        self.work.reconciliation_notes.push(note.clone());
        Ok(())
    }

    async fn waitlist_entry_for_user(
        &mut self,
        event_id: Option<Uuid>,
        table_id: Uuid,
        user_id: &str,
    ) -> Result<Option<WaitlistEntry>> {
        Ok(self
            .work
            .waitlist_entries
            .iter()
            .find(|e| {
                e.table_id == table_id
                    && e.user_id == user_id
                    && event_id.map_or(true, |ev| e.event_id == ev)
            })
            .cloned())
    }

    async fn insert_waitlist_entry(&mut self, entry: &WaitlistEntry) -> Result<()> {
        self.work.waitlist_entries.push(entry.clone());
        Ok(())
    }

    async fn insert_waitlist_priority(&mut self, priority: &WaitlistPriority) -> Result<()> {
        self.work.waitlist_priorities.push(priority.clone());
        Ok(())
    }

    async fn delete_waitlist_entry(&mut self, entry_id: Uuid) -> Result<()> {
        self.work.waitlist_priorities.retain(|p| p.entry_id != entry_id);
        self.work.waitlist_entries.retain(|e| e.id != entry_id);
        Ok(())
    }

    async fn commit(mut self: Box<Self>) -> Result<()> {
        *self.guard = std::mem::take(&mut self.work);
        Ok(())
    }
}
