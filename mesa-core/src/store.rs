use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

use crate::models::*;
use crate::Result;

/// Pagination/filter input for the bank-reference reconciliation queue.
#[derive(Debug, Clone, Default)]
pub struct ReferenceFilters {
    pub status: Option<BankReferenceStatus>,
    pub method: Option<BankReferenceMethod>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub page: Option<i64>,
    pub page_size: Option<i64>,
}

impl ReferenceFilters {
    pub fn page(&self) -> i64 {
        self.page.unwrap_or(1).max(1)
    }

    pub fn page_size(&self) -> i64 {
        self.page_size.unwrap_or(20).max(1)
    }
}

#[derive(Debug, Clone, Default)]
pub struct AuditFilters {
    pub resource_type: Option<String>,
    pub action: Option<String>,
    pub actor_id: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub take: Option<i64>,
    pub skip: Option<i64>,
}

impl AuditFilters {
    pub fn take(&self) -> i64 {
        self.take.unwrap_or(20).max(1)
    }

    pub fn skip(&self) -> i64 {
        self.skip.unwrap_or(0).max(0)
    }
}

#[derive(Debug, Clone)]
pub struct NewAuditRecord {
    pub action: String,
    pub resource_type: String,
    pub resource_id: String,
    pub metadata: Option<Value>,
    pub actor_id: Option<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct SeatStatusCount {
    pub table_id: Uuid,
    pub status: SeatStatus,
    pub count: i64,
}

#[derive(Debug, Clone, Copy)]
pub struct WaitlistScopeCount {
    pub scope: WaitlistScope,
    pub count: i64,
}

/// Single source of truth for all durable state. Reads and the notification /
/// audit bookkeeping run directly against the store; every multi-row state
/// transition goes through a [`StoreTx`] obtained from [`Store::begin`].
#[async_trait]
pub trait Store: Send + Sync {
    /// Open an atomic transaction context. Dropping the returned handle
    /// without calling `commit` discards all of its writes.
    async fn begin(&self) -> Result<Box<dyn StoreTx>>;

    // -- reservation / order reads --

    async fn reservation_by_id(&self, id: Uuid) -> Result<Option<Reservation>>;
    async fn seats_by_ids(&self, seat_ids: &[Uuid]) -> Result<Vec<Seat>>;
    async fn order_by_id(&self, id: Uuid) -> Result<Option<Order>>;
    async fn order_items(&self, order_id: Uuid) -> Result<Vec<OrderItem>>;

    // -- payment reads --

    async fn payment_attempt_by_id(&self, id: Uuid) -> Result<Option<PaymentAttempt>>;
    async fn payment_attempt_by_external_id(
        &self,
        external_id: &str,
    ) -> Result<Option<PaymentAttempt>>;
    async fn codi_charge_by_codi_id(&self, codi_id: &str) -> Result<Option<CodiCharge>>;
    async fn spei_reference_by_value(&self, reference: &str) -> Result<Option<SpeiReference>>;
    async fn bank_reference_by_id(&self, id: Uuid) -> Result<Option<BankReference>>;
    async fn list_bank_references(
        &self,
        filters: &ReferenceFilters,
    ) -> Result<(Vec<BankReferenceDetail>, i64)>;

    // -- availability projector reads --

    async fn venue_event_by_id(&self, id: Uuid) -> Result<Option<VenueEvent>>;
    async fn layout_by_id(&self, id: Uuid) -> Result<Option<Layout>>;
    async fn tables_for_event(&self, event_id: Uuid, zone_id: Option<Uuid>) -> Result<Vec<Table>>;
    async fn seat_status_counts(&self, table_ids: &[Uuid]) -> Result<Vec<SeatStatusCount>>;
    async fn waitlist_scope_counts(&self, event_id: Uuid) -> Result<Vec<WaitlistScopeCount>>;

    // -- notification queue --

    async fn enqueue_notification(&self, event: &str, payload: &Value)
        -> Result<NotificationRecord>;
    async fn mark_notification_delivered(&self, id: Uuid, at: DateTime<Utc>) -> Result<()>;
    async fn mark_notification_failed(&self, id: Uuid, error: &str) -> Result<()>;
    /// Records still awaiting delivery (status pending or failed), oldest first.
    async fn undelivered_notifications(&self, limit: i64) -> Result<Vec<NotificationRecord>>;

    // -- audit --

    async fn record_audit(&self, entry: &NewAuditRecord) -> Result<AuditRecord>;
    async fn query_audit(&self, filters: &AuditFilters) -> Result<(Vec<AuditRecord>, i64)>;
}

/// Explicit transaction-context handle. All dependent writes of one logical
/// operation happen on a single `StoreTx`; the in-transaction reads observe
/// the store at at-least read-committed isolation, and callers re-check seat
/// status rather than blindly overwriting.
#[async_trait]
pub trait StoreTx: Send {
    // -- seats & holds --

    /// Seats matching the requested ids scoped to one table; callers compare
    /// the returned count against the requested count.
    async fn seats_in_table(&mut self, table_id: Uuid, seat_ids: &[Uuid]) -> Result<Vec<Seat>>;
    async fn seats_by_ids(&mut self, seat_ids: &[Uuid]) -> Result<Vec<Seat>>;
    async fn update_seat_status(
        &mut self,
        seat_id: Uuid,
        status: SeatStatus,
        hold_ends_at: Option<DateTime<Utc>>,
    ) -> Result<()>;
    async fn insert_holding_token(&mut self, token: &HoldingToken) -> Result<()>;
    async fn holding_token_by_value(&mut self, token: &str) -> Result<Option<HoldingToken>>;

    // -- reservation seat links --

    async fn insert_reservation_seat(&mut self, link: &ReservationSeat) -> Result<()>;
    async fn reservation_seats_for_token(
        &mut self,
        holding_token_id: Uuid,
    ) -> Result<Vec<ReservationSeat>>;
    async fn reservation_seats_for_reservation(
        &mut self,
        reservation_id: Uuid,
    ) -> Result<Vec<ReservationSeat>>;
    async fn delete_reservation_seats_for_seats(&mut self, seat_ids: &[Uuid]) -> Result<()>;
    async fn delete_reservation_seats_for_reservation(
        &mut self,
        reservation_id: Uuid,
    ) -> Result<()>;
    /// Point every link of a token at the new reservation and mirror the seat
    /// status onto the link rows.
    async fn assign_reservation_seats(
        &mut self,
        holding_token_id: Uuid,
        reservation_id: Uuid,
        status: SeatStatus,
    ) -> Result<()>;

    // -- reservations & orders --

    async fn insert_reservation(&mut self, reservation: &Reservation) -> Result<()>;
    async fn reservation_by_id(&mut self, id: Uuid) -> Result<Option<Reservation>>;
    async fn update_reservation_status(
        &mut self,
        id: Uuid,
        status: ReservationStatus,
        cancelled_at: Option<DateTime<Utc>>,
    ) -> Result<()>;
    async fn insert_order(&mut self, order: &Order, items: &[OrderItem]) -> Result<()>;
    async fn update_order_status(&mut self, order_id: Uuid, status: OrderStatus) -> Result<()>;

    // -- payment attempts & provider records --

    async fn insert_payment_attempt(&mut self, attempt: &PaymentAttempt) -> Result<()>;
    async fn update_payment_attempt(
        &mut self,
        id: Uuid,
        status: PaymentStatus,
        metadata: &Value,
    ) -> Result<()>;
    async fn insert_mercadopago_payment(&mut self, record: &MercadoPagoPayment) -> Result<()>;
    async fn insert_codi_charge(&mut self, record: &CodiCharge) -> Result<()>;
    async fn update_codi_charge(
        &mut self,
        id: Uuid,
        status: &str,
        raw_response: &Value,
    ) -> Result<()>;
    async fn insert_spei_reference(&mut self, record: &SpeiReference) -> Result<()>;
    async fn update_spei_reference(
        &mut self,
        id: Uuid,
        status: &str,
        receipt_url: Option<&str>,
    ) -> Result<()>;
    async fn insert_bank_reference(&mut self, record: &BankReference) -> Result<()>;
    async fn update_bank_reference(
        &mut self,
        id: Uuid,
        status: BankReferenceStatus,
        receipt_url: Option<&str>,
    ) -> Result<()>;
    async fn update_bank_references_by_reference(
        &mut self,
        reference: &str,
        status: BankReferenceStatus,
        receipt_url: Option<&str>,
    ) -> Result<()>;
    async fn insert_reconciliation_note(&mut self, note: &ReconciliationNote) -> Result<()>;

    // -- waitlist --

    async fn waitlist_entry_for_user(
        &mut self,
        event_id: Option<Uuid>,
        table_id: Uuid,
        user_id: &str,
    ) -> Result<Option<WaitlistEntry>>;
    async fn insert_waitlist_entry(&mut self, entry: &WaitlistEntry) -> Result<()>;
    async fn insert_waitlist_priority(&mut self, priority: &WaitlistPriority) -> Result<()>;
    /// Removes the entry and any priority sidecar.
    async fn delete_waitlist_entry(&mut self, entry_id: Uuid) -> Result<()>;

    async fn commit(self: Box<Self>) -> Result<()>;
}
