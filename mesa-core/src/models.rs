use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SeatStatus {
    Available,
    Held,
    Reserved,
    Blocked,
}

impl SeatStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SeatStatus::Available => "AVAILABLE",
            SeatStatus::Held => "HELD",
            SeatStatus::Reserved => "RESERVED",
            SeatStatus::Blocked => "BLOCKED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "AVAILABLE" => Some(SeatStatus::Available),
            "HELD" => Some(SeatStatus::Held),
            "RESERVED" => Some(SeatStatus::Reserved),
            "BLOCKED" => Some(SeatStatus::Blocked),
            _ => None,
        }
    }
}

/// A seat belongs to exactly one table. `hold_ends_at` is only meaningful while
/// the status is `Held`; a lapsed hold is treated as available by the write
/// paths even before anything rewrites the row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Seat {
    pub id: Uuid,
    pub table_id: Uuid,
    pub status: SeatStatus,
    pub hold_ends_at: Option<DateTime<Utc>>,
}

/// Single-use capability over a set of held seats. Consumed exactly once by
/// reservation confirmation; expiry is re-checked at redemption time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HoldingToken {
    pub id: Uuid,
    pub token: String,
    pub event_id: Uuid,
    pub table_id: Uuid,
    pub expires_at: DateTime<Utc>,
}

/// Join row between a seat and the holding token that claimed it; after
/// confirmation it also points at the reservation. Kept for historical
/// auditing, so it mirrors the seat's hold/reserve state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReservationSeat {
    pub id: Uuid,
    pub seat_id: Uuid,
    pub holding_token_id: Uuid,
    pub reservation_id: Option<Uuid>,
    pub status: SeatStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReservationStatus {
    Confirmed,
    Cancelled,
}

impl ReservationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationStatus::Confirmed => "CONFIRMED",
            ReservationStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "CONFIRMED" => Some(ReservationStatus::Confirmed),
            "CANCELLED" => Some(ReservationStatus::Cancelled),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reservation {
    pub id: Uuid,
    pub event_id: Uuid,
    pub table_id: Uuid,
    pub holding_token_id: Uuid,
    pub status: ReservationStatus,
    pub customer_name: Option<String>,
    pub customer_email: Option<String>,
    pub customer_phone: Option<String>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Pending,
    Paid,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::Paid => "PAID",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(OrderStatus::Pending),
            "PAID" => Some(OrderStatus::Paid),
            _ => None,
        }
    }
}

/// Optional 1:1 companion to a reservation; only created when a non-zero total
/// is supplied at confirmation. Amounts are minor units.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub reservation_id: Uuid,
    pub customer_name: Option<String>,
    pub customer_email: Option<String>,
    pub customer_phone: Option<String>,
    pub total_amount: i64,
    pub currency: String,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub description: String,
    pub quantity: i32,
    pub unit_price: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentProvider {
    Mercadopago,
    Codi,
    Spei,
}

impl PaymentProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentProvider::Mercadopago => "MERCADOPAGO",
            PaymentProvider::Codi => "CODI",
            PaymentProvider::Spei => "SPEI",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "MERCADOPAGO" => Some(PaymentProvider::Mercadopago),
            "CODI" => Some(PaymentProvider::Codi),
            "SPEI" => Some(PaymentProvider::Spei),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Succeeded,
    Failed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "PENDING",
            PaymentStatus::Succeeded => "SUCCEEDED",
            PaymentStatus::Failed => "FAILED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(PaymentStatus::Pending),
            "SUCCEEDED" => Some(PaymentStatus::Succeeded),
            "FAILED" => Some(PaymentStatus::Failed),
            _ => None,
        }
    }
}

/// One row per provider interaction. `metadata` keeps the raw provider payload
/// for traceability; `external_id` is the provider's own payment reference and
/// is how webhook replays are matched back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentAttempt {
    pub id: Uuid,
    pub order_id: Uuid,
    pub provider: PaymentProvider,
    pub status: PaymentStatus,
    pub amount: i64,
    pub external_id: Option<String>,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MercadoPagoPayment {
    pub id: Uuid,
    pub payment_attempt_id: Uuid,
    pub preference_id: String,
    pub init_point: Option<String>,
    pub sandbox_init_point: Option<String>,
    pub status: String,
    pub raw_response: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodiCharge {
    pub id: Uuid,
    pub payment_attempt_id: Uuid,
    pub codi_id: String,
    pub qr_data: String,
    pub status: String,
    pub raw_response: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeiReference {
    pub id: Uuid,
    pub payment_attempt_id: Uuid,
    pub reference: String,
    pub status: String,
    pub receipt_url: Option<String>,
    pub raw_response: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BankReferenceMethod {
    Spei,
}

impl BankReferenceMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            BankReferenceMethod::Spei => "SPEI",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "SPEI" => Some(BankReferenceMethod::Spei),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BankReferenceStatus {
    Pending,
    Reconciled,
    Rejected,
}

impl BankReferenceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BankReferenceStatus::Pending => "PENDING",
            BankReferenceStatus::Reconciled => "RECONCILED",
            BankReferenceStatus::Rejected => "REJECTED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(BankReferenceStatus::Pending),
            "RECONCILED" => Some(BankReferenceStatus::Reconciled),
            "REJECTED" => Some(BankReferenceStatus::Rejected),
            _ => None,
        }
    }
}

/// Provider-agnostic row backing the reconciliation queue. Created alongside a
/// SPEI reference and driven to `Reconciled` either by the SPEI confirmation
/// path or a manual reconcile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BankReference {
    pub id: Uuid,
    pub order_id: Uuid,
    pub method: BankReferenceMethod,
    pub reference: String,
    pub status: BankReferenceStatus,
    pub amount: i64,
    pub receipt_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconciliationNote {
    pub id: Uuid,
    pub reference_id: Uuid,
    pub user_id: Option<String>,
    pub note: Option<String>,
    pub receipt_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BankReferenceDetail {
    pub reference: BankReference,
    pub order: Option<Order>,
    pub notes: Vec<ReconciliationNote>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WaitlistScope {
    Venue,
    User,
}

impl WaitlistScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            WaitlistScope::Venue => "VENUE",
            WaitlistScope::User => "USER",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "VENUE" => Some(WaitlistScope::Venue),
            "USER" => Some(WaitlistScope::User),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaitlistEntry {
    pub id: Uuid,
    pub event_id: Uuid,
    pub table_id: Uuid,
    pub user_id: String,
    pub scope: WaitlistScope,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaitlistPriority {
    pub id: Uuid,
    pub entry_id: Uuid,
    pub priority: i32,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationStatus {
    Pending,
    Delivered,
    Failed,
}

impl NotificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationStatus::Pending => "pending",
            NotificationStatus::Delivered => "delivered",
            NotificationStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(NotificationStatus::Pending),
            "delivered" => Some(NotificationStatus::Delivered),
            "failed" => Some(NotificationStatus::Failed),
            _ => None,
        }
    }
}

/// Durable envelope for every emitted event. Written before listeners run, so
/// a crashed process can replay undelivered records via `retry_pending`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationRecord {
    pub id: Uuid,
    pub event: String,
    pub payload: Value,
    pub status: NotificationStatus,
    pub attempts: i32,
    pub last_error: Option<String>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: Uuid,
    pub action: String,
    pub resource_type: String,
    pub resource_id: String,
    pub metadata: Option<Value>,
    pub actor_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

// Read-side entities the availability projector composes. Layout CRUD lives
// outside this system; these rows are only ever read here.

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VenueEvent {
    pub id: Uuid,
    pub layout_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Layout {
    pub id: Uuid,
    pub version: i32,
    pub json: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Table {
    pub id: Uuid,
    pub event_id: Uuid,
    pub zone_id: Option<Uuid>,
    pub layout_element_id: String,
    pub capacity: i32,
}
