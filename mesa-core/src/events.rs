use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{PaymentProvider, PaymentStatus, SeatStatus};

pub const SEAT_STATUS: &str = "seat-status";
pub const PAYMENT_STATUS: &str = "payment-status";
pub const CODI_STATUS: &str = "codi-status";
pub const SPEI_CONFIRMED: &str = "spei-confirmed";
pub const REFERENCE_UPDATED: &str = "reference-updated";

/// Default event set for stream subscribers that do not name one.
pub const ALL_EVENTS: [&str; 5] = [
    PAYMENT_STATUS,
    REFERENCE_UPDATED,
    CODI_STATUS,
    SPEI_CONFIRMED,
    SEAT_STATUS,
];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeatStatusEvent {
    pub seat_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table_id: Option<Uuid>,
    pub status: SeatStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentStatusEvent {
    pub order_id: Uuid,
    pub provider: PaymentProvider,
    pub status: PaymentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preference_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodiStatusEvent {
    pub order_id: Uuid,
    pub codi_id: String,
    /// Provider-native free-text status, not the canonical mapping.
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qr_data: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeiConfirmedEvent {
    pub order_id: Uuid,
    pub reference: String,
    pub amount: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferenceUpdatedEvent {
    pub order_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}
