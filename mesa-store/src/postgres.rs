//! Postgres-backed store. Queries use the runtime-checked sqlx API so the
//! workspace builds without a live database; schema lives in `migrations/`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, Row, Transaction};
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

use mesa_core::models::*;
use mesa_core::store::*;
use mesa_core::{Error, Result};

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

fn db_err(e: sqlx::Error) -> Error {
    Error::Internal(format!("database error: {e}"))
}

fn parse_col<T>(raw: &str, parse: fn(&str) -> Option<T>, what: &str) -> Result<T> {
    parse(raw).ok_or_else(|| Error::Internal(format!("unexpected {what} value: {raw}")))
}

impl PgStore {
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(3))
            .connect(url)
            .await
            .map_err(db_err)?;
        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<()> {
        info!("running database migrations");
        sqlx::migrate!("../migrations")
            .run(&self.pool)
            .await
            .map_err(|e| Error::Internal(format!("migration failed: {e}")))?;
        Ok(())
    }
}

fn seat_from_row(row: &PgRow) -> Result<Seat> {
    Ok(Seat {
        id: row.try_get("id").map_err(db_err)?,
        table_id: row.try_get("table_id").map_err(db_err)?,
        status: parse_col(
            row.try_get::<String, _>("status").map_err(db_err)?.as_str(),
            SeatStatus::parse,
            "seat status",
        )?,
        hold_ends_at: row.try_get("hold_ends_at").map_err(db_err)?,
    })
}

fn holding_token_from_row(row: &PgRow) -> Result<HoldingToken> {
    Ok(HoldingToken {
        id: row.try_get("id").map_err(db_err)?,
        token: row.try_get("token").map_err(db_err)?,
        event_id: row.try_get("event_id").map_err(db_err)?,
        table_id: row.try_get("table_id").map_err(db_err)?,
        expires_at: row.try_get("expires_at").map_err(db_err)?,
    })
}

fn reservation_seat_from_row(row: &PgRow) -> Result<ReservationSeat> {
    Ok(ReservationSeat {
        id: row.try_get("id").map_err(db_err)?,
        seat_id: row.try_get("seat_id").map_err(db_err)?,
        holding_token_id: row.try_get("holding_token_id").map_err(db_err)?,
        reservation_id: row.try_get("reservation_id").map_err(db_err)?,
        status: parse_col(
            row.try_get::<String, _>("status").map_err(db_err)?.as_str(),
            SeatStatus::parse,
            "seat status",
        )?,
    })
}

fn reservation_from_row(row: &PgRow) -> Result<Reservation> {
    Ok(Reservation {
        id: row.try_get("id").map_err(db_err)?,
        event_id: row.try_get("event_id").map_err(db_err)?,
        table_id: row.try_get("table_id").map_err(db_err)?,
        holding_token_id: row.try_get("holding_token_id").map_err(db_err)?,
        status: parse_col(
            row.try_get::<String, _>("status").map_err(db_err)?.as_str(),
            ReservationStatus::parse,
            "reservation status",
        )?,
        customer_name: row.try_get("customer_name").map_err(db_err)?,
        customer_email: row.try_get("customer_email").map_err(db_err)?,
        customer_phone: row.try_get("customer_phone").map_err(db_err)?,
        cancelled_at: row.try_get("cancelled_at").map_err(db_err)?,
        created_at: row.try_get("created_at").map_err(db_err)?,
    })
}

fn order_from_row(row: &PgRow) -> Result<Order> {
    Ok(Order {
        id: row.try_get("id").map_err(db_err)?,
        reservation_id: row.try_get("reservation_id").map_err(db_err)?,
        customer_name: row.try_get("customer_name").map_err(db_err)?,
        customer_email: row.try_get("customer_email").map_err(db_err)?,
        customer_phone: row.try_get("customer_phone").map_err(db_err)?,
        total_amount: row.try_get("total_amount").map_err(db_err)?,
        currency: row.try_get("currency").map_err(db_err)?,
        status: parse_col(
            row.try_get::<String, _>("status").map_err(db_err)?.as_str(),
            OrderStatus::parse,
            "order status",
        )?,
        created_at: row.try_get("created_at").map_err(db_err)?,
    })
}

fn order_item_from_row(row: &PgRow) -> Result<OrderItem> {
    Ok(OrderItem {
        id: row.try_get("id").map_err(db_err)?,
        order_id: row.try_get("order_id").map_err(db_err)?,
        description: row.try_get("description").map_err(db_err)?,
        quantity: row.try_get("quantity").map_err(db_err)?,
        unit_price: row.try_get("unit_price").map_err(db_err)?,
    })
}

fn payment_attempt_from_row(row: &PgRow) -> Result<PaymentAttempt> {
    Ok(PaymentAttempt {
        id: row.try_get("id").map_err(db_err)?,
        order_id: row.try_get("order_id").map_err(db_err)?,
        provider: parse_col(
            row.try_get::<String, _>("provider").map_err(db_err)?.as_str(),
            PaymentProvider::parse,
            "payment provider",
        )?,
        status: parse_col(
            row.try_get::<String, _>("status").map_err(db_err)?.as_str(),
            PaymentStatus::parse,
            "payment status",
        )?,
        amount: row.try_get("amount").map_err(db_err)?,
        external_id: row.try_get("external_id").map_err(db_err)?,
        metadata: row.try_get("metadata").map_err(db_err)?,
        created_at: row.try_get("created_at").map_err(db_err)?,
    })
}

fn codi_charge_from_row(row: &PgRow) -> Result<CodiCharge> {
    Ok(CodiCharge {
        id: row.try_get("id").map_err(db_err)?,
        payment_attempt_id: row.try_get("payment_attempt_id").map_err(db_err)?,
        codi_id: row.try_get("codi_id").map_err(db_err)?,
        qr_data: row.try_get("qr_data").map_err(db_err)?,
        status: row.try_get("status").map_err(db_err)?,
        raw_response: row.try_get("raw_response").map_err(db_err)?,
    })
}

fn spei_reference_from_row(row: &PgRow) -> Result<SpeiReference> {
    Ok(SpeiReference {
        id: row.try_get("id").map_err(db_err)?,
        payment_attempt_id: row.try_get("payment_attempt_id").map_err(db_err)?,
        reference: row.try_get("reference").map_err(db_err)?,
        status: row.try_get("status").map_err(db_err)?,
        receipt_url: row.try_get("receipt_url").map_err(db_err)?,
        raw_response: row.try_get("raw_response").map_err(db_err)?,
    })
}

fn bank_reference_from_row(row: &PgRow) -> Result<BankReference> {
    Ok(BankReference {
        id: row.try_get("id").map_err(db_err)?,
        order_id: row.try_get("order_id").map_err(db_err)?,
        method: parse_col(
            row.try_get::<String, _>("method").map_err(db_err)?.as_str(),
            BankReferenceMethod::parse,
            "bank reference method",
        )?,
        reference: row.try_get("reference").map_err(db_err)?,
        status: parse_col(
            row.try_get::<String, _>("status").map_err(db_err)?.as_str(),
            BankReferenceStatus::parse,
            "bank reference status",
        )?,
        amount: row.try_get("amount").map_err(db_err)?,
        receipt_url: row.try_get("receipt_url").map_err(db_err)?,
        created_at: row.try_get("created_at").map_err(db_err)?,
    })
}

fn reconciliation_note_from_row(row: &PgRow) -> Result<ReconciliationNote> {
    Ok(ReconciliationNote {
        id: row.try_get("id").map_err(db_err)?,
        reference_id: row.try_get("reference_id").map_err(db_err)?,
        user_id: row.try_get("user_id").map_err(db_err)?,
        note: row.try_get("note").map_err(db_err)?,
        receipt_url: row.try_get("receipt_url").map_err(db_err)?,
        created_at: row.try_get("created_at").map_err(db_err)?,
    })
}

fn waitlist_entry_from_row(row: &PgRow) -> Result<WaitlistEntry> {
    Ok(WaitlistEntry {
        id: row.try_get("id").map_err(db_err)?,
        event_id: row.try_get("event_id").map_err(db_err)?,
        table_id: row.try_get("table_id").map_err(db_err)?,
        user_id: row.try_get("user_id").map_err(db_err)?,
        scope: parse_col(
            row.try_get::<String, _>("scope").map_err(db_err)?.as_str(),
            WaitlistScope::parse,
            "waitlist scope",
        )?,
        created_at: row.try_get("created_at").map_err(db_err)?,
    })
}

fn notification_from_row(row: &PgRow) -> Result<NotificationRecord> {
    Ok(NotificationRecord {
        id: row.try_get("id").map_err(db_err)?,
        event: row.try_get("event").map_err(db_err)?,
        payload: row.try_get("payload").map_err(db_err)?,
        status: parse_col(
            row.try_get::<String, _>("status").map_err(db_err)?.as_str(),
            NotificationStatus::parse,
            "notification status",
        )?,
        attempts: row.try_get("attempts").map_err(db_err)?,
        last_error: row.try_get("last_error").map_err(db_err)?,
        delivered_at: row.try_get("delivered_at").map_err(db_err)?,
        created_at: row.try_get("created_at").map_err(db_err)?,
    })
}

fn audit_from_row(row: &PgRow) -> Result<AuditRecord> {
    Ok(AuditRecord {
        id: row.try_get("id").map_err(db_err)?,
        action: row.try_get("action").map_err(db_err)?,
        resource_type: row.try_get("resource_type").map_err(db_err)?,
        resource_id: row.try_get("resource_id").map_err(db_err)?,
        metadata: row.try_get("metadata").map_err(db_err)?,
        actor_id: row.try_get("actor_id").map_err(db_err)?,
        created_at: row.try_get("created_at").map_err(db_err)?,
    })
}

const SEAT_COLS: &str = "id, table_id, status, hold_ends_at";
const RESERVATION_COLS: &str = "id, event_id, table_id, holding_token_id, status, customer_name, customer_email, customer_phone, cancelled_at, created_at";
const ORDER_COLS: &str = "id, reservation_id, customer_name, customer_email, customer_phone, total_amount, currency, status, created_at";
const ATTEMPT_COLS: &str =
    "id, order_id, provider, status, amount, external_id, metadata, created_at";

#[async_trait]
impl Store for PgStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>> {
        let tx = self.pool.begin().await.map_err(db_err)?;
        Ok(Box::new(PgTx { tx }))
    }

    async fn reservation_by_id(&self, id: Uuid) -> Result<Option<Reservation>> {
        let row = sqlx::query(&format!(
            "SELECT {RESERVATION_COLS} FROM reservations WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        row.as_ref().map(reservation_from_row).transpose()
    }

    async fn seats_by_ids(&self, seat_ids: &[Uuid]) -> Result<Vec<Seat>> {
        let rows = sqlx::query(&format!(
            "SELECT {SEAT_COLS} FROM seats WHERE id = ANY($1) ORDER BY array_position($1, id)"
        ))
        .bind(seat_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.iter().map(seat_from_row).collect()
    }

    async fn order_by_id(&self, id: Uuid) -> Result<Option<Order>> {
        let row = sqlx::query(&format!("SELECT {ORDER_COLS} FROM orders WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.as_ref().map(order_from_row).transpose()
    }

    async fn order_items(&self, order_id: Uuid) -> Result<Vec<OrderItem>> {
        let rows = sqlx::query(
            "SELECT id, order_id, description, quantity, unit_price FROM order_items WHERE order_id = $1",
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.iter().map(order_item_from_row).collect()
    }

    async fn payment_attempt_by_id(&self, id: Uuid) -> Result<Option<PaymentAttempt>> {
        let row = sqlx::query(&format!(
            "SELECT {ATTEMPT_COLS} FROM payment_attempts WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        row.as_ref().map(payment_attempt_from_row).transpose()
    }

    async fn payment_attempt_by_external_id(
        &self,
        external_id: &str,
    ) -> Result<Option<PaymentAttempt>> {
        let row = sqlx::query(&format!(
            "SELECT {ATTEMPT_COLS} FROM payment_attempts WHERE external_id = $1"
        ))
        .bind(external_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        row.as_ref().map(payment_attempt_from_row).transpose()
    }

    async fn codi_charge_by_codi_id(&self, codi_id: &str) -> Result<Option<CodiCharge>> {
        let row = sqlx::query(
            "SELECT id, payment_attempt_id, codi_id, qr_data, status, raw_response FROM codi_charges WHERE codi_id = $1",
        )
        .bind(codi_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        row.as_ref().map(codi_charge_from_row).transpose()
    }

    async fn spei_reference_by_value(&self, reference: &str) -> Result<Option<SpeiReference>> {
        let row = sqlx::query(
            "SELECT id, payment_attempt_id, reference, status, receipt_url, raw_response FROM spei_references WHERE reference = $1",
        )
        .bind(reference)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        row.as_ref().map(spei_reference_from_row).transpose()
    }

    async fn bank_reference_by_id(&self, id: Uuid) -> Result<Option<BankReference>> {
        let row = sqlx::query(
            "SELECT id, order_id, method, reference, status, amount, receipt_url, created_at FROM bank_references WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        row.as_ref().map(bank_reference_from_row).transpose()
    }

    async fn list_bank_references(
        &self,
        filters: &ReferenceFilters,
    ) -> Result<(Vec<BankReferenceDetail>, i64)> {
        let status = filters.status.map(|s| s.as_str());
        let method = filters.method.map(|m| m.as_str());
        let where_clause = "($1::text IS NULL OR status = $1) \
             AND ($2::text IS NULL OR method = $2) \
             AND ($3::timestamptz IS NULL OR created_at >= $3) \
             AND ($4::timestamptz IS NULL OR created_at <= $4)";

        let total: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM bank_references WHERE {where_clause}"
        ))
        .bind(status)
        .bind(method)
        .bind(filters.from)
        .bind(filters.to)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;

        let rows = sqlx::query(&format!(
            "SELECT id, order_id, method, reference, status, amount, receipt_url, created_at \
             FROM bank_references WHERE {where_clause} \
             ORDER BY created_at DESC LIMIT $5 OFFSET $6"
        ))
        .bind(status)
        .bind(method)
        .bind(filters.from)
        .bind(filters.to)
        .bind(filters.page_size())
        .bind((filters.page() - 1) * filters.page_size())
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        let mut details = Vec::with_capacity(rows.len());
        for row in &rows {
            let reference = bank_reference_from_row(row)?;
            let order = self.order_by_id(reference.order_id).await?;
            let note_rows = sqlx::query(
                "SELECT id, reference_id, user_id, note, receipt_url, created_at FROM reconciliation_notes WHERE reference_id = $1 ORDER BY created_at",
            )
            .bind(reference.id)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
            let notes = note_rows
                .iter()
                .map(reconciliation_note_from_row)
                .collect::<Result<Vec<_>>>()?;
            details.push(BankReferenceDetail {
                reference,
                order,
                notes,
            });
        }

        Ok((details, total))
    }

    async fn venue_event_by_id(&self, id: Uuid) -> Result<Option<VenueEvent>> {
        let row = sqlx::query("SELECT id, layout_id FROM venue_events WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.map(|row| {
            Ok(VenueEvent {
                id: row.try_get("id").map_err(db_err)?,
                layout_id: row.try_get("layout_id").map_err(db_err)?,
            })
        })
        .transpose()
    }

    async fn layout_by_id(&self, id: Uuid) -> Result<Option<Layout>> {
        let row = sqlx::query("SELECT id, version, json FROM layouts WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.map(|row| {
            Ok(Layout {
                id: row.try_get("id").map_err(db_err)?,
                version: row.try_get("version").map_err(db_err)?,
                json: row.try_get("json").map_err(db_err)?,
            })
        })
        .transpose()
    }

    async fn tables_for_event(&self, event_id: Uuid, zone_id: Option<Uuid>) -> Result<Vec<Table>> {
        let rows = sqlx::query(
            "SELECT id, event_id, zone_id, layout_element_id, capacity FROM tables \
             WHERE event_id = $1 AND ($2::uuid IS NULL OR zone_id = $2)",
        )
        .bind(event_id)
        .bind(zone_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.iter()
            .map(|row| {
                Ok(Table {
                    id: row.try_get("id").map_err(db_err)?,
                    event_id: row.try_get("event_id").map_err(db_err)?,
                    zone_id: row.try_get("zone_id").map_err(db_err)?,
                    layout_element_id: row.try_get("layout_element_id").map_err(db_err)?,
                    capacity: row.try_get("capacity").map_err(db_err)?,
                })
            })
            .collect()
    }

    async fn seat_status_counts(&self, table_ids: &[Uuid]) -> Result<Vec<SeatStatusCount>> {
        let rows = sqlx::query(
            "SELECT table_id, status, COUNT(*) AS count FROM seats WHERE table_id = ANY($1) GROUP BY table_id, status",
        )
        .bind(table_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.iter()
            .map(|row| {
                Ok(SeatStatusCount {
                    table_id: row.try_get("table_id").map_err(db_err)?,
                    status: parse_col(
                        row.try_get::<String, _>("status").map_err(db_err)?.as_str(),
                        SeatStatus::parse,
                        "seat status",
                    )?,
                    count: row.try_get("count").map_err(db_err)?,
                })
            })
            .collect()
    }

    async fn waitlist_scope_counts(&self, event_id: Uuid) -> Result<Vec<WaitlistScopeCount>> {
        let rows = sqlx::query(
            "SELECT scope, COUNT(*) AS count FROM waitlist_entries WHERE event_id = $1 GROUP BY scope",
        )
        .bind(event_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.iter()
            .map(|row| {
                Ok(WaitlistScopeCount {
                    scope: parse_col(
                        row.try_get::<String, _>("scope").map_err(db_err)?.as_str(),
                        WaitlistScope::parse,
                        "waitlist scope",
                    )?,
                    count: row.try_get("count").map_err(db_err)?,
                })
            })
            .collect()
    }

    async fn enqueue_notification(
        &self,
        event: &str,
        payload: &Value,
    ) -> Result<NotificationRecord> {
        let row = sqlx::query(
            "INSERT INTO notification_queue (id, event, payload, status, attempts) \
             VALUES ($1, $2, $3, 'pending', 0) \
             RETURNING id, event, payload, status, attempts, last_error, delivered_at, created_at",
        )
        .bind(Uuid::new_v4())
        .bind(event)
        .bind(payload)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;
        notification_from_row(&row)
    }

    async fn mark_notification_delivered(&self, id: Uuid, at: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            "UPDATE notification_queue SET status = 'delivered', delivered_at = $2, attempts = attempts + 1, last_error = NULL WHERE id = $1",
        )
        .bind(id)
        .bind(at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn mark_notification_failed(&self, id: Uuid, error: &str) -> Result<()> {
        sqlx::query(
            "UPDATE notification_queue SET status = 'failed', attempts = attempts + 1, last_error = $2 WHERE id = $1",
        )
        .bind(id)
        .bind(error)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn undelivered_notifications(&self, limit: i64) -> Result<Vec<NotificationRecord>> {
        let rows = sqlx::query(
            "SELECT id, event, payload, status, attempts, last_error, delivered_at, created_at \
             FROM notification_queue WHERE status IN ('pending', 'failed') \
             ORDER BY created_at LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.iter().map(notification_from_row).collect()
    }

    async fn record_audit(&self, entry: &NewAuditRecord) -> Result<AuditRecord> {
        let row = sqlx::query(
            "INSERT INTO audit_log (id, action, resource_type, resource_id, metadata, actor_id) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING id, action, resource_type, resource_id, metadata, actor_id, created_at",
        )
        .bind(Uuid::new_v4())
        .bind(&entry.action)
        .bind(&entry.resource_type)
        .bind(&entry.resource_id)
        .bind(&entry.metadata)
        .bind(&entry.actor_id)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;
        audit_from_row(&row)
    }

    async fn query_audit(&self, filters: &AuditFilters) -> Result<(Vec<AuditRecord>, i64)> {
        let where_clause = "($1::text IS NULL OR resource_type = $1) \
             AND ($2::text IS NULL OR action = $2) \
             AND ($3::text IS NULL OR actor_id = $3) \
             AND ($4::timestamptz IS NULL OR created_at >= $4) \
             AND ($5::timestamptz IS NULL OR created_at <= $5)";

        let total: i64 =
            sqlx::query_scalar(&format!("SELECT COUNT(*) FROM audit_log WHERE {where_clause}"))
                .bind(&filters.resource_type)
                .bind(&filters.action)
                .bind(&filters.actor_id)
                .bind(filters.from)
                .bind(filters.to)
                .fetch_one(&self.pool)
                .await
                .map_err(db_err)?;

        let rows = sqlx::query(&format!(
            "SELECT id, action, resource_type, resource_id, metadata, actor_id, created_at \
             FROM audit_log WHERE {where_clause} \
             ORDER BY created_at DESC LIMIT $6 OFFSET $7"
        ))
        .bind(&filters.resource_type)
        .bind(&filters.action)
        .bind(&filters.actor_id)
        .bind(filters.from)
        .bind(filters.to)
        .bind(filters.take())
        .bind(filters.skip())
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        let records = rows.iter().map(audit_from_row).collect::<Result<Vec<_>>>()?;
        Ok((records, total))
    }
}

struct PgTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StoreTx for PgTx {
    async fn seats_in_table(&mut self, table_id: Uuid, seat_ids: &[Uuid]) -> Result<Vec<Seat>> {
        let rows = sqlx::query(&format!(
            "SELECT {SEAT_COLS} FROM seats WHERE table_id = $1 AND id = ANY($2) \
             ORDER BY array_position($2, id)"
        ))
        .bind(table_id)
        .bind(seat_ids)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(db_err)?;
        rows.iter().map(seat_from_row).collect()
    }

    async fn seats_by_ids(&mut self, seat_ids: &[Uuid]) -> Result<Vec<Seat>> {
        let rows = sqlx::query(&format!(
            "SELECT {SEAT_COLS} FROM seats WHERE id = ANY($1) ORDER BY array_position($1, id)"
        ))
        .bind(seat_ids)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(db_err)?;
        rows.iter().map(seat_from_row).collect()
    }

    async fn update_seat_status(
        &mut self,
        seat_id: Uuid,
        status: SeatStatus,
        hold_ends_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        sqlx::query("UPDATE seats SET status = $2, hold_ends_at = $3 WHERE id = $1")
            .bind(seat_id)
            .bind(status.as_str())
            .bind(hold_ends_at)
            .execute(&mut *self.tx)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn insert_holding_token(&mut self, token: &HoldingToken) -> Result<()> {
        sqlx::query(
            "INSERT INTO holding_tokens (id, token, event_id, table_id, expires_at) VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(token.id)
        .bind(&token.token)
        .bind(token.event_id)
        .bind(token.table_id)
        .bind(token.expires_at)
        .execute(&mut *self.tx)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn holding_token_by_value(&mut self, token: &str) -> Result<Option<HoldingToken>> {
        let row = sqlx::query(
            "SELECT id, token, event_id, table_id, expires_at FROM holding_tokens WHERE token = $1",
        )
        .bind(token)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(db_err)?;
        row.as_ref().map(holding_token_from_row).transpose()
    }

    async fn insert_reservation_seat(&mut self, link: &ReservationSeat) -> Result<()> {
        sqlx::query(
            "INSERT INTO reservation_seats (id, seat_id, holding_token_id, reservation_id, status) VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(link.id)
        .bind(link.seat_id)
        .bind(link.holding_token_id)
        .bind(link.reservation_id)
        .bind(link.status.as_str())
        .execute(&mut *self.tx)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn reservation_seats_for_token(
        &mut self,
        holding_token_id: Uuid,
    ) -> Result<Vec<ReservationSeat>> {
        let rows = sqlx::query(
            "SELECT id, seat_id, holding_token_id, reservation_id, status FROM reservation_seats WHERE holding_token_id = $1",
        )
        .bind(holding_token_id)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(db_err)?;
        rows.iter().map(reservation_seat_from_row).collect()
    }

    async fn reservation_seats_for_reservation(
        &mut self,
        reservation_id: Uuid,
    ) -> Result<Vec<ReservationSeat>> {
        let rows = sqlx::query(
            "SELECT id, seat_id, holding_token_id, reservation_id, status FROM reservation_seats WHERE reservation_id = $1",
        )
        .bind(reservation_id)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(db_err)?;
        rows.iter().map(reservation_seat_from_row).collect()
    }

    async fn delete_reservation_seats_for_seats(&mut self, seat_ids: &[Uuid]) -> Result<()> {
        sqlx::query("DELETE FROM reservation_seats WHERE seat_id = ANY($1)")
            .bind(seat_ids)
            .execute(&mut *self.tx)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn delete_reservation_seats_for_reservation(
        &mut self,
        reservation_id: Uuid,
    ) -> Result<()> {
        sqlx::query("DELETE FROM reservation_seats WHERE reservation_id = $1")
            .bind(reservation_id)
            .execute(&mut *self.tx)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn assign_reservation_seats(
        &mut self,
        holding_token_id: Uuid,
        reservation_id: Uuid,
        status: SeatStatus,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE reservation_seats SET reservation_id = $2, status = $3 WHERE holding_token_id = $1",
        )
        .bind(holding_token_id)
        .bind(reservation_id)
        .bind(status.as_str())
        .execute(&mut *self.tx)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn insert_reservation(&mut self, reservation: &Reservation) -> Result<()> {
        sqlx::query(
            "INSERT INTO reservations (id, event_id, table_id, holding_token_id, status, customer_name, customer_email, customer_phone, cancelled_at, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(reservation.id)
        .bind(reservation.event_id)
        .bind(reservation.table_id)
        .bind(reservation.holding_token_id)
        .bind(reservation.status.as_str())
        .bind(&reservation.customer_name)
        .bind(&reservation.customer_email)
        .bind(&reservation.customer_phone)
        .bind(reservation.cancelled_at)
        .bind(reservation.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn reservation_by_id(&mut self, id: Uuid) -> Result<Option<Reservation>> {
        let row = sqlx::query(&format!(
            "SELECT {RESERVATION_COLS} FROM reservations WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(db_err)?;
        row.as_ref().map(reservation_from_row).transpose()
    }

    async fn update_reservation_status(
        &mut self,
        id: Uuid,
        status: ReservationStatus,
        cancelled_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        sqlx::query("UPDATE reservations SET status = $2, cancelled_at = $3 WHERE id = $1")
            .bind(id)
            .bind(status.as_str())
            .bind(cancelled_at)
            .execute(&mut *self.tx)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn insert_order(&mut self, order: &Order, items: &[OrderItem]) -> Result<()> {
        sqlx::query(
            "INSERT INTO orders (id, reservation_id, customer_name, customer_email, customer_phone, total_amount, currency, status, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(order.id)
        .bind(order.reservation_id)
        .bind(&order.customer_name)
        .bind(&order.customer_email)
        .bind(&order.customer_phone)
        .bind(order.total_amount)
        .bind(&order.currency)
        .bind(order.status.as_str())
        .bind(order.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(db_err)?;

        for item in items {
            sqlx::query(
                "INSERT INTO order_items (id, order_id, description, quantity, unit_price) VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(item.id)
            .bind(item.order_id)
            .bind(&item.description)
            .bind(item.quantity)
            .bind(item.unit_price)
            .execute(&mut *self.tx)
            .await
            .map_err(db_err)?;
        }
        Ok(())
    }

    async fn update_order_status(&mut self, order_id: Uuid, status: OrderStatus) -> Result<()> {
        sqlx::query("UPDATE orders SET status = $2 WHERE id = $1")
            .bind(order_id)
            .bind(status.as_str())
            .execute(&mut *self.tx)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn insert_payment_attempt(&mut self, attempt: &PaymentAttempt) -> Result<()> {
        sqlx::query(
            "INSERT INTO payment_attempts (id, order_id, provider, status, amount, external_id, metadata, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(attempt.id)
        .bind(attempt.order_id)
        .bind(attempt.provider.as_str())
        .bind(attempt.status.as_str())
        .bind(attempt.amount)
        .bind(&attempt.external_id)
        .bind(&attempt.metadata)
        .bind(attempt.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn update_payment_attempt(
        &mut self,
        id: Uuid,
        status: PaymentStatus,
        metadata: &Value,
    ) -> Result<()> {
        sqlx::query("UPDATE payment_attempts SET status = $2, metadata = $3 WHERE id = $1")
            .bind(id)
            .bind(status.as_str())
            .bind(metadata)
            .execute(&mut *self.tx)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn insert_mercadopago_payment(&mut self, record: &MercadoPagoPayment) -> Result<()> {
        sqlx::query(
            "INSERT INTO mercadopago_payments (id, payment_attempt_id, preference_id, init_point, sandbox_init_point, status, raw_response) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(record.id)
        .bind(record.payment_attempt_id)
        .bind(&record.preference_id)
        .bind(&record.init_point)
        .bind(&record.sandbox_init_point)
        .bind(&record.status)
        .bind(&record.raw_response)
        .execute(&mut *self.tx)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn insert_codi_charge(&mut self, record: &CodiCharge) -> Result<()> {
        sqlx::query(
            "INSERT INTO codi_charges (id, payment_attempt_id, codi_id, qr_data, status, raw_response) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(record.id)
        .bind(record.payment_attempt_id)
        .bind(&record.codi_id)
        .bind(&record.qr_data)
        .bind(&record.status)
        .bind(&record.raw_response)
        .execute(&mut *self.tx)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn update_codi_charge(
        &mut self,
        id: Uuid,
        status: &str,
        raw_response: &Value,
    ) -> Result<()> {
        sqlx::query("UPDATE codi_charges SET status = $2, raw_response = $3 WHERE id = $1")
            .bind(id)
            .bind(status)
            .bind(raw_response)
            .execute(&mut *self.tx)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn insert_spei_reference(&mut self, record: &SpeiReference) -> Result<()> {
        sqlx::query(
            "INSERT INTO spei_references (id, payment_attempt_id, reference, status, receipt_url, raw_response) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(record.id)
        .bind(record.payment_attempt_id)
        .bind(&record.reference)
        .bind(&record.status)
        .bind(&record.receipt_url)
        .bind(&record.raw_response)
        .execute(&mut *self.tx)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn update_spei_reference(
        &mut self,
        id: Uuid,
        status: &str,
        receipt_url: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE spei_references SET status = $2, receipt_url = COALESCE($3, receipt_url) WHERE id = $1",
        )
        .bind(id)
        .bind(status)
        .bind(receipt_url)
        .execute(&mut *self.tx)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn insert_bank_reference(&mut self, record: &BankReference) -> Result<()> {
        sqlx::query(
            "INSERT INTO bank_references (id, order_id, method, reference, status, amount, receipt_url, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(record.id)
        .bind(record.order_id)
        .bind(record.method.as_str())
        .bind(&record.reference)
        .bind(record.status.as_str())
        .bind(record.amount)
        .bind(&record.receipt_url)
        .bind(record.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn update_bank_reference(
        &mut self,
        id: Uuid,
        status: BankReferenceStatus,
        receipt_url: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE bank_references SET status = $2, receipt_url = COALESCE($3, receipt_url) WHERE id = $1",
        )
        .bind(id)
        .bind(status.as_str())
        .bind(receipt_url)
        .execute(&mut *self.tx)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn update_bank_references_by_reference(
        &mut self,
        reference: &str,
        status: BankReferenceStatus,
        receipt_url: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE bank_references SET status = $2, receipt_url = COALESCE($3, receipt_url) WHERE reference = $1",
        )
        .bind(reference)
        .bind(status.as_str())
        .bind(receipt_url)
        .execute(&mut *self.tx)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn insert_reconciliation_note(&mut self, note: &ReconciliationNote) -> Result<()> {
        sqlx::query(
            "INSERT INTO reconciliation_notes (id, reference_id, user_id, note, receipt_url, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(note.id)
        .bind(note.reference_id)
        .bind(&note.user_id)
        .bind(&note.note)
        .bind(&note.receipt_url)
        .bind(note.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn waitlist_entry_for_user(
        &mut self,
        event_id: Option<Uuid>,
        table_id: Uuid,
        user_id: &str,
    ) -> Result<Option<WaitlistEntry>> {
        let row = sqlx::query(
            "SELECT id, event_id, table_id, user_id, scope, created_at FROM waitlist_entries \
             WHERE table_id = $1 AND user_id = $2 AND ($3::uuid IS NULL OR event_id = $3)",
        )
        .bind(table_id)
        .bind(user_id)
        .bind(event_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(db_err)?;
        row.as_ref().map(waitlist_entry_from_row).transpose()
    }

    async fn insert_waitlist_entry(&mut self, entry: &WaitlistEntry) -> Result<()> {
        sqlx::query(
            "INSERT INTO waitlist_entries (id, event_id, table_id, user_id, scope, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(entry.id)
        .bind(entry.event_id)
        .bind(entry.table_id)
        .bind(&entry.user_id)
        .bind(entry.scope.as_str())
        .bind(entry.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn insert_waitlist_priority(&mut self, priority: &WaitlistPriority) -> Result<()> {
        sqlx::query(
            "INSERT INTO waitlist_priorities (id, entry_id, priority, notes) VALUES ($1, $2, $3, $4)",
        )
        .bind(priority.id)
        .bind(priority.entry_id)
        .bind(priority.priority)
        .bind(&priority.notes)
        .execute(&mut *self.tx)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn delete_waitlist_entry(&mut self, entry_id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM waitlist_priorities WHERE entry_id = $1")
            .bind(entry_id)
            .execute(&mut *self.tx)
            .await
            .map_err(db_err)?;
        sqlx::query("DELETE FROM waitlist_entries WHERE id = $1")
            .bind(entry_id)
            .execute(&mut *self.tx)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx.commit().await.map_err(db_err)
    }
}

#[cfg(test)]
mod tests {
    const INIT_MIGRATION: &str = include_str!("../../migrations/0001_init.sql");

    fn column_def(table: &str, column: &str) -> String {
        let start = INIT_MIGRATION
            .find(&format!("CREATE TABLE {table} ("))
            .unwrap_or_else(|| panic!("no CREATE TABLE for {table}"));
        let block = &INIT_MIGRATION[start..];
        let end = block.find(");").unwrap();
        block[..end]
            .lines()
            .map(str::trim_start)
            .find(|l| l.starts_with(&format!("{column} ")))
            .unwrap_or_else(|| panic!("no column {column} on {table}"))
            .to_string()
    }

    // These columns back Option fields on the models; an inserted None must
    // not trip a constraint.
    #[test]
    fn optional_model_fields_map_to_nullable_columns() {
        for (table, column) in [
            ("reservations", "customer_name"),
            ("reservations", "customer_email"),
            ("reservations", "customer_phone"),
            ("orders", "customer_name"),
            ("orders", "customer_email"),
            ("orders", "customer_phone"),
            ("mercadopago_payments", "init_point"),
            ("mercadopago_payments", "sandbox_init_point"),
            ("reconciliation_notes", "user_id"),
        ] {
            let def = column_def(table, column);
            assert!(
                !def.contains("NOT NULL"),
                "{table}.{column} must accept NULL: {def}"
            );
        }
    }
}
