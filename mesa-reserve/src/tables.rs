use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use mesa_core::models::{SeatStatus, WaitlistScope};
use mesa_core::store::Store;
use mesa_core::{Error, Result};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TableMap {
    pub layout_id: Uuid,
    pub event_id: Uuid,
    pub version: i32,
    pub elements: Vec<Value>,
    pub availability: Vec<TableAvailability>,
    pub pricing: Vec<Value>,
    pub metadata: TableMapTotals,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TableAvailability {
    pub element_id: String,
    pub status: &'static str,
    pub hold_expires_at: Option<String>,
    pub reservation_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TableMapTotals {
    pub total_tables: usize,
    pub available_tables: usize,
    pub available_seats: i64,
    pub venue_waitlist: i64,
    pub user_waitlist_count: i64,
}

/// Read model for the floor map. A pure projection over seats, tables and the
/// waitlist; it never re-checks hold expiry, so a lapsed hold still reads as
/// held until a write path touches the seat.
pub struct TableMapProjector {
    store: Arc<dyn Store>,
}

impl TableMapProjector {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn table_map(&self, event_id: Uuid, zone_id: Option<Uuid>) -> Result<TableMap> {
        let event = self
            .store
            .venue_event_by_id(event_id)
            .await?
            .ok_or_else(|| Error::not_found(format!("event {event_id} not found")))?;
        let layout = self
            .store
            .layout_by_id(event.layout_id)
            .await?
            .ok_or_else(|| Error::internal(format!("layout {} missing", event.layout_id)))?;

        let tables = self.store.tables_for_event(event_id, zone_id).await?;
        let table_ids: Vec<Uuid> = tables.iter().map(|t| t.id).collect();

        let counts = if table_ids.is_empty() {
            Vec::new()
        } else {
            self.store.seat_status_counts(&table_ids).await?
        };

        let mut per_table: HashMap<Uuid, HashMap<SeatStatus, i64>> = HashMap::new();
        for group in &counts {
            *per_table
                .entry(group.table_id)
                .or_default()
                .entry(group.status)
                .or_insert(0) += group.count;
        }

        let availability: Vec<TableAvailability> = tables
            .iter()
            .map(|table| {
                let status = per_table
                    .get(&table.id)
                    .map(resolve_availability)
                    .unwrap_or("available");
                TableAvailability {
                    element_id: table.layout_element_id.clone(),
                    status,
                    hold_expires_at: None,
                    reservation_id: None,
                }
            })
            .collect();

        let available_seats: i64 = per_table
            .values()
            .map(|counts| counts.get(&SeatStatus::Available).copied().unwrap_or(0))
            .sum();
        let available_tables = availability
            .iter()
            .filter(|entry| entry.status == "available")
            .count();

        let waitlist = self.store.waitlist_scope_counts(event_id).await?;
        let scope_count = |scope: WaitlistScope| {
            waitlist
                .iter()
                .find(|group| group.scope == scope)
                .map(|group| group.count)
                .unwrap_or(0)
        };

        let element_ids: HashSet<&str> = tables
            .iter()
            .map(|table| table.layout_element_id.as_str())
            .collect();
        let elements = match layout.json.get("elements").and_then(Value::as_array) {
            Some(all) => all
                .iter()
                .filter(|element| {
                    element
                        .get("id")
                        .and_then(Value::as_str)
                        .is_some_and(|id| element_ids.contains(id))
                })
                .cloned()
                .collect(),
            None => Vec::new(),
        };

        Ok(TableMap {
            layout_id: event.layout_id,
            event_id,
            version: layout.version,
            elements,
            availability,
            pricing: Vec::new(),
            metadata: TableMapTotals {
                total_tables: tables.len(),
                available_tables,
                available_seats,
                venue_waitlist: scope_count(WaitlistScope::Venue),
                user_waitlist_count: scope_count(WaitlistScope::User),
            },
        })
    }
}

/// Any reserved seat marks the whole table reserved, then held, then blocked.
fn resolve_availability(counts: &HashMap<SeatStatus, i64>) -> &'static str {
    let count = |status: SeatStatus| counts.get(&status).copied().unwrap_or(0);
    if count(SeatStatus::Reserved) > 0 {
        "reserved"
    } else if count(SeatStatus::Held) > 0 {
        "held"
    } else if count(SeatStatus::Blocked) > 0 {
        "blocked"
    } else {
        "available"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use mesa_core::models::*;
    use mesa_store::MemStore;
    use serde_json::json;

    struct Fixture {
        store: Arc<MemStore>,
        projector: TableMapProjector,
        event_id: Uuid,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(MemStore::new());
        let projector = TableMapProjector::new(store.clone());
        let layout_id = Uuid::new_v4();
        let event_id = Uuid::new_v4();
        store
            .seed_layout(Layout {
                id: layout_id,
                version: 3,
                json: json!({
                    "elements": [
                        { "id": "el-1", "kind": "table", "x": 10, "y": 20 },
                        { "id": "el-2", "kind": "table", "x": 30, "y": 20 },
                        { "id": "el-unmapped", "kind": "decor" }
                    ]
                }),
            })
            .await;
        store
            .seed_venue_event(VenueEvent {
                id: event_id,
                layout_id,
            })
            .await;
        Fixture {
            store,
            projector,
            event_id,
        }
    }

    async fn seed_table_with_seats(
        fx: &Fixture,
        element_id: &str,
        statuses: &[SeatStatus],
    ) -> Uuid {
        let table_id = Uuid::new_v4();
        fx.store
            .seed_table(Table {
                id: table_id,
                event_id: fx.event_id,
                zone_id: None,
                layout_element_id: element_id.to_string(),
                capacity: statuses.len() as i32,
            })
            .await;
        for status in statuses {
            fx.store
                .seed_seat(Seat {
                    id: Uuid::new_v4(),
                    table_id,
                    status: *status,
                    hold_ends_at: None,
                })
                .await;
        }
        table_id
    }

    #[tokio::test]
    async fn unknown_event_is_not_found() {
        let fx = fixture().await;
        let err = fx.projector.table_map(Uuid::new_v4(), None).await;
        assert!(matches!(err, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn reserved_wins_over_held_and_blocked() {
        let fx = fixture().await;
        seed_table_with_seats(
            &fx,
            "el-1",
            &[SeatStatus::Reserved, SeatStatus::Held, SeatStatus::Blocked],
        )
        .await;
        seed_table_with_seats(&fx, "el-2", &[SeatStatus::Available, SeatStatus::Available])
            .await;

        let map = fx.projector.table_map(fx.event_id, None).await.unwrap();
        let by_element: HashMap<&str, &str> = map
            .availability
            .iter()
            .map(|a| (a.element_id.as_str(), a.status))
            .collect();
        assert_eq!(by_element["el-1"], "reserved");
        assert_eq!(by_element["el-2"], "available");

        assert_eq!(map.metadata.total_tables, 2);
        assert_eq!(map.metadata.available_tables, 1);
        assert_eq!(map.metadata.available_seats, 2);
        assert_eq!(map.version, 3);
    }

    #[tokio::test]
    async fn layout_elements_are_filtered_to_mapped_tables() {
        let fx = fixture().await;
        seed_table_with_seats(&fx, "el-1", &[SeatStatus::Available]).await;

        let map = fx.projector.table_map(fx.event_id, None).await.unwrap();
        assert_eq!(map.elements.len(), 1);
        assert_eq!(map.elements[0]["id"], "el-1");
    }

    #[tokio::test]
    async fn lapsed_hold_still_projects_as_held() {
        let fx = fixture().await;
        let table_id = Uuid::new_v4();
        fx.store
            .seed_table(Table {
                id: table_id,
                event_id: fx.event_id,
                zone_id: None,
                layout_element_id: "el-1".to_string(),
                capacity: 1,
            })
            .await;
        fx.store
            .seed_seat(Seat {
                id: Uuid::new_v4(),
                table_id,
                status: SeatStatus::Held,
                hold_ends_at: Some(Utc::now() - Duration::seconds(120)),
            })
            .await;

        let map = fx.projector.table_map(fx.event_id, None).await.unwrap();
        assert_eq!(map.availability[0].status, "held");
    }

    #[tokio::test]
    async fn waitlist_counts_split_by_scope() {
        let fx = fixture().await;
        let table_id = seed_table_with_seats(&fx, "el-1", &[SeatStatus::Available]).await;

        let mut tx = fx.store.begin().await.unwrap();
        for (user, scope) in [
            ("u1", WaitlistScope::Venue),
            ("u2", WaitlistScope::User),
            ("u3", WaitlistScope::User),
        ] {
            tx.insert_waitlist_entry(&WaitlistEntry {
                id: Uuid::new_v4(),
                event_id: fx.event_id,
                table_id,
                user_id: user.to_string(),
                scope,
                created_at: Utc::now(),
            })
            .await
            .unwrap();
        }
        tx.commit().await.unwrap();

        let map = fx.projector.table_map(fx.event_id, None).await.unwrap();
        assert_eq!(map.metadata.venue_waitlist, 1);
        assert_eq!(map.metadata.user_waitlist_count, 2);
    }

    #[tokio::test]
    async fn zone_filter_narrows_tables() {
        let fx = fixture().await;
        let zone = Uuid::new_v4();
        let table_id = Uuid::new_v4();
        fx.store
            .seed_table(Table {
                id: table_id,
                event_id: fx.event_id,
                zone_id: Some(zone),
                layout_element_id: "el-1".to_string(),
                capacity: 1,
            })
            .await;
        seed_table_with_seats(&fx, "el-2", &[SeatStatus::Available]).await;

        let map = fx
            .projector
            .table_map(fx.event_id, Some(zone))
            .await
            .unwrap();
        assert_eq!(map.metadata.total_tables, 1);
        assert_eq!(map.availability[0].element_id, "el-1");
    }
}
