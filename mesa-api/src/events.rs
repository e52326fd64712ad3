use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    response::sse::{Event, KeepAlive, Sse},
    routing::get,
    Json, Router,
};
use futures_util::stream::Stream;
use futures_util::StreamExt;
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use uuid::Uuid;

use mesa_core::events::ALL_EVENTS;
use mesa_reserve::tables::TableMap;

use crate::error::ApiError;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/events/stream", get(stream))
        .route("/api/events/{event_id}/table-map", get(table_map))
}

#[derive(Debug, Deserialize)]
struct TableMapQuery {
    #[serde(default, alias = "zoneId")]
    zone_id: Option<Uuid>,
}

async fn table_map(
    State(state): State<AppState>,
    Path(event_id): Path<Uuid>,
    Query(query): Query<TableMapQuery>,
) -> Result<Json<TableMap>, ApiError> {
    Ok(Json(state.tables.table_map(event_id, query.zone_id).await?))
}

#[derive(Debug, Deserialize)]
struct StreamQuery {
    /// Comma-separated event names; defaults to every known event.
    events: Option<String>,
}

/// Live fan-out of bus events as server-sent events. Subscriptions are
/// dropped with the stream when the client disconnects.
async fn stream(
    State(state): State<AppState>,
    Query(query): Query<StreamQuery>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let names: Vec<String> = match query.events {
        Some(raw) => raw
            .split(',')
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
            .collect(),
        None => ALL_EVENTS.iter().map(|name| name.to_string()).collect(),
    };

    let (tx, rx) = mpsc::unbounded_channel::<(String, Value)>();
    let subscriptions: Vec<_> = names
        .iter()
        .map(|name| {
            let tx = tx.clone();
            let event_name = name.clone();
            state.bus.on(
                name,
                Arc::new(move |payload: &Value| {
                    // A dropped receiver means the client went away; the bus
                    // should not count that as a delivery failure.
                    let _ = tx.send((event_name.clone(), payload.clone()));
                    Ok(())
                }),
            )
        })
        .collect();

    let stream = UnboundedReceiverStream::new(rx).map(move |(name, payload)| {
        let _keep_alive = &subscriptions;
        Ok(Event::default()
            .event(name)
            .data(payload.to_string()))
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}
