use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use mesa_api::{app, AppState};
use mesa_core::clock::ManualClock;
use mesa_core::models::*;
use mesa_core::store::Store;
use mesa_pay::UnconfiguredGateway;
use mesa_store::MemStore;

struct TestApp {
    store: Arc<MemStore>,
    router: Router,
    event_id: Uuid,
    table_id: Uuid,
    seat_ids: Vec<Uuid>,
}

async fn setup(webhook_secret: Option<&str>) -> TestApp {
    let store = Arc::new(MemStore::new());
    let clock = Arc::new(ManualClock::starting_now());
    let state = AppState::build(
        store.clone(),
        Arc::new(UnconfiguredGateway),
        clock,
        webhook_secret.map(str::to_string),
    );
    let router = app(state);

    let layout_id = Uuid::new_v4();
    let event_id = Uuid::new_v4();
    let table_id = Uuid::new_v4();
    store
        .seed_layout(Layout {
            id: layout_id,
            version: 1,
            json: json!({ "elements": [{ "id": "el-1", "kind": "table" }] }),
        })
        .await;
    store
        .seed_venue_event(VenueEvent {
            id: event_id,
            layout_id,
        })
        .await;
    store
        .seed_table(Table {
            id: table_id,
            event_id,
            zone_id: None,
            layout_element_id: "el-1".to_string(),
            capacity: 2,
        })
        .await;

    let mut seat_ids = Vec::new();
    for _ in 0..2 {
        let id = Uuid::new_v4();
        store
            .seed_seat(Seat {
                id,
                table_id,
                status: SeatStatus::Available,
                hold_ends_at: None,
            })
            .await;
        seat_ids.push(id);
    }

    TestApp {
        store,
        router,
        event_id,
        table_id,
        seat_ids,
    }
}

async fn seed_order(store: &MemStore, amount: i64) -> Uuid {
    let order_id = Uuid::new_v4();
    store
        .seed_order(
            Order {
                id: order_id,
                reservation_id: Uuid::new_v4(),
                customer_name: None,
                customer_email: None,
                customer_phone: None,
                total_amount: amount,
                currency: "MXN".to_string(),
                status: OrderStatus::Pending,
                created_at: chrono::Utc::now(),
            },
            vec![],
        )
        .await;
    order_id
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn delete(uri: &str) -> Request<Body> {
    Request::builder()
        .method("DELETE")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn hold_confirm_cancel_round_trip() {
    let test = setup(None).await;

    let response = test
        .router
        .clone()
        .oneshot(post_json(
            "/api/reservations/hold",
            json!({
                "eventId": test.event_id,
                "tableId": test.table_id,
                "seatIds": test.seat_ids,
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let hold = body_json(response).await;
    let token = hold["holdingToken"].as_str().unwrap().to_string();
    assert!(hold["expiresAt"].is_string());

    let response = test
        .router
        .clone()
        .oneshot(post_json(
            "/api/reservations",
            json!({
                "token": token,
                "customerName": "Ana",
                "customerEmail": "ana@example.com",
                "totalAmount": 10_000,
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let confirmed = body_json(response).await;
    let reservation_id = confirmed["reservation"]["id"].as_str().unwrap().to_string();
    assert_eq!(confirmed["reservation"]["status"], "CONFIRMED");
    assert_eq!(confirmed["order"]["currency"], "MXN");

    let response = test
        .router
        .clone()
        .oneshot(delete(&format!("/api/reservations/{reservation_id}")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["success"], true);

    let seats = test.store.seats_by_ids(&test.seat_ids).await.unwrap();
    assert!(seats.iter().all(|s| s.status == SeatStatus::Available));
}

#[tokio::test]
async fn conflicting_hold_maps_to_409() {
    let test = setup(None).await;
    let body = json!({
        "eventId": test.event_id,
        "tableId": test.table_id,
        "seatIds": test.seat_ids,
    });

    let response = test
        .router
        .clone()
        .oneshot(post_json("/api/reservations/hold", body.clone()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = test
        .router
        .clone()
        .oneshot(post_json("/api/reservations/hold", body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert!(body_json(response).await["error"].is_string());
}

#[tokio::test]
async fn short_hold_duration_maps_to_400() {
    let test = setup(None).await;
    let response = test
        .router
        .clone()
        .oneshot(post_json(
            "/api/reservations/hold",
            json!({
                "eventId": test.event_id,
                "tableId": test.table_id,
                "seatIds": test.seat_ids,
                "durationSeconds": 5,
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn cancel_unknown_reservation_maps_to_404() {
    let test = setup(None).await;
    let response = test
        .router
        .clone()
        .oneshot(delete(&format!("/api/reservations/{}", Uuid::new_v4())))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(body_json(response).await["error"].is_string());
}

#[tokio::test]
async fn codi_charge_and_webhook_settle_order() {
    let test = setup(None).await;
    let order_id = seed_order(&test.store, 15_000).await;

    let response = test
        .router
        .clone()
        .oneshot(post_json(
            "/api/payments/codi/charge",
            json!({ "orderId": order_id }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let charge = body_json(response).await;
    let codi_id = charge["codiId"].as_str().unwrap().to_string();
    assert_eq!(charge["qrData"], format!("CODI:{codi_id}"));

    let response = test
        .router
        .clone()
        .oneshot(post_json(
            "/api/webhooks/codi",
            json!({ "codiId": codi_id, "status": "paid", "amount": 15_000 }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let order = test.store.order_by_id(order_id).await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::Paid);

    let response = test
        .router
        .clone()
        .oneshot(get(&format!("/api/payments/codi/{codi_id}")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let detail = body_json(response).await;
    assert_eq!(detail["paymentAttempt"]["status"], "SUCCEEDED");
}

#[tokio::test]
async fn spei_reference_confirm_and_reconcile_queue() {
    let test = setup(None).await;
    let order_id = seed_order(&test.store, 40_000).await;

    let response = test
        .router
        .clone()
        .oneshot(post_json(
            "/api/payments/spei/reference",
            json!({ "orderId": order_id, "bankCode": "012" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let created = body_json(response).await;
    let reference = created["reference"].as_str().unwrap().to_string();
    assert_eq!(reference.len(), 18);

    let response = test
        .router
        .clone()
        .oneshot(post_json(
            "/api/payments/spei/confirm",
            json!({ "reference": reference, "amount": 40_000 }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let order = test.store.order_by_id(order_id).await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::Paid);

    let response = test
        .router
        .clone()
        .oneshot(get("/api/references?status=RECONCILED"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let listed = body_json(response).await;
    assert_eq!(listed["pagination"]["total"], 1);
    let reference_id = listed["data"][0]["reference"]["id"].as_str().unwrap().to_string();

    let response = test
        .router
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!("/api/references/{reference_id}/reconcile"))
                .header("content-type", "application/json")
                .header("x-actor-id", "ops-1")
                .body(Body::from(
                    json!({ "status": "REJECTED", "note": "duplicate deposit" }).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let updated = body_json(response).await;
    assert_eq!(updated["status"], "REJECTED");
}

#[tokio::test]
async fn mercadopago_webhook_requires_signature_when_secret_set() {
    let test = setup(Some("secret")).await;
    let response = test
        .router
        .clone()
        .oneshot(post_json(
            "/api/webhooks/mercadopago",
            json!({ "data": { "id": "mp-1" } }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn table_map_endpoint_reports_availability() {
    let test = setup(None).await;

    let response = test
        .router
        .clone()
        .oneshot(get(&format!("/api/events/{}/table-map", test.event_id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let map = body_json(response).await;
    assert_eq!(map["metadata"]["totalTables"], 1);
    assert_eq!(map["metadata"]["availableSeats"], 2);
    assert_eq!(map["availability"][0]["status"], "available");
    assert_eq!(map["elements"][0]["id"], "el-1");

    let response = test
        .router
        .clone()
        .oneshot(get(&format!("/api/events/{}/table-map", Uuid::new_v4())))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn audit_endpoint_lists_recorded_actions() {
    let test = setup(None).await;
    test.router
        .clone()
        .oneshot(post_json(
            "/api/reservations/hold",
            json!({
                "eventId": test.event_id,
                "tableId": test.table_id,
                "seatIds": test.seat_ids,
            }),
        ))
        .await
        .unwrap();

    let response = test
        .router
        .clone()
        .oneshot(get("/api/audit?action=seat.hold"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let page = body_json(response).await;
    assert_eq!(page["total"], 1);
    assert_eq!(page["data"][0]["resource_type"], "seat");
}

#[tokio::test]
async fn waitlist_endpoints_enforce_rules() {
    let test = setup(None).await;
    let body = json!({
        "eventId": test.event_id,
        "tableId": test.table_id,
        "userId": "user-1",
        "scope": "USER",
    });

    let response = test
        .router
        .clone()
        .oneshot(post_json("/api/waitlist", body.clone()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = test
        .router
        .clone()
        .oneshot(post_json("/api/waitlist", body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = test
        .router
        .clone()
        .oneshot(delete(&format!("/api/waitlist/{}", test.table_id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = test
        .router
        .clone()
        .oneshot(delete(&format!(
            "/api/waitlist/{}?user_id=user-1",
            test.table_id
        )))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
