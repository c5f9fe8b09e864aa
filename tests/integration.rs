mod common;

use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use rider_dispatch::api::rest::router;
use rider_dispatch::collaborators::Role;
use rider_dispatch::engine::assignment::{assign_delivery, run_assignment_engine};
use rider_dispatch::engine::lifecycle::{respond_to_assignment, update_status};
use rider_dispatch::models::actor::Actor;
use rider_dispatch::models::delivery::DeliveryStatus;
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use common::{north_of_dropoff, Harness, DROPOFF, PICKUP};

async fn in_transit(h: &Harness, delivery_id: Uuid, rider_id: Uuid) {
    assign_delivery(&h.state, delivery_id, None).await.unwrap();
    respond_to_assignment(&h.state, delivery_id, rider_id, true)
        .await
        .unwrap();
    for status in [DeliveryStatus::PickedUp, DeliveryStatus::InTransit] {
        update_status(&h.state, delivery_id, status, Actor::Rider(rider_id), None)
            .await
            .unwrap();
    }
}

fn json_request(method: &str, uri: &str, user: Uuid, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .header("x-user-id", user.to_string())
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap()
}

fn empty_request(method: &str, uri: &str, user: Uuid) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("x-user-id", user.to_string())
        .body(Body::empty())
        .unwrap()
}

fn get_request(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn body_string(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

fn location_json(lat: f64, lng: f64) -> Value {
    json!({
        "address": "14 Akin Adesola Street",
        "city": "Lagos",
        "state": "Lagos",
        "coordinates": { "lat": lat, "lng": lng }
    })
}

#[tokio::test]
async fn health_returns_ok() {
    let h = Harness::new();
    let app = router(h.state.clone());
    let response = app.oneshot(get_request("/health")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["riders"], 0);
    assert_eq!(body["deliveries"], 0);
}

#[tokio::test]
async fn metrics_returns_prometheus_format() {
    let h = Harness::new();
    let app = router(h.state.clone());
    let response = app.oneshot(get_request("/metrics")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let content_type = response
        .headers()
        .get("content-type")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(content_type.contains("text/plain"));

    let body = body_string(response).await;
    assert!(body.contains("orders_in_queue"));
}

#[tokio::test]
async fn requests_without_identity_are_not_allowed() {
    let h = Harness::new();
    let app = router(h.state.clone());
    let response = app.oneshot(get_request("/riders")).await.unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body = body_json(response).await;
    assert_eq!(body["error"], "not allowed");
}

#[tokio::test]
async fn customers_cannot_list_riders() {
    let h = Harness::new();
    let customer = h.user(Role::Customer, "Chidi");
    let app = router(h.state.clone());
    let response = app
        .oneshot(empty_request("GET", "/riders", customer))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn unknown_delivery_returns_404() {
    let h = Harness::new();
    let admin = h.user(Role::Admin, "Ops");
    let app = router(h.state.clone());
    let response = app
        .oneshot(empty_request(
            "GET",
            &format!("/deliveries/{}", Uuid::nil()),
            admin,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn unverified_rider_cannot_go_available() {
    let h = Harness::new();
    let rider_user = h.user(Role::Rider, "Musa");
    let app = router(h.state.clone());

    let res = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/riders",
            rider_user,
            json!({
                "user_id": rider_user,
                "name": "Musa",
                "vehicle": "motorcycle",
                "service_areas": ["Lagos"]
            }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let rider = body_json(res).await;
    assert_eq!(rider["status"], "pending_verification");
    let rider_id = rider["id"].as_str().unwrap().to_string();

    let res = app
        .oneshot(json_request(
            "PATCH",
            &format!("/riders/{rider_id}/availability"),
            rider_user,
            json!({ "available": true, "location": { "lat": 6.44, "lng": 3.42 } }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::PRECONDITION_FAILED);
}

#[tokio::test]
async fn unknown_timeframe_is_a_bad_request() {
    let h = Harness::new();
    let admin = h.user(Role::Admin, "Ops");
    let app = router(h.state.clone());
    let response = app
        .oneshot(empty_request(
            "GET",
            "/analytics/assignments?timeframe=fortnight",
            admin,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn pending_assignments_show_manual_queue() {
    let h = Harness::new();
    let admin = h.user(Role::Admin, "Ops");
    let delivery = h.delivery_to(None, 20_000).await;
    let app = router(h.state.clone());

    let res = app
        .clone()
        .oneshot(empty_request(
            "POST",
            &format!("/deliveries/{}/assign", delivery.id),
            admin,
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let outcome = body_json(res).await;
    assert_eq!(outcome["success"], false);
    assert_eq!(outcome["reason"], "missing coordinates");

    let res = app
        .oneshot(empty_request("GET", "/assignments/pending", admin))
        .await
        .unwrap();
    let pending = body_json(res).await;
    let list = pending.as_array().unwrap();
    assert_eq!(list.len(), 1);
    assert_eq!(list[0]["id"], delivery.id.to_string());
    assert!(list[0]["manual_assignment"]["reason"].is_string());
}

#[tokio::test]
async fn full_delivery_flow() {
    let h = Harness::new();
    let admin = h.user(Role::Admin, "Ops");
    let rider_user = h.user(Role::Rider, "Musa");
    let customer = h.user(Role::Customer, "Chidi");
    let order_id = h.order(customer, Some(DROPOFF), 20_000);
    let app = router(h.state.clone());
    tokio::spawn(run_assignment_engine(h.state.clone(), h.assignment_rx));

    let res = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/riders",
            admin,
            json!({
                "user_id": rider_user,
                "name": "Musa",
                "vehicle": "motorcycle",
                "service_areas": ["Lagos"],
                "security_deposit": 80000
            }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let rider = body_json(res).await;
    let rider_id = rider["id"].as_str().unwrap().to_string();

    for kind in ["identity", "driver_licence", "vehicle_registration", "guarantor"] {
        let res = app
            .clone()
            .oneshot(empty_request(
                "POST",
                &format!("/riders/{rider_id}/documents/{kind}/verify"),
                admin,
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }

    let here = north_of_dropoff(2.0);
    let res = app
        .clone()
        .oneshot(json_request(
            "PATCH",
            &format!("/riders/{rider_id}/availability"),
            rider_user,
            json!({ "available": true, "location": { "lat": here.lat, "lng": here.lng } }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let availability = body_json(res).await;
    assert_eq!(availability["rider"]["status"], "active");
    assert_eq!(availability["rider"]["is_available"], true);

    let res = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/deliveries",
            customer,
            json!({
                "order_id": order_id,
                "customer_id": customer,
                "pickup": location_json(PICKUP.lat, PICKUP.lng),
                "dropoff": location_json(DROPOFF.lat, DROPOFF.lng),
                "delivery_fee": 1500,
                "rider_payment": 1200
            }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let delivery = body_json(res).await;
    assert_eq!(delivery["status"], "pending_assignment");
    let delivery_id = delivery["id"].as_str().unwrap().to_string();

    tokio::time::sleep(Duration::from_millis(200)).await;

    let res = app
        .clone()
        .oneshot(empty_request(
            "GET",
            &format!("/deliveries/{delivery_id}"),
            customer,
        ))
        .await
        .unwrap();
    let offered = body_json(res).await;
    assert_eq!(offered["status"], "awaiting_rider_response");
    assert_eq!(offered["rider_id"], rider_id);

    let res = app
        .clone()
        .oneshot(json_request(
            "POST",
            &format!("/deliveries/{delivery_id}/respond"),
            rider_user,
            json!({ "accept": true }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(body_json(res).await["status"], "accepted");

    for status in ["picked_up", "in_transit", "delivered"] {
        let res = app
            .clone()
            .oneshot(json_request(
                "PATCH",
                &format!("/deliveries/{delivery_id}/status"),
                rider_user,
                json!({ "status": status }),
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(body_json(res).await["status"], status);
    }

    let res = app
        .clone()
        .oneshot(json_request(
            "PATCH",
            &format!("/deliveries/{delivery_id}/status"),
            customer,
            json!({ "status": "completed" }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = app
        .clone()
        .oneshot(json_request(
            "PATCH",
            &format!("/deliveries/{delivery_id}/status"),
            customer,
            json!({ "status": "completed" }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);

    let res = app
        .clone()
        .oneshot(empty_request(
            "POST",
            &format!("/deliveries/{delivery_id}/release-payment"),
            customer,
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let res = app
        .clone()
        .oneshot(empty_request(
            "POST",
            &format!("/deliveries/{delivery_id}/release-payment"),
            admin,
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(body_json(res).await["payment_status"], "released");
    assert_eq!(h.backends.wallet.balance(rider_user), 1_200);

    let res = app
        .clone()
        .oneshot(json_request(
            "POST",
            &format!("/deliveries/{delivery_id}/rating"),
            customer,
            json!({ "rating": 5, "comment": "on time" }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = app
        .clone()
        .oneshot(empty_request(
            "GET",
            "/analytics/deliveries?timeframe=all",
            admin,
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let metrics = body_json(res).await;
    assert_eq!(metrics["completed"], 1);
    assert_eq!(metrics["released_payouts"], 1200);
    assert_eq!(metrics["avg_customer_rating"], 5.0);

    let res = app
        .oneshot(empty_request(
            "GET",
            "/analytics/assignments?timeframe=day",
            admin,
        ))
        .await
        .unwrap();
    let analytics = body_json(res).await;
    assert_eq!(analytics["assigned"], 1);
    assert_eq!(analytics["accepted"], 1);
    assert_eq!(analytics["acceptance_rate"], 100.0);
}

#[tokio::test]
async fn busy_rider_location_update_keeps_the_delivery() {
    let h = Harness::new();
    let rider = h.rider("Musa", north_of_dropoff(2.0), 50, Some(4.8)).await;
    h.rider("Bola", north_of_dropoff(3.0), 40, Some(4.6)).await;
    let delivery = h.delivery().await;
    in_transit(&h, delivery.id, rider.id).await;

    let app = router(h.state.clone());
    let uri = format!("/riders/{}/availability", rider.id);
    let here = north_of_dropoff(1.0);
    let res = app
        .clone()
        .oneshot(json_request(
            "PATCH",
            &uri,
            rider.user_id,
            json!({ "available": false, "location": { "lat": here.lat, "lng": here.lng } }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body = body_json(res).await;
    assert_eq!(body["reassignments"], json!([]));
    assert_eq!(body["rider"]["is_on_delivery"], true);

    let closer = north_of_dropoff(0.5);
    let res = app
        .clone()
        .oneshot(json_request(
            "PATCH",
            &uri,
            rider.user_id,
            json!({ "location": { "lat": closer.lat, "lng": closer.lng } }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let stored = h.delivery_state(delivery.id).await;
    assert_eq!(stored.status, DeliveryStatus::InTransit);
    assert_eq!(stored.rider_id, Some(rider.id));

    let moved = h.rider_state(rider.id).await;
    assert_eq!(moved.location, Some(closer));
    assert!(moved.is_on_delivery);
    assert_eq!(moved.stats.reassigned_deliveries, 0);
}

#[tokio::test]
async fn going_offline_hands_the_delivery_on() {
    let h = Harness::new();
    let rider = h.rider("Musa", north_of_dropoff(2.0), 50, Some(4.8)).await;
    let backup = h.rider("Bola", north_of_dropoff(3.0), 40, Some(4.6)).await;
    let delivery = h.delivery().await;
    in_transit(&h, delivery.id, rider.id).await;

    let app = router(h.state.clone());
    let uri = format!("/riders/{}/availability", rider.id);
    let res = app
        .clone()
        .oneshot(json_request(
            "PATCH",
            &uri,
            rider.user_id,
            json!({ "offline": true, "available": true }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = app
        .clone()
        .oneshot(json_request("PATCH", &uri, rider.user_id, json!({ "offline": true })))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body = body_json(res).await;
    assert_eq!(body["reassignments"].as_array().unwrap().len(), 1);
    assert_eq!(body["rider"]["is_on_delivery"], false);

    let stored = h.delivery_state(delivery.id).await;
    assert_eq!(stored.status, DeliveryStatus::AwaitingRiderResponse);
    assert_eq!(stored.rider_id, Some(backup.id));
}
