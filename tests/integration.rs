mod common;

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::{insert_order, online_driver, state};
use ride_dispatch::api::rest::router;
use ride_dispatch::models::driver::GeoPoint;
use ride_dispatch::state::AppState;
use serde_json::{Value, json};
use tower::ServiceExt;

fn setup() -> (axum::Router, Arc<AppState>) {
    let (state, _) = state(5.0);
    let shared = Arc::new(state);
    (router(shared.clone()), shared)
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap()
}

fn empty_request(method: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

fn get_request(uri: &str) -> Request<Body> {
    empty_request("GET", uri)
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

fn order_body(id: u64) -> Value {
    json!({
        "id": id,
        "customer_id": 3,
        "service_id": 1,
        "service_name": "standard",
        "pickup": { "lat": 52.51, "lng": 13.39 },
        "dropoff": { "lat": 52.54, "lng": 13.42 },
        "estimated_fare": 14.0,
        "distance_km": 4.2
    })
}

#[tokio::test]
async fn health_returns_ok() {
    let (app, _) = setup();
    let response = app.oneshot(get_request("/health")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["online_drivers"], 0);
    assert_eq!(body["connections"], 0);
    assert_eq!(body["active_dispatches"], 0);
}

#[tokio::test]
async fn metrics_returns_prometheus_format() {
    let (app, _) = setup();
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
    assert!(body.contains("active_dispatches"));
    assert!(body.contains("online_drivers"));
}

#[tokio::test]
async fn create_order_returns_requested() {
    let (app, _) = setup();
    let response = app
        .oneshot(json_request("POST", "/orders", order_body(1)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);

    let body = body_json(response).await;
    assert_eq!(body["id"], 1);
    assert_eq!(body["status"], "Requested");
    assert!(body["driver_id"].is_null());
}

#[tokio::test]
async fn scheduled_order_is_booked() {
    let (app, _) = setup();
    let mut request = order_body(2);
    request["scheduled_at"] = json!("2030-01-01T08:00:00Z");

    let response = app
        .clone()
        .oneshot(json_request("POST", "/orders", request))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(body_json(response).await["status"], "Booked");

    let response = app
        .oneshot(get_request("/orders/2/activities"))
        .await
        .unwrap();
    let activities = body_json(response).await;
    assert_eq!(activities.as_array().unwrap().len(), 1);
    assert_eq!(activities[0]["status"], "Booked");
}

#[tokio::test]
async fn duplicate_order_returns_409() {
    let (app, _) = setup();
    let first = app
        .clone()
        .oneshot(json_request("POST", "/orders", order_body(1)))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::CREATED);

    let second = app
        .oneshot(json_request("POST", "/orders", order_body(1)))
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn create_order_with_bad_coordinates_returns_400() {
    let (app, _) = setup();
    let mut request = order_body(1);
    request["pickup"] = json!({ "lat": 123.0, "lng": 13.39 });

    let response = app
        .oneshot(json_request("POST", "/orders", request))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn get_nonexistent_order_returns_404() {
    let (app, _) = setup();
    let response = app.oneshot(get_request("/orders/404")).await.unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(body_json(response).await["error"].is_string());
}

#[tokio::test]
async fn dispatch_without_drivers_returns_503() {
    let (app, shared) = setup();
    insert_order(&shared, 1, GeoPoint::new(52.51, 13.39)).await;

    let response = app
        .clone()
        .oneshot(empty_request("POST", "/orders/1/dispatch"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body_json(response).await["error"], "no drivers available");

    let response = app.oneshot(get_request("/orders/1")).await.unwrap();
    assert_eq!(body_json(response).await["status"], "NotFound");
}

#[tokio::test]
async fn dispatch_unknown_order_returns_404() {
    let (app, _) = setup();
    let response = app
        .oneshot(empty_request("POST", "/orders/9/dispatch"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn online_drivers_are_listed() {
    let (app, shared) = setup();
    let _driver = online_driver(&shared, 7, GeoPoint::new(52.51, 13.39)).await;

    let response = app
        .clone()
        .oneshot(get_request("/drivers/online"))
        .await
        .unwrap();
    assert_eq!(body_json(response).await, json!([7]));

    let response = app
        .clone()
        .oneshot(get_request("/drivers/7/online"))
        .await
        .unwrap();
    assert_eq!(body_json(response).await["online"], true);

    let response = app.oneshot(get_request("/drivers/8/online")).await.unwrap();
    assert_eq!(body_json(response).await["online"], false);
}

#[tokio::test]
async fn dispatch_lifecycle_over_http() {
    let (app, shared) = setup();
    insert_order(&shared, 1, GeoPoint::new(52.51, 13.39)).await;
    let _driver = online_driver(&shared, 7, GeoPoint::new(52.511, 13.391)).await;

    let response = app
        .clone()
        .oneshot(json_request("POST", "/orders/1/dispatch", json!({ "driver_id": 7 })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["outcome"], "accepted");
    assert_eq!(body["candidates"], 1);

    let response = app
        .clone()
        .oneshot(empty_request("POST", "/orders/1/dispatch"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = app
        .clone()
        .oneshot(get_request("/orders/1/dispatch"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let attempt = body_json(response).await;
    assert_eq!(attempt["candidates"], json!([7]));
    assert_eq!(attempt["manual"], true);

    let response = app
        .clone()
        .oneshot(empty_request("DELETE", "/orders/1/dispatch"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app
        .clone()
        .oneshot(get_request("/orders/1/dispatch"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .oneshot(empty_request("DELETE", "/orders/1/dispatch"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
