use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::info;

use crate::error::AppError;
use crate::models::dispatch::{DispatchAttempt, DispatchOutcome};
use crate::models::driver::{DriverId, GeoPoint, ServiceId};
use crate::models::order::{CustomerId, Order, OrderActivity, OrderId, OrderStatus};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/orders", post(create_order))
        .route("/orders/:id", get(get_order))
        .route("/orders/:id/activities", get(list_activities))
        .route(
            "/orders/:id/dispatch",
            post(start_dispatch)
                .get(dispatch_status)
                .delete(cancel_dispatch),
        )
}

#[derive(Deserialize)]
pub struct CreateOrderRequest {
    pub id: OrderId,
    pub customer_id: CustomerId,
    pub service_id: ServiceId,
    pub service_name: String,
    pub pickup: GeoPoint,
    pub dropoff: GeoPoint,
    pub estimated_fare: f64,
    #[serde(default)]
    pub distance_km: f64,
    #[serde(default)]
    pub scheduled_at: Option<DateTime<Utc>>,
}

#[derive(Deserialize, Default)]
pub struct DispatchRequest {
    #[serde(default)]
    pub driver_id: Option<DriverId>,
}

async fn create_order(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<Order>), AppError> {
    for point in [&payload.pickup, &payload.dropoff] {
        if !(-90.0..=90.0).contains(&point.lat) || !(-180.0..=180.0).contains(&point.lng) {
            return Err(AppError::BadRequest(format!(
                "coordinates out of range: {}, {}",
                point.lat, point.lng
            )));
        }
    }
    if !payload.estimated_fare.is_finite() || payload.estimated_fare < 0.0 {
        return Err(AppError::BadRequest(
            "estimated_fare must be a non-negative number".to_string(),
        ));
    }

    let order = Order {
        id: payload.id,
        customer_id: payload.customer_id,
        driver_id: None,
        service_id: payload.service_id,
        service_name: payload.service_name,
        status: OrderStatus::Requested,
        pickup: payload.pickup,
        dropoff: payload.dropoff,
        estimated_fare: payload.estimated_fare,
        distance_km: payload.distance_km,
        scheduled_at: payload.scheduled_at,
        cancel_reason_id: None,
        created_at: Utc::now(),
        accepted_at: None,
        arrived_at: None,
        started_at: None,
        finished_at: None,
        canceled_at: None,
    };

    state.store.insert_order(order.clone()).await?;
    info!(order_id = order.id, customer_id = order.customer_id, "order created");

    let order = match order.scheduled_at {
        Some(at) => {
            state
                .orders
                .transition(order.id, OrderStatus::Booked, Some(format!("scheduled for {at}")))
                .await?
        }
        None => order,
    };

    Ok((StatusCode::CREATED, Json(order)))
}

async fn get_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<OrderId>,
) -> Result<Json<Order>, AppError> {
    Ok(Json(state.store.get_order(id).await?))
}

async fn list_activities(
    State(state): State<Arc<AppState>>,
    Path(id): Path<OrderId>,
) -> Result<Json<Vec<OrderActivity>>, AppError> {
    Ok(Json(state.store.activities(id).await?))
}

async fn start_dispatch(
    State(state): State<Arc<AppState>>,
    Path(id): Path<OrderId>,
    payload: Option<Json<DispatchRequest>>,
) -> Result<Json<DispatchOutcome>, AppError> {
    let request = payload.map(|Json(request)| request).unwrap_or_default();

    match state.engine.dispatch(id, request.driver_id).await? {
        DispatchOutcome::NoDriversAvailable => Err(AppError::NoAvailableDrivers),
        outcome => Ok(Json(outcome)),
    }
}

async fn dispatch_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<OrderId>,
) -> Result<Json<DispatchAttempt>, AppError> {
    state
        .engine
        .attempt(id)
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("order {id} has no active dispatch")))
}

async fn cancel_dispatch(
    State(state): State<Arc<AppState>>,
    Path(id): Path<OrderId>,
) -> Result<StatusCode, AppError> {
    if state.engine.cancel_dispatch(id).await {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound(format!("order {id} has no active dispatch")))
    }
}
