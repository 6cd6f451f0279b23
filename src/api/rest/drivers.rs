use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::{Path, State};
use axum::routing::get;
use serde::Serialize;

use crate::models::driver::{DriverId, DriverPresence};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/drivers", get(list_drivers))
        .route("/drivers/online", get(online_drivers))
        .route("/drivers/:id/online", get(driver_online))
}

#[derive(Serialize)]
struct OnlineStatus {
    driver_id: DriverId,
    online: bool,
}

async fn list_drivers(State(state): State<Arc<AppState>>) -> Json<Vec<DriverPresence>> {
    Json(state.presence.snapshot())
}

async fn online_drivers(State(state): State<Arc<AppState>>) -> Json<Vec<DriverId>> {
    Json(state.presence.online_driver_ids())
}

async fn driver_online(
    State(state): State<Arc<AppState>>,
    Path(driver_id): Path<DriverId>,
) -> Json<OnlineStatus> {
    Json(OnlineStatus {
        driver_id,
        online: state.presence.is_online(driver_id),
    })
}
