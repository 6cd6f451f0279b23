//! Inbound real-time events, applied on behalf of one authenticated
//! connection.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::error::AppError;
use crate::models::dispatch::AcceptOutcome;
use crate::models::driver::{DriverId, GeoPoint};
use crate::models::events::{
    CancelPayload, ClientEvent, ConnectedPayload, DriverLocationPayload, PresencePayload,
    ServerEvent,
};
use crate::models::identity::{ConnectionId, Identity, UserType};
use crate::models::order::{Order, OrderId, OrderStatus};
use crate::notify;
use crate::orders::Transition;
use crate::router::rooms::RoomKey;
use crate::state::AppState;

/// Greets the connection and, for drivers, arranges presence cleanup when
/// the connection goes away.
pub fn on_connect(state: &AppState, connection_id: ConnectionId, identity: Identity) {
    state.router.emit_to_connection(
        connection_id,
        ServerEvent::Connected(ConnectedPayload {
            user_id: identity.user_id,
            user_type: identity.user_type,
        }),
    );

    if identity.user_type != UserType::Driver {
        return;
    }

    let presence = Arc::clone(&state.presence);
    let engine = Arc::clone(&state.engine);
    let router = Arc::clone(&state.router);

    state.router.on_disconnect(
        connection_id,
        Box::new(move |connection_id, identity| {
            let driver_id = identity.user_id;
            if presence.release_connection(driver_id, connection_id) {
                info!(driver_id, "driver dropped offline on disconnect");
                engine.driver_gone(driver_id);
                router.emit_to_room(
                    RoomKey::Dashboard,
                    ServerEvent::DriverPresence(PresencePayload {
                        driver_id,
                        online: false,
                    }),
                );
            }
        }),
    );
}

/// Parses one text frame and applies it. Failures are reported back to the
/// sender as an `error` event.
pub async fn handle_text(
    state: &AppState,
    connection_id: ConnectionId,
    identity: Identity,
    text: &str,
) {
    let event: ClientEvent = match serde_json::from_str(text) {
        Ok(event) => event,
        Err(err) => {
            debug!(connection_id = %connection_id, error = %err, "unparseable frame");
            state.router.emit_to_connection(
                connection_id,
                ServerEvent::error("bad_event", format!("unrecognised event: {err}")),
            );
            return;
        }
    };

    let name = event.name();
    if let Err(err) = handle_event(state, connection_id, identity, event).await {
        warn!(
            connection_id = %connection_id,
            identity = %identity,
            event = name,
            error = %err,
            "event rejected"
        );
        state
            .router
            .emit_to_connection(connection_id, ServerEvent::error(err.code(), err.to_string()));
    }
}

pub async fn handle_event(
    state: &AppState,
    connection_id: ConnectionId,
    identity: Identity,
    event: ClientEvent,
) -> Result<(), AppError> {
    match event {
        ClientEvent::DriverOnline(payload) => {
            let driver_id = require_driver(identity)?;
            if let Some(location) = payload.location {
                validate_point(&location)?;
            }

            state
                .presence
                .set_online(driver_id, connection_id, payload.capabilities, payload.location);
            info!(driver_id, "driver online");
            announce_presence(state, driver_id, true);
            Ok(())
        }

        ClientEvent::DriverOffline => {
            let driver_id = require_driver(identity)?;
            if state.presence.set_offline(driver_id).is_some() {
                info!(driver_id, "driver offline");
                state.engine.driver_gone(driver_id);
                announce_presence(state, driver_id, false);
            }
            Ok(())
        }

        ClientEvent::DriverLocation(point) => {
            let driver_id = require_driver(identity)?;
            validate_point(&point)?;

            if !state.presence.update_location(driver_id, point) {
                return Err(AppError::Conflict(format!(
                    "driver {driver_id} is not online; send driver:online first"
                )));
            }
            forward_location(state, driver_id, point).await;
            Ok(())
        }

        ClientEvent::DriverAccept(target) => {
            let driver_id = require_driver(identity)?;
            match state.engine.accept(target.order_id, driver_id).await? {
                AcceptOutcome::Assigned(order) => {
                    info!(order_id = order.id, driver_id, "offer accepted");
                }
                AcceptOutcome::Ignored => {
                    debug!(order_id = target.order_id, driver_id, "accept had no effect");
                }
            }
            Ok(())
        }

        ClientEvent::DriverReject(payload) => {
            let driver_id = require_driver(identity)?;
            if !state.engine.reject(payload.order_id, driver_id, payload.reason) {
                debug!(order_id = payload.order_id, driver_id, "reject without an active dispatch");
            }
            Ok(())
        }

        ClientEvent::DriverArrived(target) => {
            advance_trip(state, identity, target.order_id, OrderStatus::Arrived).await
        }

        ClientEvent::DriverStart(target) => {
            advance_trip(state, identity, target.order_id, OrderStatus::Started).await
        }

        ClientEvent::DriverComplete(target) => {
            advance_trip(state, identity, target.order_id, OrderStatus::Finished).await
        }

        ClientEvent::DriverCancel(payload) => {
            let driver_id = require_driver(identity)?;
            assigned_order(state, payload.order_id, driver_id).await?;
            cancel_order(state, payload, OrderStatus::DriverCanceled, identity).await
        }

        ClientEvent::JoinOrder(target) => {
            authorize_order_access(state, identity, target.order_id).await?;
            state
                .router
                .join_room(connection_id, RoomKey::Order(target.order_id));
            Ok(())
        }

        ClientEvent::LeaveOrder(target) => {
            state
                .router
                .leave_room(connection_id, RoomKey::Order(target.order_id));
            Ok(())
        }

        ClientEvent::RiderCancel(payload) => {
            let order = state.store.get_order(payload.order_id).await?;
            let allowed = identity.is_admin()
                || (identity.user_type == UserType::Rider && order.customer_id == identity.user_id);
            if !allowed {
                return Err(AppError::Forbidden(format!(
                    "{identity} may not cancel order {}",
                    order.id
                )));
            }
            cancel_order(state, payload, OrderStatus::RiderCanceled, identity).await
        }
    }
}

fn require_driver(identity: Identity) -> Result<DriverId, AppError> {
    match identity.user_type {
        UserType::Driver => Ok(identity.user_id),
        _ => Err(AppError::Forbidden(format!(
            "{identity} is not a driver connection"
        ))),
    }
}

fn validate_point(point: &GeoPoint) -> Result<(), AppError> {
    let valid = point.lat.is_finite()
        && point.lng.is_finite()
        && (-90.0..=90.0).contains(&point.lat)
        && (-180.0..=180.0).contains(&point.lng);

    if valid {
        Ok(())
    } else {
        Err(AppError::BadRequest(format!(
            "coordinates out of range: {}, {}",
            point.lat, point.lng
        )))
    }
}

fn announce_presence(state: &AppState, driver_id: DriverId, online: bool) {
    state.router.emit_to_room(
        RoomKey::Dashboard,
        ServerEvent::DriverPresence(PresencePayload { driver_id, online }),
    );
}

/// Relays the position to whoever follows the driver's current trip.
async fn forward_location(state: &AppState, driver_id: DriverId, point: GeoPoint) {
    match state.store.active_order_for_driver(driver_id).await {
        Ok(Some(order)) => {
            state.router.emit_to_room(
                RoomKey::Order(order.id),
                ServerEvent::DriverLocation(DriverLocationPayload {
                    driver_id,
                    lat: point.lat,
                    lng: point.lng,
                }),
            );
        }
        Ok(None) => {}
        Err(err) => warn!(driver_id, error = %err, "active trip lookup failed"),
    }
}

async fn assigned_order(
    state: &AppState,
    order_id: OrderId,
    driver_id: DriverId,
) -> Result<Order, AppError> {
    let order = state.store.get_order(order_id).await?;
    if order.driver_id != Some(driver_id) {
        return Err(AppError::Forbidden(format!(
            "order {order_id} is not assigned to driver {driver_id}"
        )));
    }
    Ok(order)
}

async fn advance_trip(
    state: &AppState,
    identity: Identity,
    order_id: OrderId,
    target: OrderStatus,
) -> Result<(), AppError> {
    let driver_id = require_driver(identity)?;
    assigned_order(state, order_id, driver_id).await?;

    let updated = state
        .orders
        .transition(order_id, target, Some(format!("reported by driver {driver_id}")))
        .await?;
    notify::publish_status(&state.router, &updated);
    Ok(())
}

async fn cancel_order(
    state: &AppState,
    payload: CancelPayload,
    target: OrderStatus,
    identity: Identity,
) -> Result<(), AppError> {
    let updated = state
        .orders
        .apply(
            payload.order_id,
            Transition::to(target)
                .with_cancel_reason(payload.reason_id)
                .with_note(format!("cancelled by {identity}")),
        )
        .await?;

    // The offer is voided only after the cancellation is committed.
    if state.engine.cancel_dispatch(payload.order_id).await {
        info!(order_id = payload.order_id, "in-flight dispatch voided by cancellation");
    }

    notify::publish_status(&state.router, &updated);
    Ok(())
}

async fn authorize_order_access(
    state: &AppState,
    identity: Identity,
    order_id: OrderId,
) -> Result<(), AppError> {
    let order = state.store.get_order(order_id).await?;
    let allowed = match identity.user_type {
        UserType::Admin => true,
        UserType::Rider => order.customer_id == identity.user_id,
        UserType::Driver => order.driver_id == Some(identity.user_id),
    };

    if allowed {
        Ok(())
    } else {
        Err(AppError::Forbidden(format!(
            "{identity} may not follow order {order_id}"
        )))
    }
}
