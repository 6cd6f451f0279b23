use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::driver::{DriverId, GeoPoint, ServiceId};
use crate::models::identity::UserType;
use crate::models::order::{CustomerSummary, Order, OrderId, OrderStatus};

/// Frames sent by clients over the real-time channel.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientEvent {
    #[serde(rename = "driver:online")]
    DriverOnline(DriverOnlinePayload),
    #[serde(rename = "driver:offline")]
    DriverOffline,
    #[serde(rename = "driver:location")]
    DriverLocation(GeoPoint),
    #[serde(rename = "driver:accept")]
    DriverAccept(OrderRef),
    #[serde(rename = "driver:reject")]
    DriverReject(RejectPayload),
    #[serde(rename = "driver:arrived")]
    DriverArrived(OrderRef),
    #[serde(rename = "driver:start")]
    DriverStart(OrderRef),
    #[serde(rename = "driver:complete")]
    DriverComplete(OrderRef),
    #[serde(rename = "driver:cancel")]
    DriverCancel(CancelPayload),
    #[serde(rename = "join:order")]
    JoinOrder(OrderRef),
    #[serde(rename = "leave:order")]
    LeaveOrder(OrderRef),
    #[serde(rename = "rider:cancel")]
    RiderCancel(CancelPayload),
}

impl ClientEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ClientEvent::DriverOnline(_) => "driver:online",
            ClientEvent::DriverOffline => "driver:offline",
            ClientEvent::DriverLocation(_) => "driver:location",
            ClientEvent::DriverAccept(_) => "driver:accept",
            ClientEvent::DriverReject(_) => "driver:reject",
            ClientEvent::DriverArrived(_) => "driver:arrived",
            ClientEvent::DriverStart(_) => "driver:start",
            ClientEvent::DriverComplete(_) => "driver:complete",
            ClientEvent::DriverCancel(_) => "driver:cancel",
            ClientEvent::JoinOrder(_) => "join:order",
            ClientEvent::LeaveOrder(_) => "leave:order",
            ClientEvent::RiderCancel(_) => "rider:cancel",
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverOnlinePayload {
    #[serde(default)]
    pub capabilities: HashSet<ServiceId>,
    #[serde(default)]
    pub location: Option<GeoPoint>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderRef {
    pub order_id: OrderId,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectPayload {
    pub order_id: OrderId,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelPayload {
    pub order_id: OrderId,
    #[serde(default)]
    pub reason_id: Option<u64>,
}

/// Frames pushed by the service to connected parties.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    #[serde(rename = "connected")]
    Connected(ConnectedPayload),
    #[serde(rename = "order:new")]
    OrderNew(OfferPayload),
    #[serde(rename = "order:void")]
    OrderVoid(VoidPayload),
    #[serde(rename = "order:status")]
    OrderStatus(StatusPayload),
    #[serde(rename = "order:driver_found")]
    DriverFound(StatusPayload),
    #[serde(rename = "order:driver_arrived")]
    DriverArrived(StatusPayload),
    #[serde(rename = "order:started")]
    Started(StatusPayload),
    #[serde(rename = "order:completed")]
    Completed(StatusPayload),
    #[serde(rename = "order:cancelled")]
    Cancelled(StatusPayload),
    #[serde(rename = "driver:location")]
    DriverLocation(DriverLocationPayload),
    #[serde(rename = "driver:presence")]
    DriverPresence(PresencePayload),
    #[serde(rename = "error")]
    Error(ErrorPayload),
}

impl ServerEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::Connected(_) => "connected",
            ServerEvent::OrderNew(_) => "order:new",
            ServerEvent::OrderVoid(_) => "order:void",
            ServerEvent::OrderStatus(_) => "order:status",
            ServerEvent::DriverFound(_) => "order:driver_found",
            ServerEvent::DriverArrived(_) => "order:driver_arrived",
            ServerEvent::Started(_) => "order:started",
            ServerEvent::Completed(_) => "order:completed",
            ServerEvent::Cancelled(_) => "order:cancelled",
            ServerEvent::DriverLocation(_) => "driver:location",
            ServerEvent::DriverPresence(_) => "driver:presence",
            ServerEvent::Error(_) => "error",
        }
    }

    pub fn void(order_id: OrderId, reason: &str) -> Self {
        ServerEvent::OrderVoid(VoidPayload {
            order_id,
            reason: reason.to_string(),
        })
    }

    pub fn error(code: &str, message: impl Into<String>) -> Self {
        ServerEvent::Error(ErrorPayload {
            code: code.to_string(),
            message: message.into(),
        })
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectedPayload {
    pub user_id: u64,
    pub user_type: UserType,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OfferPayload {
    pub order_id: OrderId,
    pub pickup: GeoPoint,
    pub dropoff: GeoPoint,
    pub distance_to_pickup: Option<f64>,
    pub estimated_fare: f64,
    pub service_name: String,
    pub customer: CustomerSummary,
    pub expires_in_secs: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoidPayload {
    pub order_id: OrderId,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusPayload {
    pub order_id: OrderId,
    pub status: OrderStatus,
    pub driver_id: Option<DriverId>,
    pub message: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl StatusPayload {
    pub fn from_order(order: &Order) -> Self {
        let message = match order.status {
            OrderStatus::NotFound => Some("no drivers available".to_string()),
            _ => None,
        };

        Self {
            order_id: order.id,
            status: order.status,
            driver_id: order.driver_id,
            message,
            updated_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverLocationPayload {
    pub driver_id: DriverId,
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PresencePayload {
    pub driver_id: DriverId,
    pub online: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorPayload {
    pub code: String,
    pub message: String,
}
