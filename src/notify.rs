use crate::models::events::{ServerEvent, StatusPayload};
use crate::models::order::{Order, OrderStatus};
use crate::router::ConnectionRouter;
use crate::router::rooms::RoomKey;

/// Broadcasts `order:status` plus the status-specific event to everyone
/// following the order: its room, the rider, and the live dashboard.
pub fn publish_status(router: &ConnectionRouter, order: &Order) -> usize {
    let rooms = [
        RoomKey::Order(order.id),
        RoomKey::Rider(order.customer_id),
        RoomKey::Dashboard,
    ];
    let payload = StatusPayload::from_order(order);

    let follow_up = match order.status {
        OrderStatus::DriverAccepted => Some(ServerEvent::DriverFound(payload.clone())),
        OrderStatus::Arrived => Some(ServerEvent::DriverArrived(payload.clone())),
        OrderStatus::Started => Some(ServerEvent::Started(payload.clone())),
        OrderStatus::Finished => Some(ServerEvent::Completed(payload.clone())),
        OrderStatus::RiderCanceled | OrderStatus::DriverCanceled => {
            Some(ServerEvent::Cancelled(payload.clone()))
        }
        OrderStatus::Requested | OrderStatus::Booked | OrderStatus::NotFound => None,
    };

    let delivered = router.emit_to_rooms(&rooms, ServerEvent::OrderStatus(payload));
    if let Some(event) = follow_up {
        router.emit_to_rooms(&rooms, event);
    }
    delivered
}
