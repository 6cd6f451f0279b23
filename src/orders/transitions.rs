use chrono::{DateTime, Utc};

use crate::models::order::{Order, OrderStatus};

/// The authoritative transition table.
pub fn is_allowed(from: OrderStatus, to: OrderStatus) -> bool {
    use OrderStatus::*;

    if from.is_terminal() {
        return false;
    }

    match (from, to) {
        (_, RiderCanceled | DriverCanceled) => true,
        (Requested, Booked) => true,
        (Requested | Booked | NotFound, DriverAccepted) => true,
        (DriverAccepted, Arrived) => true,
        (Arrived, Started) => true,
        (Started, Finished) => true,
        (NotFound, Requested) => true,
        (Requested | Booked | DriverAccepted | Arrived | Started, NotFound) => true,
        _ => false,
    }
}

/// Applies the status and its side fields to `order`.
pub fn stamp(order: &mut Order, to: OrderStatus, at: DateTime<Utc>) {
    order.status = to;

    match to {
        OrderStatus::DriverAccepted => order.accepted_at = Some(at),
        OrderStatus::Arrived => order.arrived_at = Some(at),
        OrderStatus::Started => order.started_at = Some(at),
        OrderStatus::Finished => order.finished_at = Some(at),
        OrderStatus::RiderCanceled | OrderStatus::DriverCanceled => order.canceled_at = Some(at),
        OrderStatus::NotFound | OrderStatus::Requested => {
            order.driver_id = None;
            order.accepted_at = None;
        }
        OrderStatus::Booked => {}
    }
}

#[cfg(test)]
mod tests {
    use super::is_allowed;
    use crate::models::order::OrderStatus::{self, *};

    const ALL: [OrderStatus; 9] = [
        Requested,
        Booked,
        DriverAccepted,
        Arrived,
        Started,
        Finished,
        RiderCanceled,
        DriverCanceled,
        NotFound,
    ];

    #[test]
    fn terminal_states_have_no_exits() {
        for from in [Finished, RiderCanceled, DriverCanceled] {
            for to in ALL {
                assert!(!is_allowed(from, to), "{from:?} -> {to:?}");
            }
        }
    }

    #[test]
    fn trip_steps_cannot_be_skipped() {
        assert!(!is_allowed(Requested, Arrived));
        assert!(!is_allowed(DriverAccepted, Started));
        assert!(!is_allowed(Arrived, Finished));
        assert!(!is_allowed(Booked, Requested));
        assert!(is_allowed(Arrived, Started));
        assert!(is_allowed(Started, Finished));
    }

    #[test]
    fn cancellation_and_not_found_reach_every_live_state() {
        for from in [Requested, Booked, DriverAccepted, Arrived, Started] {
            assert!(is_allowed(from, RiderCanceled));
            assert!(is_allowed(from, DriverCanceled));
            assert!(is_allowed(from, NotFound));
        }
        assert!(!is_allowed(NotFound, NotFound));
        assert!(is_allowed(NotFound, Requested));
    }
}
