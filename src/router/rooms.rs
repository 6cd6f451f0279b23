use std::fmt;

use serde::Serialize;

use crate::models::driver::DriverId;
use crate::models::order::{CustomerId, OrderId};

/// Addressable group of connections. Rendered as `kind:id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(into = "String")]
pub enum RoomKey {
    Order(OrderId),
    Driver(DriverId),
    Rider(CustomerId),
    Dashboard,
}

impl fmt::Display for RoomKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoomKey::Order(id) => write!(f, "order:{id}"),
            RoomKey::Driver(id) => write!(f, "driver:{id}"),
            RoomKey::Rider(id) => write!(f, "rider:{id}"),
            RoomKey::Dashboard => f.write_str("dashboard:live"),
        }
    }
}

impl From<RoomKey> for String {
    fn from(room: RoomKey) -> Self {
        room.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::RoomKey;

    #[test]
    fn keys_are_composed_from_kind_and_id() {
        assert_eq!(RoomKey::Order(42).to_string(), "order:42");
        assert_eq!(RoomKey::Driver(7).to_string(), "driver:7");
        assert_eq!(RoomKey::Rider(3).to_string(), "rider:3");
        assert_eq!(RoomKey::Dashboard.to_string(), "dashboard:live");
    }
}
