use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::identity::ConnectionId;

pub type DriverId = u64;
pub type ServiceId = u64;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

/// Ephemeral record of a connected driver that has signalled it is online.
#[derive(Debug, Clone, Serialize)]
pub struct DriverPresence {
    pub driver_id: DriverId,
    pub connection_id: ConnectionId,
    pub location: Option<GeoPoint>,
    pub capabilities: HashSet<ServiceId>,
    pub updated_at: DateTime<Utc>,
}

impl DriverPresence {
    pub fn serves(&self, service_id: ServiceId) -> bool {
        self.capabilities.contains(&service_id)
    }
}
