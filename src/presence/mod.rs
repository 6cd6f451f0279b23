//! In-memory registry of online drivers and their last known position.
//!
//! Nothing here is persisted: after a restart the registry is empty until
//! drivers reconnect and announce themselves again.

use std::collections::HashSet;

use chrono::Utc;
use dashmap::DashMap;
use serde::Serialize;

use crate::geo::{BoundingBox, haversine_km};
use crate::models::driver::{DriverId, DriverPresence, GeoPoint, ServiceId};
use crate::models::identity::ConnectionId;

#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
pub struct Candidate {
    pub driver_id: DriverId,
    pub distance_km: f64,
}

#[derive(Default)]
pub struct PresenceRegistry {
    drivers: DashMap<DriverId, DriverPresence>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Upserts the driver, replacing any previous entry.
    pub fn set_online(
        &self,
        driver_id: DriverId,
        connection_id: ConnectionId,
        capabilities: HashSet<ServiceId>,
        location: Option<GeoPoint>,
    ) -> DriverPresence {
        let presence = DriverPresence {
            driver_id,
            connection_id,
            location,
            capabilities,
            updated_at: Utc::now(),
        };

        self.drivers.insert(driver_id, presence.clone());
        presence
    }

    pub fn set_offline(&self, driver_id: DriverId) -> Option<DriverPresence> {
        self.drivers.remove(&driver_id).map(|(_, presence)| presence)
    }

    /// Removes the driver only if the entry still belongs to `connection_id`.
    pub fn release_connection(&self, driver_id: DriverId, connection_id: ConnectionId) -> bool {
        self.drivers
            .remove_if(&driver_id, |_, presence| presence.connection_id == connection_id)
            .is_some()
    }

    /// Returns `false` when the driver is not registered.
    pub fn update_location(&self, driver_id: DriverId, location: GeoPoint) -> bool {
        match self.drivers.get_mut(&driver_id) {
            Some(mut presence) => {
                presence.location = Some(location);
                presence.updated_at = Utc::now();
                true
            }
            None => false,
        }
    }

    pub fn get(&self, driver_id: DriverId) -> Option<DriverPresence> {
        self.drivers.get(&driver_id).map(|entry| entry.value().clone())
    }

    pub fn is_online(&self, driver_id: DriverId) -> bool {
        self.drivers.contains_key(&driver_id)
    }

    pub fn online_driver_ids(&self) -> Vec<DriverId> {
        let mut ids: Vec<DriverId> = self.drivers.iter().map(|entry| *entry.key()).collect();
        ids.sort_unstable();
        ids
    }

    pub fn snapshot(&self) -> Vec<DriverPresence> {
        let mut drivers: Vec<DriverPresence> =
            self.drivers.iter().map(|entry| entry.value().clone()).collect();
        drivers.sort_by_key(|presence| presence.driver_id);
        drivers
    }

    pub fn len(&self) -> usize {
        self.drivers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.drivers.is_empty()
    }

    /// Drivers within `radius_km` of `origin`, nearest first, ties by id.
    pub fn find_candidates(
        &self,
        origin: GeoPoint,
        radius_km: f64,
        capability: Option<ServiceId>,
    ) -> Vec<Candidate> {
        let window = BoundingBox::around(origin, radius_km);

        let mut candidates: Vec<Candidate> = self
            .drivers
            .iter()
            .filter_map(|entry| {
                let presence = entry.value();
                let location = presence.location?;

                if let Some(service_id) = capability {
                    if !presence.serves(service_id) {
                        return None;
                    }
                }

                if !window.contains(&location) {
                    return None;
                }

                let distance_km = haversine_km(&location, &origin);
                (distance_km <= radius_km).then_some(Candidate {
                    driver_id: presence.driver_id,
                    distance_km,
                })
            })
            .collect();

        candidates.sort_by(|a, b| {
            a.distance_km
                .total_cmp(&b.distance_km)
                .then(a.driver_id.cmp(&b.driver_id))
        });
        candidates
    }
}
