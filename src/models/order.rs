use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::driver::{DriverId, GeoPoint, ServiceId};

pub type OrderId = u64;
pub type CustomerId = u64;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum OrderStatus {
    Requested,
    Booked,
    DriverAccepted,
    Arrived,
    Started,
    Finished,
    RiderCanceled,
    DriverCanceled,
    NotFound,
}

impl OrderStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Finished | OrderStatus::RiderCanceled | OrderStatus::DriverCanceled
        )
    }

    /// Still waiting for a driver and eligible for matching.
    pub fn awaits_driver(&self) -> bool {
        matches!(self, OrderStatus::Requested | OrderStatus::Booked)
    }

    /// A driver is bound and the trip has not ended.
    pub fn is_active_trip(&self) -> bool {
        matches!(
            self,
            OrderStatus::DriverAccepted | OrderStatus::Arrived | OrderStatus::Started
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub customer_id: CustomerId,
    pub driver_id: Option<DriverId>,
    pub service_id: ServiceId,
    pub service_name: String,
    pub status: OrderStatus,
    pub pickup: GeoPoint,
    pub dropoff: GeoPoint,
    pub estimated_fare: f64,
    pub distance_km: f64,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub cancel_reason_id: Option<u64>,
    pub created_at: DateTime<Utc>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub arrived_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub canceled_at: Option<DateTime<Utc>>,
}

/// Append-only audit row, one per accepted status transition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderActivity {
    pub order_id: OrderId,
    pub status: OrderStatus,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Display data about the rider attached to driver offers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CustomerSummary {
    pub id: CustomerId,
    pub name: Option<String>,
    pub rating: Option<f64>,
}

impl CustomerSummary {
    pub fn anonymous(id: CustomerId) -> Self {
        Self {
            id,
            name: None,
            rating: None,
        }
    }
}
