mod error;
mod memory;

pub use error::StorageError;
pub use memory::InMemoryOrderStore;

use async_trait::async_trait;

use crate::models::driver::DriverId;
use crate::models::order::{CustomerId, CustomerSummary, Order, OrderActivity, OrderId, OrderStatus};

/// Data-access seam for orders and their audit trail.
///
/// Calls are fallible and bounded; implementations own any retry policy.
///
/// ## Conditional writes
///
/// `commit_transition` must only apply when the stored status still equals
/// `expected`, and must write the order and its activity row together. A
/// mismatch returns `StorageError::Conflict` and leaves both untouched. This is
/// what keeps two writers (the dispatch engine and a manual assignment, or two
/// service instances) from both binding a driver.
#[async_trait]
pub trait OrderStore: Send + Sync + 'static {
    async fn get_order(&self, order_id: OrderId) -> Result<Order, StorageError>;

    async fn insert_order(&self, order: Order) -> Result<(), StorageError>;

    async fn commit_transition(
        &self,
        expected: OrderStatus,
        order: Order,
        activity: OrderActivity,
    ) -> Result<(), StorageError>;

    async fn activities(&self, order_id: OrderId) -> Result<Vec<OrderActivity>, StorageError>;

    async fn customer(&self, customer_id: CustomerId)
    -> Result<Option<CustomerSummary>, StorageError>;

    /// The driver's order that is accepted, arrived or started, if any.
    async fn active_order_for_driver(
        &self,
        driver_id: DriverId,
    ) -> Result<Option<Order>, StorageError>;
}
