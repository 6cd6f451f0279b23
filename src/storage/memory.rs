use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::models::driver::DriverId;
use crate::models::order::{CustomerId, CustomerSummary, Order, OrderActivity, OrderId, OrderStatus};
use crate::storage::{OrderStore, StorageError};

/// Process-local store used by the standalone binary and tests.
#[derive(Default)]
pub struct InMemoryOrderStore {
    orders: DashMap<OrderId, Order>,
    activities: DashMap<OrderId, Vec<OrderActivity>>,
    customers: DashMap<CustomerId, CustomerSummary>,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert_customer(&self, customer: CustomerSummary) {
        self.customers.insert(customer.id, customer);
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn get_order(&self, order_id: OrderId) -> Result<Order, StorageError> {
        self.orders
            .get(&order_id)
            .map(|entry| entry.value().clone())
            .ok_or(StorageError::OrderNotFound(order_id))
    }

    async fn insert_order(&self, order: Order) -> Result<(), StorageError> {
        match self.orders.entry(order.id) {
            Entry::Occupied(_) => Err(StorageError::AlreadyExists(order.id)),
            Entry::Vacant(slot) => {
                slot.insert(order);
                Ok(())
            }
        }
    }

    async fn commit_transition(
        &self,
        expected: OrderStatus,
        order: Order,
        activity: OrderActivity,
    ) -> Result<(), StorageError> {
        let mut stored = self
            .orders
            .get_mut(&order.id)
            .ok_or(StorageError::OrderNotFound(order.id))?;

        if stored.status != expected {
            return Err(StorageError::Conflict {
                order_id: order.id,
                expected,
                actual: stored.status,
            });
        }

        // Audit row is written while the order entry is still locked.
        self.activities.entry(order.id).or_default().push(activity);
        *stored = order;
        Ok(())
    }

    async fn activities(&self, order_id: OrderId) -> Result<Vec<OrderActivity>, StorageError> {
        if !self.orders.contains_key(&order_id) {
            return Err(StorageError::OrderNotFound(order_id));
        }

        Ok(self
            .activities
            .get(&order_id)
            .map(|entry| entry.value().clone())
            .unwrap_or_default())
    }

    async fn customer(
        &self,
        customer_id: CustomerId,
    ) -> Result<Option<CustomerSummary>, StorageError> {
        Ok(self.customers.get(&customer_id).map(|entry| entry.value().clone()))
    }

    async fn active_order_for_driver(
        &self,
        driver_id: DriverId,
    ) -> Result<Option<Order>, StorageError> {
        Ok(self
            .orders
            .iter()
            .find(|entry| entry.driver_id == Some(driver_id) && entry.status.is_active_trip())
            .map(|entry| entry.value().clone()))
    }
}
