use crate::models::order::{OrderId, OrderStatus};

#[derive(Debug, Clone, thiserror::Error)]
pub enum StorageError {
    #[error("order {0} not found")]
    OrderNotFound(OrderId),

    /// Conditional write lost: the stored status is no longer the expected one.
    #[error("order {order_id} changed concurrently: expected {expected:?}, found {actual:?}")]
    Conflict {
        order_id: OrderId,
        expected: OrderStatus,
        actual: OrderStatus,
    },

    #[error("order {0} already exists")]
    AlreadyExists(OrderId),

    /// Backend failure (connection, serialization, timeout).
    #[error("storage backend error: {0}")]
    Backend(String),
}
