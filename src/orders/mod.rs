//! Order status state machine.
//!
//! Validates every status change against the persisted status, stamps the
//! matching timestamp, and writes the order together with one audit row.
//! Broadcasting the result is left to the caller.

pub mod transitions;

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use crate::error::TransitionError;
use crate::models::driver::DriverId;
use crate::models::order::{Order, OrderActivity, OrderId, OrderStatus};
use crate::storage::{OrderStore, StorageError};

/// A requested status change and the data that travels with it.
#[derive(Debug, Clone)]
pub struct Transition {
    pub target: OrderStatus,
    pub note: Option<String>,
    pub driver_id: Option<DriverId>,
    pub cancel_reason_id: Option<u64>,
}

impl Transition {
    pub fn to(target: OrderStatus) -> Self {
        Self {
            target,
            note: None,
            driver_id: None,
            cancel_reason_id: None,
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    pub fn with_driver(mut self, driver_id: DriverId) -> Self {
        self.driver_id = Some(driver_id);
        self
    }

    pub fn with_cancel_reason(mut self, reason_id: Option<u64>) -> Self {
        self.cancel_reason_id = reason_id;
        self
    }
}

pub struct OrderStateMachine {
    store: Arc<dyn OrderStore>,
}

impl OrderStateMachine {
    pub fn new(store: Arc<dyn OrderStore>) -> Self {
        Self { store }
    }

    pub async fn transition(
        &self,
        order_id: OrderId,
        target: OrderStatus,
        note: Option<String>,
    ) -> Result<Order, TransitionError> {
        let mut change = Transition::to(target);
        change.note = note;
        self.apply(order_id, change).await
    }

    /// Moves the order to `DriverAccepted` with `driver_id` bound.
    pub async fn assign_driver(
        &self,
        order_id: OrderId,
        driver_id: DriverId,
    ) -> Result<Order, TransitionError> {
        self.apply(
            order_id,
            Transition::to(OrderStatus::DriverAccepted)
                .with_driver(driver_id)
                .with_note(format!("driver {driver_id} accepted")),
        )
        .await
    }

    pub async fn apply(&self, order_id: OrderId, change: Transition) -> Result<Order, TransitionError> {
        let current = self.store.get_order(order_id).await.map_err(|err| match err {
            StorageError::OrderNotFound(id) => TransitionError::OrderNotFound(id),
            other => TransitionError::Storage(other),
        })?;

        let from = current.status;
        let to = change.target;

        if !transitions::is_allowed(from, to) {
            warn!(order_id, from = ?from, to = ?to, "rejected order transition");
            return Err(TransitionError::InvalidTransition { order_id, from, to });
        }

        let mut updated = current;
        let now = Utc::now();

        if to == OrderStatus::DriverAccepted {
            let driver_id = change
                .driver_id
                .ok_or(TransitionError::MissingDriver { order_id, to })?;
            updated.driver_id = Some(driver_id);
        }
        if matches!(to, OrderStatus::RiderCanceled | OrderStatus::DriverCanceled) {
            updated.cancel_reason_id = change.cancel_reason_id;
        }
        transitions::stamp(&mut updated, to, now);

        let activity = OrderActivity {
            order_id,
            status: to,
            note: change.note,
            created_at: now,
        };

        self.store
            .commit_transition(from, updated.clone(), activity)
            .await
            .map_err(|err| match err {
                StorageError::Conflict { .. } => TransitionError::Conflict(order_id),
                StorageError::OrderNotFound(id) => TransitionError::OrderNotFound(id),
                other => TransitionError::Storage(other),
            })?;

        info!(
            order_id,
            from = ?from,
            to = ?to,
            driver_id = ?updated.driver_id,
            "order transitioned"
        );

        Ok(updated)
    }
}
