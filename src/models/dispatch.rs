use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::Instant;

use crate::models::driver::DriverId;
use crate::models::order::{Order, OrderId};

/// Mutable matching state for one order. Owned by exactly one dispatch task.
#[derive(Debug, Clone, Serialize)]
pub struct DispatchAttempt {
    pub order_id: OrderId,
    pub candidates: Vec<DriverId>,
    pub index: usize,
    pub manual: bool,
    #[serde(skip)]
    pub deadline: Option<Instant>,
    pub offer_expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl DispatchAttempt {
    pub fn new(order_id: OrderId, candidates: Vec<DriverId>, manual: bool) -> Self {
        Self {
            order_id,
            candidates,
            index: 0,
            manual,
            deadline: None,
            offer_expires_at: None,
            created_at: Utc::now(),
        }
    }

    pub fn current_candidate(&self) -> Option<DriverId> {
        self.candidates.get(self.index).copied()
    }

    /// True while `driver_id` holds the outstanding offer.
    pub fn is_offered_to(&self, driver_id: DriverId) -> bool {
        self.deadline.is_some() && self.current_candidate() == Some(driver_id)
    }

    pub fn arm(&mut self, deadline: Instant, expires_at: Option<DateTime<Utc>>) {
        self.deadline = Some(deadline);
        self.offer_expires_at = expires_at;
    }

    pub fn disarm(&mut self) {
        self.deadline = None;
        self.offer_expires_at = None;
    }

    pub fn advance(&mut self) {
        self.disarm();
        self.index = self.index.saturating_add(1);
    }

    /// Candidates that may have seen an offer, indices `0..=current`.
    pub fn reached(&self) -> &[DriverId] {
        let end = self.index.saturating_add(1).min(self.candidates.len());
        &self.candidates[..end]
    }
}

/// Immediate answer to a dispatch request.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DispatchOutcome {
    Accepted { candidates: usize },
    NoDriversAvailable,
}

/// How a dispatch attempt ended.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Resolution {
    Assigned { driver_id: DriverId },
    Exhausted,
    Cancelled,
    /// The order changed underneath the attempt, e.g. a manual assignment.
    Superseded,
}

impl Resolution {
    pub fn label(&self) -> &'static str {
        match self {
            Resolution::Assigned { .. } => "assigned",
            Resolution::Exhausted => "exhausted",
            Resolution::Cancelled => "cancelled",
            Resolution::Superseded => "superseded",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DispatchResolution {
    pub order_id: OrderId,
    pub resolution: Resolution,
    pub offers: usize,
    pub resolved_at: DateTime<Utc>,
}

/// Result of a driver accepting an offer.
#[derive(Debug, Clone)]
pub enum AcceptOutcome {
    Assigned(Order),
    /// No outstanding offer for this driver; nothing changed.
    Ignored,
}

#[cfg(test)]
mod tests {
    use tokio::time::{Duration, Instant};

    use super::DispatchAttempt;

    #[test]
    fn advancing_walks_the_list_and_clears_the_deadline() {
        let mut attempt = DispatchAttempt::new(1, vec![10, 20], false);
        attempt.arm(Instant::now() + Duration::from_secs(15), None);
        assert!(attempt.is_offered_to(10));

        attempt.advance();
        assert_eq!(attempt.current_candidate(), Some(20));
        assert!(attempt.deadline.is_none());
        assert!(!attempt.is_offered_to(20));

        attempt.advance();
        assert_eq!(attempt.current_candidate(), None);
    }

    #[test]
    fn reached_covers_current_index_inclusive() {
        let mut attempt = DispatchAttempt::new(1, vec![10, 20, 30], false);
        assert_eq!(attempt.reached(), &[10]);
        attempt.advance();
        assert_eq!(attempt.reached(), &[10, 20]);
        attempt.advance();
        attempt.advance();
        assert_eq!(attempt.reached(), &[10, 20, 30]);
    }
}
