use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::DispatchSettings;
use crate::engine::worker;
use crate::error::{AppError, TransitionError};
use crate::geo::haversine_km;
use crate::models::dispatch::{
    AcceptOutcome, DispatchAttempt, DispatchOutcome, DispatchResolution, Resolution,
};
use crate::models::driver::DriverId;
use crate::models::events::{OfferPayload, ServerEvent};
use crate::models::order::{CustomerSummary, Order, OrderId, OrderStatus};
use crate::notify;
use crate::observability::metrics::Metrics;
use crate::orders::OrderStateMachine;
use crate::presence::PresenceRegistry;
use crate::router::ConnectionRouter;
use crate::router::rooms::RoomKey;
use crate::storage::{OrderStore, StorageError};

/// Messages delivered to the task that owns an order's attempt.
pub(crate) enum AttemptCommand {
    Accept {
        driver_id: DriverId,
        reply: oneshot::Sender<Result<AcceptOutcome, TransitionError>>,
    },
    Reject {
        driver_id: DriverId,
        reason: Option<String>,
    },
    DriverGone {
        driver_id: DriverId,
    },
    Cancel {
        reply: oneshot::Sender<()>,
    },
}

struct AttemptEntry {
    inbox: mpsc::UnboundedSender<AttemptCommand>,
    attempt: DispatchAttempt,
}

/// Sequential offer-with-timeout matching.
///
/// Every active attempt is owned by one spawned task; accept, reject, cancel
/// and driver-gone signals reach it through its inbox and are handled one at
/// a time, racing only against that task's own deadline.
pub struct DispatchEngine {
    pub(crate) presence: Arc<PresenceRegistry>,
    pub(crate) router: Arc<ConnectionRouter>,
    pub(crate) orders: Arc<OrderStateMachine>,
    pub(crate) store: Arc<dyn OrderStore>,
    pub(crate) settings: DispatchSettings,
    pub(crate) metrics: Metrics,
    attempts: DashMap<OrderId, AttemptEntry>,
    resolutions_tx: broadcast::Sender<DispatchResolution>,
}

impl DispatchEngine {
    pub fn new(
        presence: Arc<PresenceRegistry>,
        router: Arc<ConnectionRouter>,
        orders: Arc<OrderStateMachine>,
        store: Arc<dyn OrderStore>,
        settings: DispatchSettings,
        metrics: Metrics,
    ) -> Self {
        let (resolutions_tx, _unused_rx) =
            broadcast::channel(settings.resolution_buffer_size.max(1));

        Self {
            presence,
            router,
            orders,
            store,
            settings,
            metrics,
            attempts: DashMap::new(),
            resolutions_tx,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DispatchResolution> {
        self.resolutions_tx.subscribe()
    }

    pub fn attempt(&self, order_id: OrderId) -> Option<DispatchAttempt> {
        self.attempts.get(&order_id).map(|entry| entry.attempt.clone())
    }

    pub fn active_count(&self) -> usize {
        self.attempts.len()
    }

    /// Starts matching `order_id`. With `driver_id` the order is offered to
    /// that driver alone, falling back to a nearby search when the driver is
    /// unreachable or declines.
    pub async fn dispatch(
        self: &Arc<Self>,
        order_id: OrderId,
        driver_id: Option<DriverId>,
    ) -> Result<DispatchOutcome, AppError> {
        if self.attempts.contains_key(&order_id) {
            return Err(already_dispatching(order_id));
        }

        let mut order = self.store.get_order(order_id).await?;
        match order.status {
            OrderStatus::Requested | OrderStatus::Booked => {}
            OrderStatus::NotFound => {
                order = self
                    .orders
                    .transition(
                        order_id,
                        OrderStatus::Requested,
                        Some("dispatch re-triggered".to_string()),
                    )
                    .await?;
            }
            other => {
                return Err(AppError::Conflict(format!(
                    "order {order_id} cannot be dispatched while {other:?}"
                )));
            }
        }

        let (candidates, manual) = self.resolve_candidates(&order, driver_id, None);
        if candidates.is_empty() {
            if self.attempts.contains_key(&order_id) {
                return Err(already_dispatching(order_id));
            }
            info!(order_id, "no drivers within reach");
            self.settle_unmatched(order_id).await.map_err(|err| {
                AppError::Internal(format!("could not mark order {order_id} as not found: {err}"))
            })?;
            self.metrics
                .dispatch_resolutions_total
                .with_label_values(&["no_drivers"])
                .inc();
            return Ok(DispatchOutcome::NoDriversAvailable);
        }

        let count = candidates.len();
        let attempt = DispatchAttempt::new(order_id, candidates, manual);
        let (inbox, commands) = mpsc::unbounded_channel();

        match self.attempts.entry(order_id) {
            Entry::Occupied(_) => return Err(already_dispatching(order_id)),
            Entry::Vacant(slot) => {
                slot.insert(AttemptEntry {
                    inbox,
                    attempt: attempt.clone(),
                });
            }
        }
        self.metrics.active_dispatches.inc();

        info!(order_id, candidates = count, manual, "dispatch started");
        tokio::spawn(worker::run(Arc::clone(self), order, attempt, commands));

        Ok(DispatchOutcome::Accepted { candidates: count })
    }

    /// Voids an in-flight attempt. Returns `false` when none was active.
    pub async fn cancel_dispatch(&self, order_id: OrderId) -> bool {
        let (reply, done) = oneshot::channel();
        if !self.send(order_id, AttemptCommand::Cancel { reply }) {
            return false;
        }
        done.await.is_ok()
    }

    /// A driver accepting an offer. Anything but the outstanding offer's
    /// driver, including a repeated accept, is ignored.
    pub async fn accept(
        &self,
        order_id: OrderId,
        driver_id: DriverId,
    ) -> Result<AcceptOutcome, TransitionError> {
        let (reply, response) = oneshot::channel();
        if !self.send(order_id, AttemptCommand::Accept { driver_id, reply }) {
            debug!(order_id, driver_id, "accept without an active dispatch ignored");
            return Ok(AcceptOutcome::Ignored);
        }

        response.await.unwrap_or(Ok(AcceptOutcome::Ignored))
    }

    pub fn reject(&self, order_id: OrderId, driver_id: DriverId, reason: Option<String>) -> bool {
        self.send(order_id, AttemptCommand::Reject { driver_id, reason })
    }

    /// Tells every attempt that `driver_id` is no longer reachable.
    pub fn driver_gone(&self, driver_id: DriverId) {
        let inboxes: Vec<_> = self
            .attempts
            .iter()
            .map(|entry| entry.inbox.clone())
            .collect();

        for inbox in inboxes {
            let _ = inbox.send(AttemptCommand::DriverGone { driver_id });
        }
    }

    fn send(&self, order_id: OrderId, command: AttemptCommand) -> bool {
        let Some(inbox) = self.attempts.get(&order_id).map(|entry| entry.inbox.clone()) else {
            return false;
        };
        inbox.send(command).is_ok()
    }

    pub(crate) fn resolve_candidates(
        &self,
        order: &Order,
        pinned: Option<DriverId>,
        excluded: Option<DriverId>,
    ) -> (Vec<DriverId>, bool) {
        if let Some(driver_id) = pinned {
            if self.presence.is_online(driver_id)
                && self.router.is_reachable(RoomKey::Driver(driver_id))
            {
                return (vec![driver_id], true);
            }
            info!(
                order_id = order.id,
                driver_id, "requested driver unreachable; searching nearby"
            );
        }

        let candidates = self
            .presence
            .find_candidates(order.pickup, self.settings.radius_km, Some(order.service_id))
            .into_iter()
            .filter(|candidate| Some(candidate.driver_id) != excluded)
            .filter(|candidate| self.router.is_reachable(RoomKey::Driver(candidate.driver_id)))
            .map(|candidate| candidate.driver_id)
            .collect();

        (candidates, false)
    }

    /// Replaces a declined manual attempt with a nearby search that skips the
    /// pinned driver. Returns `false` when nobody else is in reach.
    pub(crate) fn fall_back(&self, order: &Order, attempt: &mut DispatchAttempt) -> bool {
        let pinned = attempt.candidates.first().copied();
        let (candidates, _) = self.resolve_candidates(order, None, pinned);
        if candidates.is_empty() {
            return false;
        }

        info!(
            order_id = order.id,
            candidates = candidates.len(),
            "pinned driver declined; widening search"
        );
        *attempt = DispatchAttempt::new(order.id, candidates, false);
        self.record_snapshot(attempt);
        true
    }

    /// Pushes the offer to the driver's room and arms the deadline. Returns
    /// `false` when the driver cannot be reached.
    pub(crate) fn offer(
        &self,
        order: &Order,
        customer: &CustomerSummary,
        attempt: &mut DispatchAttempt,
        driver_id: DriverId,
    ) -> bool {
        let Some(presence) = self.presence.get(driver_id) else {
            debug!(order_id = order.id, driver_id, "candidate went offline before the offer");
            self.metrics.offers_total.with_label_values(&["unreachable"]).inc();
            return false;
        };

        let timeout = self.settings.offer_timeout;
        let payload = OfferPayload {
            order_id: order.id,
            pickup: order.pickup,
            dropoff: order.dropoff,
            distance_to_pickup: presence
                .location
                .map(|location| haversine_km(&location, &order.pickup)),
            estimated_fare: order.estimated_fare,
            service_name: order.service_name.clone(),
            customer: customer.clone(),
            expires_in_secs: timeout.as_secs(),
        };

        let delivered = self
            .router
            .emit_to_room(RoomKey::Driver(driver_id), ServerEvent::OrderNew(payload));
        if delivered == 0 {
            debug!(order_id = order.id, driver_id, "offer could not be delivered");
            self.metrics.offers_total.with_label_values(&["unreachable"]).inc();
            return false;
        }

        let expires_at = chrono::Duration::from_std(timeout)
            .ok()
            .map(|ttl| Utc::now() + ttl);
        attempt.arm(Instant::now() + timeout, expires_at);

        self.metrics.offers_total.with_label_values(&["delivered"]).inc();
        info!(
            order_id = order.id,
            driver_id,
            position = attempt.index,
            "offer sent"
        );
        true
    }

    pub(crate) async fn customer_for(&self, order: &Order) -> CustomerSummary {
        match self.store.customer(order.customer_id).await {
            Ok(Some(customer)) => customer,
            Ok(None) => CustomerSummary::anonymous(order.customer_id),
            Err(err) => {
                warn!(order_id = order.id, error = %err, "customer lookup failed");
                CustomerSummary::anonymous(order.customer_id)
            }
        }
    }

    /// Marks the order `NotFound`, but only if it is still waiting for a
    /// driver. Another writer may have assigned it in the meantime, which
    /// yields `Ok(None)`.
    pub(crate) async fn settle_unmatched(
        &self,
        order_id: OrderId,
    ) -> Result<Option<Order>, TransitionError> {
        let current = self.store.get_order(order_id).await.map_err(|err| match err {
            StorageError::OrderNotFound(id) => TransitionError::OrderNotFound(id),
            other => TransitionError::Storage(other),
        })?;

        if !current.status.awaits_driver() || current.driver_id.is_some() {
            info!(
                order_id,
                status = ?current.status,
                "order settled elsewhere; leaving status untouched"
            );
            return Ok(None);
        }

        let updated = match self
            .orders
            .transition(
                order_id,
                OrderStatus::NotFound,
                Some("no driver accepted the order".to_string()),
            )
            .await
        {
            Ok(updated) => updated,
            Err(TransitionError::Conflict(_) | TransitionError::InvalidTransition { .. }) => {
                info!(order_id, "order changed before it could be marked not found");
                return Ok(None);
            }
            Err(err) => {
                warn!(order_id, error = %err, "could not mark order as not found");
                return Err(err);
            }
        };

        notify::publish_status(&self.router, &updated);
        Ok(Some(updated))
    }

    pub(crate) fn record_snapshot(&self, attempt: &DispatchAttempt) {
        if let Some(mut entry) = self.attempts.get_mut(&attempt.order_id) {
            entry.attempt = attempt.clone();
        }
    }

    /// Drops the attempt from the table; later signals for the order no-op.
    pub(crate) fn retire(&self, order_id: OrderId) {
        if self.attempts.remove(&order_id).is_some() {
            self.metrics.active_dispatches.dec();
        }
    }

    pub(crate) fn finish(
        &self,
        order_id: OrderId,
        resolution: Resolution,
        offers: usize,
        elapsed: Duration,
    ) {
        let outcome = resolution.label();
        self.metrics
            .dispatch_resolutions_total
            .with_label_values(&[outcome])
            .inc();
        self.metrics
            .dispatch_latency_seconds
            .with_label_values(&[outcome])
            .observe(elapsed.as_secs_f64());

        info!(
            order_id,
            outcome,
            offers,
            elapsed_ms = elapsed.as_millis() as u64,
            "dispatch resolved"
        );

        let _ = self.resolutions_tx.send(DispatchResolution {
            order_id,
            resolution,
            offers,
            resolved_at: Utc::now(),
        });
    }
}

fn already_dispatching(order_id: OrderId) -> AppError {
    AppError::Conflict(format!("order {order_id} is already being dispatched"))
}
