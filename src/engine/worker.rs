use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::time::{Instant, sleep_until};
use tracing::{info, warn};

use crate::engine::dispatch::{AttemptCommand, DispatchEngine};
use crate::error::TransitionError;
use crate::models::dispatch::{AcceptOutcome, DispatchAttempt, Resolution};
use crate::models::events::ServerEvent;
use crate::models::order::Order;
use crate::notify;
use crate::router::rooms::RoomKey;

/// Drives one order's attempt until it resolves. Owns the attempt and its
/// deadline; all signals for the order arrive through `commands`.
pub(crate) async fn run(
    engine: Arc<DispatchEngine>,
    order: Order,
    mut attempt: DispatchAttempt,
    mut commands: mpsc::UnboundedReceiver<AttemptCommand>,
) {
    let started = Instant::now();
    let customer = engine.customer_for(&order).await;
    let mut offers = 0usize;

    let resolution = loop {
        let Some(deadline) = attempt.deadline else {
            let Some(driver_id) = attempt.current_candidate() else {
                if attempt.manual && engine.fall_back(&order, &mut attempt) {
                    continue;
                }
                if let Err(err) = engine.settle_unmatched(order.id).await {
                    warn!(order_id = order.id, error = %err, "exhausted order left unsettled");
                }
                break Resolution::Exhausted;
            };

            if engine.offer(&order, &customer, &mut attempt, driver_id) {
                offers += 1;
            } else {
                attempt.advance();
            }
            engine.record_snapshot(&attempt);
            continue;
        };

        tokio::select! {
            biased;

            command = commands.recv() => {
                let Some(command) = command else {
                    break Resolution::Cancelled;
                };
                if let Some(resolution) = handle(&engine, &order, &mut attempt, command).await {
                    break resolution;
                }
            }

            () = sleep_until(deadline) => {
                if let Some(driver_id) = attempt.current_candidate() {
                    info!(order_id = order.id, driver_id, "offer expired");
                    engine
                        .router
                        .emit_to_room(RoomKey::Driver(driver_id), ServerEvent::void(order.id, "expired"));
                }
                engine
                    .metrics
                    .offer_responses_total
                    .with_label_values(&["expired"])
                    .inc();
                attempt.advance();
                engine.record_snapshot(&attempt);
            }
        }
    };

    engine.retire(order.id);
    engine.finish(order.id, resolution, offers, started.elapsed());
}

async fn handle(
    engine: &DispatchEngine,
    order: &Order,
    attempt: &mut DispatchAttempt,
    command: AttemptCommand,
) -> Option<Resolution> {
    match command {
        AttemptCommand::Accept { driver_id, reply } => {
            if !attempt.is_offered_to(driver_id) {
                info!(order_id = order.id, driver_id, "stale accept ignored");
                let _ = reply.send(Ok(AcceptOutcome::Ignored));
                return None;
            }

            match engine.orders.assign_driver(order.id, driver_id).await {
                Ok(updated) => {
                    attempt.disarm();
                    engine.retire(order.id);
                    engine
                        .metrics
                        .offer_responses_total
                        .with_label_values(&["accepted"])
                        .inc();
                    engine
                        .router
                        .join_members_of(RoomKey::Driver(driver_id), RoomKey::Order(order.id));
                    notify::publish_status(&engine.router, &updated);
                    let _ = reply.send(Ok(AcceptOutcome::Assigned(updated)));
                    Some(Resolution::Assigned { driver_id })
                }
                Err(err @ TransitionError::Storage(_)) => {
                    warn!(
                        order_id = order.id,
                        driver_id,
                        error = %err,
                        "accept not persisted; offer stays open"
                    );
                    let _ = reply.send(Err(err));
                    None
                }
                Err(err) => {
                    warn!(
                        order_id = order.id,
                        driver_id,
                        error = %err,
                        "order changed during dispatch"
                    );
                    attempt.disarm();
                    engine.retire(order.id);
                    engine
                        .router
                        .emit_to_room(RoomKey::Driver(driver_id), ServerEvent::void(order.id, "unavailable"));
                    let _ = reply.send(Ok(AcceptOutcome::Ignored));
                    Some(Resolution::Superseded)
                }
            }
        }

        AttemptCommand::Reject { driver_id, reason } => {
            if attempt.is_offered_to(driver_id) {
                info!(
                    order_id = order.id,
                    driver_id,
                    reason = reason.as_deref().unwrap_or("none"),
                    "offer rejected"
                );
                engine
                    .metrics
                    .offer_responses_total
                    .with_label_values(&["rejected"])
                    .inc();
                attempt.advance();
                engine.record_snapshot(attempt);
            }
            None
        }

        AttemptCommand::DriverGone { driver_id } => {
            if attempt.is_offered_to(driver_id) {
                info!(order_id = order.id, driver_id, "candidate disconnected mid-offer");
                engine
                    .metrics
                    .offer_responses_total
                    .with_label_values(&["driver_gone"])
                    .inc();
                attempt.advance();
                engine.record_snapshot(attempt);
            }
            None
        }

        AttemptCommand::Cancel { reply } => {
            for &driver_id in attempt.reached() {
                engine
                    .router
                    .emit_to_room(RoomKey::Driver(driver_id), ServerEvent::void(order.id, "cancelled"));
            }
            info!(order_id = order.id, notified = attempt.reached().len(), "dispatch cancelled");
            attempt.disarm();
            engine.retire(order.id);
            let _ = reply.send(());
            Some(Resolution::Cancelled)
        }
    }
}
