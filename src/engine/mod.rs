pub mod analytics;
pub mod assignment;
pub mod lifecycle;
pub mod locator;
pub mod queue;
pub mod reassignment;
pub mod scoring;
pub mod sweeper;

use tracing::{debug, error};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::delivery::Delivery;
use crate::models::rider::RiderOutcome;
use crate::state::AppState;

const MAX_WRITE_ATTEMPTS: usize = 3;

/// Read-modify-write on one delivery, arbitrated by the store's
/// compare-and-swap. `apply` runs against fresh state on every attempt and
/// returns `false` when there is nothing to write. Returns the record as read
/// and as stored.
pub(crate) async fn mutate_delivery<F>(
    state: &AppState,
    id: Uuid,
    mut apply: F,
) -> Result<(Delivery, Delivery), AppError>
where
    F: FnMut(&mut Delivery) -> Result<bool, AppError>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        let current = state.deliveries.get(id).await?;
        let mut next = current.clone();
        if !apply(&mut next)? {
            return Ok((current.clone(), current));
        }

        match state.deliveries.compare_and_swap(next, current.version).await {
            Ok(saved) => return Ok((current, saved)),
            Err(err) if err.is_conflict() && attempt < MAX_WRITE_ATTEMPTS => {
                debug!(delivery_id = %id, attempt, "lost delivery write race; retrying");
            }
            Err(err) => return Err(err),
        }
    }
}

pub(crate) async fn release_rider(
    state: &AppState,
    rider_id: Uuid,
    delivery_id: Uuid,
    transition: &str,
    outcome: Option<RiderOutcome>,
) {
    match state.riders.set_on_delivery(rider_id, false).await {
        Ok(rider) => {
            state
                .metrics
                .rider_active_deliveries
                .with_label_values(&[&rider_id.to_string()])
                .set(i64::from(rider.active_deliveries));
        }
        Err(err) => report_reconciliation_gap(state, delivery_id, rider_id, transition, &err),
    }

    if let Some(outcome) = outcome {
        if let Err(err) = state.riders.record_outcome(rider_id, outcome).await {
            error!(
                rider_id = %rider_id,
                delivery_id = %delivery_id,
                error = %err,
                "failed to record rider outcome"
            );
        }
    }
}

pub(crate) fn report_reconciliation_gap(
    state: &AppState,
    delivery_id: Uuid,
    rider_id: Uuid,
    transition: &str,
    cause: &AppError,
) {
    state.metrics.reconciliation_gaps_total.inc();
    error!(
        target: "reconciliation_gap",
        delivery_id = %delivery_id,
        rider_id = %rider_id,
        transition,
        at = %state.clock.now(),
        error = %cause,
        "rider and delivery records disagree"
    );
}
