use tracing::{error, info};
use uuid::Uuid;

use crate::engine::assignment::assign_delivery;
use crate::engine::{mutate_delivery, release_rider};
use crate::error::AppError;
use crate::models::actor::Actor;
use crate::models::assignment::{AssignmentOutcome, Urgency};
use crate::models::delivery::DeliveryStatus;
use crate::models::event::DeliveryEvent;
use crate::models::rider::{OutcomeKind, RiderOutcome};
use crate::state::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReassignTrigger {
    Declined,
    Expired,
    RiderUnavailable,
    Requested,
}

impl ReassignTrigger {
    pub fn as_str(self) -> &'static str {
        match self {
            ReassignTrigger::Declined => "declined",
            ReassignTrigger::Expired => "expired",
            ReassignTrigger::RiderUnavailable => "rider_unavailable",
            ReassignTrigger::Requested => "requested",
        }
    }

    fn expected_status(self) -> Option<DeliveryStatus> {
        match self {
            ReassignTrigger::Declined => Some(DeliveryStatus::Declined),
            ReassignTrigger::Expired => Some(DeliveryStatus::Expired),
            ReassignTrigger::RiderUnavailable | ReassignTrigger::Requested => None,
        }
    }
}

pub async fn reassign(
    state: &AppState,
    delivery_id: Uuid,
    trigger: ReassignTrigger,
    actor: Actor,
    reason: Option<String>,
) -> Result<AssignmentOutcome, AppError> {
    if !actor.is_privileged() {
        return Err(AppError::Forbidden(
            "only administrators reassign deliveries".to_string(),
        ));
    }

    let note = match reason {
        Some(reason) => format!("reassignment ({}): {reason}", trigger.as_str()),
        None => format!("reassignment ({})", trigger.as_str()),
    };

    let (before, after) = mutate_delivery(state, delivery_id, |delivery| {
        if let Some(expected) = trigger.expected_status() {
            if delivery.status != expected {
                return Err(AppError::InvalidTransition(format!(
                    "delivery {delivery_id} is {}, no longer {}",
                    delivery.status.as_str(),
                    expected.as_str()
                )));
            }
        }
        delivery.reopen(state.clock.now(), Some(note.clone()), Some(&actor))?;
        Ok(true)
    })
    .await?;

    if before.status != after.status {
        if let (true, Some(rider_id)) = (before.status.holds_rider(), before.rider_id) {
            let outcome = RiderOutcome::of(OutcomeKind::Reassigned);
            release_rider(state, rider_id, delivery_id, "reassigned", Some(outcome)).await;
        }
        state.publish(DeliveryEvent::from_delivery(&after));
    }

    state
        .metrics
        .reassignments_total
        .with_label_values(&[trigger.as_str()])
        .inc();
    info!(
        delivery_id = %delivery_id,
        trigger = trigger.as_str(),
        previous_rider = ?before.rider_id,
        "delivery reopened for reassignment"
    );

    assign_delivery(state, delivery_id, Some(Urgency::High)).await
}

pub async fn handle_rider_unavailable(
    state: &AppState,
    rider_id: Uuid,
    actor: Actor,
) -> Result<Vec<AssignmentOutcome>, AppError> {
    state.riders.set_availability(rider_id, None, false).await?;

    let held: Vec<Uuid> = state
        .deliveries
        .list_for_rider(rider_id)
        .await?
        .into_iter()
        .filter(|delivery| {
            matches!(
                delivery.status,
                DeliveryStatus::AwaitingRiderResponse
                    | DeliveryStatus::Accepted
                    | DeliveryStatus::PickedUp
                    | DeliveryStatus::InTransit
            )
        })
        .map(|delivery| delivery.id)
        .collect();

    let mut outcomes = Vec::with_capacity(held.len());
    for delivery_id in held {
        match reassign(
            state,
            delivery_id,
            ReassignTrigger::RiderUnavailable,
            Actor::System,
            Some(format!("rider {rider_id} went unavailable ({})", actor.label())),
        )
        .await
        {
            Ok(outcome) => outcomes.push(outcome),
            Err(err) => {
                error!(delivery_id = %delivery_id, rider_id = %rider_id, error = %err, "reassignment failed");
            }
        }
    }

    Ok(outcomes)
}
