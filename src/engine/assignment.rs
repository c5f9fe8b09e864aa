use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::collaborators::OrderSnapshot;
use crate::config::DispatchPolicy;
use crate::engine::locator::locate_candidates;
use crate::engine::scoring::{compute_score, rank_candidates};
use crate::engine::{mutate_delivery, report_reconciliation_gap};
use crate::error::AppError;
use crate::geo::haversine_km;
use crate::models::actor::Actor;
use crate::models::assignment::{
    AssignmentCriteria, AssignmentFailure, AssignmentOutcome, Candidate, RankedCandidate, Urgency,
};
use crate::models::delivery::{Delivery, DeliveryStatus};
use crate::models::event::DeliveryEvent;
use crate::models::rider::VehicleType;
use crate::state::AppState;

pub async fn run_assignment_engine(state: Arc<AppState>, mut assignment_rx: mpsc::Receiver<Uuid>) {
    info!("assignment engine started");

    while let Some(delivery_id) = assignment_rx.recv().await {
        state.metrics.orders_in_queue.dec();

        match assign_delivery(&state, delivery_id, None).await {
            Ok(outcome) if outcome.success => {}
            Ok(outcome) => {
                warn!(
                    delivery_id = %delivery_id,
                    reason = outcome.reason.as_deref().unwrap_or("unknown"),
                    "automatic assignment failed; left for manual assignment"
                );
            }
            Err(err) => {
                error!(delivery_id = %delivery_id, error = %err, "failed to process delivery");
            }
        }
    }

    warn!("assignment engine stopped: queue channel closed");
}

pub fn classify_urgency(order: &OrderSnapshot, now: DateTime<Utc>, policy: &DispatchPolicy) -> Urgency {
    let age_minutes = (now - order.created_at).num_minutes();

    if age_minutes > 120
        || order.order_value > policy.high_value_threshold
        || order.delivery_fee > policy.premium_fee_threshold
    {
        Urgency::High
    } else if age_minutes > 60 || order.order_value > policy.medium_value_threshold {
        Urgency::Medium
    } else {
        Urgency::Low
    }
}

pub fn estimate_minutes(distance_km: f64, vehicle: VehicleType, policy: &DispatchPolicy) -> u32 {
    let speed = policy.vehicle_speeds.for_vehicle(vehicle);
    let travel = (distance_km * 60.0 / speed).ceil().max(0.0) as u32;
    travel + policy.prep_time_minutes + policy.handover_time_minutes
}

pub async fn build_criteria(
    state: &AppState,
    delivery: &Delivery,
    urgency_override: Option<Urgency>,
) -> Result<AssignmentCriteria, AppError> {
    let order = state.orders.get_order(delivery.order_id).await?;
    let urgency = urgency_override
        .unwrap_or_else(|| classify_urgency(&order, state.clock.now(), &state.policy));

    Ok(AssignmentCriteria {
        delivery_id: delivery.id,
        destination: delivery
            .destination()
            .or(order.destination.filter(|point| point.is_valid())),
        city: delivery.dropoff.city.clone(),
        order_value: order.order_value,
        delivery_fee: delivery.delivery_fee,
        urgency,
        vehicle_requirement: order.vehicle_requirement,
        excluded_riders: delivery.excluded_riders.clone(),
    })
}

pub async fn assign_delivery(
    state: &AppState,
    delivery_id: Uuid,
    urgency_override: Option<Urgency>,
) -> Result<AssignmentOutcome, AppError> {
    let start = Instant::now();
    let delivery = state.deliveries.get(delivery_id).await?;
    if delivery.status != DeliveryStatus::PendingAssignment {
        return Err(AppError::InvalidTransition(format!(
            "delivery {delivery_id} is {} and not pending assignment",
            delivery.status.as_str()
        )));
    }

    let criteria = build_criteria(state, &delivery, urgency_override).await?;
    let result = assign(state, &criteria).await;

    let label = match &result {
        Ok(outcome) if outcome.success => "success",
        Ok(_) => "no_rider",
        Err(_) => "error",
    };
    state
        .metrics
        .assignment_latency_seconds
        .with_label_values(&[label])
        .observe(start.elapsed().as_secs_f64());
    state.metrics.assignments_total.with_label_values(&[label]).inc();

    let outcome = result?;
    if !outcome.success {
        let reason = outcome.reason.clone().unwrap_or_default();
        flag_for_manual_assignment(state, delivery_id, &reason).await;
    }
    Ok(outcome)
}

pub async fn assign(
    state: &AppState,
    criteria: &AssignmentCriteria,
) -> Result<AssignmentOutcome, AppError> {
    let policy = &state.policy;
    let delivery_id = criteria.delivery_id;

    let Some(destination) = criteria.destination else {
        warn!(delivery_id = %delivery_id, "delivery has no destination coordinates");
        return Ok(AssignmentOutcome::failed(
            delivery_id,
            criteria.urgency,
            AssignmentFailure::MissingCoordinates,
        ));
    };

    let candidates = locate_candidates(
        state,
        &destination,
        &criteria.city,
        &criteria.excluded_riders,
    )
    .await?;
    if candidates.is_empty() {
        return Ok(AssignmentOutcome::failed(
            delivery_id,
            criteria.urgency,
            AssignmentFailure::NoAvailableRiders,
        ));
    }

    let ranked = rank_candidates(&candidates, criteria, policy);
    if ranked.is_empty() {
        return Ok(AssignmentOutcome::failed(
            delivery_id,
            criteria.urgency,
            AssignmentFailure::NoQualifiedRiders,
        ));
    }

    for (index, pick) in ranked.iter().enumerate() {
        let note = format!(
            "auto-assigned to {} (score {:.2}, {:.2} km, urgency {:?})",
            pick.rider_name, pick.score, pick.distance_km, criteria.urgency
        );
        if commit_assignment(state, delivery_id, pick.rider_id, note, Actor::System)
            .await?
            .is_none()
        {
            continue;
        }

        let alternates: Vec<RankedCandidate> = ranked
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != index)
            .map(|(_, other)| other.clone())
            .take(policy.alternates)
            .collect();
        let estimated_minutes = estimate_minutes(pick.distance_km, pick.vehicle, policy);

        info!(
            delivery_id = %delivery_id,
            rider_id = %pick.rider_id,
            score = pick.score,
            distance_km = pick.distance_km,
            estimated_minutes,
            "delivery offered to rider"
        );

        return Ok(AssignmentOutcome {
            success: true,
            delivery_id,
            urgency: criteria.urgency,
            rider: Some(pick.clone()),
            alternates,
            estimated_minutes: Some(estimated_minutes),
            reason: None,
        });
    }

    Ok(AssignmentOutcome::failed(
        delivery_id,
        criteria.urgency,
        AssignmentFailure::AllCandidatesTaken,
    ))
}

pub async fn manual_assign(
    state: &AppState,
    delivery_id: Uuid,
    rider_id: Uuid,
    actor: Actor,
) -> Result<AssignmentOutcome, AppError> {
    if !actor.is_privileged() {
        return Err(AppError::Forbidden(
            "only administrators assign riders manually".to_string(),
        ));
    }

    let policy = &state.policy;
    let rider = state.riders.get(rider_id).await?;
    if rider.security_deposit < policy.min_security_deposit {
        return Err(AppError::PreconditionFailed(format!(
            "rider {rider_id} security deposit {} is below the required {}",
            rider.security_deposit, policy.min_security_deposit
        )));
    }
    if !rider.is_assignable() {
        return Err(AppError::PreconditionFailed(format!(
            "rider {rider_id} is not available for assignment"
        )));
    }

    let delivery = state.deliveries.get(delivery_id).await?;
    if delivery.status != DeliveryStatus::PendingAssignment {
        return Err(AppError::InvalidTransition(format!(
            "delivery {delivery_id} is {} and not pending assignment",
            delivery.status.as_str()
        )));
    }
    let criteria = build_criteria(state, &delivery, None).await?;

    let distance_km = match (rider.location, criteria.destination) {
        (Some(from), Some(to)) => haversine_km(&from, &to),
        _ => 0.0,
    };
    let candidate = Candidate {
        rider: rider.clone(),
        distance_km,
    };
    let (score, breakdown) = compute_score(&candidate, &criteria, policy);

    let note = format!("manually assigned to {} by {}", rider.name, actor.label());
    if commit_assignment(state, delivery_id, rider_id, note, actor)
        .await?
        .is_none()
    {
        return Err(AppError::Conflict(format!(
            "rider {rider_id} was taken by another assignment"
        )));
    }

    info!(delivery_id = %delivery_id, rider_id = %rider_id, actor = %actor.label(), "delivery manually assigned");

    Ok(AssignmentOutcome {
        success: true,
        delivery_id,
        urgency: criteria.urgency,
        rider: Some(RankedCandidate {
            rider_id,
            rider_name: rider.name,
            vehicle: rider.vehicle,
            distance_km,
            score,
            breakdown,
        }),
        alternates: Vec::new(),
        estimated_minutes: Some(estimate_minutes(distance_km, rider.vehicle, policy)),
        reason: None,
    })
}

/// Pairs a rider with a delivery. The rider is claimed first with a
/// conditional write; `Ok(None)` means someone else holds them. The delivery
/// then moves to `awaiting_rider_response` by compare-and-swap, and if that
/// fails the rider claim is rolled back.
async fn commit_assignment(
    state: &AppState,
    delivery_id: Uuid,
    rider_id: Uuid,
    note: String,
    actor: Actor,
) -> Result<Option<Delivery>, AppError> {
    let claimed = match state.riders.set_on_delivery(rider_id, true).await {
        Ok(rider) => rider,
        Err(err) if err.is_conflict() => {
            info!(delivery_id = %delivery_id, rider_id = %rider_id, "rider taken concurrently; trying next");
            return Ok(None);
        }
        Err(err) => return Err(err),
    };

    let window = state.policy.acceptance_window();
    let offered = mutate_delivery(state, delivery_id, |delivery| {
        if delivery.status != DeliveryStatus::PendingAssignment {
            return Err(AppError::InvalidTransition(format!(
                "delivery {delivery_id} left pending assignment during the attempt"
            )));
        }
        let now = state.clock.now();
        delivery.offer_to(rider_id, now, now + window, Some(note.clone()), Some(&actor))?;
        Ok(true)
    })
    .await;

    match offered {
        Ok((_, delivery)) => {
            state
                .metrics
                .rider_active_deliveries
                .with_label_values(&[&rider_id.to_string()])
                .set(i64::from(claimed.active_deliveries));
            state.publish(DeliveryEvent::from_delivery(&delivery));
            Ok(Some(delivery))
        }
        Err(err) => {
            if let Err(release_err) = state.riders.set_on_delivery(rider_id, false).await {
                report_reconciliation_gap(
                    state,
                    delivery_id,
                    rider_id,
                    DeliveryStatus::AwaitingRiderResponse.as_str(),
                    &release_err,
                );
                return Err(AppError::ReconciliationGap(format!(
                    "rider {rider_id} left claimed after delivery {delivery_id} write failed: {err}"
                )));
            }
            Err(err)
        }
    }
}

async fn flag_for_manual_assignment(state: &AppState, delivery_id: Uuid, reason: &str) {
    let flagged = mutate_delivery(state, delivery_id, |delivery| {
        if delivery.status != DeliveryStatus::PendingAssignment {
            return Ok(false);
        }
        delivery.flag_for_manual_assignment(state.clock.now(), reason);
        Ok(true)
    })
    .await;

    if let Err(err) = flagged {
        error!(delivery_id = %delivery_id, error = %err, "failed to flag delivery for manual assignment");
    }
}
