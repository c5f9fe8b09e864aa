use tracing::{error, info, warn};
use uuid::Uuid;

use crate::collaborators::{OrderHistoryEntry, OrderStatus};
use crate::engine::reassignment::{self, ReassignTrigger};
use crate::engine::{mutate_delivery, release_rider};
use crate::error::AppError;
use crate::models::actor::Actor;
use crate::models::delivery::{Delivery, DeliveryStatus, Feedback, NewDelivery, PaymentStatus};
use crate::models::event::DeliveryEvent;
use crate::models::rider::{OutcomeKind, RiderOutcome};
use crate::state::AppState;

const EXPIRED_BEFORE_RESPONSE: &str = "acceptance window elapsed before response";

pub async fn create_delivery(state: &AppState, input: NewDelivery) -> Result<Delivery, AppError> {
    let order = state.orders.get_order(input.order_id).await?;
    if order.status != OrderStatus::Paid {
        return Err(AppError::PreconditionFailed(format!(
            "order {} is {:?}, deliveries need a paid order",
            input.order_id, order.status
        )));
    }
    if order.customer_id != input.customer_id {
        return Err(AppError::BadRequest(format!(
            "order {} does not belong to customer {}",
            input.order_id, input.customer_id
        )));
    }

    let mut input = input;
    if input.dropoff.coordinates.is_none() {
        input.dropoff.coordinates = order.destination;
    }

    let delivery = state
        .deliveries
        .insert(Delivery::new(input, state.clock.now()))
        .await?;

    info!(
        delivery_id = %delivery.id,
        order_id = %delivery.order_id,
        distance_km = delivery.distance_km,
        "delivery created"
    );
    Ok(delivery)
}

pub fn authorize_transition(
    delivery: &Delivery,
    target: DeliveryStatus,
    actor: &Actor,
) -> Result<(), AppError> {
    let allowed = match actor {
        Actor::System | Actor::Admin(_) => true,
        Actor::Rider(rider_id) => {
            delivery.rider_id == Some(*rider_id)
                && matches!(
                    target,
                    DeliveryStatus::PickedUp
                        | DeliveryStatus::InTransit
                        | DeliveryStatus::Delivered
                )
        }
        Actor::Customer(user_id) => {
            delivery.customer_id == *user_id && target == DeliveryStatus::Completed
        }
    };

    if allowed {
        Ok(())
    } else {
        Err(AppError::Forbidden(format!(
            "{} may not move delivery {} to {}",
            actor.label(),
            delivery.id,
            target.as_str()
        )))
    }
}

pub async fn update_status(
    state: &AppState,
    delivery_id: Uuid,
    target: DeliveryStatus,
    actor: Actor,
    note: Option<String>,
) -> Result<Delivery, AppError> {
    if target == DeliveryStatus::AwaitingRiderResponse {
        return Err(AppError::InvalidTransition(
            "offers are made through rider assignment".to_string(),
        ));
    }

    commit_transition(state, delivery_id, target, actor, note, |delivery| {
        authorize_transition(delivery, target, &actor)
    })
    .await
}

/// Rider accepts or declines an offer. Expiry is checked before the answer:
/// a response after the window closes expires the offer and is rejected.
pub async fn respond_to_assignment(
    state: &AppState,
    delivery_id: Uuid,
    rider_id: Uuid,
    accept: bool,
) -> Result<Delivery, AppError> {
    let target = if accept {
        DeliveryStatus::Accepted
    } else {
        DeliveryStatus::Declined
    };
    let actor = Actor::Rider(rider_id);

    let result = commit_transition(state, delivery_id, target, actor, None, |delivery| {
        if delivery.rider_id != Some(rider_id) {
            return Err(AppError::Forbidden(format!(
                "delivery {delivery_id} is not offered to rider {rider_id}"
            )));
        }
        match delivery.status {
            DeliveryStatus::AwaitingRiderResponse => Ok(()),
            DeliveryStatus::Expired => Err(AppError::ExpiredWindow(delivery_id.to_string())),
            other => Err(AppError::InvalidTransition(format!(
                "delivery {delivery_id} is {} and not awaiting a response",
                other.as_str()
            ))),
        }
    })
    .await;

    match &result {
        Ok(delivery) if delivery.status == DeliveryStatus::Declined => {
            if state.policy.reassign_on_decline {
                follow_up_reassignment(state, delivery_id, ReassignTrigger::Declined).await;
            }
        }
        Err(AppError::ExpiredWindow(_)) => {
            if state.policy.reassign_on_expiry {
                follow_up_reassignment(state, delivery_id, ReassignTrigger::Expired).await;
            }
        }
        _ => {}
    }

    result
}

/// Expires an offer whose window has closed at the store clock's "now".
/// Returns `None` when the delivery is no longer an open, lapsed offer, so
/// running it twice is harmless.
pub async fn expire_offer(
    state: &AppState,
    delivery_id: Uuid,
    note: &str,
) -> Result<Option<Delivery>, AppError> {
    let (before, after) = mutate_delivery(state, delivery_id, |delivery| {
        let now = state.clock.now();
        if !delivery.offer_expired_at(now) {
            return Ok(false);
        }
        delivery.apply_transition(
            DeliveryStatus::Expired,
            now,
            Some(note.to_string()),
            Some(&Actor::System),
        )?;
        Ok(true)
    })
    .await?;

    if before.version == after.version {
        return Ok(None);
    }

    after_transition(state, &before, &after).await;
    Ok(Some(after))
}

pub async fn release_payment(
    state: &AppState,
    delivery_id: Uuid,
    actor: Actor,
) -> Result<Delivery, AppError> {
    if !actor.is_privileged() {
        return Err(AppError::Forbidden(
            "only administrators release payments".to_string(),
        ));
    }

    let delivery = state.deliveries.get(delivery_id).await?;
    if delivery.status != DeliveryStatus::Completed {
        return Err(AppError::PreconditionFailed(format!(
            "delivery {delivery_id} is {}, payment needs completed",
            delivery.status.as_str()
        )));
    }
    if delivery.payment_status != PaymentStatus::Pending {
        return Err(AppError::PreconditionFailed(format!(
            "payment for delivery {delivery_id} is not pending"
        )));
    }
    let rider_id = delivery.rider_id.ok_or_else(|| {
        AppError::PreconditionFailed(format!("delivery {delivery_id} has no rider"))
    })?;
    let rider = state.riders.get(rider_id).await?;

    let receipt = state
        .wallet
        .credit(
            rider.user_id,
            delivery.rider_payment,
            &format!("payout for delivery {delivery_id}"),
            &format!("delivery-payout:{delivery_id}"),
        )
        .await?;

    let (_, released) = mutate_delivery(state, delivery_id, |d| {
        match d.payment_status {
            PaymentStatus::Released => return Ok(false),
            PaymentStatus::Cancelled => {
                return Err(AppError::PreconditionFailed(format!(
                    "payment for delivery {delivery_id} was cancelled"
                )));
            }
            PaymentStatus::Pending => {}
        }
        let now = state.clock.now();
        d.payment_status = PaymentStatus::Released;
        d.payment_reference = Some(receipt.reference.clone());
        d.time_log.payment_released_at = Some(now);
        let amount = d.rider_payment;
        d.add_note(now, format!("rider payment of {amount} released"), Some(&actor));
        Ok(true)
    })
    .await?;

    info!(
        delivery_id = %delivery_id,
        rider_id = %rider_id,
        amount = released.rider_payment,
        reference = %receipt.reference,
        "rider payment released"
    );
    Ok(released)
}

pub async fn rate_delivery(
    state: &AppState,
    delivery_id: Uuid,
    actor: Actor,
    rating: u8,
    comment: Option<String>,
) -> Result<Delivery, AppError> {
    if !(1..=5).contains(&rating) {
        return Err(AppError::BadRequest("rating must be between 1 and 5".to_string()));
    }

    let (_, rated) = mutate_delivery(state, delivery_id, |d| {
        if actor != Actor::Customer(d.customer_id) {
            return Err(AppError::Forbidden(format!(
                "only the customer may rate delivery {delivery_id}"
            )));
        }
        if !matches!(d.status, DeliveryStatus::Delivered | DeliveryStatus::Completed) {
            return Err(AppError::PreconditionFailed(format!(
                "delivery {delivery_id} has not been delivered"
            )));
        }
        if d.feedback.is_some() {
            return Err(AppError::PreconditionFailed(format!(
                "delivery {delivery_id} is already rated"
            )));
        }
        d.feedback = Some(Feedback {
            rating,
            comment: comment.clone(),
            rated_at: state.clock.now(),
        });
        Ok(true)
    })
    .await?;

    if let Some(rider_id) = rated.rider_id {
        if let Err(err) = state
            .riders
            .record_outcome(rider_id, RiderOutcome::rated(rating))
            .await
        {
            error!(rider_id = %rider_id, error = %err, "failed to record rating");
        }
    }

    Ok(rated)
}

pub async fn list_pending_assignments(state: &AppState) -> Result<Vec<Delivery>, AppError> {
    let mut pending = state
        .deliveries
        .list_by_status(DeliveryStatus::PendingAssignment)
        .await?;
    pending.sort_by(|a, b| {
        b.manual_assignment
            .is_some()
            .cmp(&a.manual_assignment.is_some())
            .then_with(|| a.created_at.cmp(&b.created_at))
    });
    Ok(pending)
}

async fn commit_transition<G>(
    state: &AppState,
    delivery_id: Uuid,
    target: DeliveryStatus,
    actor: Actor,
    note: Option<String>,
    guard: G,
) -> Result<Delivery, AppError>
where
    G: Fn(&Delivery) -> Result<(), AppError>,
{
    let mut forced_expiry = false;

    let (before, after) = mutate_delivery(state, delivery_id, |delivery| {
        guard(delivery)?;
        let now = state.clock.now();

        forced_expiry = matches!(target, DeliveryStatus::Accepted | DeliveryStatus::Declined)
            && delivery.offer_expired_at(now);

        if forced_expiry {
            delivery.apply_transition(
                DeliveryStatus::Expired,
                now,
                Some(EXPIRED_BEFORE_RESPONSE.to_string()),
                Some(&Actor::System),
            )?;
        } else {
            delivery.apply_transition(target, now, note.clone(), Some(&actor))?;
        }
        Ok(true)
    })
    .await?;

    after_transition(state, &before, &after).await;

    if forced_expiry {
        warn!(
            delivery_id = %delivery_id,
            actor = %actor.label(),
            "response arrived after the acceptance window"
        );
        return Err(AppError::ExpiredWindow(delivery_id.to_string()));
    }

    info!(
        delivery_id = %delivery_id,
        from = before.status.as_str(),
        to = after.status.as_str(),
        actor = %actor.label(),
        "delivery status changed"
    );
    Ok(after)
}

async fn after_transition(state: &AppState, before: &Delivery, after: &Delivery) {
    let actor = after
        .status_history
        .last()
        .and_then(|entry| entry.actor.clone());

    match after.status {
        DeliveryStatus::PickedUp => {
            notify_order(state, after, OrderStatus::Shipped, "picked up by rider", actor).await;
        }
        DeliveryStatus::Completed => {
            notify_order(state, after, OrderStatus::Delivered, "receipt confirmed", actor).await;
            if let Some(rider_id) = after.rider_id {
                let outcome = RiderOutcome::completed(after.delivery_minutes, after.rider_payment);
                release_rider(state, rider_id, after.id, "completed", Some(outcome)).await;
            }
        }
        DeliveryStatus::Cancelled => {
            if let (true, Some(rider_id)) = (before.status.holds_rider(), before.rider_id) {
                let outcome = RiderOutcome::of(OutcomeKind::Cancelled);
                release_rider(state, rider_id, after.id, "cancelled", Some(outcome)).await;
            }
            let entry = OrderHistoryEntry {
                status: OrderStatus::Cancelled,
                reason: Some("delivery cancelled".to_string()),
                actor,
            };
            if let Err(err) = state.orders.append_order_history(after.order_id, entry).await {
                error!(order_id = %after.order_id, error = %err, "failed to append order history");
            }
        }
        DeliveryStatus::Declined => {
            if let Some(rider_id) = after.rider_id {
                let outcome = RiderOutcome::of(OutcomeKind::Rejected);
                release_rider(state, rider_id, after.id, "declined", Some(outcome)).await;
            }
        }
        DeliveryStatus::Expired => {
            state.metrics.deliveries_expired_total.inc();
            if let Some(rider_id) = after.rider_id {
                release_rider(state, rider_id, after.id, "expired", None).await;
            }
        }
        _ => {}
    }

    state.publish(DeliveryEvent::from_delivery(after));
}

async fn notify_order(
    state: &AppState,
    delivery: &Delivery,
    status: OrderStatus,
    reason: &str,
    actor: Option<String>,
) {
    let entry = OrderHistoryEntry {
        status,
        reason: Some(reason.to_string()),
        actor,
    };
    if let Err(err) = state
        .orders
        .set_order_status(delivery.order_id, status, entry)
        .await
    {
        error!(
            order_id = %delivery.order_id,
            delivery_id = %delivery.id,
            error = %err,
            "failed to update order status"
        );
    }
}

async fn follow_up_reassignment(state: &AppState, delivery_id: Uuid, trigger: ReassignTrigger) {
    match reassignment::reassign(state, delivery_id, trigger, Actor::System, None).await {
        Ok(outcome) if !outcome.success => {
            warn!(
                delivery_id = %delivery_id,
                reason = outcome.reason.as_deref().unwrap_or("unknown"),
                "reassignment found no rider"
            );
        }
        Ok(_) => {}
        Err(err) => error!(delivery_id = %delivery_id, error = %err, "reassignment failed"),
    }
}
