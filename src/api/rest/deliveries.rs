use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, patch, post};
use axum::Json;
use axum::Router;
use serde::Deserialize;
use uuid::Uuid;

use crate::api::rest::auth::Caller;
use crate::engine::assignment::{assign_delivery, manual_assign};
use crate::engine::lifecycle::{
    create_delivery, list_pending_assignments, rate_delivery, release_payment,
    respond_to_assignment, update_status,
};
use crate::engine::queue::enqueue_delivery;
use crate::engine::reassignment::{reassign, ReassignTrigger};
use crate::error::AppError;
use crate::models::actor::Actor;
use crate::models::assignment::{AssignmentOutcome, Urgency};
use crate::models::delivery::{Delivery, DeliveryStatus, Location, NewDelivery};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/deliveries", post(create))
        .route("/deliveries/:id", get(get_delivery))
        .route("/deliveries/:id/assign", post(assign))
        .route("/deliveries/:id/manual-assign", post(manual))
        .route("/deliveries/:id/reassign", post(reassign_delivery))
        .route("/deliveries/:id/respond", post(respond))
        .route("/deliveries/:id/status", patch(change_status))
        .route("/deliveries/:id/release-payment", post(release))
        .route("/deliveries/:id/rating", post(rate))
        .route("/assignments/pending", get(pending))
}

#[derive(Deserialize)]
pub struct CreateDeliveryRequest {
    pub order_id: Uuid,
    pub customer_id: Uuid,
    pub pickup: Location,
    pub dropoff: Location,
    pub delivery_fee: u64,
    pub rider_payment: u64,
}

#[derive(Deserialize, Default)]
pub struct AssignRequest {
    pub urgency: Option<Urgency>,
}

#[derive(Deserialize)]
pub struct ManualAssignRequest {
    pub rider_id: Uuid,
}

#[derive(Deserialize, Default)]
pub struct ReassignRequest {
    pub reason: Option<String>,
}

#[derive(Deserialize)]
pub struct RespondRequest {
    pub accept: bool,
}

#[derive(Deserialize)]
pub struct StatusRequest {
    pub status: DeliveryStatus,
    pub note: Option<String>,
}

#[derive(Deserialize)]
pub struct RatingRequest {
    pub rating: u8,
    pub comment: Option<String>,
}

async fn create(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Json(payload): Json<CreateDeliveryRequest>,
) -> Result<Json<Delivery>, AppError> {
    if !caller.is_admin() && caller.profile.id != payload.customer_id {
        return Err(AppError::Forbidden(
            "deliveries are created for the paying customer".to_string(),
        ));
    }
    for point in [payload.pickup.coordinates, payload.dropoff.coordinates]
        .into_iter()
        .flatten()
    {
        if !point.is_valid() {
            return Err(AppError::BadRequest("invalid coordinates".to_string()));
        }
    }

    let delivery = create_delivery(
        &state,
        NewDelivery {
            order_id: payload.order_id,
            customer_id: payload.customer_id,
            pickup: payload.pickup,
            dropoff: payload.dropoff,
            delivery_fee: payload.delivery_fee,
            rider_payment: payload.rider_payment,
        },
    )
    .await?;

    enqueue_delivery(&state, delivery.id).await?;
    Ok(Json(delivery))
}

async fn get_delivery(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<Uuid>,
) -> Result<Json<Delivery>, AppError> {
    let delivery = state.deliveries.get(id).await?;
    let visible = match caller.actor()? {
        Actor::System | Actor::Admin(_) => true,
        Actor::Rider(rider_id) => delivery.rider_id == Some(rider_id),
        Actor::Customer(user_id) => delivery.customer_id == user_id,
    };
    if !visible {
        return Err(AppError::Forbidden(format!("delivery {id} is not visible")));
    }
    Ok(Json(delivery))
}

async fn assign(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<Uuid>,
    payload: Option<Json<AssignRequest>>,
) -> Result<Json<AssignmentOutcome>, AppError> {
    caller.require_admin()?;
    let urgency = payload.and_then(|Json(body)| body.urgency);
    Ok(Json(assign_delivery(&state, id, urgency).await?))
}

async fn manual(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<Uuid>,
    Json(payload): Json<ManualAssignRequest>,
) -> Result<Json<AssignmentOutcome>, AppError> {
    let actor = caller.require_admin()?;
    Ok(Json(manual_assign(&state, id, payload.rider_id, actor).await?))
}

async fn reassign_delivery(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<Uuid>,
    payload: Option<Json<ReassignRequest>>,
) -> Result<Json<AssignmentOutcome>, AppError> {
    let actor = caller.require_admin()?;
    let reason = payload.and_then(|Json(body)| body.reason);
    Ok(Json(
        reassign(&state, id, ReassignTrigger::Requested, actor, reason).await?,
    ))
}

async fn respond(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<Uuid>,
    Json(payload): Json<RespondRequest>,
) -> Result<Json<Delivery>, AppError> {
    let Actor::Rider(rider_id) = caller.actor()? else {
        return Err(AppError::Forbidden(
            "only riders respond to offers".to_string(),
        ));
    };
    Ok(Json(
        respond_to_assignment(&state, id, rider_id, payload.accept).await?,
    ))
}

async fn change_status(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<Uuid>,
    Json(payload): Json<StatusRequest>,
) -> Result<Json<Delivery>, AppError> {
    let actor = caller.actor()?;
    Ok(Json(
        update_status(&state, id, payload.status, actor, payload.note).await?,
    ))
}

async fn release(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<Uuid>,
) -> Result<Json<Delivery>, AppError> {
    let actor = caller.require_admin()?;
    Ok(Json(release_payment(&state, id, actor).await?))
}

async fn rate(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<Uuid>,
    Json(payload): Json<RatingRequest>,
) -> Result<Json<Delivery>, AppError> {
    let actor = caller.actor()?;
    Ok(Json(
        rate_delivery(&state, id, actor, payload.rating, payload.comment).await?,
    ))
}

async fn pending(
    State(state): State<Arc<AppState>>,
    caller: Caller,
) -> Result<Json<Vec<Delivery>>, AppError> {
    caller.require_admin()?;
    Ok(Json(list_pending_assignments(&state).await?))
}
