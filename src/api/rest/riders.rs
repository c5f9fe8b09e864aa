use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, patch, post};
use axum::Json;
use axum::Router;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::api::rest::auth::Caller;
use crate::engine::reassignment::handle_rider_unavailable;
use crate::error::AppError;
use crate::geo::GeoPoint;
use crate::models::assignment::AssignmentOutcome;
use crate::models::rider::{DocumentKind, Rider, RiderStatus, VehicleType};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/riders", post(create_rider).get(list_riders))
        .route("/riders/:id", get(get_rider))
        .route("/riders/:id/documents/:kind/verify", post(verify_document))
        .route("/riders/:id/status", patch(update_rider_status))
        .route("/riders/:id/availability", patch(update_availability))
}

#[derive(Deserialize)]
pub struct CreateRiderRequest {
    pub user_id: Uuid,
    pub name: String,
    pub vehicle: VehicleType,
    pub service_areas: Vec<String>,
    #[serde(default)]
    pub security_deposit: u64,
}

#[derive(Deserialize)]
pub struct UpdateStatusRequest {
    pub status: RiderStatus,
}

#[derive(Deserialize)]
pub struct UpdateAvailabilityRequest {
    pub available: Option<bool>,
    /// Ends the shift; deliveries the rider still holds go to someone else.
    #[serde(default)]
    pub offline: bool,
    pub location: Option<GeoPoint>,
}

#[derive(Serialize)]
pub struct AvailabilityResponse {
    pub rider: Rider,
    pub reassignments: Vec<AssignmentOutcome>,
}

async fn create_rider(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Json(payload): Json<CreateRiderRequest>,
) -> Result<Json<Rider>, AppError> {
    if !caller.is_admin() && caller.profile.id != payload.user_id {
        return Err(AppError::Forbidden(
            "riders may only onboard themselves".to_string(),
        ));
    }
    if payload.name.trim().is_empty() {
        return Err(AppError::BadRequest("name cannot be empty".to_string()));
    }
    if payload.service_areas.iter().all(|area| area.trim().is_empty()) {
        return Err(AppError::BadRequest(
            "at least one service area is required".to_string(),
        ));
    }

    match state.riders.find_by_user(payload.user_id).await {
        Ok(existing) => {
            return Err(AppError::Conflict(format!(
                "user {} is already rider {}",
                payload.user_id, existing.id
            )));
        }
        Err(AppError::NotFound(_)) => {}
        Err(err) => return Err(err),
    }

    let rider = Rider::new(
        payload.user_id,
        payload.name.trim().to_string(),
        payload.vehicle,
        payload
            .service_areas
            .into_iter()
            .map(|area| area.trim().to_string())
            .filter(|area| !area.is_empty())
            .collect(),
        payload.security_deposit,
        state.clock.now(),
    );
    let rider = state.riders.insert(rider).await?;

    info!(rider_id = %rider.id, user_id = %rider.user_id, "rider onboarded");
    Ok(Json(rider))
}

async fn list_riders(
    State(state): State<Arc<AppState>>,
    caller: Caller,
) -> Result<Json<Vec<Rider>>, AppError> {
    caller.require_admin()?;
    Ok(Json(state.riders.list().await?))
}

async fn get_rider(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<Uuid>,
) -> Result<Json<Rider>, AppError> {
    caller.require_rider_or_admin(id)?;
    Ok(Json(state.riders.get(id).await?))
}

async fn verify_document(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path((id, kind)): Path<(Uuid, DocumentKind)>,
) -> Result<Json<Rider>, AppError> {
    let actor = caller.require_admin()?;
    let rider = state.riders.verify_document(id, kind).await?;

    info!(
        rider_id = %id,
        document = ?kind,
        status = ?rider.status,
        actor = %actor.label(),
        "rider document verified"
    );
    Ok(Json(rider))
}

async fn update_rider_status(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateStatusRequest>,
) -> Result<Json<Rider>, AppError> {
    let actor = caller.require_admin()?;
    let rider = state.riders.set_status(id, payload.status).await?;

    info!(rider_id = %id, status = ?rider.status, actor = %actor.label(), "rider status changed");
    Ok(Json(rider))
}

async fn update_availability(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateAvailabilityRequest>,
) -> Result<Json<AvailabilityResponse>, AppError> {
    let actor = caller.require_rider_or_admin(id)?;
    if let Some(point) = payload.location {
        if !point.is_valid() {
            return Err(AppError::BadRequest("invalid coordinates".to_string()));
        }
    }

    if payload.offline {
        if payload.available == Some(true) {
            return Err(AppError::BadRequest(
                "a rider cannot be offline and available".to_string(),
            ));
        }
        if let Some(point) = payload.location {
            state.riders.update_location(id, point).await?;
        }
        let reassignments = handle_rider_unavailable(&state, id, actor).await?;
        info!(
            rider_id = %id,
            reassigned = reassignments.len(),
            actor = %actor.label(),
            "rider went offline"
        );
        return Ok(Json(AvailabilityResponse {
            rider: state.riders.get(id).await?,
            reassignments,
        }));
    }

    // an available rider never holds a delivery, so these leave work in place
    let rider = match (payload.available, payload.location) {
        (Some(available), location) => {
            state.riders.set_availability(id, location, available).await?
        }
        (None, Some(point)) => state.riders.update_location(id, point).await?,
        (None, None) => state.riders.get(id).await?,
    };

    Ok(Json(AvailabilityResponse {
        rider,
        reassignments: Vec::new(),
    }))
}
