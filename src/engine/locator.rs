use std::cmp::Ordering;

use uuid::Uuid;

use crate::config::DispatchPolicy;
use crate::error::AppError;
use crate::geo::{haversine_km, GeoPoint};
use crate::models::assignment::Candidate;
use crate::models::rider::Rider;
use crate::state::AppState;

pub async fn locate_candidates(
    state: &AppState,
    destination: &GeoPoint,
    city: &str,
    excluded: &[Uuid],
) -> Result<Vec<Candidate>, AppError> {
    let riders = state.riders.find_eligible(city).await?;
    Ok(filter_candidates(
        riders,
        destination,
        city,
        excluded,
        &state.policy,
    ))
}

pub fn filter_candidates(
    riders: Vec<Rider>,
    destination: &GeoPoint,
    city: &str,
    excluded: &[Uuid],
    policy: &DispatchPolicy,
) -> Vec<Candidate> {
    let mut candidates: Vec<Candidate> = riders
        .into_iter()
        .filter(|rider| rider.is_assignable() && rider.serves(city))
        .filter(|rider| !excluded.contains(&rider.id))
        .filter(|rider| rider.active_deliveries < policy.workload_cap)
        .filter_map(|rider| {
            let location = rider.location.filter(GeoPoint::is_valid)?;
            let distance_km = haversine_km(&location, destination);
            (distance_km <= policy.max_search_radius_km).then_some(Candidate { rider, distance_km })
        })
        .collect();

    candidates.sort_by(|a, b| {
        a.distance_km
            .partial_cmp(&b.distance_km)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.rider.id.cmp(&b.rider.id))
    });
    candidates
}
