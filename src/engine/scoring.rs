use std::cmp::Ordering;

use crate::config::DispatchPolicy;
use crate::models::assignment::{AssignmentCriteria, Candidate, RankedCandidate, ScoreBreakdown};
use crate::models::rider::{Rider, VehicleType};

const DISTANCE_WEIGHT: f64 = 0.35;
const RATING_WEIGHT: f64 = 0.25;
const EXPERIENCE_WEIGHT: f64 = 0.20;
const WORKLOAD_WEIGHT: f64 = 0.15;
const VEHICLE_WEIGHT: f64 = 0.05;

const MAX_RATING: f64 = 5.0;
const NEW_RIDER_EXPERIENCE: f64 = 20.0;
const EXPERIENCE_CURVE: f64 = 35.0;
const WORKLOAD_STEP: f64 = 33.0;

const LOW_VALUE_CEILING: u64 = 10_000;
const MEDIUM_VALUE_CEILING: u64 = 50_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueBand {
    Low,
    Medium,
    High,
}

impl ValueBand {
    pub fn of(order_value: u64) -> Self {
        if order_value <= LOW_VALUE_CEILING {
            ValueBand::Low
        } else if order_value <= MEDIUM_VALUE_CEILING {
            ValueBand::Medium
        } else {
            ValueBand::High
        }
    }
}

pub fn compute_score(
    candidate: &Candidate,
    criteria: &AssignmentCriteria,
    policy: &DispatchPolicy,
) -> (f64, ScoreBreakdown) {
    let rider = &candidate.rider;

    let breakdown = ScoreBreakdown {
        distance_score: distance_score(candidate.distance_km, policy),
        rating_score: rating_score(rider, policy),
        experience_score: experience_score(rider.stats.completed_deliveries),
        workload_score: workload_score(rider),
        vehicle_score: vehicle_score(
            rider.vehicle,
            criteria.order_value,
            criteria.vehicle_requirement,
            policy,
        ),
    };

    let score = weighted_score(&breakdown);
    (score, breakdown)
}

pub fn weighted_score(breakdown: &ScoreBreakdown) -> f64 {
    (breakdown.distance_score * DISTANCE_WEIGHT)
        + (breakdown.rating_score * RATING_WEIGHT)
        + (breakdown.experience_score * EXPERIENCE_WEIGHT)
        + (breakdown.workload_score * WORKLOAD_WEIGHT)
        + (breakdown.vehicle_score * VEHICLE_WEIGHT)
}

pub fn rank_candidates(
    candidates: &[Candidate],
    criteria: &AssignmentCriteria,
    policy: &DispatchPolicy,
) -> Vec<RankedCandidate> {
    let mut ranked: Vec<RankedCandidate> = candidates
        .iter()
        .map(|candidate| {
            let (score, breakdown) = compute_score(candidate, criteria, policy);
            RankedCandidate {
                rider_id: candidate.rider.id,
                rider_name: candidate.rider.name.clone(),
                vehicle: candidate.rider.vehicle,
                distance_km: candidate.distance_km,
                score,
                breakdown,
            }
        })
        .filter(|ranked| ranked.score >= policy.min_acceptance_score)
        .collect();

    ranked.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| {
                a.distance_km
                    .partial_cmp(&b.distance_km)
                    .unwrap_or(Ordering::Equal)
            })
            .then_with(|| a.rider_id.cmp(&b.rider_id))
    });
    ranked
}

fn distance_score(distance_km: f64, policy: &DispatchPolicy) -> f64 {
    if distance_km <= policy.priority_radius_km {
        return 100.0;
    }
    let span = policy.max_search_radius_km - policy.priority_radius_km;
    let decay = (distance_km - policy.priority_radius_km) / span * 100.0;
    (100.0 - decay).max(0.0)
}

fn rating_score(rider: &Rider, policy: &DispatchPolicy) -> f64 {
    let rating = if rider.stats.total_ratings == 0 {
        policy.unrated_rider_rating
    } else {
        rider.stats.average_rating
    };

    if rating < policy.min_rating {
        return 0.0;
    }
    ((rating - policy.min_rating) / (MAX_RATING - policy.min_rating) * 100.0).clamp(0.0, 100.0)
}

fn experience_score(completed: u32) -> f64 {
    if completed == 0 {
        return NEW_RIDER_EXPERIENCE;
    }
    (NEW_RIDER_EXPERIENCE + (f64::from(completed) + 1.0).log10() * EXPERIENCE_CURVE).min(100.0)
}

fn workload_score(rider: &Rider) -> f64 {
    if !rider.is_assignable() {
        return 0.0;
    }
    (100.0 - f64::from(rider.active_deliveries) * WORKLOAD_STEP).max(0.0)
}

fn vehicle_score(
    vehicle: VehicleType,
    order_value: u64,
    requirement: Option<VehicleType>,
    policy: &DispatchPolicy,
) -> f64 {
    let fit = vehicle_fit(vehicle, ValueBand::of(order_value));
    match requirement {
        Some(required) if required != vehicle => {
            if policy.vehicle_requirement_hard_fail {
                0.0
            } else {
                fit / 2.0
            }
        }
        _ => fit,
    }
}

fn vehicle_fit(vehicle: VehicleType, band: ValueBand) -> f64 {
    match (vehicle, band) {
        (VehicleType::OnFoot, ValueBand::Low) => 100.0,
        (VehicleType::OnFoot, ValueBand::Medium) => 60.0,
        (VehicleType::OnFoot, ValueBand::High) => 20.0,
        (VehicleType::Bicycle, ValueBand::Low) => 100.0,
        (VehicleType::Bicycle, ValueBand::Medium) => 80.0,
        (VehicleType::Bicycle, ValueBand::High) => 40.0,
        (VehicleType::Motorcycle, ValueBand::Low) => 100.0,
        (VehicleType::Motorcycle, ValueBand::Medium) => 100.0,
        (VehicleType::Motorcycle, ValueBand::High) => 80.0,
        (VehicleType::Car, ValueBand::Low) => 70.0,
        (VehicleType::Car, ValueBand::Medium) => 90.0,
        (VehicleType::Car, ValueBand::High) => 100.0,
        (VehicleType::Van, ValueBand::Low) => 50.0,
        (VehicleType::Van, ValueBand::Medium) => 80.0,
        (VehicleType::Van, ValueBand::High) => 100.0,
    }
}
