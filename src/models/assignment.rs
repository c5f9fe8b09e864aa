use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::geo::GeoPoint;
use crate::models::rider::{Rider, VehicleType};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ScoreBreakdown {
    pub distance_score: f64,
    pub rating_score: f64,
    pub experience_score: f64,
    pub workload_score: f64,
    pub vehicle_score: f64,
}

#[derive(Debug, Clone)]
pub struct Candidate {
    pub rider: Rider,
    pub distance_km: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedCandidate {
    pub rider_id: Uuid,
    pub rider_name: String,
    pub vehicle: VehicleType,
    pub distance_km: f64,
    pub score: f64,
    pub breakdown: ScoreBreakdown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignmentCriteria {
    pub delivery_id: Uuid,
    pub destination: Option<GeoPoint>,
    pub city: String,
    pub order_value: u64,
    pub delivery_fee: u64,
    pub urgency: Urgency,
    pub vehicle_requirement: Option<VehicleType>,
    #[serde(default)]
    pub excluded_riders: Vec<Uuid>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignmentFailure {
    MissingCoordinates,
    NoAvailableRiders,
    NoQualifiedRiders,
    AllCandidatesTaken,
}

impl AssignmentFailure {
    pub fn as_str(self) -> &'static str {
        match self {
            AssignmentFailure::MissingCoordinates => "missing coordinates",
            AssignmentFailure::NoAvailableRiders => "no available riders",
            AssignmentFailure::NoQualifiedRiders => "no riders meet requirements",
            AssignmentFailure::AllCandidatesTaken => "all ranked riders were taken concurrently",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignmentOutcome {
    pub success: bool,
    pub delivery_id: Uuid,
    pub urgency: Urgency,
    pub rider: Option<RankedCandidate>,
    pub alternates: Vec<RankedCandidate>,
    pub estimated_minutes: Option<u32>,
    pub reason: Option<String>,
}

impl AssignmentOutcome {
    pub fn failed(delivery_id: Uuid, urgency: Urgency, failure: AssignmentFailure) -> Self {
        Self {
            success: false,
            delivery_id,
            urgency,
            rider: None,
            alternates: Vec::new(),
            estimated_minutes: None,
            reason: Some(failure.as_str().to_string()),
        }
    }
}
