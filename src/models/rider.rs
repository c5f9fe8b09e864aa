use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::geo::GeoPoint;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RiderStatus {
    PendingVerification,
    Active,
    Inactive,
    Suspended,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum VehicleType {
    OnFoot,
    Bicycle,
    Motorcycle,
    Car,
    Van,
}

impl VehicleType {
    pub const ALL: [VehicleType; 5] = [
        VehicleType::OnFoot,
        VehicleType::Bicycle,
        VehicleType::Motorcycle,
        VehicleType::Car,
        VehicleType::Van,
    ];

    /// Average urban speed in km/h.
    pub fn default_speed_kmh(self) -> f64 {
        match self {
            VehicleType::OnFoot => 5.0,
            VehicleType::Bicycle => 15.0,
            VehicleType::Motorcycle => 30.0,
            VehicleType::Car => 25.0,
            VehicleType::Van => 20.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Identity,
    DriverLicence,
    VehicleRegistration,
    Guarantor,
}

impl DocumentKind {
    pub const REQUIRED: [DocumentKind; 4] = [
        DocumentKind::Identity,
        DocumentKind::DriverLicence,
        DocumentKind::VehicleRegistration,
        DocumentKind::Guarantor,
    ];
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationDocument {
    pub kind: DocumentKind,
    pub verified: bool,
    pub verified_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    Completed,
    Cancelled,
    Rejected,
    Reassigned,
    Rated,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiderOutcome {
    pub kind: OutcomeKind,
    pub duration_minutes: Option<f64>,
    pub rating: Option<u8>,
    pub earnings: Option<u64>,
}

impl RiderOutcome {
    pub fn of(kind: OutcomeKind) -> Self {
        Self {
            kind,
            duration_minutes: None,
            rating: None,
            earnings: None,
        }
    }

    pub fn completed(duration_minutes: Option<f64>, earnings: u64) -> Self {
        Self {
            kind: OutcomeKind::Completed,
            duration_minutes,
            rating: None,
            earnings: Some(earnings),
        }
    }

    pub fn rated(rating: u8) -> Self {
        Self {
            kind: OutcomeKind::Rated,
            duration_minutes: None,
            rating: Some(rating),
            earnings: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RiderStats {
    pub completed_deliveries: u32,
    pub cancelled_deliveries: u32,
    pub rejected_deliveries: u32,
    pub reassigned_deliveries: u32,
    pub average_delivery_minutes: f64,
    pub average_rating: f64,
    pub total_ratings: u32,
    pub total_earnings: u64,
}

impl RiderStats {
    /// Folds one outcome in. Running averages use the updated count as n:
    /// `avg' = (avg * (n - 1) + x) / n`.
    pub fn apply(&mut self, outcome: &RiderOutcome) {
        match outcome.kind {
            OutcomeKind::Completed => {
                self.completed_deliveries = self.completed_deliveries.saturating_add(1);
                if let Some(minutes) = outcome.duration_minutes {
                    self.average_delivery_minutes = running_average(
                        self.average_delivery_minutes,
                        self.completed_deliveries,
                        minutes,
                    );
                }
            }
            OutcomeKind::Cancelled => {
                self.cancelled_deliveries = self.cancelled_deliveries.saturating_add(1);
            }
            OutcomeKind::Rejected => {
                self.rejected_deliveries = self.rejected_deliveries.saturating_add(1);
            }
            OutcomeKind::Reassigned => {
                self.reassigned_deliveries = self.reassigned_deliveries.saturating_add(1);
            }
            OutcomeKind::Rated => {}
        }

        if let Some(rating) = outcome.rating {
            self.total_ratings = self.total_ratings.saturating_add(1);
            self.average_rating =
                running_average(self.average_rating, self.total_ratings, f64::from(rating));
        }

        if let Some(earnings) = outcome.earnings {
            self.total_earnings = self.total_earnings.saturating_add(earnings);
        }
    }
}

fn running_average(old: f64, n: u32, value: f64) -> f64 {
    if n <= 1 {
        return value;
    }
    let n = f64::from(n);
    (old * (n - 1.0) + value) / n
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rider {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub status: RiderStatus,
    pub is_available: bool,
    pub is_on_delivery: bool,
    pub active_deliveries: u32,
    pub location: Option<GeoPoint>,
    pub location_updated_at: Option<DateTime<Utc>>,
    pub service_areas: Vec<String>,
    pub vehicle: VehicleType,
    pub stats: RiderStats,
    pub security_deposit: u64,
    pub documents: Vec<VerificationDocument>,
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Rider {
    pub fn new(
        user_id: Uuid,
        name: String,
        vehicle: VehicleType,
        service_areas: Vec<String>,
        security_deposit: u64,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            name,
            status: RiderStatus::PendingVerification,
            is_available: false,
            is_on_delivery: false,
            active_deliveries: 0,
            location: None,
            location_updated_at: None,
            service_areas,
            vehicle,
            stats: RiderStats::default(),
            security_deposit,
            documents: DocumentKind::REQUIRED
                .iter()
                .map(|kind| VerificationDocument {
                    kind: *kind,
                    verified: false,
                    verified_at: None,
                })
                .collect(),
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_assignable(&self) -> bool {
        self.status == RiderStatus::Active && self.is_available && !self.is_on_delivery
    }

    pub fn serves(&self, city: &str) -> bool {
        let city = city.trim();
        self.service_areas
            .iter()
            .any(|area| area.trim().eq_ignore_ascii_case(city))
    }

    pub fn all_documents_verified(&self) -> bool {
        !self.documents.is_empty() && self.documents.iter().all(|doc| doc.verified)
    }
}
