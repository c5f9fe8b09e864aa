use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::geo::{haversine_km, GeoPoint};
use crate::models::actor::Actor;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    PendingAssignment,
    AwaitingRiderResponse,
    Accepted,
    PickedUp,
    InTransit,
    Delivered,
    Completed,
    Cancelled,
    Declined,
    Expired,
}

impl DeliveryStatus {
    pub const ALL: [DeliveryStatus; 10] = [
        DeliveryStatus::PendingAssignment,
        DeliveryStatus::AwaitingRiderResponse,
        DeliveryStatus::Accepted,
        DeliveryStatus::PickedUp,
        DeliveryStatus::InTransit,
        DeliveryStatus::Delivered,
        DeliveryStatus::Completed,
        DeliveryStatus::Cancelled,
        DeliveryStatus::Declined,
        DeliveryStatus::Expired,
    ];

    pub fn allowed_next(self) -> &'static [DeliveryStatus] {
        use DeliveryStatus::*;
        match self {
            PendingAssignment => &[AwaitingRiderResponse, Cancelled],
            AwaitingRiderResponse => &[Accepted, Declined, Expired, Cancelled],
            Accepted => &[PickedUp, Cancelled],
            PickedUp => &[InTransit, Cancelled],
            InTransit => &[Delivered, Cancelled],
            Delivered => &[Completed],
            Completed | Cancelled | Declined | Expired => &[],
        }
    }

    pub fn can_transition_to(self, next: DeliveryStatus) -> bool {
        self.allowed_next().contains(&next)
    }

    pub fn is_terminal(self) -> bool {
        self.allowed_next().is_empty()
    }

    pub fn holds_rider(self) -> bool {
        matches!(
            self,
            DeliveryStatus::AwaitingRiderResponse
                | DeliveryStatus::Accepted
                | DeliveryStatus::PickedUp
                | DeliveryStatus::InTransit
                | DeliveryStatus::Delivered
        )
    }

    pub fn is_reassignable(self) -> bool {
        matches!(
            self,
            DeliveryStatus::PendingAssignment
                | DeliveryStatus::AwaitingRiderResponse
                | DeliveryStatus::Accepted
                | DeliveryStatus::PickedUp
                | DeliveryStatus::InTransit
                | DeliveryStatus::Declined
                | DeliveryStatus::Expired
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DeliveryStatus::PendingAssignment => "pending_assignment",
            DeliveryStatus::AwaitingRiderResponse => "awaiting_rider_response",
            DeliveryStatus::Accepted => "accepted",
            DeliveryStatus::PickedUp => "picked_up",
            DeliveryStatus::InTransit => "in_transit",
            DeliveryStatus::Delivered => "delivered",
            DeliveryStatus::Completed => "completed",
            DeliveryStatus::Cancelled => "cancelled",
            DeliveryStatus::Declined => "declined",
            DeliveryStatus::Expired => "expired",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Released,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Location {
    pub address: String,
    pub city: String,
    pub state: String,
    pub coordinates: Option<GeoPoint>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TimeLog {
    pub assigned_at: Option<DateTime<Utc>>,
    pub responded_at: Option<DateTime<Utc>>,
    pub picked_up_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub payment_released_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusEntry {
    pub status: DeliveryStatus,
    pub at: DateTime<Utc>,
    pub note: Option<String>,
    pub actor: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditNote {
    pub at: DateTime<Utc>,
    pub note: String,
    pub actor: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManualAssignmentFlag {
    pub reason: String,
    pub flagged_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Feedback {
    pub rating: u8,
    pub comment: Option<String>,
    pub rated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewDelivery {
    pub order_id: Uuid,
    pub customer_id: Uuid,
    pub pickup: Location,
    pub dropoff: Location,
    pub delivery_fee: u64,
    pub rider_payment: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Delivery {
    pub id: Uuid,
    pub order_id: Uuid,
    pub customer_id: Uuid,
    pub rider_id: Option<Uuid>,
    pub status: DeliveryStatus,
    pub pickup: Location,
    pub dropoff: Location,
    pub distance_km: f64,
    pub delivery_fee: u64,
    pub rider_payment: u64,
    pub payment_status: PaymentStatus,
    pub payment_reference: Option<String>,
    pub time_log: TimeLog,
    pub acceptance_expiry: Option<DateTime<Utc>>,
    pub delivery_minutes: Option<f64>,
    pub status_history: Vec<StatusEntry>,
    pub notes: Vec<AuditNote>,
    pub manual_assignment: Option<ManualAssignmentFlag>,
    /// Riders who already let this delivery go; skipped on reassignment.
    pub excluded_riders: Vec<Uuid>,
    pub feedback: Option<Feedback>,
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Delivery {
    pub fn new(input: NewDelivery, now: DateTime<Utc>) -> Self {
        let distance_km = match (input.pickup.coordinates, input.dropoff.coordinates) {
            (Some(pickup), Some(dropoff)) => haversine_km(&pickup, &dropoff),
            _ => 0.0,
        };

        Self {
            id: Uuid::new_v4(),
            order_id: input.order_id,
            customer_id: input.customer_id,
            rider_id: None,
            status: DeliveryStatus::PendingAssignment,
            pickup: input.pickup,
            dropoff: input.dropoff,
            distance_km,
            delivery_fee: input.delivery_fee,
            rider_payment: input.rider_payment,
            payment_status: PaymentStatus::Pending,
            payment_reference: None,
            time_log: TimeLog::default(),
            acceptance_expiry: None,
            delivery_minutes: None,
            status_history: Vec::new(),
            notes: Vec::new(),
            manual_assignment: None,
            excluded_riders: Vec::new(),
            feedback: None,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Moves to `next` if the transition table allows it, appending exactly one
    /// history entry and stamping the matching time log field.
    pub fn apply_transition(
        &mut self,
        next: DeliveryStatus,
        at: DateTime<Utc>,
        note: Option<String>,
        actor: Option<&Actor>,
    ) -> Result<(), AppError> {
        if !self.status.can_transition_to(next) {
            return Err(AppError::InvalidTransition(format!(
                "cannot move delivery {} from {} to {}",
                self.id,
                self.status.as_str(),
                next.as_str()
            )));
        }

        match next {
            DeliveryStatus::AwaitingRiderResponse => self.time_log.assigned_at = Some(at),
            DeliveryStatus::Accepted | DeliveryStatus::Declined => {
                self.time_log.responded_at = Some(at)
            }
            DeliveryStatus::PickedUp => self.time_log.picked_up_at = Some(at),
            DeliveryStatus::Delivered => {
                self.time_log.delivered_at = Some(at);
                self.delivery_minutes = self
                    .time_log
                    .picked_up_at
                    .map(|picked_up| (at - picked_up).num_seconds().max(0) as f64 / 60.0);
            }
            DeliveryStatus::Completed => self.time_log.confirmed_at = Some(at),
            DeliveryStatus::Cancelled => {
                self.time_log.cancelled_at = Some(at);
                if self.payment_status == PaymentStatus::Pending {
                    self.payment_status = PaymentStatus::Cancelled;
                }
            }
            DeliveryStatus::PendingAssignment
            | DeliveryStatus::InTransit
            | DeliveryStatus::Expired => {}
        }

        self.status = next;
        self.push_history(at, note, actor);
        Ok(())
    }

    pub fn offer_to(
        &mut self,
        rider_id: Uuid,
        at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
        note: Option<String>,
        actor: Option<&Actor>,
    ) -> Result<(), AppError> {
        self.apply_transition(DeliveryStatus::AwaitingRiderResponse, at, note, actor)?;
        self.rider_id = Some(rider_id);
        self.acceptance_expiry = Some(expires_at);
        self.manual_assignment = None;
        Ok(())
    }

    /// Pulls the delivery back to `pending_assignment` and drops the rider.
    /// Only the reassignment path uses this; it sits outside the
    /// request-driven transition table.
    pub fn reopen(
        &mut self,
        at: DateTime<Utc>,
        note: Option<String>,
        actor: Option<&Actor>,
    ) -> Result<(), AppError> {
        if !self.status.is_reassignable() {
            return Err(AppError::InvalidTransition(format!(
                "delivery {} cannot be reassigned from {}",
                self.id,
                self.status.as_str()
            )));
        }
        if self.status == DeliveryStatus::PendingAssignment {
            return Ok(());
        }

        if let Some(rider_id) = self.rider_id.take() {
            if !self.excluded_riders.contains(&rider_id) {
                self.excluded_riders.push(rider_id);
            }
        }
        self.status = DeliveryStatus::PendingAssignment;
        self.acceptance_expiry = None;
        self.push_history(at, note, actor);
        Ok(())
    }

    /// True when an offer is out and its window has elapsed at `now`.
    /// A response at exactly the expiry instant is still in time.
    pub fn offer_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.status == DeliveryStatus::AwaitingRiderResponse
            && self.acceptance_expiry.is_some_and(|expiry| now > expiry)
    }

    pub fn add_note(&mut self, at: DateTime<Utc>, note: impl Into<String>, actor: Option<&Actor>) {
        self.notes.push(AuditNote {
            at,
            note: note.into(),
            actor: actor.map(Actor::label),
        });
    }

    pub fn flag_for_manual_assignment(&mut self, at: DateTime<Utc>, reason: &str) {
        self.manual_assignment = Some(ManualAssignmentFlag {
            reason: reason.to_string(),
            flagged_at: at,
        });
        self.add_note(
            at,
            format!("queued for manual assignment: {reason}"),
            Some(&Actor::System),
        );
    }

    pub fn destination(&self) -> Option<GeoPoint> {
        self.dropoff.coordinates.filter(GeoPoint::is_valid)
    }

    fn push_history(&mut self, at: DateTime<Utc>, note: Option<String>, actor: Option<&Actor>) {
        self.status_history.push(StatusEntry {
            status: self.status,
            at,
            note,
            actor: actor.map(Actor::label),
        });
    }
}
