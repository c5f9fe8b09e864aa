pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::AppError;
use crate::geo::GeoPoint;
use crate::models::delivery::{Delivery, DeliveryStatus};
use crate::models::rider::{DocumentKind, Rider, RiderOutcome, RiderStatus};

#[async_trait]
pub trait RiderDirectory: Send + Sync {
    async fn insert(&self, rider: Rider) -> Result<Rider, AppError>;

    async fn get(&self, id: Uuid) -> Result<Rider, AppError>;

    async fn find_by_user(&self, user_id: Uuid) -> Result<Rider, AppError>;

    async fn list(&self) -> Result<Vec<Rider>, AppError>;

    async fn find_eligible(&self, city: &str) -> Result<Vec<Rider>, AppError>;

    /// `true` claims the rider and fails with `Conflict` unless the rider is
    /// assignable at the moment of the write; it also clears `is_available`.
    /// `false` releases the rider and leaves `is_available` alone; releasing an
    /// idle rider is a no-op.
    async fn set_on_delivery(&self, id: Uuid, on_delivery: bool) -> Result<Rider, AppError>;

    async fn record_outcome(&self, id: Uuid, outcome: RiderOutcome) -> Result<Rider, AppError>;

    async fn set_availability(
        &self,
        id: Uuid,
        location: Option<GeoPoint>,
        available: bool,
    ) -> Result<Rider, AppError>;

    /// Moves the rider only; availability and delivery state stay as they are.
    async fn update_location(&self, id: Uuid, location: GeoPoint) -> Result<Rider, AppError>;

    async fn set_status(&self, id: Uuid, status: RiderStatus) -> Result<Rider, AppError>;

    async fn verify_document(&self, id: Uuid, kind: DocumentKind) -> Result<Rider, AppError>;
}

#[async_trait]
pub trait DeliveryStore: Send + Sync {
    async fn insert(&self, delivery: Delivery) -> Result<Delivery, AppError>;

    async fn get(&self, id: Uuid) -> Result<Delivery, AppError>;

    async fn get_by_order(&self, order_id: Uuid) -> Result<Delivery, AppError>;

    async fn list(&self) -> Result<Vec<Delivery>, AppError>;

    async fn list_by_status(&self, status: DeliveryStatus) -> Result<Vec<Delivery>, AppError>;

    async fn list_for_rider(&self, rider_id: Uuid) -> Result<Vec<Delivery>, AppError>;

    async fn list_expired_offers(&self, now: DateTime<Utc>) -> Result<Vec<Delivery>, AppError>;

    /// Replaces the stored record with `next` only if its version still equals
    /// `expected_version`; otherwise fails with `Conflict`. The stored version
    /// is bumped on success.
    async fn compare_and_swap(
        &self,
        next: Delivery,
        expected_version: u64,
    ) -> Result<Delivery, AppError>;
}
