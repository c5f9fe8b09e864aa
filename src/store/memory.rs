use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use uuid::Uuid;

use super::{DeliveryStore, RiderDirectory};
use crate::clock::Clock;
use crate::error::AppError;
use crate::geo::GeoPoint;
use crate::models::delivery::{Delivery, DeliveryStatus};
use crate::models::rider::{DocumentKind, Rider, RiderOutcome, RiderStatus};

pub struct InMemoryRiderDirectory {
    riders: DashMap<Uuid, Rider>,
    clock: Arc<dyn Clock>,
}

impl InMemoryRiderDirectory {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            riders: DashMap::new(),
            clock,
        }
    }

    pub fn len(&self) -> usize {
        self.riders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.riders.is_empty()
    }

    fn update<F>(&self, id: Uuid, mutate: F) -> Result<Rider, AppError>
    where
        F: FnOnce(&mut Rider) -> Result<(), AppError>,
    {
        let mut rider = self
            .riders
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("rider {id} not found")))?;

        let mut next = rider.clone();
        mutate(&mut next)?;
        next.version = rider.version + 1;
        next.updated_at = self.clock.now();
        *rider = next.clone();

        Ok(next)
    }
}

#[async_trait]
impl RiderDirectory for InMemoryRiderDirectory {
    async fn insert(&self, rider: Rider) -> Result<Rider, AppError> {
        match self.riders.entry(rider.id) {
            Entry::Occupied(_) => Err(AppError::Conflict(format!(
                "rider {} already exists",
                rider.id
            ))),
            Entry::Vacant(slot) => {
                slot.insert(rider.clone());
                Ok(rider)
            }
        }
    }

    async fn get(&self, id: Uuid) -> Result<Rider, AppError> {
        self.riders
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| AppError::NotFound(format!("rider {id} not found")))
    }

    async fn find_by_user(&self, user_id: Uuid) -> Result<Rider, AppError> {
        self.riders
            .iter()
            .find(|entry| entry.value().user_id == user_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| AppError::NotFound(format!("no rider for user {user_id}")))
    }

    async fn list(&self) -> Result<Vec<Rider>, AppError> {
        Ok(self.riders.iter().map(|entry| entry.value().clone()).collect())
    }

    async fn find_eligible(&self, city: &str) -> Result<Vec<Rider>, AppError> {
        Ok(self
            .riders
            .iter()
            .filter(|entry| entry.value().is_assignable() && entry.value().serves(city))
            .map(|entry| entry.value().clone())
            .collect())
    }

    async fn set_on_delivery(&self, id: Uuid, on_delivery: bool) -> Result<Rider, AppError> {
        self.update(id, |rider| {
            if on_delivery {
                if !rider.is_assignable() {
                    return Err(AppError::Conflict(format!(
                        "rider {} is no longer assignable",
                        rider.id
                    )));
                }
                rider.is_on_delivery = true;
                rider.is_available = false;
                rider.active_deliveries = rider.active_deliveries.saturating_add(1);
            } else if rider.is_on_delivery {
                rider.is_on_delivery = false;
                rider.active_deliveries = rider.active_deliveries.saturating_sub(1);
            }
            Ok(())
        })
    }

    async fn record_outcome(&self, id: Uuid, outcome: RiderOutcome) -> Result<Rider, AppError> {
        self.update(id, |rider| {
            rider.stats.apply(&outcome);
            Ok(())
        })
    }

    async fn set_availability(
        &self,
        id: Uuid,
        location: Option<GeoPoint>,
        available: bool,
    ) -> Result<Rider, AppError> {
        let now = self.clock.now();
        self.update(id, |rider| {
            if available && rider.is_on_delivery {
                return Err(AppError::PreconditionFailed(
                    "rider is on a delivery".to_string(),
                ));
            }
            if available && rider.status != RiderStatus::Active {
                return Err(AppError::PreconditionFailed(
                    "only active riders can go available".to_string(),
                ));
            }
            if let Some(point) = location {
                rider.location = Some(point);
                rider.location_updated_at = Some(now);
            }
            rider.is_available = available;
            Ok(())
        })
    }

    async fn update_location(&self, id: Uuid, location: GeoPoint) -> Result<Rider, AppError> {
        let now = self.clock.now();
        self.update(id, |rider| {
            rider.location = Some(location);
            rider.location_updated_at = Some(now);
            Ok(())
        })
    }

    async fn set_status(&self, id: Uuid, status: RiderStatus) -> Result<Rider, AppError> {
        self.update(id, |rider| {
            if status == RiderStatus::Active && !rider.all_documents_verified() {
                return Err(AppError::PreconditionFailed(
                    "rider documents are not all verified".to_string(),
                ));
            }
            rider.status = status;
            if status != RiderStatus::Active {
                rider.is_available = false;
            }
            Ok(())
        })
    }

    async fn verify_document(&self, id: Uuid, kind: DocumentKind) -> Result<Rider, AppError> {
        let now = self.clock.now();
        self.update(id, |rider| {
            let doc = rider
                .documents
                .iter_mut()
                .find(|doc| doc.kind == kind)
                .ok_or_else(|| AppError::NotFound(format!("document {kind:?} not on file")))?;
            if !doc.verified {
                doc.verified = true;
                doc.verified_at = Some(now);
            }
            if rider.status == RiderStatus::PendingVerification && rider.all_documents_verified() {
                rider.status = RiderStatus::Active;
            }
            Ok(())
        })
    }
}

pub struct InMemoryDeliveryStore {
    deliveries: DashMap<Uuid, Delivery>,
    by_order: DashMap<Uuid, Uuid>,
    clock: Arc<dyn Clock>,
}

impl InMemoryDeliveryStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            deliveries: DashMap::new(),
            by_order: DashMap::new(),
            clock,
        }
    }

    pub fn len(&self) -> usize {
        self.deliveries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.deliveries.is_empty()
    }

    fn collect<P>(&self, predicate: P) -> Vec<Delivery>
    where
        P: Fn(&Delivery) -> bool,
    {
        let mut found: Vec<Delivery> = self
            .deliveries
            .iter()
            .filter(|entry| predicate(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();
        found.sort_by_key(|delivery| delivery.created_at);
        found
    }
}

#[async_trait]
impl DeliveryStore for InMemoryDeliveryStore {
    async fn insert(&self, delivery: Delivery) -> Result<Delivery, AppError> {
        match self.by_order.entry(delivery.order_id) {
            Entry::Occupied(existing) => Err(AppError::Conflict(format!(
                "order {} already has delivery {}",
                delivery.order_id,
                existing.get()
            ))),
            Entry::Vacant(slot) => {
                self.deliveries.insert(delivery.id, delivery.clone());
                slot.insert(delivery.id);
                Ok(delivery)
            }
        }
    }

    async fn get(&self, id: Uuid) -> Result<Delivery, AppError> {
        self.deliveries
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| AppError::NotFound(format!("delivery {id} not found")))
    }

    async fn get_by_order(&self, order_id: Uuid) -> Result<Delivery, AppError> {
        let id = self
            .by_order
            .get(&order_id)
            .map(|entry| *entry.value())
            .ok_or_else(|| AppError::NotFound(format!("no delivery for order {order_id}")))?;
        self.get(id).await
    }

    async fn list(&self) -> Result<Vec<Delivery>, AppError> {
        Ok(self.collect(|_| true))
    }

    async fn list_by_status(&self, status: DeliveryStatus) -> Result<Vec<Delivery>, AppError> {
        Ok(self.collect(|delivery| delivery.status == status))
    }

    async fn list_for_rider(&self, rider_id: Uuid) -> Result<Vec<Delivery>, AppError> {
        Ok(self.collect(|delivery| delivery.rider_id == Some(rider_id)))
    }

    async fn list_expired_offers(&self, now: DateTime<Utc>) -> Result<Vec<Delivery>, AppError> {
        Ok(self.collect(|delivery| delivery.offer_expired_at(now)))
    }

    async fn compare_and_swap(
        &self,
        next: Delivery,
        expected_version: u64,
    ) -> Result<Delivery, AppError> {
        let mut current = self
            .deliveries
            .get_mut(&next.id)
            .ok_or_else(|| AppError::NotFound(format!("delivery {} not found", next.id)))?;

        if current.version != expected_version {
            return Err(AppError::Conflict(format!(
                "delivery {} changed concurrently (expected version {}, found {})",
                next.id, expected_version, current.version
            )));
        }

        let mut next = next;
        next.version = expected_version + 1;
        next.updated_at = self.clock.now();
        *current = next.clone();

        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;
    use uuid::Uuid;

    use super::{InMemoryDeliveryStore, InMemoryRiderDirectory};
    use crate::clock::SystemClock;
    use crate::geo::GeoPoint;
    use crate::models::delivery::{Delivery, Location, NewDelivery};
    use crate::models::rider::{DocumentKind, Rider, RiderStatus, VehicleType};
    use crate::store::{DeliveryStore, RiderDirectory};

    fn rider() -> Rider {
        Rider::new(
            Uuid::new_v4(),
            "Ada".to_string(),
            VehicleType::Bicycle,
            vec!["Lagos".to_string()],
            80_000,
            Utc::now(),
        )
    }

    fn delivery(order_id: Uuid) -> Delivery {
        let location = Location {
            address: "1 Marina".to_string(),
            city: "Lagos".to_string(),
            state: "Lagos".to_string(),
            coordinates: Some(GeoPoint::new(6.45, 3.39)),
        };
        Delivery::new(
            NewDelivery {
                order_id,
                customer_id: Uuid::new_v4(),
                pickup: location.clone(),
                dropoff: location,
                delivery_fee: 1_000,
                rider_payment: 800,
            },
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn verifying_every_document_activates_rider() {
        let directory = InMemoryRiderDirectory::new(Arc::new(SystemClock));
        let rider = directory.insert(rider()).await.unwrap();

        for kind in DocumentKind::REQUIRED {
            let updated = directory.verify_document(rider.id, kind).await.unwrap();
            let expected = if kind == DocumentKind::Guarantor {
                RiderStatus::Active
            } else {
                RiderStatus::PendingVerification
            };
            assert_eq!(updated.status, expected);
        }
    }

    #[tokio::test]
    async fn claim_is_conditional_and_release_keeps_availability() {
        let directory = InMemoryRiderDirectory::new(Arc::new(SystemClock));
        let rider = directory.insert(rider()).await.unwrap();
        for kind in DocumentKind::REQUIRED {
            directory.verify_document(rider.id, kind).await.unwrap();
        }
        directory
            .set_availability(rider.id, Some(GeoPoint::new(6.45, 3.39)), true)
            .await
            .unwrap();

        let claimed = directory.set_on_delivery(rider.id, true).await.unwrap();
        assert!(claimed.is_on_delivery);
        assert!(!claimed.is_available);
        assert_eq!(claimed.active_deliveries, 1);

        let second = directory.set_on_delivery(rider.id, true).await;
        assert!(second.unwrap_err().is_conflict());

        let released = directory.set_on_delivery(rider.id, false).await.unwrap();
        assert!(!released.is_on_delivery);
        assert!(!released.is_available);
        assert_eq!(released.active_deliveries, 0);

        let again = directory.set_on_delivery(rider.id, false).await.unwrap();
        assert_eq!(again.active_deliveries, 0);
    }

    #[tokio::test]
    async fn one_delivery_per_order() {
        let store = InMemoryDeliveryStore::new(Arc::new(SystemClock));
        let order_id = Uuid::new_v4();
        store.insert(delivery(order_id)).await.unwrap();

        let duplicate = store.insert(delivery(order_id)).await;
        assert!(duplicate.unwrap_err().is_conflict());
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn stale_version_loses_compare_and_swap() {
        let store = InMemoryDeliveryStore::new(Arc::new(SystemClock));
        let original = store.insert(delivery(Uuid::new_v4())).await.unwrap();

        let first = store
            .compare_and_swap(original.clone(), original.version)
            .await
            .unwrap();
        assert_eq!(first.version, original.version + 1);

        let stale = store.compare_and_swap(original.clone(), original.version).await;
        assert!(stale.unwrap_err().is_conflict());
    }
}
