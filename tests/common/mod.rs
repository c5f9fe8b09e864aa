#![allow(dead_code)]

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use rider_dispatch::clock::{Clock, ManualClock};
use rider_dispatch::collaborators::{OrderSnapshot, OrderStatus, Role, UserProfile};
use rider_dispatch::config::DispatchPolicy;
use rider_dispatch::engine::lifecycle::create_delivery;
use rider_dispatch::geo::GeoPoint;
use rider_dispatch::models::delivery::{Delivery, Location, NewDelivery};
use rider_dispatch::models::rider::{Rider, RiderStatus, VehicleType};
use rider_dispatch::state::{AppState, Backends, InMemoryBackends};
use rider_dispatch::store::RiderDirectory;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Drop-off used by most scenarios: Victoria Island, Lagos.
pub const DROPOFF: GeoPoint = GeoPoint {
    lat: 6.4300,
    lng: 3.4200,
};

pub const PICKUP: GeoPoint = GeoPoint {
    lat: 6.4550,
    lng: 3.3900,
};

/// Roughly `km` kilometres due north of the drop-off.
pub fn north_of_dropoff(km: f64) -> GeoPoint {
    GeoPoint::new(DROPOFF.lat + km / 111.195, DROPOFF.lng)
}

pub struct Harness {
    pub state: Arc<AppState>,
    pub backends: InMemoryBackends,
    pub clock: Arc<ManualClock>,
    pub assignment_rx: mpsc::Receiver<Uuid>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_policy(DispatchPolicy::default())
    }

    pub fn with_policy(policy: DispatchPolicy) -> Self {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap(),
        ));
        let shared: Arc<dyn Clock> = clock.clone();
        let backends = InMemoryBackends::new(shared);
        Self::assemble(backends.backends(), backends, clock, policy)
    }

    /// Builds the state over custom stores while keeping the in-memory
    /// collaborators reachable for seeding.
    pub fn assemble(
        stores: Backends,
        backends: InMemoryBackends,
        clock: Arc<ManualClock>,
        policy: DispatchPolicy,
    ) -> Self {
        let shared: Arc<dyn Clock> = clock.clone();
        let (state, assignment_rx) = AppState::new(stores, shared, policy, 64, 64);
        Self {
            state: Arc::new(state),
            backends,
            clock,
            assignment_rx,
        }
    }

    pub fn user(&self, role: Role, name: &str) -> Uuid {
        let id = Uuid::new_v4();
        self.backends.identity.insert(UserProfile {
            id,
            display_name: name.to_string(),
            role,
        });
        id
    }

    /// An active, available rider with the given track record.
    pub async fn rider(
        &self,
        name: &str,
        location: GeoPoint,
        completed: u32,
        rating: Option<f64>,
    ) -> Rider {
        self.seed_rider(name, location, completed, rating, 80_000).await
    }

    pub async fn rider_with_deposit(&self, name: &str, location: GeoPoint, deposit: u64) -> Rider {
        self.seed_rider(name, location, 5, Some(4.0), deposit).await
    }

    async fn seed_rider(
        &self,
        name: &str,
        location: GeoPoint,
        completed: u32,
        rating: Option<f64>,
        security_deposit: u64,
    ) -> Rider {
        let user_id = self.user(Role::Rider, name);
        let mut rider = Rider::new(
            user_id,
            name.to_string(),
            VehicleType::Motorcycle,
            vec!["Lagos".to_string()],
            security_deposit,
            self.clock.now(),
        );
        rider.status = RiderStatus::Active;
        rider.is_available = true;
        rider.location = Some(location);
        rider.location_updated_at = Some(self.clock.now());
        for doc in &mut rider.documents {
            doc.verified = true;
            doc.verified_at = Some(self.clock.now());
        }
        rider.stats.completed_deliveries = completed;
        if let Some(rating) = rating {
            rider.stats.average_rating = rating;
            rider.stats.total_ratings = 10;
        }
        self.backends.riders.insert(rider).await.unwrap()
    }

    pub fn order(&self, customer_id: Uuid, destination: Option<GeoPoint>, order_value: u64) -> Uuid {
        let id = Uuid::new_v4();
        self.backends.orders.insert(OrderSnapshot {
            id,
            customer_id,
            destination,
            city: "Lagos".to_string(),
            order_value,
            delivery_fee: 1_500,
            vehicle_requirement: None,
            created_at: self.clock.now(),
            status: OrderStatus::Paid,
        });
        id
    }

    /// A paid order from a fresh customer and its pending delivery.
    pub async fn delivery(&self) -> Delivery {
        self.delivery_to(Some(DROPOFF), 20_000).await
    }

    pub async fn delivery_to(&self, dropoff: Option<GeoPoint>, order_value: u64) -> Delivery {
        let customer_id = self.user(Role::Customer, "Chidi");
        let order_id = self.order(customer_id, dropoff, order_value);
        create_delivery(
            &self.state,
            NewDelivery {
                order_id,
                customer_id,
                pickup: location(Some(PICKUP)),
                dropoff: location(dropoff),
                delivery_fee: 1_500,
                rider_payment: 1_200,
            },
        )
        .await
        .unwrap()
    }

    pub async fn rider_state(&self, id: Uuid) -> Rider {
        self.state.riders.get(id).await.unwrap()
    }

    pub async fn delivery_state(&self, id: Uuid) -> Delivery {
        self.state.deliveries.get(id).await.unwrap()
    }
}

pub fn location(coordinates: Option<GeoPoint>) -> Location {
    Location {
        address: "Plot 5, Adeola Odeku Street".to_string(),
        city: "Lagos".to_string(),
        state: "Lagos".to_string(),
        coordinates,
    }
}
