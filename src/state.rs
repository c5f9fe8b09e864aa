use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use uuid::Uuid;

use crate::clock::Clock;
use crate::collaborators::{
    IdentityService, InMemoryIdentity, InMemoryOrders, InMemoryWallet, OrderService, Wallet,
};
use crate::config::DispatchPolicy;
use crate::models::event::DeliveryEvent;
use crate::observability::metrics::Metrics;
use crate::store::memory::{InMemoryDeliveryStore, InMemoryRiderDirectory};
use crate::store::{DeliveryStore, RiderDirectory};

pub struct Backends {
    pub riders: Arc<dyn RiderDirectory>,
    pub deliveries: Arc<dyn DeliveryStore>,
    pub orders: Arc<dyn OrderService>,
    pub wallet: Arc<dyn Wallet>,
    pub identity: Arc<dyn IdentityService>,
}

#[derive(Clone)]
pub struct InMemoryBackends {
    pub riders: Arc<InMemoryRiderDirectory>,
    pub deliveries: Arc<InMemoryDeliveryStore>,
    pub orders: Arc<InMemoryOrders>,
    pub wallet: Arc<InMemoryWallet>,
    pub identity: Arc<InMemoryIdentity>,
}

impl InMemoryBackends {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            riders: Arc::new(InMemoryRiderDirectory::new(clock.clone())),
            deliveries: Arc::new(InMemoryDeliveryStore::new(clock)),
            orders: Arc::new(InMemoryOrders::new()),
            wallet: Arc::new(InMemoryWallet::new()),
            identity: Arc::new(InMemoryIdentity::new()),
        }
    }

    pub fn backends(&self) -> Backends {
        Backends {
            riders: self.riders.clone(),
            deliveries: self.deliveries.clone(),
            orders: self.orders.clone(),
            wallet: self.wallet.clone(),
            identity: self.identity.clone(),
        }
    }
}

pub struct AppState {
    pub riders: Arc<dyn RiderDirectory>,
    pub deliveries: Arc<dyn DeliveryStore>,
    pub orders: Arc<dyn OrderService>,
    pub wallet: Arc<dyn Wallet>,
    pub identity: Arc<dyn IdentityService>,
    pub clock: Arc<dyn Clock>,
    pub policy: DispatchPolicy,
    pub assignment_tx: mpsc::Sender<Uuid>,
    pub delivery_events_tx: broadcast::Sender<DeliveryEvent>,
    pub metrics: Metrics,
}

impl AppState {
    pub fn new(
        backends: Backends,
        clock: Arc<dyn Clock>,
        policy: DispatchPolicy,
        order_queue_size: usize,
        event_buffer_size: usize,
    ) -> (Self, mpsc::Receiver<Uuid>) {
        let (assignment_tx, assignment_rx) = mpsc::channel(order_queue_size);
        let (delivery_events_tx, _unused_rx) = broadcast::channel(event_buffer_size);

        (
            Self {
                riders: backends.riders,
                deliveries: backends.deliveries,
                orders: backends.orders,
                wallet: backends.wallet,
                identity: backends.identity,
                clock,
                policy,
                assignment_tx,
                delivery_events_tx,
                metrics: Metrics::new(),
            },
            assignment_rx,
        )
    }

    pub fn publish(&self, event: DeliveryEvent) {
        self.metrics
            .delivery_transitions_total
            .with_label_values(&[event.status.as_str()])
            .inc();
        let _ = self.delivery_events_tx.send(event);
    }
}
