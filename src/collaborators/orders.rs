use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::geo::GeoPoint;
use crate::models::rider::VehicleType;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Paid,
    Shipped,
    Delivered,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderSnapshot {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub destination: Option<GeoPoint>,
    pub city: String,
    pub order_value: u64,
    pub delivery_fee: u64,
    #[serde(default)]
    pub vehicle_requirement: Option<VehicleType>,
    pub created_at: DateTime<Utc>,
    pub status: OrderStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderHistoryEntry {
    pub status: OrderStatus,
    pub reason: Option<String>,
    pub actor: Option<String>,
}

#[async_trait]
pub trait OrderService: Send + Sync {
    async fn get_order(&self, id: Uuid) -> Result<OrderSnapshot, AppError>;

    async fn set_order_status(
        &self,
        id: Uuid,
        status: OrderStatus,
        entry: OrderHistoryEntry,
    ) -> Result<(), AppError>;

    async fn append_order_history(&self, id: Uuid, entry: OrderHistoryEntry)
        -> Result<(), AppError>;
}

#[derive(Debug, Clone)]
struct OrderRecord {
    snapshot: OrderSnapshot,
    history: Vec<OrderHistoryEntry>,
}

#[derive(Debug, Default)]
pub struct InMemoryOrders {
    orders: DashMap<Uuid, OrderRecord>,
}

impl InMemoryOrders {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, snapshot: OrderSnapshot) {
        self.orders.insert(
            snapshot.id,
            OrderRecord {
                snapshot,
                history: Vec::new(),
            },
        );
    }

    pub fn history(&self, id: Uuid) -> Vec<OrderHistoryEntry> {
        self.orders
            .get(&id)
            .map(|record| record.history.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl OrderService for InMemoryOrders {
    async fn get_order(&self, id: Uuid) -> Result<OrderSnapshot, AppError> {
        self.orders
            .get(&id)
            .map(|record| record.snapshot.clone())
            .ok_or_else(|| AppError::NotFound(format!("order {id} not found")))
    }

    async fn set_order_status(
        &self,
        id: Uuid,
        status: OrderStatus,
        entry: OrderHistoryEntry,
    ) -> Result<(), AppError> {
        let mut record = self
            .orders
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("order {id} not found")))?;
        record.snapshot.status = status;
        record.history.push(entry);
        Ok(())
    }

    async fn append_order_history(
        &self,
        id: Uuid,
        entry: OrderHistoryEntry,
    ) -> Result<(), AppError> {
        let mut record = self
            .orders
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("order {id} not found")))?;
        record.history.push(entry);
        Ok(())
    }
}
