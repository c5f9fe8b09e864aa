use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::delivery::{Delivery, DeliveryStatus};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryEvent {
    pub delivery_id: Uuid,
    pub order_id: Uuid,
    pub rider_id: Option<Uuid>,
    pub status: DeliveryStatus,
    pub note: Option<String>,
    pub at: DateTime<Utc>,
}

impl DeliveryEvent {
    pub fn from_delivery(delivery: &Delivery) -> Self {
        let last = delivery.status_history.last();
        Self {
            delivery_id: delivery.id,
            order_id: delivery.order_id,
            rider_id: delivery.rider_id,
            status: delivery.status,
            note: last.and_then(|entry| entry.note.clone()),
            at: last.map(|entry| entry.at).unwrap_or(delivery.updated_at),
        }
    }
}
