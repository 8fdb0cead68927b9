use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VehicleType {
    Truck,
    Van,
    Refrigerated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProductType {
    Electronics,
    Food,
    Furniture,
    Construction,
    Pharmaceuticals,
    Clothing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OrderStatus {
    New,
    InProgress,
    Completed,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::New => "new",
            OrderStatus::InProgress => "in-progress",
            OrderStatus::Completed => "completed",
            OrderStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub order_id: String,
    pub customer: Uuid,
    pub driver: Option<Uuid>,
    pub origin: u32,
    pub destination: u32,
    pub vehicle_type: VehicleType,
    pub product_type: ProductType,
    pub weight: String,
    pub price: f64,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub estimated_arrival: Option<NaiveDate>,
    pub delivered_on: Option<DateTime<Utc>>,
    pub reason: Option<String>,
    /// Insertion sequence, breaks ties between equal creation times.
    #[serde(skip)]
    pub seq: u64,
}

/// Formats the business-facing order code, e.g. `ORD-00042`.
pub fn order_code(number: u64) -> String {
    format!("ORD-{number:05}")
}
