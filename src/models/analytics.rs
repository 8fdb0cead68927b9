use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AnalyticsKey {
    pub user: Uuid,
    pub month_year: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Analytics {
    pub user_id: Uuid,
    pub month_year: String,
    pub total_orders: u64,
    pub completed_orders: u64,
    pub total_distance: f64,
    pub total_revenue: f64,
    pub average_rating: f64,
}

impl Analytics {
    pub fn empty(user_id: Uuid, month_year: String) -> Self {
        Self {
            user_id,
            month_year,
            total_orders: 0,
            completed_orders: 0,
            total_distance: 0.0,
            total_revenue: 0.0,
            average_rating: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AnalyticsEvent {
    OrderCreated,
    OrderCompleted { distance_km: f64, revenue: f64 },
}
