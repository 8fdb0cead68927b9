use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingPoint {
    pub id: Uuid,
    pub order: Uuid,
    pub latitude: f64,
    pub longitude: f64,
    pub timestamp: DateTime<Utc>,
    pub progress: u8,
}

/// Snapshot returned by the latest-tracking endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct LatestTracking {
    pub latitude: f64,
    pub longitude: f64,
    pub timestamp: DateTime<Utc>,
    pub progress: u8,
}

impl From<&TrackingPoint> for LatestTracking {
    fn from(point: &TrackingPoint) -> Self {
        Self {
            latitude: point.latitude,
            longitude: point.longitude,
            timestamp: point.timestamp,
            progress: point.progress,
        }
    }
}
