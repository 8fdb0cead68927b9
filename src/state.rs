use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use uuid::Uuid;

use crate::config::Config;
use crate::geo::DistanceMode;
use crate::models::analytics::{Analytics, AnalyticsKey};
use crate::models::document::DriverDocument;
use crate::models::location::{Location, SEED_CITIES};
use crate::models::order::Order;
use crate::models::tracking::TrackingPoint;
use crate::models::truck::Truck;
use crate::models::user::User;
use crate::observability::metrics::Metrics;

#[derive(Debug, Clone, Copy)]
pub struct Settings {
    pub distance_mode: DistanceMode,
    pub analytics_window_months: u32,
    pub admin_analytics_window_months: u32,
}

impl From<&Config> for Settings {
    fn from(config: &Config) -> Self {
        Self {
            distance_mode: config.distance_mode,
            analytics_window_months: config.analytics_window_months,
            admin_analytics_window_months: config.admin_analytics_window_months,
        }
    }
}

pub struct AppState {
    pub users: DashMap<Uuid, User>,
    pub usernames: DashMap<String, Uuid>,
    pub emails: DashMap<String, Uuid>,
    pub sessions: DashMap<String, Uuid>,
    pub locations: DashMap<u32, Location>,
    pub orders: DashMap<Uuid, Order>,
    pub order_codes: DashMap<String, Uuid>,
    pub tracking: DashMap<Uuid, Vec<TrackingPoint>>,
    pub analytics: DashMap<AnalyticsKey, Analytics>,
    pub trucks: DashMap<Uuid, Truck>,
    pub license_plates: DashMap<String, Uuid>,
    pub documents: DashMap<Uuid, DriverDocument>,
    pub settings: Settings,
    pub metrics: Metrics,
    sequence: AtomicU64,
    order_numbers: AtomicU64,
}

impl AppState {
    pub fn new(settings: Settings) -> Self {
        let state = Self {
            users: DashMap::new(),
            usernames: DashMap::new(),
            emails: DashMap::new(),
            sessions: DashMap::new(),
            locations: DashMap::new(),
            orders: DashMap::new(),
            order_codes: DashMap::new(),
            tracking: DashMap::new(),
            analytics: DashMap::new(),
            trucks: DashMap::new(),
            license_plates: DashMap::new(),
            documents: DashMap::new(),
            settings,
            metrics: Metrics::new(),
            sequence: AtomicU64::new(0),
            order_numbers: AtomicU64::new(0),
        };
        state.seed_locations();
        state
    }

    /// Monotonic insertion counter shared by every collection that needs a stable order.
    pub fn next_seq(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn next_order_number(&self) -> u64 {
        self.order_numbers.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn seed_locations(&self) {
        for (name, latitude, longitude) in SEED_CITIES {
            if self.locations.iter().any(|entry| entry.name == name) {
                continue;
            }
            let id = self.locations.len() as u32 + 1;
            self.locations.insert(
                id,
                Location {
                    id,
                    name: name.to_string(),
                    latitude,
                    longitude,
                },
            );
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new(Settings::from(&Config::default()))
    }
}
