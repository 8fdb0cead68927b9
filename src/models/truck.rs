use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::order::VehicleType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TruckType {
    Truck,
    Van,
    Refrigerated,
    Tanker,
}

impl TruckType {
    pub fn serves(self, vehicle: VehicleType) -> bool {
        matches!(
            (self, vehicle),
            (TruckType::Truck, VehicleType::Truck)
                | (TruckType::Van, VehicleType::Van)
                | (TruckType::Refrigerated, VehicleType::Refrigerated)
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Truck {
    pub id: Uuid,
    pub license_plate: String,
    pub model: String,
    pub year: u16,
    pub truck_type: TruckType,
    pub max_weight: f64,
    pub length: f64,
    pub tachograph_expiry: NaiveDate,
    pub is_active: bool,
    pub assigned_driver: Option<Uuid>,
    #[serde(skip)]
    pub seq: u64,
}
