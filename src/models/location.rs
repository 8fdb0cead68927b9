use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub id: u32,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
}

/// Cities seeded at startup, with ids 1..=13 in this order.
pub const SEED_CITIES: [(&str, f64, f64); 13] = [
    ("Almaty", 43.238949, 76.889709),
    ("Nur-Sultan", 51.169392, 71.449074),
    ("Shymkent", 42.315514, 69.586907),
    ("Karaganda", 49.807754, 73.088504),
    ("Taraz", 42.900799, 71.378102),
    ("Atyrau", 47.095585, 51.877508),
    ("Aktau", 43.635921, 51.198199),
    ("Aktobe", 50.300374, 57.154882),
    ("Oral", 51.227821, 51.386104),
    ("Pavlodar", 52.285577, 76.940947),
    ("Semey", 50.413728, 80.258585),
    ("Oskemen", 49.948027, 82.627949),
    ("Kyzylorda", 44.853108, 65.498416),
];
