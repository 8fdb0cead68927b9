pub mod access;
pub mod accounts;
pub mod analytics;
pub mod fleet;
pub mod lifecycle;
pub mod tracking;

#[cfg(test)]
pub(crate) mod fixtures {
    use chrono::{NaiveDate, Utc};
    use uuid::Uuid;

    use crate::config::Config;
    use crate::engine::{fleet, lifecycle};
    use crate::models::order::{Order, ProductType, VehicleType};
    use crate::models::truck::{Truck, TruckType};
    use crate::models::user::{Actor, DriverProfile, Role, User};
    use crate::state::{AppState, Settings};

    pub fn settings() -> Settings {
        Settings::from(&Config::default())
    }

    pub fn state() -> AppState {
        AppState::new(settings())
    }

    fn user(state: &AppState, username: &str, role: Role) -> Actor {
        let user = User {
            id: Uuid::new_v4(),
            username: username.to_string(),
            email: format!("{username}@example.com"),
            first_name: username.to_string(),
            last_name: "Test".to_string(),
            role,
            phone: None,
            password_hash: super::accounts::hash_password("password123"),
            date_joined: Utc::now(),
            driver: (role == Role::Driver).then(DriverProfile::default),
        };
        super::accounts::insert_user(state, user)
            .expect("fixture user")
            .actor()
    }

    pub fn customer(state: &AppState, username: &str) -> Actor {
        user(state, username, Role::Customer)
    }

    pub fn driver(state: &AppState, username: &str) -> Actor {
        user(state, username, Role::Driver)
    }

    pub fn admin(state: &AppState) -> Actor {
        user(state, &format!("admin-{}", Uuid::new_v4().simple()), Role::Admin)
    }

    /// Almaty to Nur-Sultan by truck.
    pub fn new_order() -> lifecycle::NewOrder {
        lifecycle::NewOrder {
            origin: 1,
            destination: 2,
            vehicle_type: VehicleType::Truck,
            product_type: ProductType::Electronics,
            weight: "450kg".to_string(),
            price: 1200.0,
            estimated_arrival: NaiveDate::from_ymd_opt(2025, 7, 1),
        }
    }

    pub fn order(state: &AppState, customer: &Actor) -> Order {
        lifecycle::create_order(state, customer, new_order()).expect("fixture order")
    }

    pub fn truck(state: &AppState, plate: &str, truck_type: TruckType) -> Truck {
        let admin = admin(state);
        fleet::create_truck(
            state,
            &admin,
            fleet::TruckInput {
                license_plate: plate.to_string(),
                model: "MAN TGX".to_string(),
                year: 2020,
                truck_type,
                max_weight: 18_000.0,
                length: 12.0,
                tachograph_expiry: NaiveDate::from_ymd_opt(2027, 3, 1).expect("valid date"),
                is_active: true,
            },
        )
        .expect("fixture truck")
    }
}
