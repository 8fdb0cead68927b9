use chrono::NaiveDate;
use dashmap::mapref::entry::Entry;
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::document::{DocumentType, DriverDocument};
use crate::models::order::VehicleType;
use crate::models::truck::{Truck, TruckType};
use crate::models::user::{Actor, Role};
use crate::state::AppState;

fn default_active() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct TruckInput {
    pub license_plate: String,
    pub model: String,
    pub year: u16,
    pub truck_type: TruckType,
    pub max_weight: f64,
    pub length: f64,
    pub tachograph_expiry: NaiveDate,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TruckPatch {
    pub license_plate: Option<String>,
    pub model: Option<String>,
    pub year: Option<u16>,
    pub truck_type: Option<TruckType>,
    pub max_weight: Option<f64>,
    pub length: Option<f64>,
    pub tachograph_expiry: Option<NaiveDate>,
    pub is_active: Option<bool>,
}

impl From<TruckInput> for TruckPatch {
    fn from(input: TruckInput) -> Self {
        Self {
            license_plate: Some(input.license_plate),
            model: Some(input.model),
            year: Some(input.year),
            truck_type: Some(input.truck_type),
            max_weight: Some(input.max_weight),
            length: Some(input.length),
            tachograph_expiry: Some(input.tachograph_expiry),
            is_active: Some(input.is_active),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DocumentInput {
    pub document_type: DocumentType,
    pub document_number: String,
    pub issue_date: NaiveDate,
    pub expiry_date: NaiveDate,
    #[serde(default)]
    pub image: Option<String>,
}

fn require_admin(actor: &Actor) -> Result<(), AppError> {
    if actor.is_admin() {
        Ok(())
    } else {
        Err(AppError::Forbidden("fleet changes require an administrator".to_string()))
    }
}

fn require_driver(actor: &Actor) -> Result<(), AppError> {
    if actor.role == Role::Driver {
        Ok(())
    } else {
        Err(AppError::Forbidden("documents belong to drivers".to_string()))
    }
}

fn normalize_plate(raw: &str) -> Result<String, AppError> {
    let plate = raw.trim().to_ascii_uppercase();
    if plate.is_empty() || plate.len() > 20 {
        return Err(AppError::validation(
            "license_plate",
            "license plate must be 1-20 characters",
        ));
    }
    Ok(plate)
}

fn validate_dimensions(max_weight: f64, length: f64) -> Result<(), AppError> {
    if !(max_weight.is_finite() && max_weight > 0.0) {
        return Err(AppError::validation("max_weight", "max weight must be positive"));
    }
    if !(length.is_finite() && length > 0.0) {
        return Err(AppError::validation("length", "length must be positive"));
    }
    Ok(())
}

fn claim_plate(state: &AppState, plate: &str, id: Uuid) -> Result<(), AppError> {
    match state.license_plates.entry(plate.to_string()) {
        Entry::Vacant(slot) => {
            slot.insert(id);
            Ok(())
        }
        Entry::Occupied(holder) if *holder.get() == id => Ok(()),
        Entry::Occupied(_) => Err(AppError::validation(
            "license_plate",
            format!("truck with license plate {plate} already exists"),
        )),
    }
}

pub fn list_trucks(state: &AppState) -> Vec<Truck> {
    let mut trucks: Vec<Truck> = state.trucks.iter().map(|entry| entry.value().clone()).collect();
    trucks.sort_by_key(|truck| truck.seq);
    trucks
}

pub fn get_truck(state: &AppState, id: Uuid) -> Result<Truck, AppError> {
    state
        .trucks
        .get(&id)
        .map(|truck| truck.value().clone())
        .ok_or_else(|| AppError::NotFound(format!("truck {id} not found")))
}

pub fn create_truck(state: &AppState, actor: &Actor, input: TruckInput) -> Result<Truck, AppError> {
    require_admin(actor)?;
    let plate = normalize_plate(&input.license_plate)?;
    validate_dimensions(input.max_weight, input.length)?;

    let id = Uuid::new_v4();
    claim_plate(state, &plate, id)?;

    let truck = Truck {
        id,
        license_plate: plate,
        model: input.model.trim().to_string(),
        year: input.year,
        truck_type: input.truck_type,
        max_weight: input.max_weight,
        length: input.length,
        tachograph_expiry: input.tachograph_expiry,
        is_active: input.is_active,
        assigned_driver: None,
        seq: state.next_seq(),
    };
    state.trucks.insert(id, truck.clone());

    info!(truck_id = %id, license_plate = %truck.license_plate, "truck registered");
    Ok(truck)
}

pub fn update_truck(
    state: &AppState,
    actor: &Actor,
    id: Uuid,
    patch: TruckPatch,
) -> Result<Truck, AppError> {
    require_admin(actor)?;
    let current = get_truck(state, id)?;

    let plate = match patch.license_plate.as_deref() {
        Some(raw) => normalize_plate(raw)?,
        None => current.license_plate.clone(),
    };
    validate_dimensions(
        patch.max_weight.unwrap_or(current.max_weight),
        patch.length.unwrap_or(current.length),
    )?;
    if plate != current.license_plate {
        claim_plate(state, &plate, id)?;
        state.license_plates.remove(&current.license_plate);
    }

    let mut truck = state
        .trucks
        .get_mut(&id)
        .ok_or_else(|| AppError::NotFound(format!("truck {id} not found")))?;
    truck.license_plate = plate;
    if let Some(model) = patch.model {
        truck.model = model.trim().to_string();
    }
    if let Some(year) = patch.year {
        truck.year = year;
    }
    if let Some(truck_type) = patch.truck_type {
        truck.truck_type = truck_type;
    }
    if let Some(max_weight) = patch.max_weight {
        truck.max_weight = max_weight;
    }
    if let Some(length) = patch.length {
        truck.length = length;
    }
    if let Some(expiry) = patch.tachograph_expiry {
        truck.tachograph_expiry = expiry;
    }
    if let Some(active) = patch.is_active {
        truck.is_active = active;
    }

    Ok(truck.clone())
}

pub fn delete_truck(state: &AppState, actor: &Actor, id: Uuid) -> Result<(), AppError> {
    require_admin(actor)?;
    let (_, truck) = state
        .trucks
        .remove(&id)
        .ok_or_else(|| AppError::NotFound(format!("truck {id} not found")))?;
    state.license_plates.remove(&truck.license_plate);

    if let Some(driver) = truck.assigned_driver {
        if let Some(mut user) = state.users.get_mut(&driver) {
            if let Some(profile) = user.driver.as_mut().filter(|p| p.assigned_truck == Some(id)) {
                profile.assigned_truck = None;
            }
        }
    }

    info!(truck_id = %id, "truck removed");
    Ok(())
}

/// Gives the driver the first free active truck serving `vehicle` unless one is already held.
///
/// Returns the driver's truck after the call, `None` when no suitable truck is free.
pub fn ensure_truck_for(
    state: &AppState,
    driver: Uuid,
    vehicle: VehicleType,
) -> Result<Option<Uuid>, AppError> {
    let held = state
        .users
        .get(&driver)
        .ok_or_else(|| AppError::NotFound(format!("driver {driver} not found")))?
        .driver
        .as_ref()
        .ok_or_else(|| AppError::Internal(format!("user {driver} has no driver profile")))?
        .assigned_truck;
    if held.is_some() {
        return Ok(held);
    }

    let mut candidates: Vec<(u64, Uuid)> = state
        .trucks
        .iter()
        .filter(|entry| {
            let truck = entry.value();
            truck.is_active && truck.assigned_driver.is_none() && truck.truck_type.serves(vehicle)
        })
        .map(|entry| (entry.seq, entry.id))
        .collect();
    candidates.sort();

    let claimed = candidates.into_iter().find_map(|(_, id)| {
        let mut truck = state.trucks.get_mut(&id)?;
        if truck.is_active && truck.assigned_driver.is_none() {
            truck.assigned_driver = Some(driver);
            Some(id)
        } else {
            None
        }
    });

    let Some(truck_id) = claimed else {
        state
            .metrics
            .truck_assignments_total
            .with_label_values(&["unavailable"])
            .inc();
        warn!(driver_id = %driver, vehicle = ?vehicle, "no free truck for vehicle type");
        return Ok(None);
    };

    let winner = {
        let mut user = state
            .users
            .get_mut(&driver)
            .ok_or_else(|| AppError::NotFound(format!("driver {driver} not found")))?;
        match user.driver.as_mut() {
            Some(profile) if profile.assigned_truck.is_none() => {
                profile.assigned_truck = Some(truck_id);
                truck_id
            }
            Some(profile) => profile.assigned_truck.unwrap_or(truck_id),
            None => truck_id,
        }
    };

    // a concurrent acceptance by the same driver got there first
    if winner != truck_id {
        if let Some(mut truck) = state.trucks.get_mut(&truck_id) {
            truck.assigned_driver = None;
        }
    }

    state
        .metrics
        .truck_assignments_total
        .with_label_values(&["assigned"])
        .inc();
    info!(driver_id = %driver, truck_id = %winner, "truck assigned to driver");
    Ok(Some(winner))
}

pub fn documents_of(state: &AppState, owner: Uuid) -> Vec<DriverDocument> {
    let mut documents: Vec<DriverDocument> = state
        .documents
        .iter()
        .filter(|entry| entry.owner == owner)
        .map(|entry| entry.value().clone())
        .collect();
    documents.sort_by(|a, b| {
        a.issue_date
            .cmp(&b.issue_date)
            .then_with(|| a.document_number.cmp(&b.document_number))
    });
    documents
}

fn validate_document(input: &DocumentInput) -> Result<(), AppError> {
    if input.document_number.trim().is_empty() {
        return Err(AppError::validation("document_number", "document number is required"));
    }
    if input.expiry_date < input.issue_date {
        return Err(AppError::validation(
            "expiry_date",
            "expiry date cannot precede issue date",
        ));
    }
    Ok(())
}

pub fn list_documents(state: &AppState, actor: &Actor) -> Result<Vec<DriverDocument>, AppError> {
    require_driver(actor)?;
    Ok(documents_of(state, actor.id))
}

pub fn get_document(state: &AppState, actor: &Actor, id: Uuid) -> Result<DriverDocument, AppError> {
    require_driver(actor)?;
    state
        .documents
        .get(&id)
        .filter(|document| document.owner == actor.id)
        .map(|document| document.value().clone())
        .ok_or_else(|| AppError::NotFound(format!("document {id} not found")))
}

pub fn create_document(
    state: &AppState,
    actor: &Actor,
    input: DocumentInput,
) -> Result<DriverDocument, AppError> {
    require_driver(actor)?;
    validate_document(&input)?;

    let document = DriverDocument {
        id: Uuid::new_v4(),
        owner: actor.id,
        document_type: input.document_type,
        document_number: input.document_number.trim().to_string(),
        issue_date: input.issue_date,
        expiry_date: input.expiry_date,
        image: input.image,
    };
    state.documents.insert(document.id, document.clone());
    Ok(document)
}

pub fn replace_document(
    state: &AppState,
    actor: &Actor,
    id: Uuid,
    input: DocumentInput,
) -> Result<DriverDocument, AppError> {
    require_driver(actor)?;
    validate_document(&input)?;

    let mut document = state
        .documents
        .get_mut(&id)
        .filter(|document| document.owner == actor.id)
        .ok_or_else(|| AppError::NotFound(format!("document {id} not found")))?;
    document.document_type = input.document_type;
    document.document_number = input.document_number.trim().to_string();
    document.issue_date = input.issue_date;
    document.expiry_date = input.expiry_date;
    document.image = input.image;

    Ok(document.clone())
}

pub fn delete_document(state: &AppState, actor: &Actor, id: Uuid) -> Result<(), AppError> {
    require_driver(actor)?;
    state
        .documents
        .remove_if(&id, |_, document| document.owner == actor.id)
        .map(|_| ())
        .ok_or_else(|| AppError::NotFound(format!("document {id} not found")))
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::engine::fixtures;

    fn truck_input(plate: &str, truck_type: TruckType) -> TruckInput {
        TruckInput {
            license_plate: plate.to_string(),
            model: "Volvo FH16".to_string(),
            year: 2021,
            truck_type,
            max_weight: 20_000.0,
            length: 13.6,
            tachograph_expiry: NaiveDate::from_ymd_opt(2027, 1, 1).unwrap(),
            is_active: true,
        }
    }

    #[test]
    fn license_plates_are_unique_case_insensitively() {
        let state = fixtures::state();
        let admin = fixtures::admin(&state);
        create_truck(&state, &admin, truck_input("123 abc 02", TruckType::Truck)).unwrap();
        let err = create_truck(&state, &admin, truck_input("123 ABC 02", TruckType::Van)).unwrap_err();
        assert!(matches!(err, AppError::Validation { ref field, .. } if field == "license_plate"));
    }

    #[test]
    fn only_admins_manage_trucks() {
        let state = fixtures::state();
        let customer = fixtures::customer(&state, "kaysar");
        let err = create_truck(&state, &customer, truck_input("A1", TruckType::Truck)).unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[test]
    fn auto_assignment_picks_first_active_matching_truck() {
        let state = fixtures::state();
        let admin = fixtures::admin(&state);
        let driver = fixtures::driver(&state, "trucker");

        create_truck(&state, &admin, truck_input("VAN-1", TruckType::Van)).unwrap();
        let mut inactive = truck_input("TRK-0", TruckType::Truck);
        inactive.is_active = false;
        create_truck(&state, &admin, inactive).unwrap();
        let first = create_truck(&state, &admin, truck_input("TRK-1", TruckType::Truck)).unwrap();
        create_truck(&state, &admin, truck_input("TRK-2", TruckType::Truck)).unwrap();

        let assigned = ensure_truck_for(&state, driver.id, VehicleType::Truck).unwrap();
        assert_eq!(assigned, Some(first.id));
        assert_eq!(get_truck(&state, first.id).unwrap().assigned_driver, Some(driver.id));

        // already holding a truck: no second assignment
        let again = ensure_truck_for(&state, driver.id, VehicleType::Truck).unwrap();
        assert_eq!(again, Some(first.id));
        assert_eq!(
            list_trucks(&state)
                .iter()
                .filter(|truck| truck.assigned_driver.is_some())
                .count(),
            1
        );
    }

    #[test]
    fn assignment_reports_none_without_matching_truck() {
        let state = fixtures::state();
        let admin = fixtures::admin(&state);
        let driver = fixtures::driver(&state, "trucker");
        create_truck(&state, &admin, truck_input("VAN-1", TruckType::Van)).unwrap();

        assert_eq!(
            ensure_truck_for(&state, driver.id, VehicleType::Refrigerated).unwrap(),
            None
        );
    }

    #[test]
    fn deleting_truck_clears_driver_assignment() {
        let state = fixtures::state();
        let admin = fixtures::admin(&state);
        let driver = fixtures::driver(&state, "trucker");
        let truck = create_truck(&state, &admin, truck_input("TRK-1", TruckType::Truck)).unwrap();
        ensure_truck_for(&state, driver.id, VehicleType::Truck).unwrap();

        delete_truck(&state, &admin, truck.id).unwrap();

        let user = state.users.get(&driver.id).unwrap();
        assert_eq!(user.driver.as_ref().unwrap().assigned_truck, None);
        assert!(!state.license_plates.contains_key("TRK-1"));
    }

    #[test]
    fn documents_are_private_to_their_driver() {
        let state = fixtures::state();
        let owner = fixtures::driver(&state, "owner");
        let other = fixtures::driver(&state, "other");
        let input = DocumentInput {
            document_type: DocumentType::DriverLicense,
            document_number: "KZ-123456".to_string(),
            issue_date: NaiveDate::from_ymd_opt(2020, 5, 1).unwrap(),
            expiry_date: NaiveDate::from_ymd_opt(2030, 5, 1).unwrap(),
            image: None,
        };

        let document = create_document(&state, &owner, input.clone()).unwrap();
        assert_eq!(list_documents(&state, &owner).unwrap().len(), 1);
        assert!(list_documents(&state, &other).unwrap().is_empty());
        assert!(matches!(
            get_document(&state, &other, document.id),
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            delete_document(&state, &other, document.id),
            Err(AppError::NotFound(_))
        ));
        delete_document(&state, &owner, document.id).unwrap();
        assert!(list_documents(&state, &owner).unwrap().is_empty());
    }

    #[test]
    fn expiry_before_issue_is_rejected() {
        let state = fixtures::state();
        let driver = fixtures::driver(&state, "owner");
        let err = create_document(
            &state,
            &driver,
            DocumentInput {
                document_type: DocumentType::IdCard,
                document_number: "ID-1".to_string(),
                issue_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
                expiry_date: NaiveDate::from_ymd_opt(2023, 1, 1).unwrap(),
                image: None,
            },
        )
        .unwrap_err();
        assert!(matches!(err, AppError::Validation { ref field, .. } if field == "expiry_date"));
    }
}
