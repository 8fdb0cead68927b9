use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    IdCard,
    DriverLicense,
    TruckLicense,
    Other,
}

impl DocumentType {
    pub fn display_name(self) -> &'static str {
        match self {
            DocumentType::IdCard => "ID Card",
            DocumentType::DriverLicense => "Driver's License",
            DocumentType::TruckLicense => "Truck License",
            DocumentType::Other => "Other",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverDocument {
    pub id: Uuid,
    pub owner: Uuid,
    pub document_type: DocumentType,
    pub document_number: String,
    pub issue_date: NaiveDate,
    pub expiry_date: NaiveDate,
    pub image: Option<String>,
}
