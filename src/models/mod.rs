pub mod analytics;
pub mod document;
pub mod location;
pub mod order;
pub mod tracking;
pub mod truck;
pub mod user;
