use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::Json;
use axum::Router;

use crate::api::rest::extract::PathParam;
use crate::error::AppError;
use crate::models::location::Location;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/locations", get(list_locations))
        .route("/locations/:id", get(get_location))
}

async fn list_locations(State(state): State<Arc<AppState>>) -> Json<Vec<Location>> {
    let mut locations: Vec<Location> = state
        .locations
        .iter()
        .map(|entry| entry.value().clone())
        .collect();
    locations.sort_by_key(|location| location.id);
    Json(locations)
}

async fn get_location(
    State(state): State<Arc<AppState>>,
    PathParam(id): PathParam<u32>,
) -> Result<Json<Location>, AppError> {
    let location = state
        .locations
        .get(&id)
        .ok_or_else(|| AppError::NotFound(format!("location {id} not found")))?;

    Ok(Json(location.value().clone()))
}
