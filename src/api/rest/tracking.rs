use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::Json;
use axum::Router;
use serde::Deserialize;
use uuid::Uuid;

use crate::api::rest::extract::{Authenticated, JsonBody, PathParam, QueryFilter, QueryParams};
use crate::engine::tracking::{self, NewTrackingPoint};
use crate::error::AppError;
use crate::models::tracking::{LatestTracking, TrackingPoint};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/tracking", get(list_points).post(append_point))
        .route("/tracking/:id", get(get_point))
        .route("/order-tracking/:order_id", get(latest_tracking))
}

#[derive(Deserialize)]
pub struct TrackingFilter {
    pub order: Option<Uuid>,
}

impl QueryFilter for TrackingFilter {
    const FIELD: &'static str = "order";
}

async fn list_points(
    State(state): State<Arc<AppState>>,
    Authenticated { actor, .. }: Authenticated,
    QueryParams(filter): QueryParams<TrackingFilter>,
) -> Json<Vec<TrackingPoint>> {
    Json(tracking::list_points(&state, &actor, filter.order))
}

async fn append_point(
    State(state): State<Arc<AppState>>,
    Authenticated { actor, .. }: Authenticated,
    JsonBody(payload): JsonBody<NewTrackingPoint>,
) -> Result<(StatusCode, Json<TrackingPoint>), AppError> {
    let point = tracking::append_point(&state, &actor, payload)?;
    Ok((StatusCode::CREATED, Json(point)))
}

async fn get_point(
    State(state): State<Arc<AppState>>,
    Authenticated { actor, .. }: Authenticated,
    PathParam(id): PathParam<Uuid>,
) -> Result<Json<TrackingPoint>, AppError> {
    Ok(Json(tracking::get_point(&state, &actor, id)?))
}

/// Seeds a point at the order's origin when none exists yet.
async fn latest_tracking(
    State(state): State<Arc<AppState>>,
    Authenticated { actor, .. }: Authenticated,
    PathParam(order_id): PathParam<String>,
) -> Result<Json<LatestTracking>, AppError> {
    let point = tracking::latest_or_seed(&state, &actor, &order_id)?;
    Ok(Json(LatestTracking::from(&point)))
}
