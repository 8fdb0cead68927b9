use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::Json;
use axum::Router;
use chrono::Utc;

use crate::api::rest::extract::Authenticated;
use crate::engine::analytics;
use crate::error::AppError;
use crate::models::analytics::Analytics;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/analytics", get(own_analytics))
        .route("/admin/analytics", get(all_analytics))
}

async fn own_analytics(
    State(state): State<Arc<AppState>>,
    Authenticated { actor, .. }: Authenticated,
) -> Json<Vec<Analytics>> {
    Json(analytics::own_rollups(&state, &actor, Utc::now()))
}

async fn all_analytics(
    State(state): State<Arc<AppState>>,
    Authenticated { actor, .. }: Authenticated,
) -> Result<Json<Vec<Analytics>>, AppError> {
    Ok(Json(analytics::all_rollups(&state, &actor, Utc::now())?))
}
