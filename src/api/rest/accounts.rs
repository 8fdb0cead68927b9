use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use chrono::Utc;

use crate::api::rest::extract::{Authenticated, JsonBody};
use crate::engine::accounts::{
    self, Credentials, DriverCredentials, DriverProfileView, NewCustomer, NewDriver,
    ProfileUpdate, Session,
};
use crate::error::AppError;
use crate::models::user::User;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/register", post(register))
        .route("/register/driver", post(register_driver))
        .route("/login", post(login))
        .route("/logout", post(logout))
        .route(
            "/profile",
            get(get_profile).put(replace_profile).patch(patch_profile),
        )
        .route("/driver/profile", get(driver_profile))
}

async fn register(
    State(state): State<Arc<AppState>>,
    JsonBody(payload): JsonBody<NewCustomer>,
) -> Result<(StatusCode, Json<User>), AppError> {
    let user = accounts::register_customer(&state, payload)?;
    Ok((StatusCode::CREATED, Json(user)))
}

async fn register_driver(
    State(state): State<Arc<AppState>>,
    Authenticated { actor, .. }: Authenticated,
    JsonBody(payload): JsonBody<NewDriver>,
) -> Result<(StatusCode, Json<DriverCredentials>), AppError> {
    let credentials = accounts::register_driver(&state, &actor, payload)?;
    Ok((StatusCode::CREATED, Json(credentials)))
}

async fn login(
    State(state): State<Arc<AppState>>,
    JsonBody(payload): JsonBody<Credentials>,
) -> Result<Json<Session>, AppError> {
    Ok(Json(accounts::login(&state, payload)?))
}

async fn logout(
    State(state): State<Arc<AppState>>,
    Authenticated { token, .. }: Authenticated,
) -> StatusCode {
    accounts::logout(&state, &token);
    StatusCode::NO_CONTENT
}

async fn get_profile(
    State(state): State<Arc<AppState>>,
    Authenticated { actor, .. }: Authenticated,
) -> Result<Json<User>, AppError> {
    Ok(Json(accounts::get_user(&state, actor.id)?))
}

async fn replace_profile(
    State(state): State<Arc<AppState>>,
    Authenticated { actor, .. }: Authenticated,
    JsonBody(payload): JsonBody<ProfileUpdate>,
) -> Result<Json<User>, AppError> {
    Ok(Json(accounts::update_profile(&state, &actor, payload, true)?))
}

async fn patch_profile(
    State(state): State<Arc<AppState>>,
    Authenticated { actor, .. }: Authenticated,
    JsonBody(payload): JsonBody<ProfileUpdate>,
) -> Result<Json<User>, AppError> {
    Ok(Json(accounts::update_profile(&state, &actor, payload, false)?))
}

async fn driver_profile(
    State(state): State<Arc<AppState>>,
    Authenticated { actor, .. }: Authenticated,
) -> Result<Json<DriverProfileView>, AppError> {
    Ok(Json(accounts::driver_profile(&state, &actor, Utc::now())?))
}
