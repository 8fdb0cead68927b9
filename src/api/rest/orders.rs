use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::rest::extract::{Authenticated, JsonBody, PathParam, QueryFilter, QueryParams};
use crate::engine::access;
use crate::engine::lifecycle::{self, NewOrder, OrderEdit, OrderPatch, StatusChange};
use crate::error::AppError;
use crate::models::order::{Order, OrderStatus, ProductType, VehicleType};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/orders", get(list_orders).post(create_order))
        .route(
            "/orders/:id",
            get(get_order)
                .put(replace_order)
                .patch(patch_order)
                .delete(delete_order),
        )
        .route("/new-orders", get(available_orders))
        .route("/new-orders/:id/accept", post(accept_order))
        .route("/my-orders", get(my_orders))
        .route("/update-order-status/:order_id", post(update_order_status))
}

#[derive(Deserialize)]
pub struct OrderFilter {
    pub status: Option<OrderStatus>,
}

impl QueryFilter for OrderFilter {
    const FIELD: &'static str = "status";
}

#[derive(Serialize)]
pub struct OrderView {
    pub id: Uuid,
    pub order_id: String,
    pub customer_id: Uuid,
    pub customer_name: Option<String>,
    pub driver_id: Option<Uuid>,
    pub driver_name: Option<String>,
    pub origin: u32,
    pub origin_name: Option<String>,
    pub destination: u32,
    pub destination_name: Option<String>,
    pub vehicle_type: VehicleType,
    pub product_type: ProductType,
    pub weight: String,
    pub price: f64,
    pub status: OrderStatus,
    pub date: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub estimated_arrival: Option<NaiveDate>,
    pub delivered_on: Option<DateTime<Utc>>,
    pub reason: Option<String>,
    pub distance: f64,
}

#[derive(Serialize)]
pub struct StatusUpdated {
    pub status: &'static str,
    pub message: String,
    pub order: OrderView,
}

fn display_name(state: &AppState, user: Uuid) -> Option<String> {
    state.users.get(&user).map(|user| {
        let full_name = user.full_name();
        if full_name.is_empty() {
            user.username.clone()
        } else {
            full_name
        }
    })
}

fn location_name(state: &AppState, id: u32) -> Option<String> {
    state.locations.get(&id).map(|location| location.name.clone())
}

pub fn order_view(state: &AppState, order: Order) -> OrderView {
    OrderView {
        customer_name: display_name(state, order.customer),
        driver_name: order.driver.and_then(|driver| display_name(state, driver)),
        origin_name: location_name(state, order.origin),
        destination_name: location_name(state, order.destination),
        distance: lifecycle::order_distance(state, &order),
        date: order.created_at.format("%Y-%m-%d").to_string(),
        id: order.id,
        order_id: order.order_id,
        customer_id: order.customer,
        driver_id: order.driver,
        origin: order.origin,
        destination: order.destination,
        vehicle_type: order.vehicle_type,
        product_type: order.product_type,
        weight: order.weight,
        price: order.price,
        status: order.status,
        created_at: order.created_at,
        updated_at: order.updated_at,
        estimated_arrival: order.estimated_arrival,
        delivered_on: order.delivered_on,
        reason: order.reason,
    }
}

fn views(state: &AppState, orders: Vec<Order>) -> Vec<OrderView> {
    orders.into_iter().map(|order| order_view(state, order)).collect()
}

async fn list_orders(
    State(state): State<Arc<AppState>>,
    Authenticated { actor, .. }: Authenticated,
    QueryParams(filter): QueryParams<OrderFilter>,
) -> Json<Vec<OrderView>> {
    let orders = access::visible_orders(&state, &actor, filter.status);
    Json(views(&state, orders))
}

async fn create_order(
    State(state): State<Arc<AppState>>,
    Authenticated { actor, .. }: Authenticated,
    JsonBody(payload): JsonBody<NewOrder>,
) -> Result<(StatusCode, Json<OrderView>), AppError> {
    let order = lifecycle::create_order(&state, &actor, payload)?;
    Ok((StatusCode::CREATED, Json(order_view(&state, order))))
}

async fn get_order(
    State(state): State<Arc<AppState>>,
    Authenticated { actor, .. }: Authenticated,
    PathParam(id): PathParam<Uuid>,
) -> Result<Json<OrderView>, AppError> {
    let order = access::visible_order(&state, &actor, id)?;
    Ok(Json(order_view(&state, order)))
}

async fn replace_order(
    State(state): State<Arc<AppState>>,
    Authenticated { actor, .. }: Authenticated,
    PathParam(id): PathParam<Uuid>,
    JsonBody(payload): JsonBody<NewOrder>,
) -> Result<Json<OrderView>, AppError> {
    let order = lifecycle::edit_order(&state, &actor, id, OrderEdit::Replace(payload))?;
    Ok(Json(order_view(&state, order)))
}

async fn patch_order(
    State(state): State<Arc<AppState>>,
    Authenticated { actor, .. }: Authenticated,
    PathParam(id): PathParam<Uuid>,
    JsonBody(payload): JsonBody<OrderPatch>,
) -> Result<Json<OrderView>, AppError> {
    let order = lifecycle::edit_order(&state, &actor, id, OrderEdit::Patch(payload))?;
    Ok(Json(order_view(&state, order)))
}

async fn delete_order(
    State(state): State<Arc<AppState>>,
    Authenticated { actor, .. }: Authenticated,
    PathParam(id): PathParam<Uuid>,
) -> Result<StatusCode, AppError> {
    lifecycle::delete_order(&state, &actor, id)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn available_orders(
    State(state): State<Arc<AppState>>,
    Authenticated { actor, .. }: Authenticated,
) -> Result<Json<Vec<OrderView>>, AppError> {
    let orders = access::available_orders(&state, &actor)?;
    Ok(Json(views(&state, orders)))
}

async fn accept_order(
    State(state): State<Arc<AppState>>,
    Authenticated { actor, .. }: Authenticated,
    PathParam(id): PathParam<Uuid>,
) -> Result<Json<OrderView>, AppError> {
    let order = lifecycle::accept_order(&state, &actor, id)?;
    Ok(Json(order_view(&state, order)))
}

async fn my_orders(
    State(state): State<Arc<AppState>>,
    Authenticated { actor, .. }: Authenticated,
) -> Json<Vec<OrderView>> {
    let orders = access::order_history(&state, &actor);
    Json(views(&state, orders))
}

async fn update_order_status(
    State(state): State<Arc<AppState>>,
    Authenticated { actor, .. }: Authenticated,
    PathParam(order_id): PathParam<String>,
    JsonBody(payload): JsonBody<StatusChange>,
) -> Result<Json<StatusUpdated>, AppError> {
    let order = lifecycle::update_status(&state, &actor, &order_id, payload)?;
    Ok(Json(StatusUpdated {
        status: "success",
        message: format!("Order status updated to {}", order.status),
        order: order_view(&state, order),
    }))
}
