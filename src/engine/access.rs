//! Role-based scoping of orders and tracking points.
//!
//! Every read of orders or tracking goes through here so the visibility rules
//! for customers, drivers and administrators live in one place.

use std::collections::HashSet;

use uuid::Uuid;

use crate::error::AppError;
use crate::models::order::{Order, OrderStatus};
use crate::models::tracking::TrackingPoint;
use crate::models::user::{Actor, Role};
use crate::state::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderScope {
    All,
    DrivenBy(Uuid),
    OwnedBy(Uuid),
}

impl OrderScope {
    pub fn for_actor(actor: &Actor) -> Self {
        match actor.role {
            Role::Admin => OrderScope::All,
            Role::Driver => OrderScope::DrivenBy(actor.id),
            Role::Customer => OrderScope::OwnedBy(actor.id),
        }
    }

    pub fn admits(&self, order: &Order) -> bool {
        match self {
            OrderScope::All => true,
            OrderScope::DrivenBy(driver) => order.driver == Some(*driver),
            OrderScope::OwnedBy(customer) => order.customer == *customer,
        }
    }
}

/// The order's customer, its driver, or any administrator.
pub fn is_participant(actor: &Actor, order: &Order) -> bool {
    actor.is_admin() || order.customer == actor.id || order.driver == Some(actor.id)
}

pub fn ensure_participant(actor: &Actor, order: &Order) -> Result<(), AppError> {
    if is_participant(actor, order) {
        Ok(())
    } else {
        Err(AppError::Forbidden(format!(
            "not a participant of order {}",
            order.order_id
        )))
    }
}

/// Newest first; equal creation times keep insertion order.
pub fn sort_newest_first(orders: &mut [Order]) {
    orders.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.seq.cmp(&b.seq)));
}

fn collect_orders(state: &AppState, keep: impl Fn(&Order) -> bool) -> Vec<Order> {
    let mut orders: Vec<Order> = state
        .orders
        .iter()
        .filter(|entry| keep(entry.value()))
        .map(|entry| entry.value().clone())
        .collect();
    sort_newest_first(&mut orders);
    orders
}

pub fn visible_orders(state: &AppState, actor: &Actor, status: Option<OrderStatus>) -> Vec<Order> {
    let scope = OrderScope::for_actor(actor);
    collect_orders(state, |order| {
        scope.admits(order) && status.is_none_or(|wanted| order.status == wanted)
    })
}

/// Unclaimed work: `new` orders without a driver. Customers are not offered work.
pub fn available_orders(state: &AppState, actor: &Actor) -> Result<Vec<Order>, AppError> {
    if actor.role == Role::Customer {
        return Err(AppError::Forbidden(
            "available orders are only listed for drivers".to_string(),
        ));
    }
    Ok(collect_orders(state, |order| {
        order.status == OrderStatus::New && order.driver.is_none()
    }))
}

/// The caller's scope without orders that were never picked up.
pub fn order_history(state: &AppState, actor: &Actor) -> Vec<Order> {
    let scope = OrderScope::for_actor(actor);
    collect_orders(state, |order| {
        scope.admits(order) && order.status != OrderStatus::New
    })
}

/// Looks up an order by internal id; orders outside the caller's scope are reported as missing.
pub fn visible_order(state: &AppState, actor: &Actor, id: Uuid) -> Result<Order, AppError> {
    let scope = OrderScope::for_actor(actor);
    state
        .orders
        .get(&id)
        .filter(|order| scope.admits(order))
        .map(|order| order.value().clone())
        .ok_or_else(|| AppError::NotFound(format!("order {id} not found")))
}

pub fn order_by_code(state: &AppState, code: &str) -> Result<Order, AppError> {
    let id = state
        .order_codes
        .get(code)
        .map(|entry| *entry.value())
        .ok_or_else(|| AppError::NotFound(format!("order {code} not found")))?;

    state
        .orders
        .get(&id)
        .map(|order| order.value().clone())
        .ok_or_else(|| AppError::NotFound(format!("order {code} not found")))
}

/// Tracking points of orders inside the caller's scope, newest first.
pub fn visible_tracking(
    state: &AppState,
    actor: &Actor,
    order: Option<Uuid>,
) -> Vec<TrackingPoint> {
    let scope = OrderScope::for_actor(actor);
    let visible: HashSet<Uuid> = state
        .orders
        .iter()
        .filter(|entry| scope.admits(entry.value()))
        .map(|entry| *entry.key())
        .collect();

    let mut points: Vec<TrackingPoint> = state
        .tracking
        .iter()
        .filter(|entry| visible.contains(entry.key()))
        .filter(|entry| order.is_none_or(|wanted| *entry.key() == wanted))
        .flat_map(|entry| entry.value().clone())
        .collect();
    points.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    points
}
