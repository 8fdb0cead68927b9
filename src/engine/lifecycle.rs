//! Order lifecycle: creation, claiming, status transitions and their side effects.
//!
//! ```text
//! new ──accept──▶ in-progress ──complete──▶ completed
//!  │                   │
//!  └──────cancel───────┴──────▶ cancelled
//! ```

use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::engine::{access, analytics, fleet};
use crate::error::AppError;
use crate::models::analytics::AnalyticsEvent;
use crate::models::order::{order_code, Order, OrderStatus, ProductType, VehicleType};
use crate::models::user::{Actor, Role};
use crate::state::AppState;

const MAX_WEIGHT_LEN: usize = 20;

#[derive(Debug, Clone, Deserialize)]
pub struct NewOrder {
    pub origin: u32,
    pub destination: u32,
    pub vehicle_type: VehicleType,
    pub product_type: ProductType,
    pub weight: String,
    pub price: f64,
    #[serde(default)]
    pub estimated_arrival: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OrderPatch {
    pub origin: Option<u32>,
    pub destination: Option<u32>,
    pub vehicle_type: Option<VehicleType>,
    pub product_type: Option<ProductType>,
    pub weight: Option<String>,
    pub price: Option<f64>,
    pub estimated_arrival: Option<NaiveDate>,
}

pub enum OrderEdit {
    Replace(NewOrder),
    Patch(OrderPatch),
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatusChange {
    pub status: OrderStatus,
    #[serde(default)]
    pub reason: Option<String>,
}

/// Transitions the state machine permits at all. Which caller may request which
/// transition is decided by the operations below.
pub fn permits(from: OrderStatus, to: OrderStatus) -> bool {
    matches!(
        (from, to),
        (OrderStatus::New, OrderStatus::InProgress)
            | (OrderStatus::InProgress, OrderStatus::Completed)
            | (OrderStatus::New, OrderStatus::Cancelled)
            | (OrderStatus::InProgress, OrderStatus::Cancelled)
    )
}

fn validate_details(
    state: &AppState,
    origin: u32,
    destination: u32,
    weight: &str,
    price: f64,
) -> Result<(), AppError> {
    if !state.locations.contains_key(&origin) {
        return Err(AppError::validation("origin", format!("unknown location {origin}")));
    }
    if !state.locations.contains_key(&destination) {
        return Err(AppError::validation(
            "destination",
            format!("unknown location {destination}"),
        ));
    }
    if origin == destination {
        return Err(AppError::validation(
            "destination",
            "destination must differ from origin",
        ));
    }
    let weight = weight.trim();
    if weight.is_empty() || weight.len() > MAX_WEIGHT_LEN {
        return Err(AppError::validation(
            "weight",
            format!("weight must be 1-{MAX_WEIGHT_LEN} characters"),
        ));
    }
    if !(price.is_finite() && price >= 0.0) {
        return Err(AppError::validation("price", "price must be a non-negative number"));
    }
    Ok(())
}

pub fn create_order(state: &AppState, actor: &Actor, input: NewOrder) -> Result<Order, AppError> {
    if actor.role == Role::Driver {
        return Err(AppError::Forbidden("drivers cannot place orders".to_string()));
    }
    validate_details(state, input.origin, input.destination, &input.weight, input.price)?;

    let now = Utc::now();
    let order = Order {
        id: Uuid::new_v4(),
        order_id: order_code(state.next_order_number()),
        customer: actor.id,
        driver: None,
        origin: input.origin,
        destination: input.destination,
        vehicle_type: input.vehicle_type,
        product_type: input.product_type,
        weight: input.weight.trim().to_string(),
        price: input.price,
        status: OrderStatus::New,
        created_at: now,
        updated_at: now,
        estimated_arrival: input.estimated_arrival,
        delivered_on: None,
        reason: None,
        seq: state.next_seq(),
    };

    state.order_codes.insert(order.order_id.clone(), order.id);
    state.orders.insert(order.id, order.clone());
    state.metrics.orders_created_total.inc();
    analytics::accrue(state, order.customer, AnalyticsEvent::OrderCreated, now);

    info!(order_id = %order.order_id, customer_id = %order.customer, "order created");
    Ok(order)
}

pub fn edit_order(
    state: &AppState,
    actor: &Actor,
    id: Uuid,
    edit: OrderEdit,
) -> Result<Order, AppError> {
    if actor.role == Role::Driver {
        return Err(AppError::Forbidden("drivers cannot edit orders".to_string()));
    }
    let current = access::visible_order(state, actor, id)?;

    let (patch, replace) = match edit {
        OrderEdit::Patch(patch) => (patch, false),
        OrderEdit::Replace(full) => (
            OrderPatch {
                origin: Some(full.origin),
                destination: Some(full.destination),
                vehicle_type: Some(full.vehicle_type),
                product_type: Some(full.product_type),
                weight: Some(full.weight),
                price: Some(full.price),
                estimated_arrival: full.estimated_arrival,
            },
            true,
        ),
    };

    let origin = patch.origin.unwrap_or(current.origin);
    let destination = patch.destination.unwrap_or(current.destination);
    let weight = patch.weight.unwrap_or(current.weight);
    let price = patch.price.unwrap_or(current.price);
    validate_details(state, origin, destination, &weight, price)?;

    let mut order = state
        .orders
        .get_mut(&id)
        .ok_or_else(|| AppError::NotFound(format!("order {id} not found")))?;
    if order.status != OrderStatus::New {
        return Err(AppError::Conflict(format!(
            "order {} can only be edited while new",
            order.order_id
        )));
    }

    order.origin = origin;
    order.destination = destination;
    order.weight = weight.trim().to_string();
    order.price = price;
    if let Some(vehicle_type) = patch.vehicle_type {
        order.vehicle_type = vehicle_type;
    }
    if let Some(product_type) = patch.product_type {
        order.product_type = product_type;
    }
    if replace || patch.estimated_arrival.is_some() {
        order.estimated_arrival = patch.estimated_arrival;
    }
    order.updated_at = Utc::now();

    Ok(order.clone())
}

pub fn delete_order(state: &AppState, actor: &Actor, id: Uuid) -> Result<(), AppError> {
    if actor.role == Role::Driver {
        return Err(AppError::Forbidden("drivers cannot delete orders".to_string()));
    }
    let current = access::visible_order(state, actor, id)?;

    let removed = state
        .orders
        .remove_if(&id, |_, order| order.status == OrderStatus::New);
    if removed.is_none() {
        return Err(AppError::Conflict(format!(
            "order {} can only be deleted while new",
            current.order_id
        )));
    }

    state.order_codes.remove(&current.order_id);
    state.tracking.remove(&id);
    info!(order_id = %current.order_id, "order deleted");
    Ok(())
}

/// Claims a `new` order for the calling driver.
///
/// The status check and the write happen under the order's entry lock, so of
/// several drivers racing for the same order exactly one wins; the others get
/// `NotFound` as if the order had already left the pool. Truck assignment
/// afterwards is best effort.
pub fn accept_order(state: &AppState, actor: &Actor, id: Uuid) -> Result<Order, AppError> {
    if actor.role != Role::Driver {
        return Err(AppError::Forbidden("only drivers can accept orders".to_string()));
    }

    let now = Utc::now();
    let accepted = {
        let mut order = state
            .orders
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("order {id} not found")))?;
        if order.status != OrderStatus::New || order.driver.is_some() {
            return Err(AppError::NotFound(format!(
                "order {} is no longer available",
                order.order_id
            )));
        }
        order.driver = Some(actor.id);
        order.status = OrderStatus::InProgress;
        order.updated_at = now;
        order.clone()
    };

    record_transition(state, OrderStatus::InProgress);
    analytics::accrue(state, actor.id, AnalyticsEvent::OrderCreated, now);

    if let Err(err) = fleet::ensure_truck_for(state, actor.id, accepted.vehicle_type) {
        warn!(
            order_id = %accepted.order_id,
            driver_id = %actor.id,
            error = %err,
            "truck auto-assignment failed"
        );
    }

    info!(order_id = %accepted.order_id, driver_id = %actor.id, "order accepted");
    Ok(accepted)
}

/// Explicit status change requested by a participant of the order.
pub fn update_status(
    state: &AppState,
    actor: &Actor,
    code: &str,
    change: StatusChange,
) -> Result<Order, AppError> {
    let order = access::order_by_code(state, code)?;
    access::ensure_participant(actor, &order)?;

    match change.status {
        OrderStatus::Completed => complete_order(state, order.id, Utc::now()),
        OrderStatus::Cancelled => cancel_order(state, order.id, change.reason, Utc::now()),
        to => Err(AppError::InvalidTransition {
            from: order.status,
            to,
        }),
    }
}

/// Moves an in-progress order to `completed` stamped at `at` and settles analytics.
pub fn complete_order(state: &AppState, id: Uuid, at: DateTime<Utc>) -> Result<Order, AppError> {
    let completed = transition(state, id, OrderStatus::Completed, at, |order| {
        order.delivered_on = Some(at);
    })?;

    let distance_km = order_distance(state, &completed);
    let event = AnalyticsEvent::OrderCompleted {
        distance_km,
        revenue: completed.price,
    };
    analytics::accrue(state, completed.customer, event, at);

    if let Some(driver) = completed.driver {
        analytics::accrue(state, driver, event, at);
        if let Some(mut user) = state.users.get_mut(&driver) {
            if let Some(profile) = user.driver.as_mut() {
                profile.total_kilometers += distance_km.round() as u64;
            }
        }
    }

    info!(order_id = %completed.order_id, distance_km, "order completed");
    Ok(completed)
}

fn cancel_order(
    state: &AppState,
    id: Uuid,
    reason: Option<String>,
    at: DateTime<Utc>,
) -> Result<Order, AppError> {
    let reason = reason
        .map(|reason| reason.trim().to_string())
        .filter(|reason| !reason.is_empty());
    let cancelled = transition(state, id, OrderStatus::Cancelled, at, |order| {
        order.reason = reason;
    })?;

    info!(order_id = %cancelled.order_id, "order cancelled");
    Ok(cancelled)
}

fn transition(
    state: &AppState,
    id: Uuid,
    to: OrderStatus,
    at: DateTime<Utc>,
    apply: impl FnOnce(&mut Order),
) -> Result<Order, AppError> {
    let updated = {
        let mut order = state
            .orders
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("order {id} not found")))?;
        if !permits(order.status, to) {
            return Err(AppError::InvalidTransition {
                from: order.status,
                to,
            });
        }
        order.status = to;
        order.updated_at = at;
        apply(order.value_mut());
        order.clone()
    };

    record_transition(state, to);
    Ok(updated)
}

fn record_transition(state: &AppState, to: OrderStatus) {
    state
        .metrics
        .order_transitions_total
        .with_label_values(&[to.as_str()])
        .inc();
}

/// Distance between the order's origin and destination under the configured mode.
pub fn order_distance(state: &AppState, order: &Order) -> f64 {
    let origin = state.locations.get(&order.origin).map(|entry| entry.value().clone());
    let destination = state
        .locations
        .get(&order.destination)
        .map(|entry| entry.value().clone());

    match (origin, destination) {
        (Some(from), Some(to)) => state.settings.distance_mode.distance_km(&from, &to),
        _ => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Barrier;

    use super::*;
    use crate::engine::analytics::current_rollup;
    use crate::engine::fixtures;
    use crate::geo::DistanceMode;
    use crate::models::truck::TruckType;

    fn assert_invariants(order: &Order) {
        if order.status != OrderStatus::Cancelled {
            assert_eq!(order.driver.is_none(), order.status == OrderStatus::New);
        }
        assert_eq!(
            order.delivered_on.is_some(),
            order.status == OrderStatus::Completed
        );
    }

    fn change(status: OrderStatus) -> StatusChange {
        StatusChange {
            status,
            reason: None,
        }
    }

    #[test]
    fn new_orders_start_unclaimed() {
        let state = fixtures::state();
        let customer = fixtures::customer(&state, "kaysar");
        let order = fixtures::order(&state, &customer);

        assert_eq!(order.status, OrderStatus::New);
        assert_eq!(order.order_id, "ORD-00001");
        assert_eq!(order.customer, customer.id);
        assert_invariants(&order);

        let row = current_rollup(&state, customer.id, order.created_at).unwrap();
        assert_eq!(row.total_orders, 1);
    }

    #[test]
    fn drivers_cannot_place_orders_and_locations_must_exist() {
        let state = fixtures::state();
        let driver = fixtures::driver(&state, "trucker");
        let customer = fixtures::customer(&state, "kaysar");

        let err = create_order(&state, &driver, fixtures::new_order()).unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        let mut input = fixtures::new_order();
        input.destination = 99;
        let err = create_order(&state, &customer, input).unwrap_err();
        assert!(matches!(err, AppError::Validation { ref field, .. } if field == "destination"));
    }

    #[test]
    fn accept_claims_order_and_assigns_truck() {
        let state = fixtures::state();
        let customer = fixtures::customer(&state, "kaysar");
        let driver = fixtures::driver(&state, "trucker");
        let truck = fixtures::truck(&state, "TRK-1", TruckType::Truck);
        let order = fixtures::order(&state, &customer);

        let accepted = accept_order(&state, &driver, order.id).unwrap();
        assert_eq!(accepted.status, OrderStatus::InProgress);
        assert_eq!(accepted.driver, Some(driver.id));
        assert_invariants(&accepted);

        let user = state.users.get(&driver.id).unwrap();
        assert_eq!(user.driver.as_ref().unwrap().assigned_truck, Some(truck.id));
    }

    #[test]
    fn accept_succeeds_without_any_truck() {
        let state = fixtures::state();
        let customer = fixtures::customer(&state, "kaysar");
        let driver = fixtures::driver(&state, "trucker");
        let order = fixtures::order(&state, &customer);

        let accepted = accept_order(&state, &driver, order.id).unwrap();
        assert_eq!(accepted.status, OrderStatus::InProgress);
    }

    #[test]
    fn only_drivers_accept_and_only_new_orders() {
        let state = fixtures::state();
        let customer = fixtures::customer(&state, "kaysar");
        let driver = fixtures::driver(&state, "trucker");
        let order = fixtures::order(&state, &customer);

        assert!(matches!(
            accept_order(&state, &customer, order.id),
            Err(AppError::Forbidden(_))
        ));
        assert!(matches!(
            accept_order(&state, &driver, Uuid::new_v4()),
            Err(AppError::NotFound(_))
        ));

        accept_order(&state, &driver, order.id).unwrap();
        assert!(matches!(
            accept_order(&state, &driver, order.id),
            Err(AppError::NotFound(_))
        ));
    }

    #[test]
    fn concurrent_acceptance_has_exactly_one_winner() {
        let state = fixtures::state();
        let customer = fixtures::customer(&state, "kaysar");
        let order = fixtures::order(&state, &customer);
        let drivers: Vec<Actor> = (0..8)
            .map(|n| fixtures::driver(&state, &format!("driver{n}")))
            .collect();
        let barrier = Barrier::new(drivers.len());

        let results: Vec<Result<Order, AppError>> = std::thread::scope(|scope| {
            let handles: Vec<_> = drivers
                .iter()
                .map(|driver| {
                    let state = &state;
                    let barrier = &barrier;
                    scope.spawn(move || {
                        barrier.wait();
                        accept_order(state, driver, order.id)
                    })
                })
                .collect();
            handles.into_iter().map(|handle| handle.join().unwrap()).collect()
        });

        let winners: Vec<&Order> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
        assert_eq!(winners.len(), 1);
        assert!(results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(|err| matches!(err, AppError::NotFound(_))));

        let stored = state.orders.get(&order.id).unwrap().clone();
        assert_eq!(stored.driver, winners[0].driver);
        assert_eq!(stored.status, OrderStatus::InProgress);
    }

    #[test]
    fn completion_requires_in_progress() {
        let state = fixtures::state();
        let customer = fixtures::customer(&state, "kaysar");
        let order = fixtures::order(&state, &customer);

        let err = update_status(&state, &customer, &order.order_id, change(OrderStatus::Completed))
            .unwrap_err();
        assert!(matches!(
            err,
            AppError::InvalidTransition {
                from: OrderStatus::New,
                to: OrderStatus::Completed
            }
        ));

        update_status(&state, &customer, &order.order_id, change(OrderStatus::Cancelled)).unwrap();
        let err = update_status(&state, &customer, &order.order_id, change(OrderStatus::Completed))
            .unwrap_err();
        assert!(matches!(
            err,
            AppError::InvalidTransition {
                from: OrderStatus::Cancelled,
                ..
            }
        ));
    }

    #[test]
    fn claiming_through_status_update_is_rejected() {
        let state = fixtures::state();
        let customer = fixtures::customer(&state, "kaysar");
        let order = fixtures::order(&state, &customer);

        let err = update_status(&state, &customer, &order.order_id, change(OrderStatus::InProgress))
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidTransition { .. }));
    }

    #[test]
    fn outsiders_cannot_change_status() {
        let state = fixtures::state();
        let customer = fixtures::customer(&state, "kaysar");
        let stranger = fixtures::customer(&state, "stranger");
        let order = fixtures::order(&state, &customer);

        let err = update_status(&state, &stranger, &order.order_id, change(OrderStatus::Cancelled))
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        let admin = fixtures::admin(&state);
        let cancelled = update_status(
            &state,
            &admin,
            &order.order_id,
            StatusChange {
                status: OrderStatus::Cancelled,
                reason: Some("customer called".to_string()),
            },
        )
        .unwrap();
        assert_eq!(cancelled.reason.as_deref(), Some("customer called"));
        assert_invariants(&cancelled);
    }

    #[test]
    fn completion_settles_analytics_and_kilometers() {
        let mut settings = fixtures::settings();
        settings.distance_mode = DistanceMode::Placeholder;
        let state = AppState::new(settings);
        let customer = fixtures::customer(&state, "kaysar");
        let driver = fixtures::driver(&state, "trucker");
        let order = fixtures::order(&state, &customer);

        accept_order(&state, &driver, order.id).unwrap();
        let completed =
            update_status(&state, &driver, &order.order_id, change(OrderStatus::Completed)).unwrap();
        assert_invariants(&completed);
        let delivered = completed.delivered_on.unwrap();

        let customer_row = current_rollup(&state, customer.id, delivered).unwrap();
        assert_eq!(customer_row.total_orders, 1);
        assert_eq!(customer_row.completed_orders, 1);
        assert_eq!(customer_row.total_distance, 100.0);
        assert_eq!(customer_row.total_revenue, order.price);

        let driver_row = current_rollup(&state, driver.id, delivered).unwrap();
        assert_eq!(driver_row.total_orders, 1);
        assert_eq!(driver_row.completed_orders, 1);

        let user = state.users.get(&driver.id).unwrap();
        assert_eq!(user.driver.as_ref().unwrap().total_kilometers, 100);
    }

    #[test]
    fn only_new_orders_can_be_edited_or_deleted() {
        let state = fixtures::state();
        let customer = fixtures::customer(&state, "kaysar");
        let driver = fixtures::driver(&state, "trucker");
        let order = fixtures::order(&state, &customer);

        let edited = edit_order(
            &state,
            &customer,
            order.id,
            OrderEdit::Patch(OrderPatch {
                price: Some(2500.0),
                ..OrderPatch::default()
            }),
        )
        .unwrap();
        assert_eq!(edited.price, 2500.0);
        assert_eq!(edited.weight, order.weight);

        accept_order(&state, &driver, order.id).unwrap();
        assert!(matches!(
            edit_order(&state, &customer, order.id, OrderEdit::Patch(OrderPatch::default())),
            Err(AppError::Conflict(_))
        ));
        assert!(matches!(
            delete_order(&state, &customer, order.id),
            Err(AppError::Conflict(_))
        ));
    }

    #[test]
    fn delete_cascades_to_tracking_and_frees_code() {
        let state = fixtures::state();
        let customer = fixtures::customer(&state, "kaysar");
        let order = fixtures::order(&state, &customer);
        state.tracking.insert(order.id, Vec::new());

        delete_order(&state, &customer, order.id).unwrap();
        assert!(!state.orders.contains_key(&order.id));
        assert!(!state.tracking.contains_key(&order.id));
        assert!(!state.order_codes.contains_key(&order.order_id));
    }

    #[test]
    fn transition_table() {
        use OrderStatus::*;
        assert!(permits(New, InProgress));
        assert!(permits(InProgress, Completed));
        assert!(permits(New, Cancelled));
        assert!(permits(InProgress, Cancelled));
        assert!(!permits(New, Completed));
        assert!(!permits(Completed, Cancelled));
        assert!(!permits(Cancelled, InProgress));
        assert!(!permits(Completed, Completed));
    }
}
