use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::mapref::one::RefMut;
use serde::Deserialize;
use tracing::{debug, info};
use uuid::Uuid;

use crate::engine::{access, lifecycle};
use crate::error::AppError;
use crate::models::order::{Order, OrderStatus};
use crate::models::tracking::TrackingPoint;
use crate::models::user::Actor;
use crate::state::AppState;

#[derive(Debug, Clone, Deserialize)]
pub struct NewTrackingPoint {
    pub order: Uuid,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub progress: i64,
}

fn validate(input: &NewTrackingPoint) -> Result<u8, AppError> {
    if !(-90.0..=90.0).contains(&input.latitude) {
        return Err(AppError::validation("latitude", "latitude must be within [-90, 90]"));
    }
    if !(-180.0..=180.0).contains(&input.longitude) {
        return Err(AppError::validation(
            "longitude",
            "longitude must be within [-180, 180]",
        ));
    }
    u8::try_from(input.progress)
        .ok()
        .filter(|progress| *progress <= 100)
        .ok_or_else(|| AppError::validation("progress", "progress must be within [0, 100]"))
}

/// Latest point of a log; among equal timestamps the last appended wins.
fn latest(points: &[TrackingPoint]) -> Option<&TrackingPoint> {
    points.iter().max_by_key(|point| point.timestamp)
}

/// Opens the order's tracking log. A log is only created while the order still
/// exists, so a concurrent delete cannot leave an orphaned log behind.
fn open_log<'a>(
    state: &'a AppState,
    order: &Order,
) -> Option<RefMut<'a, Uuid, Vec<TrackingPoint>>> {
    match state.tracking.entry(order.id) {
        Entry::Occupied(log) => Some(log.into_ref()),
        Entry::Vacant(slot) => state
            .orders
            .contains_key(&order.id)
            .then(|| slot.insert(Vec::new())),
    }
}

/// Appends a progress sample. A sample reaching 100% completes an in-progress order
/// with the sample's timestamp as delivery time.
pub fn append_point(
    state: &AppState,
    actor: &Actor,
    input: NewTrackingPoint,
) -> Result<TrackingPoint, AppError> {
    let progress = validate(&input)?;
    let order = state
        .orders
        .get(&input.order)
        .map(|order| order.value().clone())
        .ok_or_else(|| AppError::validation("order", format!("unknown order {}", input.order)))?;
    access::ensure_participant(actor, &order)?;

    let point = {
        let mut log = open_log(state, &order).ok_or_else(|| {
            AppError::validation("order", format!("unknown order {}", input.order))
        })?;
        let now = Utc::now();
        // timestamps never go backwards within one log
        let timestamp = latest(&log).map_or(now, |last| last.timestamp.max(now));
        let point = TrackingPoint {
            id: Uuid::new_v4(),
            order: order.id,
            latitude: input.latitude,
            longitude: input.longitude,
            timestamp,
            progress,
        };
        log.push(point.clone());
        point
    };
    state.metrics.tracking_points_total.inc();

    if point.progress >= 100 && order.status == OrderStatus::InProgress {
        match lifecycle::complete_order(state, order.id, point.timestamp) {
            Ok(_) => info!(order_id = %order.order_id, "order completed by tracking update"),
            // completed concurrently by another update
            Err(AppError::InvalidTransition { .. }) => {
                debug!(order_id = %order.order_id, "order already left in-progress")
            }
            Err(err) => return Err(err),
        }
    }

    Ok(point)
}

/// Returns the latest tracking point of the order, seeding one on first access.
///
/// This is not a pure read: an order without any point gets a zero-progress
/// point at its origin. Check and seed happen under the log's entry lock, so
/// concurrent or repeated calls seed at most once.
pub fn latest_or_seed(state: &AppState, actor: &Actor, code: &str) -> Result<TrackingPoint, AppError> {
    let order = access::order_by_code(state, code)?;
    access::ensure_participant(actor, &order)?;

    let (latitude, longitude) = state
        .locations
        .get(&order.origin)
        .map(|origin| (origin.latitude, origin.longitude))
        .ok_or_else(|| AppError::Internal(format!("order {code} has unknown origin")))?;

    let mut log = open_log(state, &order)
        .ok_or_else(|| AppError::NotFound(format!("order {code} not found")))?;
    if let Some(point) = latest(&log) {
        return Ok(point.clone());
    }

    let seed = TrackingPoint {
        id: Uuid::new_v4(),
        order: order.id,
        latitude,
        longitude,
        timestamp: Utc::now(),
        progress: 0,
    };
    log.push(seed.clone());
    state.metrics.tracking_points_total.inc();

    debug!(order_id = %order.order_id, "seeded tracking at origin");
    Ok(seed)
}

pub fn list_points(state: &AppState, actor: &Actor, order: Option<Uuid>) -> Vec<TrackingPoint> {
    access::visible_tracking(state, actor, order)
}

pub fn get_point(state: &AppState, actor: &Actor, id: Uuid) -> Result<TrackingPoint, AppError> {
    access::visible_tracking(state, actor, None)
        .into_iter()
        .find(|point| point.id == id)
        .ok_or_else(|| AppError::NotFound(format!("tracking point {id} not found")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::fixtures;
    use crate::engine::lifecycle::accept_order;

    fn sample(order: Uuid, progress: i64) -> NewTrackingPoint {
        NewTrackingPoint {
            order,
            latitude: 47.0,
            longitude: 74.0,
            progress,
        }
    }

    #[test]
    fn full_progress_completes_in_progress_order() {
        let state = fixtures::state();
        let customer = fixtures::customer(&state, "kaysar");
        let driver = fixtures::driver(&state, "trucker");
        let order = fixtures::order(&state, &customer);
        accept_order(&state, &driver, order.id).unwrap();

        append_point(&state, &driver, sample(order.id, 40)).unwrap();
        let last = append_point(&state, &driver, sample(order.id, 100)).unwrap();

        let stored = state.orders.get(&order.id).unwrap().clone();
        assert_eq!(stored.status, OrderStatus::Completed);
        assert_eq!(stored.delivered_on, Some(last.timestamp));
    }

    #[test]
    fn full_progress_on_new_order_is_only_recorded() {
        let state = fixtures::state();
        let customer = fixtures::customer(&state, "kaysar");
        let order = fixtures::order(&state, &customer);

        append_point(&state, &customer, sample(order.id, 100)).unwrap();

        let stored = state.orders.get(&order.id).unwrap().clone();
        assert_eq!(stored.status, OrderStatus::New);
        assert!(stored.delivered_on.is_none());
        assert_eq!(state.tracking.get(&order.id).unwrap().len(), 1);
    }

    #[test]
    fn out_of_range_values_are_rejected() {
        let state = fixtures::state();
        let customer = fixtures::customer(&state, "kaysar");
        let order = fixtures::order(&state, &customer);

        for (input, field) in [
            (sample(order.id, 101), "progress"),
            (sample(order.id, -1), "progress"),
            (NewTrackingPoint { latitude: 91.0, ..sample(order.id, 10) }, "latitude"),
            (NewTrackingPoint { longitude: -181.0, ..sample(order.id, 10) }, "longitude"),
            (sample(Uuid::new_v4(), 10), "order"),
        ] {
            let err = append_point(&state, &customer, input).unwrap_err();
            assert!(
                matches!(err, AppError::Validation { field: ref f, .. } if f == field),
                "expected {field} error, got {err:?}"
            );
        }
    }

    #[test]
    fn deleted_order_gets_no_tracking_log() {
        let state = fixtures::state();
        let customer = fixtures::customer(&state, "kaysar");
        let order = fixtures::order(&state, &customer);

        // snapshot taken before the order disappears
        state.orders.remove(&order.id);

        assert!(open_log(&state, &order).is_none());
        assert!(!state.tracking.contains_key(&order.id));
        assert!(matches!(
            append_point(&state, &customer, sample(order.id, 10)),
            Err(AppError::Validation { ref field, .. }) if field == "order"
        ));
        assert!(!state.tracking.contains_key(&order.id));
    }

    #[test]
    fn outsiders_cannot_append() {
        let state = fixtures::state();
        let customer = fixtures::customer(&state, "kaysar");
        let stranger = fixtures::driver(&state, "stranger");
        let order = fixtures::order(&state, &customer);

        assert!(matches!(
            append_point(&state, &stranger, sample(order.id, 10)),
            Err(AppError::Forbidden(_))
        ));
    }

    #[test]
    fn latest_seeds_once_at_origin() {
        let state = fixtures::state();
        let customer = fixtures::customer(&state, "kaysar");
        let order = fixtures::order(&state, &customer);
        let origin = state.locations.get(&order.origin).unwrap().clone();

        let first = latest_or_seed(&state, &customer, &order.order_id).unwrap();
        assert_eq!(first.progress, 0);
        assert_eq!(first.latitude, origin.latitude);
        assert_eq!(first.longitude, origin.longitude);

        let second = latest_or_seed(&state, &customer, &order.order_id).unwrap();
        assert_eq!(second.id, first.id);
        assert_eq!(state.tracking.get(&order.id).unwrap().len(), 1);
    }

    #[test]
    fn latest_returns_newest_appended_point() {
        let state = fixtures::state();
        let customer = fixtures::customer(&state, "kaysar");
        let driver = fixtures::driver(&state, "trucker");
        let order = fixtures::order(&state, &customer);
        accept_order(&state, &driver, order.id).unwrap();

        append_point(&state, &driver, sample(order.id, 10)).unwrap();
        let newest = append_point(&state, &driver, sample(order.id, 55)).unwrap();

        let latest = latest_or_seed(&state, &customer, &order.order_id).unwrap();
        assert_eq!(latest.id, newest.id);
        assert_eq!(latest.progress, 55);
    }

    #[test]
    fn listing_is_scoped_to_visible_orders() {
        let state = fixtures::state();
        let owner = fixtures::customer(&state, "owner");
        let other = fixtures::customer(&state, "other");
        let admin = fixtures::admin(&state);
        let mine = fixtures::order(&state, &owner);
        let theirs = fixtures::order(&state, &other);

        let point = append_point(&state, &owner, sample(mine.id, 5)).unwrap();
        append_point(&state, &other, sample(theirs.id, 5)).unwrap();

        assert_eq!(list_points(&state, &owner, None).len(), 1);
        assert_eq!(list_points(&state, &admin, None).len(), 2);
        assert_eq!(list_points(&state, &admin, Some(theirs.id)).len(), 1);
        assert!(get_point(&state, &owner, point.id).is_ok());
        assert!(matches!(
            get_point(&state, &other, point.id),
            Err(AppError::NotFound(_))
        ));
    }
}
