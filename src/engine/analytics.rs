use std::collections::HashSet;

use chrono::{DateTime, Datelike, Utc};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::analytics::{Analytics, AnalyticsEvent, AnalyticsKey};
use crate::models::user::Actor;
use crate::state::AppState;

pub fn month_label(at: DateTime<Utc>) -> String {
    at.format("%Y-%m").to_string()
}

/// Labels of the `count` months ending with the month of `now`, newest first.
pub fn trailing_months(now: DateTime<Utc>, count: u32) -> Vec<String> {
    let current = now.year() * 12 + now.month0() as i32;
    (0..count as i32)
        .map(|offset| {
            let index = current - offset;
            format!("{:04}-{:02}", index.div_euclid(12), index.rem_euclid(12) + 1)
        })
        .collect()
}

/// Adds `event` to the user's rollup for the month of `at`, creating the row on first use.
/// The increment happens under the row's entry lock.
pub fn accrue(state: &AppState, user: Uuid, event: AnalyticsEvent, at: DateTime<Utc>) {
    let key = AnalyticsKey {
        user,
        month_year: month_label(at),
    };
    let month_year = key.month_year.clone();
    let mut row = state
        .analytics
        .entry(key)
        .or_insert_with(|| Analytics::empty(user, month_year));

    match event {
        AnalyticsEvent::OrderCreated => row.total_orders += 1,
        AnalyticsEvent::OrderCompleted {
            distance_km,
            revenue,
        } => {
            row.completed_orders += 1;
            row.total_distance += distance_km;
            row.total_revenue += revenue;
        }
    }
}

pub fn current_rollup(state: &AppState, user: Uuid, now: DateTime<Utc>) -> Option<Analytics> {
    let key = AnalyticsKey {
        user,
        month_year: month_label(now),
    };
    state.analytics.get(&key).map(|row| row.value().clone())
}

/// The caller's own rollups over the configured trailing window.
pub fn own_rollups(state: &AppState, actor: &Actor, now: DateTime<Utc>) -> Vec<Analytics> {
    let months: HashSet<String> =
        trailing_months(now, state.settings.analytics_window_months).into_iter().collect();

    let mut rows: Vec<Analytics> = state
        .analytics
        .iter()
        .filter(|entry| entry.key().user == actor.id && months.contains(&entry.key().month_year))
        .map(|entry| entry.value().clone())
        .collect();
    rows.sort_by(|a, b| b.month_year.cmp(&a.month_year));
    rows
}

pub fn all_rollups(
    state: &AppState,
    actor: &Actor,
    now: DateTime<Utc>,
) -> Result<Vec<Analytics>, AppError> {
    if !actor.is_admin() {
        return Err(AppError::Forbidden(
            "analytics for all users require an administrator".to_string(),
        ));
    }

    let months: HashSet<String> = trailing_months(now, state.settings.admin_analytics_window_months)
        .into_iter()
        .collect();

    let mut rows: Vec<Analytics> = state
        .analytics
        .iter()
        .filter(|entry| months.contains(&entry.key().month_year))
        .map(|entry| entry.value().clone())
        .collect();
    rows.sort_by(|a, b| {
        b.month_year
            .cmp(&a.month_year)
            .then_with(|| a.user_id.cmp(&b.user_id))
    });
    Ok(rows)
}
