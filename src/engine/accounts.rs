use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use rand::distr::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::info;
use uuid::Uuid;

use crate::config::AdminAccount;
use crate::engine::{analytics, fleet};
use crate::error::AppError;
use crate::models::analytics::Analytics;
use crate::models::document::DriverDocument;
use crate::models::truck::Truck;
use crate::models::user::{Actor, DriverProfile, Role, User};
use crate::state::AppState;

const MIN_PASSWORD_LEN: usize = 8;
const GENERATED_PASSWORD_LEN: usize = 8;
const MAX_USERNAME_LEN: usize = 15;
const SUFFIX_DIGITS: usize = 3;
const USERNAME_ATTEMPTS: usize = 1_000;

#[derive(Debug, Deserialize)]
pub struct NewCustomer {
    pub username: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub phone: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct NewDriver {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    #[serde(default)]
    pub experience_years: u32,
}

/// Returned once when a driver account is provisioned; the password is not recoverable later.
#[derive(Debug, Serialize)]
pub struct DriverCredentials {
    pub user: User,
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct Session {
    pub token: String,
    pub user_id: Uuid,
    pub email: String,
    pub role: Role,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ProfileUpdate {
    pub phone: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub experience_years: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct DriverProfileView {
    pub user: User,
    pub phone: Option<String>,
    pub experience_years: u32,
    pub total_kilometers: u64,
    pub documents: Vec<DriverDocument>,
    pub assigned_truck: Option<Truck>,
    pub analytics: Option<Analytics>,
}

pub fn register_customer(state: &AppState, input: NewCustomer) -> Result<User, AppError> {
    let username = input.username.trim().to_string();
    if username.is_empty() {
        return Err(AppError::validation("username", "username cannot be empty"));
    }
    if input.password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::validation(
            "password",
            format!("password must be at least {MIN_PASSWORD_LEN} characters"),
        ));
    }
    let email = normalize_email(&input.email)?;

    let user = User {
        id: Uuid::new_v4(),
        username,
        email,
        first_name: input.first_name.trim().to_string(),
        last_name: input.last_name.trim().to_string(),
        role: Role::Customer,
        phone: input.phone.filter(|phone| !phone.trim().is_empty()),
        password_hash: hash_password(&input.password),
        date_joined: Utc::now(),
        driver: None,
    };

    let user = insert_user(state, user)?;
    info!(user_id = %user.id, username = %user.username, "customer registered");
    Ok(user)
}

pub fn register_driver(
    state: &AppState,
    actor: &Actor,
    input: NewDriver,
) -> Result<DriverCredentials, AppError> {
    if actor.role == Role::Driver {
        return Err(AppError::Forbidden(
            "drivers cannot provision driver accounts".to_string(),
        ));
    }

    let first_name = input.first_name.trim().to_string();
    let last_name = input.last_name.trim().to_string();
    if first_name.is_empty() {
        return Err(AppError::validation("first_name", "first name is required"));
    }
    if last_name.is_empty() {
        return Err(AppError::validation("last_name", "last name is required"));
    }
    if input.phone.trim().is_empty() {
        return Err(AppError::validation("phone", "phone is required"));
    }
    let email = normalize_email(&input.email)?;
    if state.emails.contains_key(&email) {
        return Err(AppError::validation("email", "email is already registered"));
    }

    let id = Uuid::new_v4();
    let username = claim_generated_username(state, &first_name, &last_name, id)?;
    let password = generate_password();

    let user = User {
        id,
        username: username.clone(),
        email,
        first_name,
        last_name,
        role: Role::Driver,
        phone: Some(input.phone.trim().to_string()),
        password_hash: hash_password(&password),
        date_joined: Utc::now(),
        driver: Some(DriverProfile {
            experience_years: input.experience_years,
            ..DriverProfile::default()
        }),
    };

    if !claim_email(state, &user.email, id) {
        state.usernames.remove(&username);
        return Err(AppError::validation("email", "email is already registered"));
    }
    state.users.insert(id, user.clone());

    info!(user_id = %id, username = %username, provisioned_by = %actor.id, "driver provisioned");
    Ok(DriverCredentials {
        user,
        username,
        password,
    })
}

/// Creates the configured admin account unless the username already exists.
pub fn bootstrap_admin(state: &AppState, account: &AdminAccount) -> Result<User, AppError> {
    if let Some(existing) = state.usernames.get(&account.username) {
        return get_user(state, *existing);
    }

    let user = User {
        id: Uuid::new_v4(),
        username: account.username.clone(),
        email: normalize_email(&account.email)?,
        first_name: "Admin".to_string(),
        last_name: "User".to_string(),
        role: Role::Admin,
        phone: None,
        password_hash: hash_password(&account.password),
        date_joined: Utc::now(),
        driver: None,
    };

    let user = insert_user(state, user)?;
    info!(user_id = %user.id, username = %user.username, "admin account bootstrapped");
    Ok(user)
}

pub fn login(state: &AppState, credentials: Credentials) -> Result<Session, AppError> {
    let rejected = || AppError::validation("credentials", "unable to log in with provided credentials");

    let user_id = state
        .usernames
        .get(credentials.username.trim())
        .map(|entry| *entry.value())
        .ok_or_else(rejected)?;
    let user = get_user(state, user_id).map_err(|_| rejected())?;

    if !verify_password(&user.password_hash, &credentials.password) {
        return Err(rejected());
    }

    let token = to_hex(&rand::rng().random::<[u8; 20]>());
    state.sessions.insert(token.clone(), user.id);
    state.metrics.active_sessions.inc();

    Ok(Session {
        token,
        user_id: user.id,
        email: user.email,
        role: user.role,
        username: user.username,
        first_name: user.first_name,
        last_name: user.last_name,
    })
}

pub fn logout(state: &AppState, token: &str) {
    if state.sessions.remove(token).is_some() {
        state.metrics.active_sessions.dec();
    }
}

pub fn authenticate(state: &AppState, token: &str) -> Result<Actor, AppError> {
    let user_id = state
        .sessions
        .get(token)
        .map(|entry| *entry.value())
        .ok_or(AppError::Unauthorized)?;

    state
        .users
        .get(&user_id)
        .map(|user| user.actor())
        .ok_or(AppError::Unauthorized)
}

pub fn get_user(state: &AppState, id: Uuid) -> Result<User, AppError> {
    state
        .users
        .get(&id)
        .map(|user| user.value().clone())
        .ok_or_else(|| AppError::NotFound(format!("user {id} not found")))
}

/// `replace` clears optional fields missing from the update (PUT); otherwise missing fields are kept.
pub fn update_profile(
    state: &AppState,
    actor: &Actor,
    update: ProfileUpdate,
    replace: bool,
) -> Result<User, AppError> {
    let current = get_user(state, actor.id)?;

    if update.experience_years.is_some() && current.driver.is_none() {
        return Err(AppError::validation(
            "experience_years",
            "only drivers have driving experience",
        ));
    }

    let email = match update.email.as_deref() {
        Some(raw) => Some(normalize_email(raw)?),
        None if replace => return Err(AppError::validation("email", "email is required")),
        None => None,
    };

    if let Some(email) = email.as_ref().filter(|email| **email != current.email) {
        if !claim_email(state, email, actor.id) {
            return Err(AppError::validation("email", "email is already registered"));
        }
        state.emails.remove(&current.email);
    }

    let mut user = state
        .users
        .get_mut(&actor.id)
        .ok_or_else(|| AppError::NotFound(format!("user {} not found", actor.id)))?;

    if let Some(email) = email {
        user.email = email;
    }
    if replace {
        user.phone = update.phone.filter(|phone| !phone.trim().is_empty());
        user.first_name = update.first_name.unwrap_or_default().trim().to_string();
        user.last_name = update.last_name.unwrap_or_default().trim().to_string();
        if let Some(profile) = user.driver.as_mut() {
            profile.experience_years = update.experience_years.unwrap_or(0);
        }
    } else {
        if let Some(phone) = update.phone {
            user.phone = Some(phone).filter(|phone| !phone.trim().is_empty());
        }
        if let Some(first_name) = update.first_name {
            user.first_name = first_name.trim().to_string();
        }
        if let Some(last_name) = update.last_name {
            user.last_name = last_name.trim().to_string();
        }
        if let (Some(years), Some(profile)) = (update.experience_years, user.driver.as_mut()) {
            profile.experience_years = years;
        }
    }

    Ok(user.clone())
}

pub fn driver_profile(
    state: &AppState,
    actor: &Actor,
    now: DateTime<Utc>,
) -> Result<DriverProfileView, AppError> {
    if actor.role != Role::Driver {
        return Err(AppError::Forbidden("driver profile is only available to drivers".to_string()));
    }

    let user = get_user(state, actor.id)?;
    let profile = user.driver.clone().unwrap_or_default();
    let assigned_truck = profile
        .assigned_truck
        .and_then(|truck_id| state.trucks.get(&truck_id).map(|truck| truck.value().clone()));

    Ok(DriverProfileView {
        phone: user.phone.clone(),
        experience_years: profile.experience_years,
        total_kilometers: profile.total_kilometers,
        documents: fleet::documents_of(state, actor.id),
        assigned_truck,
        analytics: analytics::current_rollup(state, actor.id, now),
        user,
    })
}

/// Inserts a user after atomically claiming its username and email.
pub(crate) fn insert_user(state: &AppState, user: User) -> Result<User, AppError> {
    if !claim_username(state, &user.username, user.id) {
        return Err(AppError::validation("username", "username is already taken"));
    }
    if !claim_email(state, &user.email, user.id) {
        state.usernames.remove(&user.username);
        return Err(AppError::validation("email", "email is already registered"));
    }

    state.users.insert(user.id, user.clone());
    Ok(user)
}

fn claim_username(state: &AppState, username: &str, id: Uuid) -> bool {
    match state.usernames.entry(username.to_string()) {
        Entry::Vacant(slot) => {
            slot.insert(id);
            true
        }
        Entry::Occupied(_) => false,
    }
}

fn claim_email(state: &AppState, email: &str, id: Uuid) -> bool {
    match state.emails.entry(email.to_string()) {
        Entry::Vacant(slot) => {
            slot.insert(id);
            true
        }
        Entry::Occupied(_) => false,
    }
}

fn claim_generated_username(
    state: &AppState,
    first_name: &str,
    last_name: &str,
    id: Uuid,
) -> Result<String, AppError> {
    let base = username_base(first_name, last_name);
    if claim_username(state, &base, id) {
        return Ok(base);
    }

    // the suffix must survive the length cap
    let stem: String = base.chars().take(MAX_USERNAME_LEN - SUFFIX_DIGITS).collect();
    let mut rng = rand::rng();
    for _ in 0..USERNAME_ATTEMPTS {
        let suffix = rng.random_range(0..1000);
        let candidate = format!("{stem}{suffix:03}");
        if claim_username(state, &candidate, id) {
            return Ok(candidate);
        }
    }

    Err(AppError::Internal(format!(
        "could not generate a free username from {base}"
    )))
}

/// First letter of the first name followed by the last name, lowercase alphanumerics only.
pub(crate) fn username_base(first_name: &str, last_name: &str) -> String {
    let initial = first_name.chars().find(|c| c.is_alphanumeric());
    let base: String = initial
        .into_iter()
        .chain(last_name.chars().filter(|c| c.is_alphanumeric()))
        .flat_map(char::to_lowercase)
        .take(MAX_USERNAME_LEN)
        .collect();

    if base.is_empty() { "driver".to_string() } else { base }
}

fn generate_password() -> String {
    rand::rng()
        .sample_iter(Alphanumeric)
        .take(GENERATED_PASSWORD_LEN)
        .map(char::from)
        .collect()
}

fn normalize_email(raw: &str) -> Result<String, AppError> {
    let email = raw.trim().to_ascii_lowercase();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(email),
        _ => Err(AppError::validation("email", "enter a valid email address")),
    }
}

/// Stores `sha256$<salt>$<digest>`: one round of salted SHA-256, not a slow
/// password KDF, so a leaked store is cheap to brute-force.
pub(crate) fn hash_password(password: &str) -> String {
    let salt = to_hex(&rand::rng().random::<[u8; 16]>());
    format!("sha256${salt}${}", digest(&salt, password))
}

pub(crate) fn verify_password(stored: &str, password: &str) -> bool {
    match stored.split('$').collect::<Vec<_>>().as_slice() {
        ["sha256", salt, expected] => digest(salt, password) == *expected,
        _ => false,
    }
}

fn digest(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    to_hex(&hasher.finalize())
}

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|byte| format!("{byte:02x}")).collect()
}
