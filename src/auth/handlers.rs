use axum::extract::{FromRef, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use lazy_static::lazy_static;
use regex::Regex;
use tracing::{info, instrument, warn};

use crate::auth::dto::{AuthResponse, LoginRequest, PublicUser, RegisterRequest};
use crate::auth::jwt::{AuthUser, JwtKeys};
use crate::auth::password;
use crate::auth::repo::User;
use crate::error::ApiError;
use crate::state::AppState;
use crate::store::Store;

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/me", get(get_me))
}

fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    // Email is the natural key, kept exactly as provided apart from
    // surrounding whitespace.
    let email = payload.email.trim().to_string();
    if !is_valid_email(&email) {
        warn!(email = %email, "invalid email");
        return Err(ApiError::Validation("Invalid email address".into()));
    }

    if state.store.find_user_by_email(&email).await?.is_some() {
        warn!(email = %email, "email already registered");
        return Err(ApiError::Conflict("Email already registered".into()));
    }

    let hash = password::hash(payload.password).await?;
    let user = User::new(email, hash);
    state.store.insert_user(&user).await?;

    let token = JwtKeys::from_ref(&state).sign(user.id, &user.email)?;
    info!(user_id = %user.id, email = %user.email, "user registered");
    Ok(Json(AuthResponse {
        token,
        user: PublicUser::from(&user),
    }))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    let email = payload.email.trim().to_string();

    let Some(user) = state.store.find_user_by_email(&email).await? else {
        warn!(email = %email, "login unknown email");
        return Err(ApiError::Auth("Invalid email or password".into()));
    };

    let ok = password::verify(payload.password, user.password_hash.clone()).await?;
    if !ok {
        warn!(user_id = %user.id, "login invalid password");
        return Err(ApiError::Auth("Invalid email or password".into()));
    }

    let token = JwtKeys::from_ref(&state).sign(user.id, &user.email)?;
    info!(user_id = %user.id, email = %user.email, "user logged in");
    Ok(Json(AuthResponse {
        token,
        user: PublicUser::from(&user),
    }))
}

/// Returns the stored record for the token's identity, so `created_at`
/// is the real creation time rather than a synthesized one.
#[instrument(skip(state))]
pub async fn get_me(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
) -> Result<Json<PublicUser>, ApiError> {
    let user = state
        .store
        .find_user_by_id(identity.user_id)
        .await?
        .ok_or_else(|| {
            warn!(user_id = %identity.user_id, "token for unknown user");
            ApiError::Auth("User not found".into())
        })?;

    Ok(Json(PublicUser::from(&user)))
}
