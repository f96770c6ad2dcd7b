//! # Authentication Handlers
//!
//! HTTP request handlers for signup and login. Both return a JWT that the
//! chat endpoints (and the push subscription) verify on every request.

use axum::{
    extract::{Json, State},
    http::StatusCode,
};
use lib_auth::{encode_jwt, hash_password, verify_password};
use lib_core::dto::{AuthResponse, LoginRequest, SignupRequest, UserInfo};
use lib_core::error::{AppError, Result};
use lib_core::model::store::models::{User, UserForCreate};
use lib_core::model::store::UserRepository;
use lib_core::{Config, DbPool};
use lib_utils::validation::{validate_email, validate_min_length};
use tracing::{info, instrument, warn};

fn auth_response(user: &User, config: &Config, message: &str) -> Result<AuthResponse> {
    let token = encode_jwt(
        user.id,
        &user.username,
        &config.jwt_secret,
        config.jwt_expiration_hours,
    )
    .map_err(|e| AppError::Internal(e.to_string()))?;

    Ok(AuthResponse {
        user: UserInfo {
            id: user.id,
            username: user.username.clone(),
            email: user.email.clone(),
            created_at: user.created_at.to_rfc3339(),
        },
        token,
        message: message.to_string(),
    })
}

/// Signup handler - creates a new user account.
///
/// **Route**: `POST /api/auth/signup`
#[instrument(skip(pool, config, req), fields(username = %req.username))]
pub async fn signup(
    State(pool): State<DbPool>,
    State(config): State<Config>,
    Json(req): Json<SignupRequest>,
) -> Result<(StatusCode, Json<AuthResponse>)> {
    validate_min_length(&req.username, 3, "Username").map_err(AppError::InvalidInput)?;
    validate_email(&req.email).map_err(AppError::InvalidInput)?;

    if UserRepository::find_by_email(&pool, &req.email).await?.is_some() {
        warn!("[SIGNUP] Email already registered");
        return Err(AppError::InvalidInput("Email already registered".to_string()));
    }

    if UserRepository::find_by_username(&pool, &req.username).await?.is_some() {
        warn!("[SIGNUP] Username already taken: {}", req.username);
        return Err(AppError::InvalidInput("Username already taken".to_string()));
    }

    let password_hash =
        hash_password(&req.password).map_err(|e| AppError::InvalidInput(e.to_string()))?;

    let user = UserRepository::create(
        &pool,
        UserForCreate {
            username: req.username,
            email: req.email,
            password_hash,
        },
    )
    .await?;

    info!("[SIGNUP] Created user {} ({})", user.username, user.id);

    let response = auth_response(&user, &config, "Signup successful")?;
    Ok((StatusCode::CREATED, Json(response)))
}

/// Login handler - verifies credentials and issues a JWT.
///
/// **Route**: `POST /api/auth/login`
#[instrument(skip(pool, config, req))]
pub async fn login(
    State(pool): State<DbPool>,
    State(config): State<Config>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<AuthResponse>> {
    let user = match UserRepository::find_by_email(&pool, &req.email_or_username).await? {
        Some(user) => Some(user),
        None => UserRepository::find_by_username(&pool, &req.email_or_username).await?,
    };

    let Some(user) = user else {
        warn!("[LOGIN] Unknown account: {}", req.email_or_username);
        return Err(AppError::Unauthorized("Invalid credentials".to_string()));
    };

    let valid = verify_password(&req.password, &user.password_hash)
        .map_err(|e| AppError::Internal(e.to_string()))?;

    if !valid {
        warn!("[LOGIN] Bad password for user {}", user.id);
        return Err(AppError::Unauthorized("Invalid credentials".to_string()));
    }

    info!("[LOGIN] User {} authenticated", user.id);

    let response = auth_response(&user, &config, "Login successful")?;
    Ok(Json(response))
}
