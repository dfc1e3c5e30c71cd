use axum::{
    extract::State,
    response::Response,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use crate::auth::{AuthenticatedUser, Capability};
use crate::entities::user;
use crate::errors::{ApiError, ErrorResponse};
use crate::handlers::common::{created, message, success};
use crate::services::accounts::{LoginInput, RegisterInput, UpdateProfileInput};
use crate::AppState;

/// A user as the API presents it; the password hash never leaves the
/// service layer.
#[derive(Debug, Serialize, ToSchema)]
pub struct UserResponse {
    pub id: i32,
    pub username: String,
    pub email: String,
    pub full_name: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub role_id: i32,
    pub registered_at: DateTime<Utc>,
    pub last_login_at: Option<DateTime<Utc>>,
    pub is_active: bool,
}

impl From<user::Model> for UserResponse {
    fn from(user: user::Model) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
            full_name: user.full_name,
            phone: user.phone,
            address: user.address,
            role_id: user.role_id,
            registered_at: user.registered_at,
            last_login_at: user.last_login_at,
            is_active: user.is_active,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LoginResponse {
    pub token: String,
    pub capability: Capability,
    pub user: UserResponse,
}

#[utoipa::path(
    post,
    path = "/auth/register",
    request_body = RegisterInput,
    responses(
        (status = 201, description = "Account created", body = UserResponse),
        (status = 409, description = "Username or email already taken", body = ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn register(
    State(state): State<AppState>,
    Json(input): Json<RegisterInput>,
) -> Result<Response, ApiError> {
    let user = state.accounts.register(input).await?;
    Ok(created(UserResponse::from(user)))
}

#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginInput,
    responses(
        (status = 200, description = "Token issued", body = LoginResponse),
        (status = 401, description = "Bad credentials", body = ErrorResponse),
        (status = 403, description = "Account disabled", body = ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn login(
    State(state): State<AppState>,
    Json(input): Json<LoginInput>,
) -> Result<Response, ApiError> {
    let session = state.accounts.login(input).await?;
    Ok(success(LoginResponse {
        token: session.token,
        capability: session.capability,
        user: UserResponse::from(session.user),
    }))
}

/// Tokens are stateless; logout is an acknowledgement that the client
/// should discard its copy.
#[utoipa::path(
    post,
    path = "/auth/logout",
    responses((status = 200, description = "Logged out")),
    security(("bearer_token" = [])),
    tag = "auth"
)]
pub async fn logout(AuthenticatedUser(user): AuthenticatedUser) -> Response {
    message(format!("Goodbye, {}", user.username))
}

#[utoipa::path(
    get,
    path = "/auth/me",
    responses(
        (status = 200, description = "Current user", body = UserResponse),
        (status = 401, description = "Not authenticated", body = ErrorResponse)
    ),
    security(("bearer_token" = [])),
    tag = "auth"
)]
pub async fn me(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
) -> Result<Response, ApiError> {
    let profile = state.accounts.profile(user.user_id).await?;
    Ok(success(UserResponse::from(profile)))
}

#[utoipa::path(
    get,
    path = "/profile",
    responses((status = 200, description = "Own profile", body = UserResponse)),
    security(("bearer_token" = [])),
    tag = "profile"
)]
pub async fn get_profile(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
) -> Result<Response, ApiError> {
    let profile = state.accounts.profile(user.user_id).await?;
    Ok(success(UserResponse::from(profile)))
}

#[utoipa::path(
    put,
    path = "/profile",
    request_body = UpdateProfileInput,
    responses(
        (status = 200, description = "Profile updated", body = UserResponse),
        (status = 409, description = "Email already registered", body = ErrorResponse)
    ),
    security(("bearer_token" = [])),
    tag = "profile"
)]
pub async fn update_profile(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Json(input): Json<UpdateProfileInput>,
) -> Result<Response, ApiError> {
    let updated = state.accounts.update_profile(user.user_id, input).await?;
    Ok(success(UserResponse::from(updated)))
}

/// Routes open to anonymous callers.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
}

/// Routes that require a valid token.
pub fn authenticated_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/logout", post(logout))
        .route("/auth/me", get(me))
        .route("/profile", get(get_profile).put(update_profile))
}
