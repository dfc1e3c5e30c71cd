use std::sync::Arc;

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, StatusCode},
    middleware::{from_fn_with_state, Next},
    response::{IntoResponse, Response},
    Json, Router,
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::errors::ServiceError;

/// What a caller is allowed to do, resolved once at login from the
/// user's role and embedded in the token.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    ToSchema,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Capability {
    Admin,
    Member,
}

impl Capability {
    pub fn from_role_name(role: &str) -> Self {
        match role {
            "admin" => Capability::Admin,
            _ => Capability::Member,
        }
    }

    pub fn is_admin(self) -> bool {
        matches!(self, Capability::Admin)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: i32,
    pub username: String,
    pub capability: Capability,
    pub jti: String,
    pub iat: i64,
    pub exp: i64,
    pub nbf: i64,
    pub iss: String,
    pub aud: String,
}

/// The authenticated caller, inserted into request extensions by
/// [`auth_middleware`] and pulled out by the extractors below.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: i32,
    pub username: String,
    pub capability: Capability,
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.capability.is_admin()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Missing authorization token")]
    MissingToken,
    #[error("Invalid token: {0}")]
    InvalidToken(String),
    #[error("Token expired")]
    TokenExpired,
    #[error("Insufficient privileges")]
    InsufficientPrivileges,
    #[error("Failed to hash password")]
    HashError,
}

impl AuthError {
    fn error_code(&self) -> &'static str {
        match self {
            AuthError::MissingToken => "missing_token",
            AuthError::InvalidToken(_) => "invalid_token",
            AuthError::TokenExpired => "token_expired",
            AuthError::InsufficientPrivileges => "insufficient_privileges",
            AuthError::HashError => "internal_error",
        }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            AuthError::MissingToken | AuthError::InvalidToken(_) | AuthError::TokenExpired => {
                StatusCode::UNAUTHORIZED
            }
            AuthError::InsufficientPrivileges => StatusCode::FORBIDDEN,
            AuthError::HashError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": self.error_code(),
            "message": self.to_string(),
        }));
        (self.status_code(), body).into_response()
    }
}

impl From<AuthError> for ServiceError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InsufficientPrivileges => ServiceError::Forbidden(err.to_string()),
            AuthError::HashError => ServiceError::HashError("argon2 failure".into()),
            other => ServiceError::Unauthorized(other.to_string()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub expiration_secs: i64,
    pub remember_me_expiration_secs: i64,
    pub issuer: String,
    pub audience: String,
}

impl From<&AppConfig> for AuthConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            jwt_secret: config.jwt_secret.clone(),
            expiration_secs: config.jwt_expiration as i64,
            remember_me_expiration_secs: config.remember_me_expiration as i64,
            issuer: config.auth_issuer.clone(),
            audience: config.auth_audience.clone(),
        }
    }
}

/// Issues and validates the signed tokens that stand in for the
/// session cookie of a classic server-rendered storefront.
pub struct AuthService {
    config: AuthConfig,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl AuthService {
    pub fn new(config: AuthConfig) -> Self {
        let encoding_key = EncodingKey::from_secret(config.jwt_secret.as_bytes());
        let decoding_key = DecodingKey::from_secret(config.jwt_secret.as_bytes());
        Self {
            config,
            encoding_key,
            decoding_key,
        }
    }

    /// A `remember_me` login gets the long-lived expiration window.
    pub fn issue_token(
        &self,
        user_id: i32,
        username: &str,
        capability: Capability,
        remember_me: bool,
    ) -> Result<String, AuthError> {
        let now = Utc::now();
        let lifetime = if remember_me {
            self.config.remember_me_expiration_secs
        } else {
            self.config.expiration_secs
        };
        let claims = Claims {
            sub: user_id,
            username: username.to_owned(),
            capability,
            jti: Uuid::new_v4().to_string(),
            iat: now.timestamp(),
            exp: (now + Duration::seconds(lifetime)).timestamp(),
            nbf: now.timestamp(),
            iss: self.config.issuer.clone(),
            aud: self.config.audience.clone(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AuthError::InvalidToken(e.to_string()))
    }

    pub fn validate_token(&self, token: &str) -> Result<Claims, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.config.issuer]);
        validation.set_audience(&[&self.config.audience]);
        validation.validate_nbf = true;

        decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                _ => AuthError::InvalidToken(e.to_string()),
            })
    }
}

pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|_| AuthError::HashError)
}

pub fn verify_password(password: &str, hash: &str) -> Result<bool, AuthError> {
    let parsed = PasswordHash::new(hash).map_err(|_| AuthError::HashError)?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

fn bearer_token(request: &Request) -> Option<&str> {
    request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
}

/// Rejects the request unless a valid bearer token is present, then
/// makes the caller available to handlers as an [`AuthUser`] extension.
pub async fn auth_middleware(
    State(auth): State<Arc<AuthService>>,
    mut request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let token = bearer_token(&request).ok_or(AuthError::MissingToken)?;
    let claims = auth.validate_token(token).map_err(|e| {
        debug!("token rejected: {}", e);
        e
    })?;

    request.extensions_mut().insert(AuthUser {
        user_id: claims.sub,
        username: claims.username,
        capability: claims.capability,
    });
    Ok(next.run(request).await)
}

/// Like [`auth_middleware`] but anonymous callers pass through. Used on
/// public pages that render differently for a signed-in customer.
pub async fn optional_auth_middleware(
    State(auth): State<Arc<AuthService>>,
    mut request: Request,
    next: Next,
) -> Response {
    if let Some(token) = bearer_token(&request) {
        match auth.validate_token(token) {
            Ok(claims) => {
                request.extensions_mut().insert(AuthUser {
                    user_id: claims.sub,
                    username: claims.username,
                    capability: claims.capability,
                });
            }
            Err(e) => warn!("ignoring invalid token on public route: {}", e),
        }
    }
    next.run(request).await
}

/// Runs after [`auth_middleware`]; rejects callers without the admin
/// capability.
pub async fn admin_middleware(request: Request, next: Next) -> Result<Response, AuthError> {
    let user = request
        .extensions()
        .get::<AuthUser>()
        .ok_or(AuthError::MissingToken)?;
    if !user.is_admin() {
        return Err(AuthError::InsufficientPrivileges);
    }
    Ok(next.run(request).await)
}

/// Router sugar for the three access tiers of the storefront.
pub trait AuthRouterExt<S> {
    fn with_auth(self, auth: Arc<AuthService>) -> Self;
    fn with_optional_auth(self, auth: Arc<AuthService>) -> Self;
    fn with_admin(self, auth: Arc<AuthService>) -> Self;
}

impl<S> AuthRouterExt<S> for Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    fn with_auth(self, auth: Arc<AuthService>) -> Self {
        self.layer(from_fn_with_state(auth, auth_middleware))
    }

    fn with_optional_auth(self, auth: Arc<AuthService>) -> Self {
        self.layer(from_fn_with_state(auth, optional_auth_middleware))
    }

    fn with_admin(self, auth: Arc<AuthService>) -> Self {
        // Layers wrap outside-in, so the authentication layer must be
        // added last to run first and fill in the extension the
        // capability check reads.
        self.layer(axum::middleware::from_fn(admin_middleware))
            .layer(from_fn_with_state(auth, auth_middleware))
    }
}

/// Extractor for handlers behind [`auth_middleware`].
pub struct AuthenticatedUser(pub AuthUser);

#[async_trait::async_trait]
impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthUser>()
            .cloned()
            .map(AuthenticatedUser)
            .ok_or(AuthError::MissingToken)
    }
}

/// Extractor for public routes behind [`optional_auth_middleware`].
pub struct MaybeAuthUser(pub Option<AuthUser>);

#[async_trait::async_trait]
impl<S> FromRequestParts<S> for MaybeAuthUser
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(MaybeAuthUser(parts.extensions.get::<AuthUser>().cloned()))
    }
}
