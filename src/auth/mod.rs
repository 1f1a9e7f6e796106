/*!
 * # Authentication and Authorization Module
 *
 * Users sign in with email and password and receive an HS256 JWT. The token
 * is returned in the login body and also set as an HttpOnly session cookie,
 * so both API clients (`Authorization: Bearer`) and browsers are served by
 * the same middleware.
 *
 * Authorization is role based: every role maps to a fixed permission set
 * (see [`permissions`]) and routes are gated with [`AuthRouterExt`].
 */

use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::AppConfig;
use crate::entities::user::{self, UserRole};
use crate::errors::ServiceError;

mod password;
mod permissions;

pub use password::{hash_password, verify_password, MIN_PASSWORD_LENGTH};
pub use permissions::{consts, permissions_for_role};

const JWT_ISSUER: &str = "bomflow-auth";
const JWT_AUDIENCE: &str = "bomflow-api";

/// Claim structure for JWT tokens
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,       // Subject (user ID)
    pub name: String,      // User's name
    pub email: String,     // User's email
    pub role: UserRole,    // Role at issue time; re-read from the database on use
    pub jti: String,       // JWT ID
    pub iat: i64,          // Issued at time
    pub exp: i64,          // Expiration time
    pub nbf: i64,          // Not valid before time
    pub iss: String,       // Issuer
    pub aud: String,       // Audience
}

/// Authenticated user attached to request extensions by [`auth_middleware`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub name: String,
    pub email: String,
    pub role: UserRole,
    pub permissions: Vec<String>,
    pub token_id: String,
    pub token_expires_at: i64,
}

impl AuthUser {
    fn from_user(user: &user::Model, claims: &Claims) -> Self {
        Self {
            user_id: user.id,
            name: user.name.clone(),
            email: user.email.clone(),
            role: user.role,
            permissions: permissions_for_role(user.role)
                .iter()
                .map(|p| p.to_string())
                .collect(),
            token_id: claims.jti.clone(),
            token_expires_at: claims.exp,
        }
    }

    /// Check if the user has a specific permission
    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.iter().any(|p| p == permission)
    }

    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthUser>()
            .cloned()
            .ok_or(AuthError::MissingAuth)
    }
}

/// Authentication configuration
#[derive(Clone, Debug)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub jwt_audience: String,
    pub jwt_issuer: String,
    pub token_expiration: Duration,
    pub cookie_name: String,
    pub cookie_secure: bool,
}

impl AuthConfig {
    pub fn from_app_config(cfg: &AppConfig) -> Self {
        Self {
            jwt_secret: cfg.jwt_secret.clone(),
            jwt_audience: JWT_AUDIENCE.to_string(),
            jwt_issuer: JWT_ISSUER.to_string(),
            token_expiration: Duration::from_secs(cfg.jwt_expiration),
            cookie_name: cfg.session_cookie_name.clone(),
            cookie_secure: cfg.session_cookie_secure,
        }
    }
}

/// A freshly signed access token
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct IssuedToken {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
    #[serde(skip)]
    pub jti: String,
}

/// Authentication service that handles credential checks, token issuance and validation
#[derive(Debug, Clone)]
pub struct AuthService {
    pub config: AuthConfig,
    pub db: Arc<DatabaseConnection>,
    revoked_tokens: Arc<RwLock<Vec<RevokedToken>>>,
}

/// Token revoked by logout before its natural expiry
#[derive(Clone, Debug)]
struct RevokedToken {
    jti: String,
    expiry: DateTime<Utc>,
}

impl AuthService {
    pub fn new(config: AuthConfig, db: Arc<DatabaseConnection>) -> Self {
        Self {
            config,
            db,
            revoked_tokens: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Checks email and password and signs a token for the matching active user.
    pub async fn login(
        &self,
        email: &str,
        password: &str,
    ) -> Result<(user::Model, IssuedToken), AuthError> {
        let email = email.trim().to_lowercase();
        let found = user::Entity::find()
            .filter(user::Column::Email.eq(email.as_str()))
            .one(&*self.db)
            .await
            .map_err(|e| AuthError::DatabaseError(e.to_string()))?;

        let Some(found) = found else {
            debug!("login attempt for unknown email");
            return Err(AuthError::InvalidCredentials);
        };

        if !verify_password(password, &found.password_hash) {
            return Err(AuthError::InvalidCredentials);
        }
        if !found.active {
            return Err(AuthError::InactiveUser);
        }

        let token = self.generate_token(&found)?;
        Ok((found, token))
    }

    /// Generate a JWT token for a user
    pub fn generate_token(&self, user: &user::Model) -> Result<IssuedToken, AuthError> {
        let now = Utc::now();
        let exp = now
            + ChronoDuration::from_std(self.config.token_expiration)
                .map_err(|_| AuthError::InternalError("Invalid token duration".to_string()))?;
        let jti = Uuid::new_v4().to_string();

        let claims = Claims {
            sub: user.id.to_string(),
            name: user.name.clone(),
            email: user.email.clone(),
            role: user.role,
            jti: jti.clone(),
            iat: now.timestamp(),
            exp: exp.timestamp(),
            nbf: now.timestamp(),
            iss: self.config.jwt_issuer.clone(),
            aud: self.config.jwt_audience.clone(),
        };

        let access_token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.config.jwt_secret.as_bytes()),
        )
        .map_err(|e| AuthError::TokenCreation(e.to_string()))?;

        Ok(IssuedToken {
            access_token,
            token_type: "Bearer".to_string(),
            expires_in: self.config.token_expiration.as_secs() as i64,
            jti,
        })
    }

    /// Validate a JWT token and extract the claims
    pub async fn validate_token(&self, token: &str) -> Result<Claims, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_audience(&[self.config.jwt_audience.as_str()]);
        validation.set_issuer(&[self.config.jwt_issuer.as_str()]);

        let claims = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.config.jwt_secret.as_bytes()),
            &validation,
        )
        .map_err(|e| match e.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::TokenExpired,
            _ => AuthError::InvalidToken,
        })?
        .claims;

        if self.is_token_revoked(&claims.jti).await {
            return Err(AuthError::RevokedToken);
        }

        Ok(claims)
    }

    /// Validates the token and loads its subject. Inactive or deleted users
    /// are rejected even while their token is still within its lifetime.
    pub async fn authenticate(&self, token: &str) -> Result<AuthUser, AuthError> {
        let claims = self.validate_token(token).await?;
        let user_id = Uuid::parse_str(&claims.sub).map_err(|_| AuthError::InvalidToken)?;

        let found = user::Entity::find_by_id(user_id)
            .one(&*self.db)
            .await
            .map_err(|e| AuthError::DatabaseError(e.to_string()))?
            .ok_or(AuthError::UserNotFound)?;

        if !found.active {
            return Err(AuthError::InactiveUser);
        }

        Ok(AuthUser::from_user(&found, &claims))
    }

    /// Revoke a token until it would have expired anyway
    pub async fn revoke(&self, jti: &str, exp: i64) {
        let expiry = DateTime::<Utc>::from_timestamp(exp, 0).unwrap_or_else(Utc::now);
        let mut revoked = self.revoked_tokens.write().await;
        revoked.push(RevokedToken {
            jti: jti.to_string(),
            expiry,
        });

        let now = Utc::now();
        revoked.retain(|t| t.expiry > now);
    }

    async fn is_token_revoked(&self, token_id: &str) -> bool {
        let revoked = self.revoked_tokens.read().await;
        revoked.iter().any(|t| t.jti == token_id)
    }

    /// `Set-Cookie` value carrying the session token
    pub fn session_cookie(&self, token: &IssuedToken) -> String {
        let mut cookie = format!(
            "{}={}; HttpOnly; Path=/; SameSite=Lax; Max-Age={}",
            self.config.cookie_name, token.access_token, token.expires_in
        );
        if self.config.cookie_secure {
            cookie.push_str("; Secure");
        }
        cookie
    }

    /// `Set-Cookie` value that removes the session cookie
    pub fn clear_session_cookie(&self) -> String {
        let mut cookie = format!(
            "{}=; HttpOnly; Path=/; SameSite=Lax; Max-Age=0",
            self.config.cookie_name
        );
        if self.config.cookie_secure {
            cookie.push_str("; Secure");
        }
        cookie
    }

    /// Token from `Authorization: Bearer` or, failing that, the session cookie
    pub fn token_from_headers(&self, headers: &HeaderMap) -> Option<String> {
        if let Some(token) = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
        {
            return Some(token.to_string());
        }

        headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(';'))
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(name, _)| *name == self.config.cookie_name)
            .map(|(_, value)| value.to_string())
            .filter(|v| !v.is_empty())
    }
}

/// Authentication error types
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Authentication required")]
    MissingAuth,

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Invalid authentication token")]
    InvalidToken,

    #[error("Token has expired")]
    TokenExpired,

    #[error("Token has been revoked")]
    RevokedToken,

    #[error("User account is disabled")]
    InactiveUser,

    #[error("Token creation failed: {0}")]
    TokenCreation(String),

    #[error("User no longer exists")]
    UserNotFound,

    #[error("Insufficient permissions")]
    InsufficientPermissions,

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl From<AuthError> for ServiceError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InsufficientPermissions => ServiceError::Forbidden(err.to_string()),
            AuthError::TokenCreation(msg) => ServiceError::JwtError(msg),
            AuthError::DatabaseError(msg) | AuthError::InternalError(msg) => {
                ServiceError::InternalError(msg)
            }
            other => ServiceError::Unauthorized(other.to_string()),
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        ServiceError::from(self).into_response()
    }
}

/// Permission middleware to check if a user has the required permission
pub async fn permission_middleware(
    State(required_permission): State<String>,
    request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let user = request
        .extensions()
        .get::<AuthUser>()
        .ok_or(AuthError::MissingAuth)?;

    if !user.is_admin() && !user.has_permission(&required_permission) {
        warn!(
            user_id = %user.user_id,
            permission = %required_permission,
            "permission denied"
        );
        return Err(AuthError::InsufficientPermissions);
    }

    Ok(next.run(request).await)
}

/// Authentication middleware that extracts and validates auth tokens
pub async fn auth_middleware(mut request: Request, next: Next) -> Response {
    let auth_service = match request.extensions().get::<Arc<AuthService>>() {
        Some(service) => service.clone(),
        None => {
            return AuthError::InternalError("Authentication service not available".into())
                .into_response();
        }
    };

    let Some(token) = auth_service.token_from_headers(request.headers()) else {
        return AuthError::MissingAuth.into_response();
    };

    match auth_service.authenticate(&token).await {
        Ok(user) => {
            request.extensions_mut().insert(user);
            next.run(request).await
        }
        Err(e) => e.into_response(),
    }
}

/// Extension methods for Router to add auth middleware
pub trait AuthRouterExt {
    fn with_auth(self) -> Self;
    fn with_permission(self, permission: &str) -> Self;
}

impl<S> AuthRouterExt for axum::Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    fn with_auth(self) -> Self {
        self.layer(axum::middleware::from_fn(auth_middleware))
    }

    fn with_permission(self, permission: &str) -> Self {
        self.layer(axum::middleware::from_fn_with_state(
            permission.to_string(),
            permission_middleware,
        ))
        .with_auth()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use sea_orm::{ActiveModelTrait, ConnectOptions, Database, Set};
    use sea_orm_migration::MigratorTrait;

    async fn service() -> AuthService {
        let mut opt = ConnectOptions::new("sqlite::memory:");
        opt.max_connections(1).min_connections(1);
        let db = Database::connect(opt).await.unwrap();
        crate::migrator::Migrator::up(&db, None).await.unwrap();

        AuthService::new(
            AuthConfig {
                jwt_secret: "unit-test-secret-that-is-long-enough-123".into(),
                jwt_audience: JWT_AUDIENCE.into(),
                jwt_issuer: JWT_ISSUER.into(),
                token_expiration: Duration::from_secs(600),
                cookie_name: "bomflow_session".into(),
                cookie_secure: false,
            },
            Arc::new(db),
        )
    }

    async fn insert_user(auth: &AuthService, email: &str, active: bool) -> user::Model {
        user::ActiveModel {
            name: Set("Dana".into()),
            email: Set(email.into()),
            password_hash: Set(hash_password("s3cret-pass").unwrap()),
            role: Set(UserRole::Manager),
            active: Set(active),
            ..Default::default()
        }
        .insert(&*auth.db)
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn login_issues_token_that_authenticates() {
        let auth = service().await;
        let created = insert_user(&auth, "dana@example.com", true).await;

        let (user, token) = auth.login("  Dana@Example.com ", "s3cret-pass").await.unwrap();
        assert_eq!(user.id, created.id);

        let current = auth.authenticate(&token.access_token).await.unwrap();
        assert_eq!(current.user_id, created.id);
        assert!(current.has_permission(consts::CATALOG_WRITE));
        assert!(!current.has_permission(consts::USERS_MANAGE));
    }

    #[tokio::test]
    async fn wrong_password_and_inactive_users_are_rejected() {
        let auth = service().await;
        insert_user(&auth, "dana@example.com", true).await;
        insert_user(&auth, "off@example.com", false).await;

        assert!(matches!(
            auth.login("dana@example.com", "nope-nope").await,
            Err(AuthError::InvalidCredentials)
        ));
        assert!(matches!(
            auth.login("off@example.com", "s3cret-pass").await,
            Err(AuthError::InactiveUser)
        ));
    }

    #[tokio::test]
    async fn revoked_tokens_fail_validation() {
        let auth = service().await;
        let created = insert_user(&auth, "dana@example.com", true).await;
        let token = auth.generate_token(&created).unwrap();

        let claims = auth.validate_token(&token.access_token).await.unwrap();
        auth.revoke(&claims.jti, claims.exp).await;

        assert!(matches!(
            auth.validate_token(&token.access_token).await,
            Err(AuthError::RevokedToken)
        ));
    }

    #[tokio::test]
    async fn token_is_read_from_bearer_or_cookie() {
        let auth = service().await;

        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; bomflow_session=abc.def.ghi"),
        );
        assert_eq!(auth.token_from_headers(&headers).as_deref(), Some("abc.def.ghi"));

        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("Bearer from-header"),
        );
        assert_eq!(auth.token_from_headers(&headers).as_deref(), Some("from-header"));
    }

    #[tokio::test]
    async fn session_cookie_attributes() {
        let auth = service().await;
        let token = IssuedToken {
            access_token: "tok".into(),
            token_type: "Bearer".into(),
            expires_in: 600,
            jti: "j".into(),
        };
        let cookie = auth.session_cookie(&token);
        assert!(cookie.starts_with("bomflow_session=tok;"));
        assert!(cookie.contains("HttpOnly"));
        assert!(!cookie.contains("Secure"));
        assert!(auth.clear_session_cookie().contains("Max-Age=0"));
    }
}
