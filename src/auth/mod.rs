/*!
 * # Authentication and Authorization
 *
 * - Registration, login and staff creation with argon2 password hashes
 * - HS256 JWT access tokens
 * - Middleware that turns a bearer token into a [`TenantScope`] and checks
 *   the route's permission against the [`PolicyEnforcer`]
 */

use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{Duration as ChronoDuration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::rngs::OsRng;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set};
use serde::{Deserialize, Serialize};
use std::{sync::Arc, time::Duration};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::{
    config::AppConfig,
    db::{self, audit::Audited, DbPool, WriteContext},
    entities::{
        payment_method,
        user::{self, UserRole},
    },
    errors::ServiceError,
    services::{
        payments::activate_for_owner,
        tenancy::{resolve_owner, TenantScope},
    },
};

pub mod permissions;
pub mod policy;

pub use permissions::consts;
pub use policy::{PolicyEnforcer, PolicySource};

/// Claim structure for JWT tokens
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // internal user id
    pub role: String,
    pub jti: String,
    pub iat: i64,
    pub exp: i64,
    pub nbf: i64,
    pub iss: String,
    pub aud: String,
}

/// Authenticated caller, attached to request extensions next to its
/// [`TenantScope`].
#[derive(Debug, Clone, Serialize)]
pub struct AuthUser {
    pub user_id: i32,
    pub email: String,
    pub name: String,
    pub role: UserRole,
    pub token_id: String,
}

#[derive(Clone, Debug)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub jwt_audience: String,
    pub jwt_issuer: String,
    pub access_token_expiration: Duration,
}

impl AuthConfig {
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            jwt_secret: config.jwt_secret.clone(),
            jwt_audience: config.auth_audience.clone(),
            jwt_issuer: config.auth_issuer.clone(),
            access_token_expiration: Duration::from_secs(config.jwt_expiration),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(length(min = 1, max = 120))]
    pub name: String,
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 8, message = "password must be at least 8 characters"))]
    pub password: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1))]
    pub password: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateStaffRequest {
    #[validate(length(min = 1, max = 120))]
    pub name: String,
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 8, message = "password must be at least 8 characters"))]
    pub password: String,
    pub role: UserRole,
}

#[derive(Debug, Clone, Serialize)]
pub struct AuthResponse {
    pub access_token: String,
    pub token_type: &'static str,
    pub expires_in: i64,
    pub user: user::Model,
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Missing authentication")]
    MissingAuth,

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Token has expired")]
    TokenExpired,

    #[error("Token creation failed: {0}")]
    TokenCreation(String),

    #[error("Email is already registered")]
    EmailTaken,

    #[error("Insufficient permissions")]
    InsufficientPermissions,

    #[error("Internal error: {0}")]
    InternalError(String),

    #[error(transparent)]
    Service(#[from] ServiceError),
}

impl From<sea_orm::DbErr> for AuthError {
    fn from(err: sea_orm::DbErr) -> Self {
        AuthError::Service(ServiceError::DatabaseError(err))
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, error_code, error_message): (StatusCode, &str, String) = match self {
            Self::Service(err) => return err.into_response(),
            Self::MissingAuth => (
                StatusCode::UNAUTHORIZED,
                "AUTH_MISSING",
                "Authentication required".to_string(),
            ),
            Self::InvalidCredentials => (
                StatusCode::UNAUTHORIZED,
                "AUTH_INVALID_CREDENTIALS",
                "Invalid credentials".to_string(),
            ),
            Self::InvalidToken => (
                StatusCode::UNAUTHORIZED,
                "AUTH_INVALID_TOKEN",
                "Invalid authentication token".to_string(),
            ),
            Self::TokenExpired => (
                StatusCode::UNAUTHORIZED,
                "AUTH_TOKEN_EXPIRED",
                "Token has expired".to_string(),
            ),
            Self::EmailTaken => (
                StatusCode::CONFLICT,
                "AUTH_EMAIL_TAKEN",
                "Email is already registered".to_string(),
            ),
            Self::InsufficientPermissions => (
                StatusCode::FORBIDDEN,
                "AUTH_INSUFFICIENT_PERMISSIONS",
                "Insufficient permissions".to_string(),
            ),
            Self::TokenCreation(msg) | Self::InternalError(msg) => {
                warn!(error = %msg, "auth internal failure");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "AUTH_INTERNAL_ERROR",
                    "Internal server error".to_string(),
                )
            }
        };

        let body = Json(serde_json::json!({
            "error": {
                "code": error_code,
                "message": error_message,
            }
        }));

        (status, body).into_response()
    }
}

pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AuthError::InternalError(format!("password hashing failed: {}", e)))
}

pub fn verify_password(password: &str, hash: &str) -> bool {
    PasswordHash::new(hash)
        .map(|parsed| {
            Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok()
        })
        .unwrap_or(false)
}

/// Token issuance, credential checks and per-request authorization.
#[derive(Clone)]
pub struct AuthService {
    pub config: AuthConfig,
    db: Arc<DbPool>,
    policy: Arc<PolicyEnforcer>,
}

impl AuthService {
    pub fn new(config: AuthConfig, db: Arc<DbPool>, policy: Arc<PolicyEnforcer>) -> Self {
        Self { config, db, policy }
    }

    pub fn policy(&self) -> &Arc<PolicyEnforcer> {
        &self.policy
    }

    pub fn generate_token(&self, user: &user::Model) -> Result<String, AuthError> {
        let now = Utc::now();
        let exp = now
            + ChronoDuration::from_std(self.config.access_token_expiration)
                .map_err(|_| AuthError::TokenCreation("invalid token duration".to_string()))?;

        let claims = Claims {
            sub: user.id.to_string(),
            role: user.role.clone(),
            jti: Uuid::new_v4().to_string(),
            iat: now.timestamp(),
            exp: exp.timestamp(),
            nbf: now.timestamp(),
            iss: self.config.jwt_issuer.clone(),
            aud: self.config.jwt_audience.clone(),
        };

        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.config.jwt_secret.as_bytes()),
        )
        .map_err(|e| AuthError::TokenCreation(e.to_string()))
    }

    pub fn validate_token(&self, token: &str) -> Result<Claims, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[self.config.jwt_issuer.as_str()]);
        validation.set_audience(&[self.config.jwt_audience.as_str()]);

        decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.config.jwt_secret.as_bytes()),
            &validation,
        )
        .map(|data| data.claims)
        .map_err(|e| match e.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::TokenExpired,
            _ => AuthError::InvalidToken,
        })
    }

    fn respond(&self, user: user::Model) -> Result<AuthResponse, AuthError> {
        Ok(AuthResponse {
            access_token: self.generate_token(&user)?,
            token_type: "Bearer",
            expires_in: self.config.access_token_expiration.as_secs() as i64,
            user,
        })
    }

    async fn email_taken(&self, email: &str) -> Result<bool, AuthError> {
        Ok(user::Entity::find()
            .filter(user::Column::Email.eq(email))
            .one(self.db.as_ref())
            .await?
            .is_some())
    }

    /// Registers a new owner. Cash is activated for every new owner.
    #[instrument(skip(self, request), fields(email = %request.email))]
    pub async fn register(&self, request: RegisterRequest) -> Result<AuthResponse, AuthError> {
        request.validate().map_err(ServiceError::from)?;
        let email = request.email.trim().to_lowercase();
        if self.email_taken(&email).await? {
            return Err(AuthError::EmailTaken);
        }
        let password_hash = hash_password(&request.password)?;

        let db = self.db.as_ref();
        let txn = db::begin(db).await?;
        let mut active = user::ActiveModel {
            uuid: Set(Uuid::new_v4()),
            name: Set(request.name),
            email: Set(email),
            password_hash: Set(password_hash),
            role: Set(UserRole::Owner.to_string()),
            owner_id: Set(None),
            track_add_on_stock: Set(false),
            email_verified_at: Set(None),
            ..Default::default()
        };
        active.stamp_created(&WriteContext::system());
        let owner = active.insert(&txn).await?;

        let cash = payment_method::Entity::find()
            .filter(payment_method::Column::Code.eq(payment_method::CASH_CODE))
            .filter(payment_method::Column::DeletedAt.is_null())
            .one(&txn)
            .await?;
        match cash {
            Some(cash) => {
                activate_for_owner(&txn, &WriteContext::new(owner.id), owner.id, cash.id).await?;
            }
            None => warn!("cash payment method is not seeded"),
        }
        db::commit(txn).await?;

        info!(user = %owner.uuid, "owner registered");
        self.respond(owner)
    }

    #[instrument(skip(self, request), fields(email = %request.email))]
    pub async fn login(&self, request: LoginRequest) -> Result<AuthResponse, AuthError> {
        request.validate().map_err(ServiceError::from)?;
        let email = request.email.trim().to_lowercase();
        let user = user::Entity::find()
            .filter(user::Column::Email.eq(email))
            .filter(user::Column::DeletedAt.is_null())
            .one(self.db.as_ref())
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        if !verify_password(&request.password, &user.password_hash) {
            debug!("password mismatch");
            return Err(AuthError::InvalidCredentials);
        }
        self.respond(user)
    }

    /// Creates a manager or cashier working for the caller's owner.
    #[instrument(skip(self, scope, request), fields(owner_id = scope.owner_id))]
    pub async fn create_staff(
        &self,
        scope: &TenantScope,
        request: CreateStaffRequest,
    ) -> Result<user::Model, AuthError> {
        request.validate().map_err(ServiceError::from)?;
        if !scope.is_owner() {
            return Err(ServiceError::Forbidden("only owners can create staff".into()).into());
        }
        if request.role == UserRole::Owner {
            return Err(
                ServiceError::InvalidInput("staff role must be manager or cashier".into()).into(),
            );
        }
        let email = request.email.trim().to_lowercase();
        if self.email_taken(&email).await? {
            return Err(AuthError::EmailTaken);
        }

        let mut active = user::ActiveModel {
            uuid: Set(Uuid::new_v4()),
            name: Set(request.name),
            email: Set(email),
            password_hash: Set(hash_password(&request.password)?),
            role: Set(request.role.to_string()),
            owner_id: Set(Some(scope.owner_id)),
            track_add_on_stock: Set(false),
            email_verified_at: Set(None),
            ..Default::default()
        };
        active.stamp_created(&scope.write_context());
        let staff = active.insert(self.db.as_ref()).await?;
        info!(user = %staff.uuid, role = %staff.role, "staff created");
        Ok(staff)
    }

    /// Resolves a bearer token to its user and tenant scope.
    pub async fn authenticate(&self, token: &str) -> Result<(AuthUser, TenantScope), AuthError> {
        let claims = self.validate_token(token)?;
        let user_id: i32 = claims.sub.parse().map_err(|_| AuthError::InvalidToken)?;

        let user = user::Entity::find_by_id(user_id)
            .filter(user::Column::DeletedAt.is_null())
            .one(self.db.as_ref())
            .await?
            .ok_or(AuthError::InvalidToken)?;
        let role = user
            .role()
            .ok_or_else(|| AuthError::InternalError(format!("unknown role {}", user.role)))?;

        let scope = TenantScope::new(resolve_owner(user.id, role, user.owner_id), user.id, role);
        let auth_user = AuthUser {
            user_id: user.id,
            email: user.email,
            name: user.name,
            role,
            token_id: claims.jti,
        };
        Ok((auth_user, scope))
    }

    /// Checks `resource:action` for the caller.
    pub async fn authorize(&self, user: &AuthUser, permission: &str) -> bool {
        let (resource, action) = permissions::split(permission);
        let id = user.user_id.to_string();
        self.policy
            .enforce(
                &[user.email.as_str(), id.as_str()],
                user.role.as_ref(),
                resource,
                action,
            )
            .await
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Authentication middleware. Inserts [`AuthUser`] and [`TenantScope`].
pub async fn auth_middleware(mut request: Request, next: Next) -> Response {
    let auth_service = match request.extensions().get::<Arc<AuthService>>() {
        Some(service) => service.clone(),
        None => {
            return AuthError::InternalError("authentication service not available".into())
                .into_response();
        }
    };

    let token = match bearer_token(request.headers()) {
        Some(token) => token.to_string(),
        None => return AuthError::MissingAuth.into_response(),
    };

    match auth_service.authenticate(&token).await {
        Ok((user, scope)) => {
            crate::tracing::record_tenant(scope.owner_id, scope.actor_id);
            request.extensions_mut().insert(user);
            request.extensions_mut().insert(scope);
            next.run(request).await
        }
        Err(e) => e.into_response(),
    }
}

/// Permission middleware; runs after [`auth_middleware`].
pub async fn permission_middleware(
    State(required_permission): State<String>,
    request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let user = request
        .extensions()
        .get::<AuthUser>()
        .cloned()
        .ok_or(AuthError::MissingAuth)?;
    let auth_service = request
        .extensions()
        .get::<Arc<AuthService>>()
        .cloned()
        .ok_or_else(|| AuthError::InternalError("authentication service not available".into()))?;

    if !auth_service.authorize(&user, &required_permission).await {
        warn!(user_id = user.user_id, permission = %required_permission, "policy denied");
        return Err(AuthError::InsufficientPermissions);
    }

    Ok(next.run(request).await)
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
    use assert_matches::assert_matches;

    fn service() -> AuthService {
        let config = AuthConfig {
            jwt_secret: "k3s!r-test-secret-with-enough-entropy-0123".into(),
            jwt_audience: "kasir-clients".into(),
            jwt_issuer: "kasir-api".into(),
            access_token_expiration: Duration::from_secs(3600),
        };
        let policy = PolicyEnforcer::from_csv("p, owner, *, *\np, cashier, orders, read").unwrap();
        AuthService::new(
            config,
            Arc::new(sea_orm::DatabaseConnection::Disconnected),
            Arc::new(policy),
        )
    }

    fn user(role: UserRole) -> user::Model {
        user::Model {
            id: 42,
            uuid: Uuid::new_v4(),
            name: "Sari".into(),
            email: "sari@kasir.test".into(),
            password_hash: String::new(),
            role: role.to_string(),
            owner_id: None,
            track_add_on_stock: false,
            email_verified_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            deleted_at: None,
            created_by: None,
            updated_by: None,
            deleted_by: None,
        }
    }

    #[test]
    fn password_hash_round_trip() {
        let hash = hash_password("rahasia-123").unwrap();
        assert!(verify_password("rahasia-123", &hash));
        assert!(!verify_password("rahasia-124", &hash));
        assert!(!verify_password("rahasia-123", "not-a-hash"));
    }

    #[test]
    fn token_carries_subject_and_role() {
        let svc = service();
        let token = svc.generate_token(&user(UserRole::Cashier)).unwrap();
        let claims = svc.validate_token(&token).unwrap();
        assert_eq!(claims.sub, "42");
        assert_eq!(claims.role, "cashier");
        assert_eq!(claims.iss, "kasir-api");
    }

    #[test]
    fn token_from_another_issuer_is_rejected() {
        let svc = service();
        let mut other = service();
        other.config.jwt_issuer = "someone-else".into();
        let token = other.generate_token(&user(UserRole::Owner)).unwrap();
        assert_matches!(svc.validate_token(&token), Err(AuthError::InvalidToken));
    }

    #[test]
    fn bearer_header_is_parsed() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);
        headers.insert(header::AUTHORIZATION, "Bearer abc.def".parse().unwrap());
        assert_eq!(bearer_token(&headers), Some("abc.def"));
        headers.insert(header::AUTHORIZATION, "Basic xyz".parse().unwrap());
        assert_eq!(bearer_token(&headers), None);
    }

    #[tokio::test]
    async fn authorize_splits_resource_and_action() {
        let svc = service();
        let auth_user = AuthUser {
            user_id: 7,
            email: "kasir@kasir.test".into(),
            name: "Kasir".into(),
            role: UserRole::Cashier,
            token_id: "t".into(),
        };
        assert!(svc.authorize(&auth_user, "orders:read").await);
        assert!(!svc.authorize(&auth_user, "orders:cancel").await);
    }
}
