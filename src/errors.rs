use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use sea_orm::error::DbErr;
use serde::{Deserialize, Serialize};
use tracing::error;
use uuid::Uuid;

use crate::i18n::{current_locale, Locale};

fn current_request_id() -> Option<String> {
    crate::tracing::current_request_id().map(|rid| rid.as_str().to_string())
}

/// Error body returned by every failing endpoint.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// HTTP status category (e.g. "Not Found")
    pub error: String,
    /// Human-readable, localized description
    pub message: String,
    /// Extra machine-usable detail, such as the onboarding route for a 428
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub timestamp: String,
}

#[derive(Debug, thiserror::Error, Serialize)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(
        #[from]
        #[serde(skip)]
        DbErr,
    ),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Authentication error: {0}")]
    AuthError(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Insufficient stock: {0}")]
    InsufficientStock(String),

    #[error("Recipe missing for product {0}")]
    RecipeMissing(Uuid),

    #[error("Add-on {0} is not bound to the product")]
    AddOnNotBound(Uuid),

    #[error("Order {0} is already completed")]
    OrderAlreadyCompleted(Uuid),

    #[error("Purchase order {0} is already received")]
    AlreadyReceived(Uuid),

    #[error("Payment method {0} is not active")]
    PaymentMethodInactive(i32),

    #[error("iPaymu registration required")]
    IpaymuRegistrationRequired,

    #[error("TSM registration required")]
    TsmRegistrationRequired,

    #[error("Gateway failure: {0}")]
    GatewayFailure(String),

    #[error("Signature mismatch")]
    SignatureMismatch,

    #[error("Unknown payment reference: {0}")]
    UnknownReference(String),

    #[error("Queue error: {0}")]
    QueueError(String),

    #[error("Internal error: {0}")]
    InternalError(String),

    #[error("Other error: {0}")]
    Other(
        #[from]
        #[serde(skip)]
        anyhow::Error,
    ),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

impl ServiceError {
    pub fn db_error(error: DbErr) -> Self {
        ServiceError::DatabaseError(error)
    }

    pub fn not_found(kind: &str, reference: impl std::fmt::Display) -> Self {
        ServiceError::NotFound(format!("{} {}", kind, reference))
    }

    /// Single source of truth for error-to-status mapping.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) | Self::UnknownReference(_) => StatusCode::NOT_FOUND,
            Self::ValidationError(_)
            | Self::InvalidInput(_)
            | Self::RecipeMissing(_)
            | Self::AddOnNotBound(_)
            | Self::PaymentMethodInactive(_) => StatusCode::BAD_REQUEST,
            Self::AuthError(_) | Self::SignatureMismatch => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Conflict(_)
            | Self::OrderAlreadyCompleted(_)
            | Self::AlreadyReceived(_)
            | Self::InsufficientStock(_) => StatusCode::CONFLICT,
            Self::IpaymuRegistrationRequired | Self::TsmRegistrationRequired => {
                StatusCode::PRECONDITION_REQUIRED
            }
            Self::GatewayFailure(_) => StatusCode::BAD_GATEWAY,
            Self::QueueError(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::DatabaseError(_) | Self::InternalError(_) | Self::Other(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Route the client should follow to finish issuer onboarding.
    pub fn onboarding_route(&self) -> Option<&'static str> {
        match self {
            Self::IpaymuRegistrationRequired => Some("/payment-gateways/ipaymu/register"),
            Self::TsmRegistrationRequired => Some("/payment-gateways/tsm/register"),
            _ => None,
        }
    }

    /// Message safe to put in an HTTP response. Internal failures get a
    /// generic text so implementation details never leak.
    pub fn response_message(&self, locale: Locale) -> String {
        match locale {
            Locale::En => match self {
                Self::DatabaseError(_) | Self::InternalError(_) | Self::Other(_) => {
                    "Internal server error".to_string()
                }
                Self::QueueError(_) => "Service temporarily unavailable".to_string(),
                Self::GatewayFailure(_) => {
                    "Payment gateway could not process the request".to_string()
                }
                _ => self.to_string(),
            },
            Locale::Id => match self {
                Self::DatabaseError(_) | Self::InternalError(_) | Self::Other(_) => {
                    "Terjadi kesalahan pada server".to_string()
                }
                Self::QueueError(_) => "Layanan sementara tidak tersedia".to_string(),
                Self::NotFound(what) => format!("Data tidak ditemukan: {}", what),
                Self::ValidationError(msg) => format!("Validasi gagal: {}", msg),
                Self::InvalidInput(msg) => format!("Input tidak valid: {}", msg),
                Self::AuthError(_) => "Autentikasi gagal".to_string(),
                Self::Forbidden(_) => "Akses ditolak".to_string(),
                Self::Conflict(msg) => format!("Konflik: {}", msg),
                Self::InsufficientStock(msg) => format!("Stok tidak mencukupi: {}", msg),
                Self::RecipeMissing(id) => format!("Resep untuk produk {} belum diatur", id),
                Self::AddOnNotBound(id) => {
                    format!("Add-on {} tidak terhubung dengan produk", id)
                }
                Self::OrderAlreadyCompleted(id) => format!("Pesanan {} sudah lunas", id),
                Self::AlreadyReceived(id) => format!("Purchase order {} sudah diterima", id),
                Self::PaymentMethodInactive(id) => {
                    format!("Metode pembayaran {} tidak aktif", id)
                }
                Self::IpaymuRegistrationRequired => "Registrasi iPaymu diperlukan".to_string(),
                Self::TsmRegistrationRequired => "Registrasi TSM diperlukan".to_string(),
                Self::GatewayFailure(_) => "Gateway pembayaran gagal memproses".to_string(),
                Self::SignatureMismatch => "Tanda tangan tidak cocok".to_string(),
                Self::UnknownReference(r) => format!("Referensi pembayaran {} tidak dikenal", r),
            },
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let request_id = current_request_id();

        if status.is_server_error() {
            error!(
                request_id = request_id.as_deref().unwrap_or("-"),
                error = %self,
                "request failed"
            );
        }

        let err = ErrorResponse {
            error: status.canonical_reason().unwrap_or("Error").to_string(),
            message: self.response_message(current_locale()),
            details: self.onboarding_route().map(str::to_string),
            request_id,
            timestamp: chrono::Utc::now().to_rfc3339(),
        };

        (status, Json(err)).into_response()
    }
}
