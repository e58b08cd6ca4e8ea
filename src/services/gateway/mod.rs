//! Outbound payment-gateway calls and inbound callback verification.
//!
//! Both issuers speak the same envelope: a JSON body signed with
//! `hex(sha256(VA + ":" + body))`, sent in the `Signature` header next to a
//! `VA` header carrying the virtual account id.

mod ipaymu;
mod tsm;

pub use ipaymu::IpaymuGateway;
pub use tsm::TsmGateway;

use std::{collections::HashMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};
use validator::Validate;

use crate::{config::AppConfig, entities::payment_method::Issuer, errors::ServiceError};

pub const SIGNATURE_HEADER: &str = "Signature";
pub const VA_HEADER: &str = "VA";
const API_KEY_HEADER: &str = "X-Api-Key";

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("gateway request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("gateway rejected the request with status {status}: {message}")]
    Rejected { status: i64, message: String },

    #[error("unexpected gateway response: {0}")]
    InvalidResponse(String),

    #[error("callback signature does not match")]
    SignatureMismatch,

    #[error("no gateway configured for issuer {0}")]
    NotConfigured(Issuer),
}

impl From<GatewayError> for ServiceError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::SignatureMismatch => ServiceError::SignatureMismatch,
            other => ServiceError::GatewayFailure(other.to_string()),
        }
    }
}

/// What we ask an issuer to charge.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRequest {
    pub reference_id: String,
    pub amount: Decimal,
    pub payment_method: String,
    pub payment_channel: String,
    pub account: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub return_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancel_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notify_url: Option<String>,
}

/// The issuer's answer to a successful transaction request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GatewayTransaction {
    pub transaction_id: String,
    pub payment_url: Option<String>,
    pub raw: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallbackStatus {
    Paid,
    Pending,
    Failed,
}

/// Body of an issuer's notify callback.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CallbackPayload {
    #[serde(alias = "referenceId", alias = "reference")]
    #[validate(length(min = 1, message = "reference_id is required"))]
    pub reference_id: String,
    pub status: CallbackStatus,
    #[serde(default, alias = "settlementStatus")]
    pub settlement_status: Option<String>,
    #[serde(default, alias = "trxId", alias = "transaction_id")]
    pub trx_id: Option<String>,
}

#[async_trait]
pub trait GatewayAdapter: Send + Sync {
    fn issuer(&self) -> Issuer;

    /// Name recorded in the gateway audit log for outbound calls.
    fn service_name(&self) -> &'static str;

    async fn create_transaction(
        &self,
        request: &TransactionRequest,
    ) -> Result<GatewayTransaction, GatewayError>;

    /// Checks the `Signature` header of a callback against its raw body.
    fn verify_callback(&self, body: &[u8], signature: &str) -> Result<(), GatewayError>;
}

pub fn sign(virtual_account: &str, body: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(virtual_account.as_bytes());
    hasher.update(b":");
    hasher.update(body);
    hex::encode(hasher.finalize())
}

pub fn verify_signature(virtual_account: &str, body: &[u8], signature: &str) -> bool {
    let expected = sign(virtual_account, body);
    let given = signature.trim().to_ascii_lowercase();
    expected.len() == given.len()
        && expected
            .bytes()
            .zip(given.bytes())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
}

/// Connection details shared by both issuers.
#[derive(Debug, Clone)]
pub struct GatewayEndpoint {
    pub base_url: String,
    pub api_key: Option<String>,
    pub virtual_account: String,
}

/// Posts a signed JSON body and unwraps the issuer's status envelope.
pub(crate) async fn signed_post(
    client: &reqwest::Client,
    endpoint: &GatewayEndpoint,
    path: &str,
    payload: &TransactionRequest,
) -> Result<Value, GatewayError> {
    let body = serde_json::to_vec(payload)
        .map_err(|e| GatewayError::InvalidResponse(format!("unserializable request: {}", e)))?;
    let url = format!("{}{}", endpoint.base_url.trim_end_matches('/'), path);

    let mut request = client
        .post(&url)
        .header("Content-Type", "application/json")
        .header(SIGNATURE_HEADER, sign(&endpoint.virtual_account, &body))
        .header(VA_HEADER, &endpoint.virtual_account);
    if let Some(key) = &endpoint.api_key {
        request = request.header(API_KEY_HEADER, key);
    }

    debug!(%url, reference = %payload.reference_id, "calling payment gateway");
    let response = request.body(body).send().await?;
    let http_status = response.status();
    let text = response.text().await?;

    if !http_status.is_success() {
        warn!(%url, status = http_status.as_u16(), "gateway returned an error status");
        return Err(GatewayError::Rejected {
            status: i64::from(http_status.as_u16()),
            message: text,
        });
    }

    let json: Value = serde_json::from_str(&text)
        .map_err(|e| GatewayError::InvalidResponse(format!("body is not json: {}", e)))?;

    let status = json
        .get("Status")
        .or_else(|| json.get("status"))
        .and_then(Value::as_i64)
        .ok_or_else(|| GatewayError::InvalidResponse("missing Status field".into()))?;
    if status != 200 {
        let message = json
            .get("Message")
            .or_else(|| json.get("message"))
            .and_then(Value::as_str)
            .unwrap_or("no message")
            .to_string();
        return Err(GatewayError::Rejected { status, message });
    }

    Ok(json)
}

/// Pulls the first present key out of the envelope's `Data` object.
pub(crate) fn data_field(json: &Value, keys: &[&str]) -> Option<String> {
    let data = json.get("Data").or_else(|| json.get("data"))?;
    keys.iter().find_map(|key| match data.get(*key)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

/// Issuer-keyed set of adapters.
#[derive(Clone, Default)]
pub struct GatewayRegistry {
    adapters: HashMap<Issuer, Arc<dyn GatewayAdapter>>,
}

impl GatewayRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, adapter: Arc<dyn GatewayAdapter>) -> &mut Self {
        self.adapters.insert(adapter.issuer(), adapter);
        self
    }

    pub fn get(&self, issuer: Issuer) -> Result<Arc<dyn GatewayAdapter>, GatewayError> {
        self.adapters
            .get(&issuer)
            .cloned()
            .ok_or(GatewayError::NotConfigured(issuer))
    }

    /// Registers an adapter for every issuer whose base URL and VA are set.
    pub fn from_config(config: &AppConfig) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.gateway_timeout_secs))
            .build()?;

        let mut registry = Self::new();
        if let (Some(base_url), Some(va)) = (&config.ipaymu_base_url, &config.ipaymu_va) {
            registry.register(Arc::new(IpaymuGateway::new(
                client.clone(),
                GatewayEndpoint {
                    base_url: base_url.clone(),
                    api_key: config.ipaymu_api_key.clone(),
                    virtual_account: va.clone(),
                },
            )));
        }
        if let (Some(base_url), Some(va)) = (&config.tsm_base_url, &config.tsm_va) {
            registry.register(Arc::new(TsmGateway::new(
                client,
                GatewayEndpoint {
                    base_url: base_url.clone(),
                    api_key: config.tsm_api_key.clone(),
                    virtual_account: va.clone(),
                },
            )));
        }
        Ok(registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_is_sha256_of_va_colon_body() {
        let body = br#"{"referenceId":"abc","status":"paid"}"#;
        let expected = hex::encode(Sha256::digest(
            [b"0000001234".as_slice(), b":".as_slice(), body.as_slice()].concat(),
        ));
        assert_eq!(sign("0000001234", body), expected);
        assert!(verify_signature("0000001234", body, &expected));
        assert!(verify_signature(
            "0000001234",
            body,
            &expected.to_ascii_uppercase()
        ));
        assert!(!verify_signature("0000009999", body, &expected));
        assert!(!verify_signature("0000001234", b"{}", &expected));
    }

    #[test]
    fn callback_payload_accepts_issuer_spellings() {
        let payload: CallbackPayload = serde_json::from_str(
            r#"{"referenceId":"r-1","status":"paid","settlementStatus":"settled","trxId":"99"}"#,
        )
        .unwrap();
        assert_eq!(payload.reference_id, "r-1");
        assert_eq!(payload.status, CallbackStatus::Paid);
        assert_eq!(payload.trx_id.as_deref(), Some("99"));

        assert!(serde_json::from_str::<CallbackPayload>(
            r#"{"reference_id":"r-1","status":"refunded"}"#
        )
        .is_err());

        let empty: CallbackPayload =
            serde_json::from_str(r#"{"reference_id":"","status":"pending"}"#).unwrap();
        assert!(empty.validate().is_err());
    }

    #[test]
    fn data_field_reads_numbers_and_strings() {
        let json = serde_json::json!({
            "Status": 200,
            "Data": { "TransactionId": 4412, "Url": "https://pay.example/4412" }
        });
        assert_eq!(
            data_field(&json, &["TransactionId"]).as_deref(),
            Some("4412")
        );
        assert_eq!(
            data_field(&json, &["PaymentUrl", "Url"]).as_deref(),
            Some("https://pay.example/4412")
        );
        assert_eq!(data_field(&json, &["Missing"]), None);
    }

    #[test]
    fn missing_issuer_is_not_configured() {
        let registry = GatewayRegistry::new();
        assert!(matches!(
            registry.get(Issuer::Tsm),
            Err(GatewayError::NotConfigured(Issuer::Tsm))
        ));
    }
}
