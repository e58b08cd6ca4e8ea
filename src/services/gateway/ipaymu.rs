use async_trait::async_trait;
use tracing::instrument;

use super::{
    data_field, signed_post, verify_signature, GatewayAdapter, GatewayEndpoint, GatewayError,
    GatewayTransaction, TransactionRequest,
};
use crate::entities::payment_method::Issuer;

const DIRECT_PAYMENT_PATH: &str = "/api/v2/payment/direct";

/// iPaymu direct-payment adapter.
pub struct IpaymuGateway {
    client: reqwest::Client,
    endpoint: GatewayEndpoint,
}

impl IpaymuGateway {
    pub fn new(client: reqwest::Client, endpoint: GatewayEndpoint) -> Self {
        Self { client, endpoint }
    }
}

#[async_trait]
impl GatewayAdapter for IpaymuGateway {
    fn issuer(&self) -> Issuer {
        Issuer::Ipaymu
    }

    fn service_name(&self) -> &'static str {
        "ipaymu.payment.direct"
    }

    #[instrument(skip(self, request), fields(reference = %request.reference_id))]
    async fn create_transaction(
        &self,
        request: &TransactionRequest,
    ) -> Result<GatewayTransaction, GatewayError> {
        let json = signed_post(&self.client, &self.endpoint, DIRECT_PAYMENT_PATH, request).await?;

        let transaction_id = data_field(&json, &["TransactionId", "SessionId"])
            .ok_or_else(|| GatewayError::InvalidResponse("missing Data.TransactionId".into()))?;
        let payment_url = data_field(&json, &["PaymentUrl", "Url", "PaymentNo"]);

        Ok(GatewayTransaction {
            transaction_id,
            payment_url,
            raw: json,
        })
    }

    fn verify_callback(&self, body: &[u8], signature: &str) -> Result<(), GatewayError> {
        if verify_signature(&self.endpoint.virtual_account, body, signature) {
            Ok(())
        } else {
            Err(GatewayError::SignatureMismatch)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::gateway::{sign, SIGNATURE_HEADER, VA_HEADER};
    use rust_decimal_macros::dec;
    use wiremock::{
        matchers::{header, header_exists, method, path},
        Mock, MockServer, ResponseTemplate,
    };

    fn request() -> TransactionRequest {
        TransactionRequest {
            reference_id: "7f0c1c9e-0000-4000-8000-000000000001".into(),
            amount: dec!(50000),
            payment_method: "qris".into(),
            payment_channel: "qris".into(),
            account: "ipaymu-acc-1".into(),
            name: Some("Budi".into()),
            phone: None,
            email: None,
            return_url: None,
            cancel_url: None,
            notify_url: Some("https://pos.example/api/payment/ipaymu/notify".into()),
        }
    }

    fn gateway(server: &MockServer) -> IpaymuGateway {
        IpaymuGateway::new(
            reqwest::Client::new(),
            GatewayEndpoint {
                base_url: server.uri(),
                api_key: Some("key-1".into()),
                virtual_account: "0000001234".into(),
            },
        )
    }

    #[tokio::test]
    async fn posts_signed_request_and_reads_transaction() {
        let server = MockServer::start().await;
        let body = serde_json::to_vec(&request()).unwrap();

        Mock::given(method("POST"))
            .and(path(DIRECT_PAYMENT_PATH))
            .and(header(VA_HEADER, "0000001234"))
            .and(header(SIGNATURE_HEADER, sign("0000001234", &body).as_str()))
            .and(header_exists("X-Api-Key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "Status": 200,
                "Message": "Success",
                "Data": { "TransactionId": 8812, "PaymentUrl": "https://pay.example/8812" }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let trx = gateway(&server).create_transaction(&request()).await.unwrap();
        assert_eq!(trx.transaction_id, "8812");
        assert_eq!(trx.payment_url.as_deref(), Some("https://pay.example/8812"));
    }

    #[tokio::test]
    async fn non_200_status_field_is_a_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "Status": 401,
                "Message": "unauthorized signature"
            })))
            .mount(&server)
            .await;

        let err = gateway(&server)
            .create_transaction(&request())
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Rejected { status: 401, .. }));
    }

    #[tokio::test]
    async fn http_error_is_a_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = gateway(&server)
            .create_transaction(&request())
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Rejected { status: 503, .. }));
    }

    #[tokio::test]
    async fn callback_signature_uses_configured_va() {
        let server = MockServer::start().await;
        let gw = gateway(&server);
        let body = br#"{"reference_id":"r","status":"paid"}"#;

        assert!(gw.verify_callback(body, &sign("0000001234", body)).is_ok());
        assert!(matches!(
            gw.verify_callback(body, &sign("other", body)),
            Err(GatewayError::SignatureMismatch)
        ));
    }
}
