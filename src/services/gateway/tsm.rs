use async_trait::async_trait;
use tracing::instrument;

use super::{
    data_field, signed_post, verify_signature, GatewayAdapter, GatewayEndpoint, GatewayError,
    GatewayTransaction, TransactionRequest,
};
use crate::entities::payment_method::Issuer;

const TRANSACTIONS_PATH: &str = "/api/v1/transactions";

/// TSM card and e-wallet adapter.
pub struct TsmGateway {
    client: reqwest::Client,
    endpoint: GatewayEndpoint,
}

impl TsmGateway {
    pub fn new(client: reqwest::Client, endpoint: GatewayEndpoint) -> Self {
        Self { client, endpoint }
    }
}

#[async_trait]
impl GatewayAdapter for TsmGateway {
    fn issuer(&self) -> Issuer {
        Issuer::Tsm
    }

    fn service_name(&self) -> &'static str {
        "tsm.transactions"
    }

    #[instrument(skip(self, request), fields(reference = %request.reference_id))]
    async fn create_transaction(
        &self,
        request: &TransactionRequest,
    ) -> Result<GatewayTransaction, GatewayError> {
        let json = signed_post(&self.client, &self.endpoint, TRANSACTIONS_PATH, request).await?;

        let transaction_id = data_field(&json, &["trx_id", "transaction_id", "TransactionId"])
            .ok_or_else(|| GatewayError::InvalidResponse("missing data.trx_id".into()))?;
        let payment_url = data_field(&json, &["payment_url", "url"]);

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
    use rust_decimal_macros::dec;
    use wiremock::{
        matchers::{method, path},
        Mock, MockServer, ResponseTemplate,
    };

    #[tokio::test]
    async fn reads_lowercase_envelope() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(TRANSACTIONS_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": 200,
                "message": "ok",
                "data": { "trx_id": "TSM-77", "payment_url": "https://tsm.example/77" }
            })))
            .mount(&server)
            .await;

        let gateway = TsmGateway::new(
            reqwest::Client::new(),
            GatewayEndpoint {
                base_url: server.uri(),
                api_key: None,
                virtual_account: "VA-TSM".into(),
            },
        );
        let trx = gateway
            .create_transaction(&TransactionRequest {
                reference_id: "ref-1".into(),
                amount: dec!(12500),
                payment_method: "credit_card".into(),
                payment_channel: "cc".into(),
                account: "tsm-merchant".into(),
                name: None,
                phone: None,
                email: None,
                return_url: None,
                cancel_url: None,
                notify_url: None,
            })
            .await
            .unwrap();

        assert_eq!(trx.transaction_id, "TSM-77");
        assert_eq!(trx.payment_url.as_deref(), Some("https://tsm.example/77"));
        assert_eq!(gateway.issuer(), Issuer::Tsm);
    }
}
