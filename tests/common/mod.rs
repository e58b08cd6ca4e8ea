#![allow(dead_code)]

use std::str::FromStr;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
};

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{Method, Request, StatusCode},
    Router,
};
use kasir_api::{
    auth::{AuthConfig, AuthService, PolicyEnforcer},
    config::AppConfig,
    db,
    entities::payment_method::Issuer,
    handlers::AppServices,
    services::{
        gateway::{
            self, GatewayAdapter, GatewayError, GatewayRegistry, GatewayTransaction,
            TransactionRequest, SIGNATURE_HEADER,
        },
        notifications::{EmailQueue, LogMailer},
        payments::{self, PaymentUrls},
    },
    AppState,
};
use rust_decimal::Decimal;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;
use uuid::Uuid;

pub const FAKE_VA: &str = "0000007700001234";

/// Stands in for an issuer. Records what it was asked to charge and signs
/// callbacks with the same scheme the real adapters verify.
pub struct FakeGateway {
    issuer: Issuer,
    pub requests: Mutex<Vec<TransactionRequest>>,
    pub reject: AtomicBool,
}

impl FakeGateway {
    pub fn new(issuer: Issuer) -> Self {
        Self {
            issuer,
            requests: Mutex::new(Vec::new()),
            reject: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl GatewayAdapter for FakeGateway {
    fn issuer(&self) -> Issuer {
        self.issuer
    }

    fn service_name(&self) -> &'static str {
        "fake.create_transaction"
    }

    async fn create_transaction(
        &self,
        request: &TransactionRequest,
    ) -> Result<GatewayTransaction, GatewayError> {
        self.requests.lock().unwrap().push(request.clone());
        if self.reject.load(Ordering::SeqCst) {
            return Err(GatewayError::Rejected {
                status: 401,
                message: "unauthorized merchant".into(),
            });
        }
        Ok(GatewayTransaction {
            transaction_id: format!("trx-{}", request.reference_id),
            payment_url: Some(format!("https://pay.test/{}", request.reference_id)),
            raw: json!({ "Status": 200 }),
        })
    }

    fn verify_callback(&self, body: &[u8], signature: &str) -> Result<(), GatewayError> {
        if gateway::verify_signature(FAKE_VA, body, signature) {
            Ok(())
        } else {
            Err(GatewayError::SignatureMismatch)
        }
    }
}

/// Helper harness for spinning up the full router over a throwaway SQLite file.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub ipaymu: Arc<FakeGateway>,
    pub tsm: Arc<FakeGateway>,
    _email_worker: tokio::task::JoinHandle<()>,
    _dir: TempDir,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_connections(1).await
    }

    /// Same harness over a pool of `connections`, so requests can hold
    /// transactions at the same time.
    pub async fn with_connections(connections: u32) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let db_path = dir.path().join("kasir_test.db");

        let mut cfg = AppConfig::new(
            format!("sqlite://{}?mode=rwc", db_path.display()),
            "redis://127.0.0.1:6379".to_string(),
            "test_secret_key_for_testing_purposes_only_32chars".to_string(),
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );
        cfg.db_max_connections = connections;
        cfg.db_min_connections = 1;
        cfg.payment_notify_url = Some("https://kasir.test".to_string());

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");
        payments::seed_payment_methods(&pool)
            .await
            .expect("failed to seed payment methods");

        let db_arc = Arc::new(pool);
        let policy = PolicyEnforcer::from_config(None)
            .await
            .expect("bundled policy parses");
        let auth_service = Arc::new(AuthService::new(
            AuthConfig::from_app_config(&cfg),
            db_arc.clone(),
            Arc::new(policy),
        ));

        let ipaymu = Arc::new(FakeGateway::new(Issuer::Ipaymu));
        let tsm = Arc::new(FakeGateway::new(Issuer::Tsm));
        let mut registry = GatewayRegistry::new();
        registry.register(ipaymu.clone()).register(tsm.clone());

        let (email, email_worker) = EmailQueue::start(Arc::new(LogMailer), 8);

        let services = AppServices::new(
            db_arc.clone(),
            auth_service,
            Arc::new(registry),
            PaymentUrls::from_config(&cfg),
            email,
        );
        let state = AppState {
            db: db_arc,
            config: cfg,
            services,
        };

        Self {
            router: kasir_api::build_router(state.clone()),
            state,
            ipaymu,
            tsm,
            _email_worker: email_worker,
            _dir: dir,
        }
    }

    /// Send a request against the router with an optional bearer token.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(tok) = token {
            builder = builder.header("authorization", format!("Bearer {}", tok));
        }
        let body = match body {
            Some(json) => {
                builder = builder.header("content-type", "application/json");
                Body::from(serde_json::to_vec(&json).expect("serialize request body"))
            }
            None => Body::empty(),
        };
        let request = builder.body(body).expect("failed to build request");
        self.send(request).await
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("read body");
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, value)
    }

    pub async fn get(&self, uri: &str, token: &str) -> (StatusCode, Value) {
        self.request(Method::GET, uri, None, Some(token)).await
    }

    pub async fn post(&self, uri: &str, body: Value, token: &str) -> (StatusCode, Value) {
        self.request(Method::POST, uri, Some(body), Some(token)).await
    }

    pub async fn put(&self, uri: &str, body: Option<Value>, token: &str) -> (StatusCode, Value) {
        self.request(Method::PUT, uri, body, Some(token)).await
    }

    /// Posts a raw callback body the way an issuer would.
    pub async fn callback(&self, issuer: &str, body: &Value, signature: Option<&str>) -> (StatusCode, Value) {
        let raw = serde_json::to_vec(body).expect("serialize callback");
        let mut builder = Request::builder()
            .method(Method::POST)
            .uri(format!("/api/payment/{}/notify", issuer))
            .header("content-type", "application/json");
        let signed;
        let signature = match signature {
            Some(sig) => sig,
            None => {
                signed = gateway::sign(FAKE_VA, &raw);
                signed.as_str()
            }
        };
        builder = builder.header(SIGNATURE_HEADER, signature);
        self.send(builder.body(Body::from(raw)).expect("callback request"))
            .await
    }

    /// Registers an owner and returns their bearer token.
    pub async fn register_owner(&self, email: &str) -> String {
        let (status, body) = self
            .request(
                Method::POST,
                "/auth/register",
                Some(json!({ "name": "Owner", "email": email, "password": "sup3r-secret" })),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "register failed: {body}");
        body["access_token"].as_str().expect("token").to_string()
    }

    /// Creates staff under the owner and logs them in.
    pub async fn staff_token(&self, owner: &str, email: &str, role: &str) -> String {
        let (status, body) = self
            .post(
                "/staff",
                json!({ "name": "Staff", "email": email, "password": "cashier-pass", "role": role }),
                owner,
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "create staff failed: {body}");
        let (status, body) = self
            .request(
                Method::POST,
                "/auth/login",
                Some(json!({ "email": email, "password": "cashier-pass" })),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::OK, "staff login failed: {body}");
        body["access_token"].as_str().expect("token").to_string()
    }

    pub async fn create_outlet(&self, token: &str, outlet_type: &str) -> Uuid {
        let (status, body) = self
            .post(
                "/outlets",
                json!({ "name": "Main Street", "address": "Jl. Merdeka 1", "outlet_type": outlet_type }),
                token,
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "create outlet failed: {body}");
        uuid_of(&body)
    }

    pub async fn create_product(
        &self,
        token: &str,
        sku: &str,
        product_type: &str,
        price: i64,
    ) -> Uuid {
        let (status, body) = self
            .post(
                "/products",
                json!({
                    "name": format!("Product {sku}"),
                    "sku": sku,
                    "product_type": product_type,
                    "price": price,
                    "unit": "pcs",
                }),
                token,
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "create product failed: {body}");
        uuid_of(&body)
    }

    pub async fn set_stock(&self, token: &str, outlet: Uuid, product: Uuid, quantity: i64) {
        let (status, body) = self
            .put(
                &format!("/outlets/{outlet}/stocks"),
                Some(json!({ "product_id": product, "quantity": quantity })),
                token,
            )
            .await;
        assert_eq!(status, StatusCode::OK, "set stock failed: {body}");
    }

    pub async fn stock_of(&self, token: &str, outlet: Uuid, product: Uuid) -> Decimal {
        let (status, body) = self.get(&format!("/outlets/{outlet}/stocks"), token).await;
        assert_eq!(status, StatusCode::OK, "list stock failed: {body}");
        body.as_array()
            .expect("stock rows")
            .iter()
            .find(|row| row["product_uuid"] == json!(product))
            .map(|row| dec(&row["quantity"]))
            .unwrap_or(Decimal::ZERO)
    }

    pub async fn movements(&self, token: &str, outlet: Uuid, product: Uuid) -> Vec<Value> {
        let (status, body) = self
            .get(
                &format!("/outlets/{outlet}/stock-movements?product_id={product}"),
                token,
            )
            .await;
        assert_eq!(status, StatusCode::OK, "movements failed: {body}");
        body.as_array().cloned().unwrap_or_default()
    }

    pub async fn create_order(&self, token: &str, outlet: Uuid, lines: Value) -> (StatusCode, Value) {
        self.post("/orders", json!({ "outlet_id": outlet, "lines": lines }), token)
            .await
    }

    pub async fn method_id(&self, token: &str, code: &str) -> i32 {
        let (status, body) = self.get("/payment-methods", token).await;
        assert_eq!(status, StatusCode::OK, "list methods failed: {body}");
        body.as_array()
            .expect("methods")
            .iter()
            .find(|m| m["code"] == code)
            .and_then(|m| m["id"].as_i64())
            .expect("method seeded") as i32
    }

    pub async fn pay(&self, token: &str, order: Uuid, method_id: i32, amount: i64) -> (StatusCode, Value) {
        self.post(
            "/order-payments",
            json!({ "order_id": order, "payment_method_id": method_id, "amount": amount }),
            token,
        )
        .await
    }

    /// Registers the owner with an issuer and activates one of its methods.
    pub async fn enable_gateway_method(&self, token: &str, issuer: &str, code: &str) -> i32 {
        let (status, body) = self
            .post(
                &format!("/payment-gateways/{issuer}/register"),
                json!({ "external_account_id": "merchant-1", "virtual_account": FAKE_VA }),
                token,
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "gateway register failed: {body}");
        let id = self.method_id(token, code).await;
        let (status, body) = self
            .post(&format!("/payment-methods/{id}/activate"), json!({}), token)
            .await;
        assert_eq!(status, StatusCode::OK, "activate failed: {body}");
        id
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self._email_worker.abort();
    }
}

pub fn uuid_of(body: &Value) -> Uuid {
    body["uuid"]
        .as_str()
        .and_then(|s| Uuid::parse_str(s).ok())
        .unwrap_or_else(|| panic!("no uuid in {body}"))
}

/// Decimals serialize as strings; accept numbers too.
pub fn dec(value: &Value) -> Decimal {
    match value {
        Value::String(s) => Decimal::from_str(s).expect("decimal string"),
        Value::Number(n) => Decimal::from_str(&n.to_string()).expect("decimal number"),
        other => panic!("not a decimal: {other}"),
    }
}
