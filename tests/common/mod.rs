#![allow(dead_code)]

use axum::{
    body::{to_bytes, Body},
    http::{header, Request, Response},
    Router,
};
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use wechat_checkout::{
    client::{signed_xml, WeChatPayClient, WeChatPayCredentials},
    handlers::{AppState, CheckoutSettings, HealthState},
    models::{NewTransaction, PaymentTransaction, TransactionState},
    routes::create_router,
    services::{InMemoryTransactionStore, TransactionStore},
};

pub const APP_ID: &str = "wx2421b1c4370ec43b";
pub const MCH_ID: &str = "10000100";
pub const API_KEY: &str = "192006250b4c09247ec02edce69f6a2d";
pub const PROCESS_PAGE: &str = "/payment/process";

pub struct TestApp {
    pub router: Router,
    pub store: Arc<InMemoryTransactionStore>,
}

impl TestApp {
    pub fn new(gateway_url: String) -> Self {
        let credentials = WeChatPayCredentials {
            app_id: APP_ID.to_string(),
            api_key: API_KEY.to_string(),
            mch_id: MCH_ID.to_string(),
            mch_cert_path: None,
            mch_key_path: None,
        };
        let gateway = Arc::new(
            WeChatPayClient::new(credentials, gateway_url, Duration::from_secs(5)).unwrap(),
        );
        let store = Arc::new(InMemoryTransactionStore::new());

        let state = AppState::new(
            gateway,
            store.clone(),
            CheckoutSettings {
                notify_url: "https://shop.example.com/checkout/notify".to_string(),
                process_page_url: PROCESS_PAGE.to_string(),
                order_lifetime: Duration::from_secs(7200),
            },
        );
        let health = HealthState {
            store: store.clone(),
            started_at: Instant::now(),
        };

        Self {
            router: create_router(state, health),
            store,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        use tower::ServiceExt;
        self.router.clone().oneshot(request).await.unwrap()
    }

    /// Starts checkout for `reference` and returns the session cookie.
    pub async fn begin(&self, reference: &str, amount: &str) -> String {
        let request = Request::post("/checkout/begin")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(format!(
                r#"{{"reference":"{}","amount":"{}"}}"#,
                reference, amount
            )))
            .unwrap();
        let response = self.send(request).await;
        assert!(response.status().is_success(), "begin failed: {}", response.status());

        let set_cookie = response.headers()[header::SET_COOKIE].to_str().unwrap();
        set_cookie.split(';').next().unwrap().to_string()
    }

    pub async fn insert(&self, reference: &str, state: TransactionState) -> PaymentTransaction {
        self.store
            .insert(NewTransaction {
                reference: reference.to_string(),
                amount: Decimal::new(1, 2),
                state,
            })
            .await
            .unwrap()
    }

    pub async fn transaction(&self, reference: &str) -> PaymentTransaction {
        let mut found = self.store.search(reference).await.unwrap();
        assert_eq!(found.len(), 1);
        found.remove(0)
    }
}

pub fn get(uri: &str, cookie: &str) -> Request<Body> {
    Request::get(uri)
        .header(header::COOKIE, cookie)
        .body(Body::empty())
        .unwrap()
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    to_bytes(response.into_body(), usize::MAX).await.unwrap().to_vec()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

/// A gateway document signed with the test API key.
pub fn signed(pairs: &[(&str, &str)]) -> String {
    let params: BTreeMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    signed_xml(params, API_KEY).unwrap()
}

pub fn paid_push(out_trade_no: &str, transaction_id: &str) -> String {
    signed(&[
        ("appid", APP_ID),
        ("mch_id", MCH_ID),
        ("return_code", "SUCCESS"),
        ("result_code", "SUCCESS"),
        ("out_trade_no", out_trade_no),
        ("transaction_id", transaction_id),
        ("total_fee", "1"),
        ("trade_type", "NATIVE"),
    ])
}

pub fn order_query(trade_state: &str, transaction_id: &str) -> String {
    signed(&[
        ("appid", APP_ID),
        ("mch_id", MCH_ID),
        ("return_code", "SUCCESS"),
        ("result_code", "SUCCESS"),
        ("trade_state", trade_state),
        ("out_trade_no", "SO1001"),
        ("transaction_id", transaction_id),
    ])
}
