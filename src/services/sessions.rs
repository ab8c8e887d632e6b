use crate::models::CheckoutOrder;
use axum::http::{header::COOKIE, HeaderMap};
use moka::future::Cache;
use std::time::Duration;
use uuid::Uuid;

pub const SESSION_COOKIE: &str = "checkout_session";

/// Maps checkout session ids to the order the shopper is paying for.
pub struct SessionStore {
    orders: Cache<String, CheckoutOrder>,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        let orders = Cache::builder()
            .max_capacity(100_000)
            .time_to_live(ttl)
            .build();
        Self { orders }
    }

    /// Opens a new session for `order` and returns its id.
    pub async fn begin(&self, order: CheckoutOrder) -> String {
        let session_id = Uuid::new_v4().simple().to_string();
        tracing::debug!(session = %session_id, reference = %order.reference, "Checkout session opened");
        self.orders.insert(session_id.clone(), order).await;
        session_id
    }

    pub async fn current_order(&self, session_id: &str) -> Option<CheckoutOrder> {
        self.orders.get(session_id).await
    }

    /// Resolves the order behind the session cookie of a request.
    pub async fn order_for(&self, headers: &HeaderMap) -> Option<CheckoutOrder> {
        let session_id = session_id(headers)?;
        self.current_order(&session_id).await
    }
}

pub fn session_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|cookies| cookies.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.to_string())
        .filter(|value| !value.is_empty())
}

pub fn session_cookie(session_id: &str, ttl: Duration) -> String {
    format!(
        "{}={}; Path=/; Max-Age={}; HttpOnly; SameSite=Lax",
        SESSION_COOKIE,
        session_id,
        ttl.as_secs()
    )
}
