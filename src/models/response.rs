use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Values for the QR checkout page. Exactly one of the two shapes is rendered.
#[derive(Serialize, Deserialize, Debug, PartialEq)]
#[serde(untagged)]
pub enum QrCodePage {
    Ready {
        qrcode: String,
        order: String,
        amount: Decimal,
    },
    Failed {
        error: String,
    },
}

/// `result` is `0` once the payment is confirmed and `1` otherwise.
#[derive(Serialize, Deserialize, Debug, PartialEq)]
pub struct PollResult {
    pub result: u8,
    pub order: String,
}

impl PollResult {
    pub fn new(confirmed: bool, order: String) -> Self {
        Self {
            result: if confirmed { 0 } else { 1 },
            order,
        }
    }
}

#[derive(Serialize, Deserialize, Debug)]
pub struct BeginCheckout {
    pub reference: String,
    pub amount: Decimal,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct CheckoutStarted {
    pub reference: String,
    pub action_url: String,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct HealthStatus {
    pub status: String,
    pub version: String,
    pub store: bool,
    pub uptime_seconds: u64,
    pub timestamp: DateTime<Utc>,
}
