use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use std::fmt;

/// `return_code` / `result_code` as reported by the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Code {
    Success,
    Fail(String),
}

impl Code {
    /// Anything but a literal `SUCCESS` is a failure; the message is kept for logs.
    pub fn from_fields(code: Option<&str>, message: Option<&str>) -> Self {
        match code {
            Some("SUCCESS") => Code::Success,
            Some(other) => Code::Fail(message.unwrap_or(other).to_string()),
            None => Code::Fail(message.unwrap_or("missing code").to_string()),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Code::Success)
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Code::Success => f.write_str("SUCCESS"),
            Code::Fail(msg) => write!(f, "FAIL ({})", msg),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeState {
    Success,
    Refund,
    NotPay,
    Closed,
    Revoked,
    UserPaying,
    PayError,
    Other(String),
}

impl TradeState {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "SUCCESS" => TradeState::Success,
            "REFUND" => TradeState::Refund,
            "NOTPAY" => TradeState::NotPay,
            "CLOSED" => TradeState::Closed,
            "REVOKED" => TradeState::Revoked,
            "USERPAYING" => TradeState::UserPaying,
            "PAYERROR" => TradeState::PayError,
            other => TradeState::Other(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradeType {
    /// Merchant displays a QR code, the payer scans it.
    Native,
}

impl TradeType {
    pub fn as_str(self) -> &'static str {
        match self {
            TradeType::Native => "NATIVE",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreateOrderRequest {
    pub trade_type: TradeType,
    pub body: String,
    pub time_start: DateTime<FixedOffset>,
    pub time_expire: DateTime<FixedOffset>,
    pub out_trade_no: String,
    pub total_fee: u64,
    pub notify_url: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreatedOrder {
    pub prepay_id: Option<String>,
    pub code_url: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderQuery {
    pub return_code: Code,
    pub result_code: Code,
    pub trade_state: Option<TradeState>,
    pub out_trade_no: Option<String>,
    pub transaction_id: Option<String>,
}

impl OrderQuery {
    /// The remote transaction id, only when the order is reported as paid.
    pub fn paid_transaction_id(&self) -> Option<&str> {
        if self.return_code.is_success()
            && self.result_code.is_success()
            && self.trade_state == Some(TradeState::Success)
        {
            self.transaction_id.as_deref()
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PushNotification {
    pub return_code: Code,
    pub result_code: Code,
    pub out_trade_no: Option<String>,
    pub transaction_id: Option<String>,
    pub total_fee: Option<u64>,
}

impl PushNotification {
    /// `(out_trade_no, transaction_id)` when the push reports a successful payment.
    pub fn confirmed_payment(&self) -> Option<(&str, &str)> {
        if !(self.return_code.is_success() && self.result_code.is_success()) {
            return None;
        }
        Some((self.out_trade_no.as_deref()?, self.transaction_id.as_deref()?))
    }
}
