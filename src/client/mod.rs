pub mod sign;
pub mod wechat;
pub mod xml;

pub use wechat::{WeChatPayClient, WeChatPayCredentials};

use crate::{
    error::GatewayError,
    models::{CreateOrderRequest, CreatedOrder, OrderQuery, PushNotification},
};
use async_trait::async_trait;
use std::collections::BTreeMap;

/// The three gateway calls checkout needs.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Places a remote order and returns the URL to encode as a QR code.
    async fn create_order(&self, request: &CreateOrderRequest) -> Result<CreatedOrder, GatewayError>;

    /// Remote status of the order placed under `out_trade_no`.
    async fn query_order(&self, out_trade_no: &str) -> Result<OrderQuery, GatewayError>;

    /// Verifies and decodes an asynchronous payment notification.
    fn parse_push(&self, raw: &[u8]) -> Result<PushNotification, GatewayError>;
}

/// Signs `params` in place and encodes them as a gateway XML document.
pub fn signed_xml(
    mut params: BTreeMap<String, String>,
    api_key: &str,
) -> Result<String, GatewayError> {
    let signature = sign::sign(&params, api_key)?;
    params.insert("sign".to_string(), signature);
    Ok(xml::to_xml(&params))
}
