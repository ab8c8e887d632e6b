use crate::{
    client::{sign, signed_xml, xml, PaymentGateway},
    error::GatewayError,
    models::{Code, CreateOrderRequest, CreatedOrder, OrderQuery, PushNotification, TradeState},
};
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;
use uuid::Uuid;

const UNIFIED_ORDER_PATH: &str = "/pay/unifiedorder";
const ORDER_QUERY_PATH: &str = "/pay/orderquery";
const TIME_FORMAT: &str = "%Y%m%d%H%M%S";

/// Merchant credentials of the WeChat Pay acquirer.
#[derive(Debug, Clone)]
pub struct WeChatPayCredentials {
    pub app_id: String,
    pub api_key: String,
    pub mch_id: String,
    pub mch_cert_path: Option<PathBuf>,
    pub mch_key_path: Option<PathBuf>,
}

impl WeChatPayCredentials {
    fn validate(&self) -> Result<(), GatewayError> {
        for (name, value) in [
            ("app_id", &self.app_id),
            ("api_key", &self.api_key),
            ("mch_id", &self.mch_id),
        ] {
            if value.trim().is_empty() {
                return Err(GatewayError::Config(format!("{} is empty", name)));
            }
        }

        for path in [&self.mch_cert_path, &self.mch_key_path].into_iter().flatten() {
            if !path.exists() {
                return Err(GatewayError::Config(format!(
                    "merchant file {} does not exist",
                    path.display()
                )));
            }
        }

        Ok(())
    }
}

/// WeChat Pay API v2 client. There is no sandbox; point `gateway_url` at a
/// stub server for testing.
pub struct WeChatPayClient {
    credentials: WeChatPayCredentials,
    gateway_url: String,
    server_ip: String,
    client: reqwest::Client,
}

impl WeChatPayClient {
    pub fn new(
        credentials: WeChatPayCredentials,
        gateway_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, GatewayError> {
        credentials.validate().map_err(|e| {
            tracing::error!("Failed to build WeChat Pay client: {}", e);
            e
        })?;

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GatewayError::Config(format!("HTTP client: {}", e)))?;

        Ok(Self {
            credentials,
            gateway_url: gateway_url.into().trim_end_matches('/').to_string(),
            server_ip: "127.0.0.1".to_string(),
            client,
        })
    }

    /// Address reported as `spbill_create_ip` on new orders.
    pub fn with_server_ip(mut self, server_ip: impl Into<String>) -> Self {
        self.server_ip = server_ip.into();
        self
    }

    async fn post(
        &self,
        path: &str,
        mut params: BTreeMap<String, String>,
    ) -> Result<BTreeMap<String, String>, GatewayError> {
        params.insert("appid".to_string(), self.credentials.app_id.clone());
        params.insert("mch_id".to_string(), self.credentials.mch_id.clone());
        params.insert("nonce_str".to_string(), Uuid::new_v4().simple().to_string());
        params.insert("sign_type".to_string(), sign::SIGN_TYPE.to_string());

        let body = signed_xml(params, &self.credentials.api_key)?;

        let response = self
            .client
            .post(format!("{}{}", self.gateway_url, path))
            .header(CONTENT_TYPE, "text/xml; charset=utf-8")
            .body(body)
            .send()
            .await?
            .error_for_status()?;

        let raw = response.bytes().await?;
        let fields = xml::from_xml(&raw)?;

        // Only successful responses carry a signature.
        if is_success(&fields, "return_code") {
            sign::verify(&fields, &self.credentials.api_key)?;
        }

        tracing::debug!(path, fields = ?fields, "WeChat Pay response");
        Ok(fields)
    }
}

#[async_trait]
impl PaymentGateway for WeChatPayClient {
    async fn create_order(&self, request: &CreateOrderRequest) -> Result<CreatedOrder, GatewayError> {
        let params = BTreeMap::from([
            ("trade_type".to_string(), request.trade_type.as_str().to_string()),
            ("body".to_string(), request.body.clone()),
            ("out_trade_no".to_string(), request.out_trade_no.clone()),
            ("product_id".to_string(), request.out_trade_no.clone()),
            ("total_fee".to_string(), request.total_fee.to_string()),
            ("spbill_create_ip".to_string(), self.server_ip.clone()),
            ("time_start".to_string(), request.time_start.format(TIME_FORMAT).to_string()),
            ("time_expire".to_string(), request.time_expire.format(TIME_FORMAT).to_string()),
            ("notify_url".to_string(), request.notify_url.clone()),
        ]);

        let fields = self.post(UNIFIED_ORDER_PATH, params).await?;

        let return_code = return_code(&fields);
        let result_code = result_code(&fields);
        if !return_code.is_success() || !result_code.is_success() {
            tracing::error!(
                out_trade_no = %request.out_trade_no,
                %return_code,
                %result_code,
                "WeChat Pay unified order failed"
            );
            return Err(GatewayError::Rejected(format!(
                "order {} not created: return_code={}, result_code={}",
                request.out_trade_no, return_code, result_code
            )));
        }

        let code_url = field(&fields, "code_url")
            .ok_or_else(|| GatewayError::MalformedPayload("code_url missing".to_string()))?;

        Ok(CreatedOrder {
            prepay_id: field(&fields, "prepay_id"),
            code_url,
        })
    }

    async fn query_order(&self, out_trade_no: &str) -> Result<OrderQuery, GatewayError> {
        let params = BTreeMap::from([("out_trade_no".to_string(), out_trade_no.to_string())]);
        let fields = self.post(ORDER_QUERY_PATH, params).await?;

        let query = OrderQuery {
            return_code: return_code(&fields),
            result_code: result_code(&fields),
            trade_state: field(&fields, "trade_state").map(|s| TradeState::parse(&s)),
            out_trade_no: field(&fields, "out_trade_no"),
            transaction_id: field(&fields, "transaction_id"),
        };
        tracing::info!(out_trade_no, query = ?query, "WeChat Pay order query");
        Ok(query)
    }

    fn parse_push(&self, raw: &[u8]) -> Result<PushNotification, GatewayError> {
        let fields = xml::from_xml(raw)?;
        let return_code = return_code(&fields);

        if return_code.is_success() {
            sign::verify(&fields, &self.credentials.api_key)?;
            if field(&fields, "appid").as_deref() != Some(self.credentials.app_id.as_str())
                || field(&fields, "mch_id").as_deref() != Some(self.credentials.mch_id.as_str())
            {
                return Err(GatewayError::MalformedPayload(
                    "notification addressed to another merchant".to_string(),
                ));
            }
        }

        let push = PushNotification {
            return_code,
            result_code: result_code(&fields),
            out_trade_no: field(&fields, "out_trade_no"),
            transaction_id: field(&fields, "transaction_id"),
            total_fee: field(&fields, "total_fee").and_then(|fee| fee.parse().ok()),
        };

        if push.return_code.is_success()
            && push.result_code.is_success()
            && push.confirmed_payment().is_none()
        {
            return Err(GatewayError::MalformedPayload(
                "successful notification without out_trade_no/transaction_id".to_string(),
            ));
        }

        Ok(push)
    }
}

fn field(fields: &BTreeMap<String, String>, key: &str) -> Option<String> {
    fields.get(key).filter(|v| !v.is_empty()).cloned()
}

fn is_success(fields: &BTreeMap<String, String>, key: &str) -> bool {
    fields.get(key).map(String::as_str) == Some("SUCCESS")
}

fn return_code(fields: &BTreeMap<String, String>) -> Code {
    Code::from_fields(
        fields.get("return_code").map(String::as_str),
        fields.get("return_msg").map(String::as_str),
    )
}

fn result_code(fields: &BTreeMap<String, String>) -> Code {
    Code::from_fields(
        fields.get("result_code").map(String::as_str),
        fields
            .get("err_code_des")
            .or_else(|| fields.get("err_code"))
            .map(String::as_str),
    )
}
