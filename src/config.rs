use anyhow::{bail, Context, Result};
use std::path::PathBuf;
use std::time::Duration;

use crate::client::WeChatPayCredentials;

pub const DEFAULT_GATEWAY_URL: &str = "https://api.mch.weixin.qq.com";

#[derive(Debug, Clone)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub environment: Environment,
    pub host: String,
    pub port: u16,

    // Public URL of this service, used to build the notify callback
    pub base_url: String,
    pub process_page_url: String,

    // WeChat Pay acquirer
    pub wechatpay: WeChatPayCredentials,
    pub gateway_url: String,
    pub gateway_timeout: Duration,
    pub server_ip: String,

    // Redis (in-memory store when unset)
    pub redis_url: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let environment = Self::parse_environment()?;

        let config = Self {
            environment: environment.clone(),
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .context("Invalid PORT")?,

            base_url: std::env::var("BASE_URL")
                .context("BASE_URL required")?
                .trim_end_matches('/')
                .to_string(),
            process_page_url: std::env::var("PROCESS_PAGE_URL")
                .unwrap_or_else(|_| "/payment/process".to_string()),

            wechatpay: WeChatPayCredentials {
                app_id: std::env::var("WECHATPAY_APPID").context("WECHATPAY_APPID required")?,
                api_key: std::env::var("WECHATPAY_API_KEY")
                    .context("WECHATPAY_API_KEY required")?,
                mch_id: std::env::var("WECHATPAY_MCH_ID").context("WECHATPAY_MCH_ID required")?,
                mch_cert_path: std::env::var("WECHATPAY_MCH_CERT").ok().map(PathBuf::from),
                mch_key_path: std::env::var("WECHATPAY_MCH_KEY").ok().map(PathBuf::from),
            },
            gateway_url: std::env::var("WECHATPAY_GATEWAY_URL")
                .unwrap_or_else(|_| DEFAULT_GATEWAY_URL.to_string()),
            gateway_timeout: Duration::from_secs(
                std::env::var("GATEWAY_TIMEOUT_SECS")
                    .unwrap_or_else(|_| "10".to_string())
                    .parse()
                    .context("Invalid GATEWAY_TIMEOUT_SECS")?,
            ),
            server_ip: std::env::var("WECHATPAY_SERVER_IP")
                .unwrap_or_else(|_| "127.0.0.1".to_string()),

            redis_url: std::env::var("REDIS_URL").ok(),
        };

        config.validate()?;
        Ok(config)
    }

    /// Callback URL handed to the gateway with every new order.
    pub fn notify_url(&self) -> String {
        format!("{}{}", self.base_url, crate::routes::NOTIFY_PATH)
    }

    fn parse_environment() -> Result<Environment> {
        let env = std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());

        match env.to_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "staging" | "stage" => Ok(Environment::Staging),
            "production" | "prod" => Ok(Environment::Production),
            _ => bail!("Unknown environment: {}", env),
        }
    }

    fn validate(&self) -> Result<()> {
        if !self.base_url.starts_with("http") {
            bail!("BASE_URL must be HTTP(S) URL");
        }
        if !self.gateway_url.starts_with("http") {
            bail!("WECHATPAY_GATEWAY_URL must be HTTP(S) URL");
        }
        if self.wechatpay.mch_cert_path.is_some() != self.wechatpay.mch_key_path.is_some() {
            bail!("WECHATPAY_MCH_CERT and WECHATPAY_MCH_KEY must be set together");
        }
        if matches!(self.environment, Environment::Production) && !self.base_url.starts_with("https") {
            bail!("BASE_URL must use HTTPS in production");
        }

        tracing::info!(
            "Configuration validated for {:?} environment",
            self.environment
        );

        Ok(())
    }
}
