use crate::error::GatewayError;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::collections::BTreeMap;

type HmacSha256 = Hmac<Sha256>;

pub const SIGN_TYPE: &str = "HMAC-SHA256";

/// String-to-sign: non-empty fields except `sign`, sorted by key, joined as
/// `k=v&...`, with the API key appended as `&key=...`.
fn string_to_sign(params: &BTreeMap<String, String>, api_key: &str) -> String {
    let mut payload = params
        .iter()
        .filter(|(k, v)| k.as_str() != "sign" && !v.is_empty())
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&");
    payload.push_str("&key=");
    payload.push_str(api_key);
    payload
}

fn mac(params: &BTreeMap<String, String>, api_key: &str) -> Result<HmacSha256, GatewayError> {
    let mut mac = HmacSha256::new_from_slice(api_key.as_bytes())
        .map_err(|e| GatewayError::Config(format!("Invalid API key: {}", e)))?;
    mac.update(string_to_sign(params, api_key).as_bytes());
    Ok(mac)
}

/// Upper-case hex HMAC-SHA256 signature.
pub fn sign(params: &BTreeMap<String, String>, api_key: &str) -> Result<String, GatewayError> {
    Ok(hex::encode_upper(mac(params, api_key)?.finalize().into_bytes()))
}

/// Checks the `sign` field in constant time. A missing or non-hex signature fails.
pub fn verify(params: &BTreeMap<String, String>, api_key: &str) -> Result<(), GatewayError> {
    let provided = params
        .get("sign")
        .ok_or(GatewayError::InvalidSignature)?;
    let provided = hex::decode(provided).map_err(|_| GatewayError::InvalidSignature)?;

    mac(params, api_key)?
        .verify_slice(&provided)
        .map_err(|_| GatewayError::InvalidSignature)
}
