//! Razorpay order creation and payment signature checks.

use std::time::Duration;

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tracing::{info, instrument};

use super::{http_client, GatewayOrder, PaymentGateway};
use crate::domain::value_objects::Money;
use crate::error::{Result, StorefrontError};

type HmacSha256 = Hmac<Sha256>;

/// Checks `razorpay_signature = hex(HMAC-SHA256(secret, "<order_id>|<payment_id>"))`.
#[derive(Clone)]
pub struct SignatureVerifier {
    secret: String,
}

impl SignatureVerifier {
    pub fn new(secret: impl Into<String>) -> Self { Self { secret: secret.into() } }

    pub fn sign(&self, gateway_order_id: &str, gateway_payment_id: &str) -> Result<String> {
        Ok(hex::encode(self.mac(gateway_order_id, gateway_payment_id)?.finalize().into_bytes()))
    }

    /// Constant-time comparison of the decoded signature against the expected MAC.
    pub fn verify(&self, gateway_order_id: &str, gateway_payment_id: &str, signature: &str) -> Result<()> {
        let provided = hex::decode(signature).map_err(|_| StorefrontError::InvalidSignature)?;
        self.mac(gateway_order_id, gateway_payment_id)?
            .verify_slice(&provided)
            .map_err(|_| StorefrontError::InvalidSignature)
    }

    fn mac(&self, gateway_order_id: &str, gateway_payment_id: &str) -> Result<HmacSha256> {
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .map_err(|e| StorefrontError::PaymentVerificationFailed(e.to_string()))?;
        mac.update(format!("{}|{}", gateway_order_id, gateway_payment_id).as_bytes());
        Ok(mac)
    }
}

impl std::fmt::Debug for SignatureVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { f.write_str("SignatureVerifier(..)") }
}

#[derive(Serialize)]
struct CreateOrderBody<'a> {
    amount: i64,
    currency: &'a str,
    receipt: &'a str,
}

#[derive(Deserialize)]
struct CreateOrderResponse {
    id: String,
    amount: i64,
    currency: String,
    receipt: Option<String>,
}

pub struct RazorpayClient {
    http: reqwest::Client,
    base_url: String,
    key_id: String,
    key_secret: String,
}

impl RazorpayClient {
    pub fn new(base_url: impl Into<String>, key_id: impl Into<String>, key_secret: impl Into<String>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            http: http_client(timeout)?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            key_id: key_id.into(),
            key_secret: key_secret.into(),
        })
    }
}

#[async_trait]
impl PaymentGateway for RazorpayClient {
    fn key_id(&self) -> &str { &self.key_id }

    #[instrument(skip(self), fields(amount = %amount.amount(), currency = amount.currency()))]
    async fn create_order(&self, amount: &Money, receipt: &str) -> Result<GatewayOrder> {
        let body = CreateOrderBody { amount: amount.minor_units()?, currency: amount.currency(), receipt };
        let response = self.http
            .post(format!("{}/v1/orders", self.base_url))
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .json(&body)
            .send()
            .await
            .map_err(|e| StorefrontError::external("razorpay", e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(StorefrontError::external("razorpay", format!("order creation failed: {} - {}", status, text)));
        }
        let created: CreateOrderResponse = response.json().await.map_err(|e| StorefrontError::external("razorpay", e.to_string()))?;
        info!(gateway_order_id = %created.id, "gateway order created");
        Ok(GatewayOrder { gateway_order_id: created.id, amount: created.amount, currency: created.currency, receipt: created.receipt })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use wiremock::matchers::{body_json, header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_signature_round_trip() {
        let v = SignatureVerifier::new("s3cret");
        let sig = v.sign("order_A", "pay_B").unwrap();
        assert_eq!(sig.len(), 64);
        assert!(v.verify("order_A", "pay_B", &sig).is_ok());
        assert!(matches!(v.verify("order_A", "pay_C", &sig), Err(StorefrontError::InvalidSignature)));
        assert!(SignatureVerifier::new("other").verify("order_A", "pay_B", &sig).is_err());
    }

    #[test]
    fn test_malformed_signature_rejected() {
        let v = SignatureVerifier::new("s3cret");
        let sig = v.sign("order_A", "pay_B").unwrap();
        assert!(matches!(v.verify("order_A", "pay_B", "zz-not-hex"), Err(StorefrontError::InvalidSignature)));
        assert!(matches!(v.verify("order_A", "pay_B", &sig[..32]), Err(StorefrontError::InvalidSignature)));
        assert!(matches!(v.verify("order_A", "pay_B", ""), Err(StorefrontError::InvalidSignature)));
        assert!(v.verify("order_A", "pay_B", &sig.to_uppercase()).is_ok());
    }

    #[tokio::test]
    async fn test_create_order_sends_paise() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/orders"))
            .and(header_exists("authorization"))
            .and(body_json(serde_json::json!({"amount": 50000, "currency": "INR", "receipt": "rcpt_1"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "order_N1", "amount": 50000, "currency": "INR", "receipt": "rcpt_1", "status": "created"
            })))
            .mount(&server)
            .await;

        let client = RazorpayClient::new(server.uri(), "rzp_test", "secret", Duration::from_secs(5)).unwrap();
        let order = client.create_order(&Money::inr(dec!(500)), "rcpt_1").await.unwrap();
        assert_eq!(order.gateway_order_id, "order_N1");
        assert_eq!(order.amount, 50000);
    }

    #[tokio::test]
    async fn test_create_order_failure_is_external() {
        let server = MockServer::start().await;
        Mock::given(method("POST")).and(path("/v1/orders"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
            .mount(&server)
            .await;
        let client = RazorpayClient::new(server.uri(), "rzp_test", "secret", Duration::from_secs(5)).unwrap();
        let err = client.create_order(&Money::inr(dec!(10)), "rcpt_2").await.unwrap_err();
        assert!(matches!(err, StorefrontError::ExternalService { service: "razorpay", .. }));
    }
}
