//! Shiprocket carrier API.
//!
//! Login exchanges email and password for a bearer token, cached until shortly
//! before it expires. A 401 on any call drops the cached token and retries once.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};

use super::{http_client, Carrier, Contact, ReturnShipment, ReturnShipmentRequest, ShipmentLine, ShipmentRequest};
use crate::domain::aggregates::CarrierShipment;
use crate::error::{Result, StorefrontError};

const SERVICE: &str = "shiprocket";
const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(240 * 3600);
const TOKEN_MARGIN: Duration = Duration::from_secs(60);

#[derive(Clone, Debug)]
pub struct ShiprocketCredentials {
    pub email: String,
    pub password: String,
}

struct CachedToken {
    value: String,
    expires_at: Instant,
}

pub struct ShiprocketClient {
    http: reqwest::Client,
    base_url: String,
    credentials: Option<ShiprocketCredentials>,
    pickup_location: String,
    token: Mutex<Option<CachedToken>>,
}

#[derive(Serialize)]
struct LoginBody<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct LoginResponse {
    token: String,
    expires_in: Option<u64>,
}

#[derive(Serialize)]
struct OrderItemBody<'a> {
    name: &'a str,
    sku: &'a str,
    units: i32,
    selling_price: Decimal,
    discount: i32,
    tax: i32,
    hsn: &'a str,
}

#[derive(Serialize)]
struct CreateOrderBody<'a> {
    order_id: &'a str,
    order_date: String,
    pickup_location: &'a str,
    comment: &'a str,
    shipping_is_billing: bool,
    billing_customer_name: &'a str,
    billing_last_name: &'a str,
    billing_address: &'a str,
    billing_address_2: &'a str,
    billing_city: &'a str,
    billing_pincode: &'a str,
    billing_state: &'a str,
    billing_country: &'a str,
    billing_email: &'a str,
    billing_phone: &'a str,
    shipping_customer_name: &'a str,
    shipping_last_name: &'a str,
    shipping_address: &'a str,
    shipping_address_2: &'a str,
    shipping_city: &'a str,
    shipping_pincode: &'a str,
    shipping_state: &'a str,
    shipping_country: &'a str,
    shipping_email: &'a str,
    shipping_phone: &'a str,
    order_items: Vec<OrderItemBody<'a>>,
    payment_method: &'a str,
    sub_total: Decimal,
    length: i32,
    breadth: i32,
    height: i32,
    /// Kilograms
    weight: Decimal,
}

#[derive(Deserialize)]
struct CreateOrderResponse {
    order_id: Option<i64>,
    #[serde(default)]
    awb_code: Option<String>,
    #[serde(default)]
    awb_codes: Vec<String>,
    #[serde(default)]
    courier_name: Option<String>,
    #[serde(default)]
    label_url: Option<String>,
}

#[derive(Serialize)]
struct CancelBody {
    ids: Vec<i64>,
}

#[derive(Serialize)]
struct ReturnItemBody<'a> {
    name: &'a str,
    sku: &'a str,
    units: i32,
    selling_price: Decimal,
}

#[derive(Serialize)]
struct ReturnBody<'a> {
    order_id: &'a str,
    channel_id: &'a str,
    pickup_customer_name: &'a str,
    pickup_customer_phone: &'a str,
    pickup_customer_email: &'a str,
    pickup_address: &'a str,
    pickup_city: &'a str,
    pickup_state: &'a str,
    pickup_pincode: &'a str,
    pickup_country: &'a str,
    return_reason: &'a str,
    return_type: &'a str,
    return_items: Vec<ReturnItemBody<'a>>,
}

#[derive(Deserialize)]
struct ReturnResponse {
    return_id: serde_json::Value,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    awb_code: Option<String>,
}

fn items(lines: &[ShipmentLine]) -> Vec<OrderItemBody<'_>> {
    lines.iter().map(|l| OrderItemBody {
        name: &l.name, sku: l.sku.as_str(), units: l.units, selling_price: l.selling_price, discount: 0, tax: 0, hsn: &l.hsn,
    }).collect()
}

fn line2(c: &Contact) -> &str { c.address.line2.as_deref().unwrap_or("") }

impl ShiprocketClient {
    pub fn new(base_url: impl Into<String>, credentials: Option<ShiprocketCredentials>, pickup_location: impl Into<String>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            http: http_client(timeout)?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            credentials,
            pickup_location: pickup_location.into(),
            token: Mutex::new(None),
        })
    }

    async fn token(&self) -> Result<String> {
        let mut cached = self.token.lock().await;
        if let Some(t) = cached.as_ref().filter(|t| t.expires_at > Instant::now()) {
            return Ok(t.value.clone());
        }
        let creds = self.credentials.as_ref().ok_or_else(|| StorefrontError::external(SERVICE, "credentials not configured"))?;
        let response = self.http
            .post(format!("{}/v1/external/auth/login", self.base_url))
            .json(&LoginBody { email: &creds.email, password: &creds.password })
            .send()
            .await
            .map_err(|e| StorefrontError::external(SERVICE, e.to_string()))?;
        if !response.status().is_success() {
            return Err(StorefrontError::external(SERVICE, format!("auth failed: {}", response.status())));
        }
        let login: LoginResponse = response.json().await.map_err(|e| StorefrontError::external(SERVICE, e.to_string()))?;
        let ttl = login.expires_in.map(Duration::from_secs).unwrap_or(DEFAULT_TOKEN_TTL).saturating_sub(TOKEN_MARGIN);
        *cached = Some(CachedToken { value: login.token.clone(), expires_at: Instant::now() + ttl });
        Ok(login.token)
    }

    async fn post<B: Serialize + Sync, R: DeserializeOwned + Send>(&self, path: &str, body: &B) -> Result<R> {
        for attempt in 0..2 {
            let token = self.token().await?;
            let response = self.http
                .post(format!("{}{}", self.base_url, path))
                .bearer_auth(&token)
                .json(body)
                .send()
                .await
                .map_err(|e| StorefrontError::external(SERVICE, e.to_string()))?;
            let status = response.status();
            if status == reqwest::StatusCode::UNAUTHORIZED && attempt == 0 {
                warn!(path, "carrier token rejected, logging in again");
                *self.token.lock().await = None;
                continue;
            }
            if !status.is_success() {
                let text = response.text().await.unwrap_or_default();
                return Err(StorefrontError::external(SERVICE, format!("{} failed: {} - {}", path, status, text)));
            }
            return response.json().await.map_err(|e| StorefrontError::external(SERVICE, e.to_string()));
        }
        Err(StorefrontError::external(SERVICE, "authentication rejected"))
    }
}

#[async_trait]
impl Carrier for ShiprocketClient {
    #[instrument(skip(self, request), fields(order_id = %request.order_id))]
    async fn create_shipment(&self, request: &ShipmentRequest) -> Result<CarrierShipment> {
        let (b, s) = (&request.billing, &request.shipping);
        let body = CreateOrderBody {
            order_id: &request.order_id,
            order_date: request.order_date.format("%Y-%m-%d %H:%M").to_string(),
            pickup_location: &self.pickup_location,
            comment: &request.comment,
            shipping_is_billing: request.shipping_is_billing,
            billing_customer_name: &b.name, billing_last_name: "", billing_address: &b.address.line1,
            billing_address_2: line2(b), billing_city: &b.address.city, billing_pincode: &b.address.pincode,
            billing_state: &b.address.state, billing_country: "India", billing_email: &b.email, billing_phone: &b.phone,
            shipping_customer_name: &s.name, shipping_last_name: "", shipping_address: &s.address.line1,
            shipping_address_2: line2(s), shipping_city: &s.address.city, shipping_pincode: &s.address.pincode,
            shipping_state: &s.address.state, shipping_country: "India", shipping_email: &s.email, shipping_phone: &s.phone,
            order_items: items(&request.lines),
            payment_method: if request.prepaid { "Prepaid" } else { "COD" },
            sub_total: request.sub_total,
            length: request.package.length_cm,
            breadth: request.package.breadth_cm,
            height: request.package.height_cm,
            weight: Decimal::new(request.package.weight_grams as i64, 3),
        };
        let created: CreateOrderResponse = self.post("/v1/external/orders/create/adhoc", &body).await?;
        let carrier_order_id = created.order_id
            .ok_or_else(|| StorefrontError::external(SERVICE, "order creation returned no order id"))?
            .to_string();
        let awb = created.awb_code.filter(|a| !a.is_empty()).or_else(|| created.awb_codes.into_iter().find(|a| !a.is_empty()));
        info!(carrier_order_id = %carrier_order_id, awb = ?awb, "carrier shipment created");
        Ok(CarrierShipment { carrier_order_id, awb, courier: created.courier_name.filter(|c| !c.is_empty()), label_url: created.label_url })
    }

    #[instrument(skip(self))]
    async fn cancel_shipments(&self, carrier_order_ids: &[String]) -> Result<()> {
        let ids = carrier_order_ids.iter()
            .map(|id| id.parse::<i64>().map_err(|_| StorefrontError::Validation(format!("carrier order id {:?} is not numeric", id))))
            .collect::<Result<Vec<_>>>()?;
        let _: serde_json::Value = self.post("/v1/external/orders/cancel", &CancelBody { ids }).await?;
        info!(count = carrier_order_ids.len(), "carrier shipments cancelled");
        Ok(())
    }

    #[instrument(skip(self, request), fields(carrier_order_id = %request.carrier_order_id))]
    async fn create_return(&self, request: &ReturnShipmentRequest) -> Result<ReturnShipment> {
        let p = &request.pickup;
        let body = ReturnBody {
            order_id: &request.carrier_order_id,
            channel_id: "1",
            pickup_customer_name: &p.name, pickup_customer_phone: &p.phone, pickup_customer_email: &p.email,
            pickup_address: &p.address.line1, pickup_city: &p.address.city, pickup_state: &p.address.state,
            pickup_pincode: &p.address.pincode, pickup_country: "India",
            return_reason: request.reason.as_ref(),
            return_type: "refund",
            return_items: request.lines.iter().map(|l| ReturnItemBody { name: &l.name, sku: l.sku.as_str(), units: l.units, selling_price: l.selling_price }).collect(),
        };
        let created: ReturnResponse = self.post("/v1/external/orders/return", &body).await?;
        let return_id = match created.return_id {
            serde_json::Value::String(s) => s,
            serde_json::Value::Number(n) => n.to_string(),
            other => return Err(StorefrontError::external(SERVICE, format!("unexpected return id {}", other))),
        };
        Ok(ReturnShipment { return_id, status: created.status, awb: created.awb_code.filter(|a| !a.is_empty()) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::Package;
    use crate::domain::aggregates::ReturnReason;
    use crate::domain::value_objects::{Address, Sku};
    use chrono::Utc;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn contact() -> Contact {
        Contact {
            name: "Asha".into(), email: "asha@example.com".into(), phone: "9800000000".into(),
            address: Address { line1: "12 Clay Lane".into(), city: "Mumbai".into(), state: "Maharashtra".into(), pincode: "400001".into(), ..Default::default() },
        }
    }

    fn line() -> ShipmentLine {
        ShipmentLine { name: "Vase".into(), sku: Sku::for_product(7), units: 2, selling_price: Decimal::new(250, 0), hsn: "6911".into() }
    }

    async fn login(server: &MockServer, expected_calls: u64) {
        Mock::given(method("POST")).and(path("/v1/external/auth/login"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"token": "tok"})))
            .expect(expected_calls)
            .mount(server)
            .await;
    }

    fn client(server: &MockServer) -> ShiprocketClient {
        let creds = ShiprocketCredentials { email: "ops@example.com".into(), password: "pw".into() };
        ShiprocketClient::new(server.uri(), Some(creds), "Primary", Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_create_shipment_and_token_reuse() {
        let server = MockServer::start().await;
        login(&server, 1).await;
        Mock::given(method("POST")).and(path("/v1/external/orders/create/adhoc"))
            .and(header("authorization", "Bearer tok"))
            .and(body_partial_json(serde_json::json!({"pickup_location": "Primary", "payment_method": "Prepaid", "length": 20})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "order_id": 112233, "status": "NEW", "awb_codes": ["AWB77"], "courier_name": "Delhivery"
            })))
            .expect(2)
            .mount(&server)
            .await;

        let c = client(&server);
        let request = ShipmentRequest {
            order_id: "o-1".into(), order_date: Utc::now(), comment: String::new(), billing: contact(), shipping: contact(),
            shipping_is_billing: true, lines: vec![line()], prepaid: true, sub_total: Decimal::new(500, 0),
            package: Package { weight_grams: 500, length_cm: 20, breadth_cm: 15, height_cm: 10 },
        };
        let shipment = c.create_shipment(&request).await.unwrap();
        assert_eq!(shipment.carrier_order_id, "112233");
        assert_eq!(shipment.awb.as_deref(), Some("AWB77"));
        c.create_shipment(&request).await.unwrap();
    }

    #[tokio::test]
    async fn test_missing_credentials_fail_without_network() {
        let c = ShiprocketClient::new("http://127.0.0.1:9", None, "Primary", Duration::from_secs(1)).unwrap();
        let err = c.cancel_shipments(&["1".into()]).await.unwrap_err();
        assert!(matches!(err, StorefrontError::ExternalService { service: "shiprocket", .. }));
    }

    #[tokio::test]
    async fn test_cancel_failure_surfaces() {
        let server = MockServer::start().await;
        login(&server, 1).await;
        Mock::given(method("POST")).and(path("/v1/external/orders/cancel"))
            .and(body_partial_json(serde_json::json!({"ids": [42]})))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        let err = client(&server).cancel_shipments(&["42".into()]).await.unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_create_return_numeric_id() {
        let server = MockServer::start().await;
        login(&server, 1).await;
        Mock::given(method("POST")).and(path("/v1/external/orders/return"))
            .and(body_partial_json(serde_json::json!({"order_id": "112233", "return_reason": "defective"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"return_id": 9001, "status": "RETURN PENDING", "message": "ok"})))
            .mount(&server)
            .await;
        let request = ReturnShipmentRequest { carrier_order_id: "112233".into(), pickup: contact(), reason: ReturnReason::Defective, lines: vec![line()] };
        let r = client(&server).create_return(&request).await.unwrap();
        assert_eq!(r.return_id, "9001");
        assert_eq!(r.awb, None);
    }
}
