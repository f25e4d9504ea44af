//! Payment gateway client.
//!
//! Checkout talks to the gateway through the [`PaymentGateway`] trait so tests
//! can substitute a fake. [`RazorpayGateway`] is the production client.

use crate::{config::AppConfig, errors::ServiceError};
use async_trait::async_trait;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::Sha256;
use std::time::Duration;
use tracing::{error, info, instrument, warn};

type HmacSha256 = Hmac<Sha256>;

/// Body sent to the gateway's order endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayOrderRequest {
    /// Minor currency units
    pub amount: i64,
    pub currency: String,
    pub receipt: String,
}

impl GatewayOrderRequest {
    pub fn new(amount: i64, currency: impl Into<String>) -> Self {
        Self {
            amount,
            currency: currency.into(),
            receipt: receipt_id(),
        }
    }
}

/// `receipt_{unix millis}`, the receipt format the storefront has always sent.
pub fn receipt_id() -> String {
    format!("receipt_{}", chrono::Utc::now().timestamp_millis())
}

/// Order object returned by the gateway. Fields we don't model are kept in
/// `extra` so the object can be handed back to the client verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayOrder {
    pub id: String,
    #[serde(default)]
    pub amount: i64,
    #[serde(default)]
    pub currency: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receipt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl GatewayOrder {
    /// Parses a gateway response, rejecting anything without a usable order id.
    pub fn from_json(value: Value) -> Result<Self, ServiceError> {
        let has_id = value
            .get("id")
            .and_then(Value::as_str)
            .map(|id| !id.trim().is_empty())
            .unwrap_or(false);
        if !has_id {
            return Err(ServiceError::GatewayError(
                "Payment gateway did not return an order id".into(),
            ));
        }
        serde_json::from_value(value).map_err(|e| {
            ServiceError::GatewayError(format!("Malformed payment gateway order: {}", e))
        })
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Creates a gateway order the client-side widget can pay against.
    async fn create_order(&self, request: GatewayOrderRequest)
        -> Result<GatewayOrder, ServiceError>;

    /// Checks the signature the widget returned with a successful payment.
    fn verify_payment(
        &self,
        order_id: &str,
        payment_id: &str,
        signature: &str,
    ) -> Result<(), ServiceError>;
}

/// Hex HMAC-SHA256 of `"{order_id}|{payment_id}"`, compared in constant time.
pub fn verify_payment_signature(
    secret: &str,
    order_id: &str,
    payment_id: &str,
    signature: &str,
) -> bool {
    let Ok(expected) = hex::decode(signature.trim()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(format!("{}|{}", order_id, payment_id).as_bytes());
    mac.verify_slice(&expected).is_ok()
}

/// Signs `"{order_id}|{payment_id}"` the way the gateway does.
pub fn sign_payment(secret: &str, order_id: &str, payment_id: &str) -> Result<String, ServiceError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| ServiceError::InternalError(format!("Invalid signing key: {}", e)))?;
    mac.update(format!("{}|{}", order_id, payment_id).as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

#[derive(Debug, Clone)]
pub struct RazorpayConfig {
    pub key_id: String,
    pub key_secret: String,
    pub base_url: String,
    pub timeout: Duration,
}

impl RazorpayConfig {
    /// `None` when the credentials are not configured.
    pub fn from_app_config(cfg: &AppConfig) -> Option<Self> {
        if !cfg.has_gateway_credentials() {
            return None;
        }
        Some(Self {
            key_id: cfg.razorpay_key_id.clone().unwrap_or_default(),
            key_secret: cfg.razorpay_key_secret.clone().unwrap_or_default(),
            base_url: cfg.payment_gateway_base_url.trim_end_matches('/').to_string(),
            timeout: cfg.payment_gateway_timeout(),
        })
    }
}

/// Razorpay Orders API client
#[derive(Debug, Clone)]
pub struct RazorpayGateway {
    client: reqwest::Client,
    config: RazorpayConfig,
}

impl RazorpayGateway {
    pub fn new(config: RazorpayConfig) -> Result<Self, ServiceError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ServiceError::InternalError(format!("HTTP client setup failed: {}", e)))?;
        Ok(Self { client, config })
    }

    fn orders_url(&self) -> String {
        format!("{}/v1/orders", self.config.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl PaymentGateway for RazorpayGateway {
    #[instrument(skip(self, request), fields(amount = request.amount, receipt = %request.receipt))]
    async fn create_order(
        &self,
        request: GatewayOrderRequest,
    ) -> Result<GatewayOrder, ServiceError> {
        let response = self
            .client
            .post(self.orders_url())
            .basic_auth(&self.config.key_id, Some(&self.config.key_secret))
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "Payment gateway request failed");
                ServiceError::GatewayError(format!("Payment gateway unreachable: {}", e))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(%status, %body, "Payment gateway rejected order creation");
            return Err(ServiceError::GatewayError(format!(
                "Payment gateway rejected order creation with status {}",
                status.as_u16()
            )));
        }

        let value: Value = response.json().await.map_err(|e| {
            ServiceError::GatewayError(format!("Unreadable payment gateway response: {}", e))
        })?;
        let order = GatewayOrder::from_json(value)?;
        info!(gateway_order_id = %order.id, "Gateway order created");
        Ok(order)
    }

    fn verify_payment(
        &self,
        order_id: &str,
        payment_id: &str,
        signature: &str,
    ) -> Result<(), ServiceError> {
        if verify_payment_signature(&self.config.key_secret, order_id, payment_id, signature) {
            Ok(())
        } else {
            Err(ServiceError::GatewayError(
                "Payment signature verification failed".into(),
            ))
        }
    }
}

/// Stand-in used when no gateway credentials are configured; every call fails.
#[derive(Debug, Clone, Default)]
pub struct UnconfiguredGateway;

#[async_trait]
impl PaymentGateway for UnconfiguredGateway {
    async fn create_order(
        &self,
        _request: GatewayOrderRequest,
    ) -> Result<GatewayOrder, ServiceError> {
        Err(ServiceError::GatewayError(
            "Payment gateway is not configured".into(),
        ))
    }

    fn verify_payment(&self, _: &str, _: &str, _: &str) -> Result<(), ServiceError> {
        Err(ServiceError::GatewayError(
            "Payment gateway is not configured".into(),
        ))
    }
}
