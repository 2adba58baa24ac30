use crate::{
    entities::customer::Model as CustomerModel,
    entities::order::PaymentMethod,
    errors::ServiceError,
    services::checkout::{PricedItem, ShippingAddressInput},
};
use chrono::Utc;
use hmac::{Hmac, Mac};
use http::HeaderMap;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::collections::HashMap;
use tracing::{info, instrument, warn};
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

const STRIPE_API_BASE: &str = "https://api.stripe.com/v1";
const CARD_PAYMENT_PREFIX: &str = "pi_";
const TRANSFER_PAYMENT_PREFIX: &str = "transfer_";

/// Payment intent handle returned by the gateway. The client secret goes
/// back to the caller; the id is what the webhook reconciles against.
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentIntent {
    pub id: String,
    pub client_secret: String,
}

#[derive(Debug, Deserialize)]
struct GatewayCustomer {
    id: String,
    #[serde(default)]
    deleted: bool,
}

/// Checkout context attached to a payment intent as opaque metadata and read
/// back verbatim by the webhook. The gateway is the source of truth for this
/// data between intent creation and reconciliation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CheckoutMetadata {
    pub customer_id: Uuid,
    pub auth_subject: String,
    pub order_items: Vec<MetadataItem>,
    pub shipping_address: ShippingAddressInput,
    pub coupon_code: Option<String>,
    pub shipping_fee: i64,
    pub discount: i64,
    pub total: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetadataItem {
    pub product_id: Uuid,
    pub unit_price: i64,
    pub quantity: i32,
}

impl From<&PricedItem> for MetadataItem {
    fn from(item: &PricedItem) -> Self {
        Self {
            product_id: item.product_id,
            unit_price: item.unit_price,
            quantity: item.quantity,
        }
    }
}

impl CheckoutMetadata {
    /// Flattens into `metadata[...]` form fields for the gateway API.
    pub fn to_form_fields(&self) -> Result<Vec<(String, String)>, ServiceError> {
        Ok(vec![
            (
                "metadata[customer_id]".to_string(),
                self.customer_id.to_string(),
            ),
            (
                "metadata[auth_subject]".to_string(),
                self.auth_subject.clone(),
            ),
            (
                "metadata[order_items]".to_string(),
                serde_json::to_string(&self.order_items)?,
            ),
            (
                "metadata[shipping_address]".to_string(),
                serde_json::to_string(&self.shipping_address)?,
            ),
            (
                "metadata[coupon_code]".to_string(),
                self.coupon_code.clone().unwrap_or_default(),
            ),
            (
                "metadata[shipping_fee]".to_string(),
                self.shipping_fee.to_string(),
            ),
            ("metadata[discount]".to_string(), self.discount.to_string()),
            ("metadata[total]".to_string(), self.total.to_string()),
        ])
    }

    /// Rebuilds the checkout context from webhook metadata.
    pub fn from_intent_metadata(
        metadata: &HashMap<String, String>,
    ) -> Result<Self, ServiceError> {
        let get = |key: &str| {
            metadata.get(key).ok_or_else(|| {
                ServiceError::BadRequest(format!("payment intent metadata missing '{}'", key))
            })
        };

        let customer_id = Uuid::parse_str(get("customer_id")?).map_err(|_| {
            ServiceError::BadRequest("payment intent metadata has invalid customer_id".to_string())
        })?;

        let order_items: Vec<MetadataItem> = serde_json::from_str(get("order_items")?)?;
        let shipping_address: ShippingAddressInput =
            serde_json::from_str(get("shipping_address")?)?;

        let coupon_code = metadata
            .get("coupon_code")
            .map(String::as_str)
            .filter(|c| !c.is_empty())
            .map(str::to_string);

        let parse_amount = |key: &str| -> Result<i64, ServiceError> {
            get(key)?.parse::<i64>().map_err(|_| {
                ServiceError::BadRequest(format!("payment intent metadata has invalid {}", key))
            })
        };

        Ok(Self {
            customer_id,
            auth_subject: get("auth_subject")?.clone(),
            order_items,
            shipping_address,
            coupon_code,
            shipping_fee: parse_amount("shipping_fee")?,
            discount: parse_amount("discount")?,
            total: parse_amount("total")?,
        })
    }
}

/// Inbound webhook event, decoded just far enough to reconcile.
#[derive(Debug, Deserialize)]
pub struct WebhookEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: WebhookEventData,
}

#[derive(Debug, Deserialize)]
pub struct WebhookEventData {
    pub object: WebhookPaymentIntent,
}

#[derive(Debug, Deserialize)]
pub struct WebhookPaymentIntent {
    pub id: String,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// Thin client over the card gateway's REST API: customer creation, payment
/// intent creation, webhook signature verification.
#[derive(Clone)]
pub struct StripeGateway {
    http: reqwest::Client,
    secret_key: Option<String>,
    webhook_secret: Option<String>,
    tolerance_secs: u64,
}

impl StripeGateway {
    pub fn new(
        secret_key: Option<String>,
        webhook_secret: Option<String>,
        tolerance_secs: u64,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            secret_key,
            webhook_secret,
            tolerance_secs,
        }
    }

    fn secret_key(&self) -> Result<&str, ServiceError> {
        self.secret_key.as_deref().ok_or_else(|| {
            ServiceError::ExternalServiceError("payment gateway is not configured".to_string())
        })
    }

    /// Returns the gateway customer id for this customer, creating one on
    /// first use. A cached id that no longer resolves remotely (deleted or
    /// stale) is silently replaced by a fresh customer.
    #[instrument(skip(self, customer), fields(customer_id = %customer.id))]
    pub async fn ensure_customer(&self, customer: &CustomerModel) -> Result<String, ServiceError> {
        let key = self.secret_key()?;

        if let Some(cached) = customer.gateway_customer_id.as_deref() {
            let url = format!("{}/customers/{}", STRIPE_API_BASE, cached);
            match self.http.get(&url).basic_auth(key, Some("")).send().await {
                Ok(response) if response.status().is_success() => {
                    if let Ok(remote) = response.json::<GatewayCustomer>().await {
                        if !remote.deleted {
                            return Ok(remote.id);
                        }
                    }
                }
                Ok(_) | Err(_) => {
                    warn!("cached gateway customer id is stale; recreating");
                }
            }
        }

        let customer_id = customer.id.to_string();
        let params = [
            ("email", customer.email.as_str()),
            ("name", customer.name.as_str()),
            ("metadata[customer_id]", customer_id.as_str()),
            ("metadata[auth_subject]", customer.auth_subject.as_str()),
        ];

        let response = self
            .http
            .post(format!("{}/customers", STRIPE_API_BASE))
            .basic_auth(key, Some(""))
            .form(&params)
            .send()
            .await
            .map_err(|e| ServiceError::ExternalServiceError(format!("gateway error: {}", e)))?;

        if !response.status().is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(ServiceError::ExternalServiceError(format!(
                "gateway customer creation failed: {}",
                detail
            )));
        }

        let created: GatewayCustomer = response
            .json()
            .await
            .map_err(|e| ServiceError::ExternalServiceError(format!("gateway response: {}", e)))?;

        info!(gateway_customer = %created.id, "gateway customer created");
        Ok(created.id)
    }

    /// Creates a payment intent carrying the checkout metadata. No local
    /// state is touched here; reconciliation happens when the webhook lands.
    #[instrument(skip(self, metadata), fields(amount = amount, currency = %currency))]
    pub async fn create_payment_intent(
        &self,
        amount: i64,
        currency: &str,
        gateway_customer_id: &str,
        metadata: &CheckoutMetadata,
    ) -> Result<PaymentIntent, ServiceError> {
        let key = self.secret_key()?;

        let mut params = vec![
            ("amount".to_string(), amount.to_string()),
            ("currency".to_string(), currency.to_string()),
            ("customer".to_string(), gateway_customer_id.to_string()),
            (
                "automatic_payment_methods[enabled]".to_string(),
                "true".to_string(),
            ),
        ];
        params.extend(metadata.to_form_fields()?);

        let response = self
            .http
            .post(format!("{}/payment_intents", STRIPE_API_BASE))
            .basic_auth(key, Some(""))
            .form(&params)
            .send()
            .await
            .map_err(|e| ServiceError::ExternalServiceError(format!("gateway error: {}", e)))?;

        if !response.status().is_success() {
            let detail = response.text().await.unwrap_or_default();
            warn!(detail = %detail, "payment intent creation failed");
            return Err(ServiceError::PaymentFailed(
                "Failed to create payment intent".to_string(),
            ));
        }

        let intent: PaymentIntent = response
            .json()
            .await
            .map_err(|e| ServiceError::ExternalServiceError(format!("gateway response: {}", e)))?;

        info!(intent_id = %intent.id, "payment intent created");
        Ok(intent)
    }

    /// Verifies the gateway's `Stripe-Signature` header: HMAC-SHA256 over
    /// `"{t}.{body}"` with the shared webhook secret, compared in constant
    /// time, with a bounded timestamp skew.
    pub fn verify_webhook_signature(&self, headers: &HeaderMap, payload: &[u8]) -> bool {
        let Some(secret) = self.webhook_secret.as_deref() else {
            warn!("webhook secret not configured; rejecting webhook");
            return false;
        };

        let Some(signature) = headers
            .get("Stripe-Signature")
            .and_then(|h| h.to_str().ok())
        else {
            return false;
        };

        let mut timestamp = "";
        let mut v1 = "";
        for part in signature.split(',') {
            let mut it = part.trim().splitn(2, '=');
            match (it.next(), it.next()) {
                (Some("t"), Some(val)) => timestamp = val,
                (Some("v1"), Some(val)) => v1 = val,
                _ => {}
            }
        }

        if timestamp.is_empty() || v1.is_empty() {
            return false;
        }

        if let Ok(ts) = timestamp.parse::<i64>() {
            let now = Utc::now().timestamp();
            if (now - ts).unsigned_abs() > self.tolerance_secs {
                return false;
            }
        } else {
            return false;
        }

        let signed = [timestamp.as_bytes(), b".", payload].concat();
        let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
            Ok(mac) => mac,
            Err(_) => return false,
        };
        mac.update(&signed);
        let expected = hex::encode(mac.finalize().into_bytes());

        constant_time_eq(&expected, v1)
    }

    pub fn parse_webhook_event(payload: &[u8]) -> Result<WebhookEvent, ServiceError> {
        serde_json::from_slice(payload)
            .map_err(|e| ServiceError::BadRequest(format!("invalid webhook payload: {}", e)))
    }
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut res = 0u8;
    for (x, y) in a.as_bytes().iter().zip(b.as_bytes()) {
        res |= x ^ y;
    }
    res == 0
}

/// Locally generated payment id for bank-transfer orders.
pub fn transfer_payment_id() -> String {
    format!("{}{}", TRANSFER_PAYMENT_PREFIX, Utc::now().timestamp_millis())
}

/// Fallback for rows that predate the explicit `payment_method` column: the
/// method is sniffed from the payment id prefix, defaulting to bank transfer
/// with a logged warning for unrecognized ids.
pub fn infer_payment_method(payment_id: &str) -> PaymentMethod {
    if payment_id.starts_with(CARD_PAYMENT_PREFIX) {
        PaymentMethod::Card
    } else if payment_id.starts_with(TRANSFER_PAYMENT_PREFIX) {
        PaymentMethod::BankTransfer
    } else {
        if !payment_id.is_empty() {
            warn!(payment_id = %payment_id, "unrecognized payment id prefix; assuming bank transfer");
        }
        PaymentMethod::BankTransfer
    }
}
