//! Billing service (Razorpay)
//!
//! Order creation against the Razorpay REST API and webhook processing.
//! Amounts are INR: the pricing table is in rupees, the provider API wants
//! paise. Webhook bodies are verified as HMAC-SHA256 over the RAW bytes
//! before any JSON parsing.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use base64::Engine;
use chrono::{Duration as ChronoDuration, Utc};
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use tracing::{info, warn};
use ts_rs::TS;
use ureq::Agent;
use uuid::Uuid;

use crate::config::{TS_EXPORT_PATH, get_config};
use crate::errors::{QrifyError, Result};
use crate::storage::{PlanTier, SeaOrmStorage, Subscription, SubscriptionStatus, User};

type HmacSha256 = Hmac<Sha256>;

/// 订阅激活时长
const SUBSCRIPTION_DAYS: i64 = 30;
/// Razorpay API 超时
const API_TIMEOUT_SECS: u64 = 10;

static BILLING_AGENT: OnceLock<Agent> = OnceLock::new();

fn get_agent() -> &'static Agent {
    BILLING_AGENT.get_or_init(|| {
        Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(API_TIMEOUT_SECS)))
            .build()
            .into()
    })
}

// ============ DTOs ============

/// One row of the public pricing table
#[derive(Debug, Clone, Serialize, TS)]
#[ts(export, export_to = TS_EXPORT_PATH)]
pub struct PlanInfo {
    pub plan: PlanTier,
    /// INR, main unit
    pub price: u64,
    pub max_qr_codes: u64,
}

/// Checkout parameters returned to the frontend widget
#[derive(Debug, Clone, Serialize, TS)]
#[ts(export, export_to = TS_EXPORT_PATH)]
pub struct CheckoutOrder {
    pub order_id: String,
    /// paise
    pub amount: u64,
    pub currency: String,
    pub key_id: String,
    pub plan: PlanTier,
}

// ============ BillingService ============

/// Service for plan pricing, order creation, and webhook processing
pub struct BillingService {
    storage: Arc<SeaOrmStorage>,
}

impl BillingService {
    pub fn new(storage: Arc<SeaOrmStorage>) -> Self {
        Self { storage }
    }

    /// Static pricing table
    pub fn plans() -> Vec<PlanInfo> {
        [PlanTier::Free, PlanTier::Pro, PlanTier::Business]
            .into_iter()
            .map(|plan| PlanInfo {
                plan,
                price: plan.price_inr(),
                max_qr_codes: plan.qr_limit(),
            })
            .collect()
    }

    /// Create a Razorpay order and record a pending subscription
    pub async fn create_order(&self, user: &User, plan: PlanTier) -> Result<CheckoutOrder> {
        if plan == PlanTier::Free {
            return Err(QrifyError::validation("the free plan needs no payment"));
        }

        let billing = &get_config().billing;
        if billing.razorpay_key_id.is_empty() || billing.razorpay_key_secret.is_empty() {
            return Err(QrifyError::payment_provider(
                "payment provider is not configured",
            ));
        }

        let amount_paise = plan.price_inr() * 100;
        // uid 前 8 位足以人工对账，完整 id 在 notes 里
        let receipt = format!(
            "rcpt_{}_{}",
            Utc::now().timestamp(),
            &user.id[..user.id.len().min(8)]
        );

        let body = serde_json::json!({
            "amount": amount_paise,
            "currency": "INR",
            "receipt": receipt,
            "notes": {
                "user_id": user.id,
                "plan": plan.to_string(),
            },
        });

        let url = format!("{}/v1/orders", billing.razorpay_api_base);
        let auth = format!(
            "Basic {}",
            base64::engine::general_purpose::STANDARD.encode(format!(
                "{}:{}",
                billing.razorpay_key_id, billing.razorpay_key_secret
            ))
        );

        let response = tokio::task::spawn_blocking(move || -> Result<serde_json::Value> {
            let mut resp = get_agent()
                .post(&url)
                .header("Authorization", &auth)
                .send_json(&body)
                .map_err(|e| {
                    QrifyError::payment_provider(format!("order creation failed: {}", e))
                })?;
            resp.body_mut()
                .read_json()
                .map_err(|e| QrifyError::payment_provider(format!("invalid order response: {}", e)))
        })
        .await
        .map_err(|e| QrifyError::payment_provider(format!("order task failed: {}", e)))??;

        let order_id = response["id"]
            .as_str()
            .ok_or_else(|| QrifyError::payment_provider("order response missing id"))?
            .to_string();

        let now = Utc::now();
        let subscription = Subscription {
            id: Uuid::new_v4().to_string(),
            user_id: user.id.clone(),
            plan,
            amount: plan.price_inr() as i64,
            currency: "INR".to_string(),
            provider: "razorpay".to_string(),
            provider_order_id: Some(order_id.clone()),
            provider_payment_id: None,
            status: SubscriptionStatus::Pending,
            start_date: now,
            end_date: None,
            created_at: now,
        };
        self.storage.insert_subscription(&subscription).await?;

        info!(
            "BillingService: order {} ({} plan) for user {}",
            order_id, plan, user.id
        );

        Ok(CheckoutOrder {
            order_id,
            amount: amount_paise,
            currency: "INR".to_string(),
            key_id: billing.razorpay_key_id.clone(),
            plan,
        })
    }

    /// Verify `x-razorpay-signature` over the raw request body
    pub fn verify_webhook_signature(raw_body: &[u8], signature: &str) -> Result<()> {
        let secret = &get_config().billing.razorpay_webhook_secret;
        if secret.is_empty() {
            return Err(QrifyError::webhook_signature(
                "webhook secret is not configured",
            ));
        }
        Self::verify_signature_with_secret(raw_body, signature, secret)
    }

    pub(crate) fn verify_signature_with_secret(
        raw_body: &[u8],
        signature: &str,
        secret: &str,
    ) -> Result<()> {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|e| QrifyError::webhook_signature(e.to_string()))?;
        mac.update(raw_body);
        let expected = hex::encode(mac.finalize().into_bytes());

        let provided = signature.trim().to_lowercase();
        if expected.as_bytes().ct_eq(provided.as_bytes()).into() {
            Ok(())
        } else {
            Err(QrifyError::webhook_signature("signature mismatch"))
        }
    }

    /// Process a verified webhook body
    ///
    /// `payment.captured` activates a 30-day subscription and upgrades the
    /// user's plan; `payment.failed` marks the pending row failed. Unknown
    /// events are acknowledged and ignored.
    pub async fn handle_webhook(&self, raw_body: &[u8], signature: &str) -> Result<&'static str> {
        Self::verify_webhook_signature(raw_body, signature)?;

        let payload: serde_json::Value = serde_json::from_slice(raw_body)?;
        let event = payload["event"].as_str().unwrap_or_default();
        let payment = &payload["payload"]["payment"]["entity"];

        match event {
            "payment.captured" => self.activate_subscription(payment).await,
            "payment.failed" => self.fail_subscription(payment).await,
            other => {
                info!("BillingService: ignoring webhook event '{}'", other);
                Ok("ignored")
            }
        }
    }

    async fn find_by_order(&self, payment: &serde_json::Value) -> Result<Subscription> {
        let order_id = payment["order_id"]
            .as_str()
            .ok_or_else(|| QrifyError::validation("payment entity missing order_id"))?;

        self.storage
            .get_subscription_by_order_id(order_id)
            .await?
            .ok_or_else(|| {
                QrifyError::not_found(format!("no subscription for order {}", order_id))
            })
    }

    async fn activate_subscription(&self, payment: &serde_json::Value) -> Result<&'static str> {
        let mut sub = self.find_by_order(payment).await?;

        if sub.status == SubscriptionStatus::Active {
            // Webhook 重放：已激活则直接确认
            return Ok("already active");
        }

        let now = Utc::now();
        sub.status = SubscriptionStatus::Active;
        sub.provider_payment_id = payment["id"].as_str().map(String::from);
        sub.start_date = now;
        sub.end_date = Some(now + ChronoDuration::days(SUBSCRIPTION_DAYS));
        self.storage.update_subscription(&sub).await?;

        // 套餐以 notes 为准，订阅行兜底
        let plan = payment["notes"]["plan"]
            .as_str()
            .and_then(|p| p.parse::<PlanTier>().ok())
            .unwrap_or(sub.plan);

        match self.storage.get_user_by_id(&sub.user_id).await? {
            Some(mut user) => {
                user.plan = plan;
                user.updated_at = now;
                self.storage.update_user(&user).await?;
                info!(
                    "BillingService: activated {} plan for user {} until {:?}",
                    plan, user.id, sub.end_date
                );
            }
            None => {
                warn!(
                    "BillingService: payment captured for missing user {}",
                    sub.user_id
                );
            }
        }

        Ok("activated")
    }

    async fn fail_subscription(&self, payment: &serde_json::Value) -> Result<&'static str> {
        let mut sub = self.find_by_order(payment).await?;

        sub.status = SubscriptionStatus::Failed;
        sub.provider_payment_id = payment["id"].as_str().map(String::from);
        self.storage.update_subscription(&sub).await?;

        warn!(
            "BillingService: payment failed for order {:?} (user {})",
            sub.provider_order_id, sub.user_id
        );
        Ok("failed")
    }

    /// The caller's subscription history, newest first
    pub async fn list_subscriptions(&self, user_id: &str) -> Result<Vec<Subscription>> {
        self.storage.list_subscriptions_for_user(user_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pricing_table() {
        let plans = BillingService::plans();
        assert_eq!(plans.len(), 3);
        assert_eq!(plans[0].price, 0);
        assert_eq!(plans[1].price, 499);
        assert_eq!(plans[2].price, 1499);
        assert_eq!(plans[2].max_qr_codes, 1_000_000);
    }

    #[test]
    fn test_webhook_signature_round_trip() {
        let body = br#"{"event":"payment.captured"}"#;
        let secret = "whsec_test";

        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(body);
        let signature = hex::encode(mac.finalize().into_bytes());

        assert!(
            BillingService::verify_signature_with_secret(body, &signature, secret).is_ok()
        );
        // 签名比较大小写不敏感
        assert!(
            BillingService::verify_signature_with_secret(
                body,
                &signature.to_uppercase(),
                secret
            )
            .is_ok()
        );
    }

    #[test]
    fn test_webhook_signature_rejects_tampering() {
        let body = br#"{"event":"payment.captured"}"#;
        let secret = "whsec_test";

        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(body);
        let signature = hex::encode(mac.finalize().into_bytes());

        assert!(
            BillingService::verify_signature_with_secret(
                br#"{"event":"payment.failed"}"#,
                &signature,
                secret
            )
            .is_err()
        );
        assert!(
            BillingService::verify_signature_with_secret(body, &signature, "other-secret")
                .is_err()
        );
        assert!(BillingService::verify_signature_with_secret(body, "deadbeef", secret).is_err());
    }
}
