//! Payment gateway configuration

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;
use crate::adapters::paypal::PayPalConfig;
use crate::adapters::stripe::{StripeConfig, DEFAULT_WEBHOOK_TOLERANCE_SECS};

/// Gateway credentials and call budgets.
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentConfig {
    pub stripe: StripeSettings,

    pub paypal: PayPalSettings,

    /// Bound on each outbound gateway call
    #[serde(default = "default_gateway_timeout")]
    pub gateway_timeout_secs: u64,

    /// Bound on each notification dispatch
    #[serde(default = "default_notification_timeout")]
    pub notification_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeSettings {
    /// `sk_live_...` or `sk_test_...`
    pub api_key: SecretString,

    /// `whsec_...`
    pub webhook_secret: SecretString,

    #[serde(default = "default_stripe_base_url")]
    pub api_base_url: String,

    #[serde(default = "default_webhook_tolerance")]
    pub webhook_tolerance_secs: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PayPalSettings {
    pub client_id: String,

    pub client_secret: SecretString,

    /// Id of the webhook registered with PayPal, needed to verify deliveries
    pub webhook_id: String,

    /// Sandbox unless overridden
    #[serde(default = "default_paypal_base_url")]
    pub api_base_url: String,
}

impl PaymentConfig {
    pub fn gateway_timeout(&self) -> Duration {
        Duration::from_secs(self.gateway_timeout_secs)
    }

    pub fn notification_timeout(&self) -> Duration {
        Duration::from_secs(self.notification_timeout_secs)
    }

    pub fn stripe_config(&self) -> StripeConfig {
        StripeConfig::new(
            self.stripe.api_key.clone(),
            self.stripe.webhook_secret.clone(),
        )
        .with_base_url(&self.stripe.api_base_url)
        .with_timeout(self.gateway_timeout())
        .with_webhook_tolerance(self.stripe.webhook_tolerance_secs)
    }

    pub fn paypal_config(&self) -> PayPalConfig {
        PayPalConfig::new(
            &self.paypal.client_id,
            self.paypal.client_secret.clone(),
            &self.paypal.webhook_id,
        )
        .with_base_url(&self.paypal.api_base_url)
        .with_timeout(self.gateway_timeout())
    }

    pub fn validate(&self, production: bool) -> Result<(), ValidationError> {
        self.stripe.validate(production)?;
        self.paypal.validate()?;
        if self.gateway_timeout_secs == 0 || self.gateway_timeout_secs > 120 {
            return Err(ValidationError::InvalidTimeout("payment.gateway_timeout_secs"));
        }
        if self.notification_timeout_secs == 0 {
            return Err(ValidationError::InvalidTimeout(
                "payment.notification_timeout_secs",
            ));
        }
        Ok(())
    }
}

impl StripeSettings {
    pub fn is_test_mode(&self) -> bool {
        self.api_key.expose_secret().starts_with("sk_test_")
    }

    pub fn validate(&self, production: bool) -> Result<(), ValidationError> {
        let key = self.api_key.expose_secret();
        let secret = self.webhook_secret.expose_secret();
        if key.is_empty() {
            return Err(ValidationError::MissingRequired("PAYMENT__STRIPE__API_KEY"));
        }
        if secret.is_empty() {
            return Err(ValidationError::MissingRequired(
                "PAYMENT__STRIPE__WEBHOOK_SECRET",
            ));
        }
        if !key.starts_with("sk_") {
            return Err(ValidationError::InvalidStripeKey);
        }
        if !secret.starts_with("whsec_") {
            return Err(ValidationError::InvalidStripeWebhookSecret);
        }
        if production && self.is_test_mode() {
            return Err(ValidationError::TestKeyInProduction);
        }
        if !self.api_base_url.starts_with("https://") && !self.api_base_url.starts_with("http://") {
            return Err(ValidationError::InvalidBaseUrl("payment.stripe.api_base_url"));
        }
        if self.webhook_tolerance_secs <= 0 {
            return Err(ValidationError::InvalidTimeout(
                "payment.stripe.webhook_tolerance_secs",
            ));
        }
        Ok(())
    }
}

impl PayPalSettings {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.client_id.is_empty() {
            return Err(ValidationError::MissingRequired("PAYMENT__PAYPAL__CLIENT_ID"));
        }
        if self.client_secret.expose_secret().is_empty() {
            return Err(ValidationError::MissingRequired(
                "PAYMENT__PAYPAL__CLIENT_SECRET",
            ));
        }
        if self.webhook_id.is_empty() {
            return Err(ValidationError::MissingRequired("PAYMENT__PAYPAL__WEBHOOK_ID"));
        }
        if !self.api_base_url.starts_with("https://") && !self.api_base_url.starts_with("http://") {
            return Err(ValidationError::InvalidBaseUrl("payment.paypal.api_base_url"));
        }
        Ok(())
    }
}

fn default_gateway_timeout() -> u64 {
    30
}

fn default_notification_timeout() -> u64 {
    5
}

fn default_stripe_base_url() -> String {
    "https://api.stripe.com".to_string()
}

fn default_webhook_tolerance() -> i64 {
    DEFAULT_WEBHOOK_TOLERANCE_SECS
}

fn default_paypal_base_url() -> String {
    "https://api-m.sandbox.paypal.com".to_string()
}
