use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

/// Who a notice is addressed to.
#[derive(Debug, Clone)]
pub struct Recipient {
    pub email: String,
    pub name: String,
}

/// Account notices the identity core sends.
#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
    Verification { url: String },
    PasswordResetLink { url: String },
    PasswordResetCode { code: String, valid_minutes: i64 },
    /// Sent when an earlier notice could not be delivered to the address.
    DeliveryFailure,
}

impl Notice {
    pub fn template_name(&self) -> &'static str {
        match self {
            Notice::Verification { .. } => "email-verification",
            Notice::PasswordResetLink { .. } => "password-reset",
            Notice::PasswordResetCode { .. } => "password-reset-otp",
            Notice::DeliveryFailure => "email-update-required",
        }
    }

    pub fn data(&self, to: &Recipient) -> Value {
        match self {
            Notice::Verification { url } => json!({ "name": to.name, "verification_url": url }),
            Notice::PasswordResetLink { url } => json!({ "name": to.name, "reset_url": url }),
            Notice::PasswordResetCode { code, valid_minutes } => {
                json!({ "name": to.name, "otp": code, "valid_minutes": valid_minutes })
            }
            Notice::DeliveryFailure => json!({ "name": to.name }),
        }
    }
}

/// One delivery channel.
#[async_trait]
pub trait Notifier: Send + Sync {
    fn channel(&self) -> &'static str;

    async fn send(&self, to: &Recipient, notice: &Notice) -> anyhow::Result<()>;
}

// ─── HTTP notification service ───────────────────────────────────────────────

/// Posts `{to, template_name, data}` to the platform notification service.
pub struct HttpNotifier {
    client: Client,
    endpoint: String,
}

impl HttpNotifier {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            endpoint: format!("{}/api/v1/notifications", base_url.trim_end_matches('/')),
        }
    }
}

#[async_trait]
impl Notifier for HttpNotifier {
    fn channel(&self) -> &'static str {
        "http"
    }

    async fn send(&self, to: &Recipient, notice: &Notice) -> anyhow::Result<()> {
        let payload = json!({
            "to": [to.email],
            "template_name": notice.template_name(),
            "data": notice.data(to),
        });

        let response = self
            .client
            .post(&self.endpoint)
            .header("Content-Type", "application/json")
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            anyhow::bail!("notification service error {}: {}", status, text);
        }

        Ok(())
    }
}

// ─── Channel fallback ────────────────────────────────────────────────────────

/// Ordered delivery channels; each notice goes to the first channel that accepts it.
#[derive(Clone, Default)]
pub struct Notifications {
    channels: Vec<Arc<dyn Notifier>>,
}

impl Notifications {
    pub fn new(channels: Vec<Arc<dyn Notifier>>) -> Self {
        Self { channels }
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Tries each channel in order. Returns the channel that delivered, or
    /// the last error; no configured channel counts as a failed delivery.
    pub async fn deliver(&self, to: &Recipient, notice: &Notice) -> anyhow::Result<&'static str> {
        let mut last_err = anyhow::anyhow!("no notification channel configured");
        for channel in &self.channels {
            match channel.send(to, notice).await {
                Ok(()) => return Ok(channel.channel()),
                Err(e) => {
                    tracing::warn!(
                        channel = channel.channel(),
                        template = notice.template_name(),
                        "notification delivery failed, trying next channel: {e:#}"
                    );
                    last_err = e;
                }
            }
        }
        Err(last_err)
    }

    /// Like [`deliver`](Self::deliver), but when `notice` cannot be delivered
    /// a delivery-failure notice is attempted before the error is returned.
    /// If that notice fails too, the returned error names both failures.
    pub async fn deliver_or_report(&self, to: &Recipient, notice: &Notice) -> anyhow::Result<&'static str> {
        let err = match self.deliver(to, notice).await {
            Ok(channel) => return Ok(channel),
            Err(e) => e,
        };
        match self.deliver(to, &Notice::DeliveryFailure).await {
            Ok(_) => Err(err),
            Err(notice_err) => {
                tracing::warn!(
                    template = notice.template_name(),
                    "delivery-failure notice not sent either: {notice_err:#}"
                );
                Err(anyhow::anyhow!(
                    "{err:#}; delivery-failure notice also failed: {notice_err:#}"
                ))
            }
        }
    }
}
