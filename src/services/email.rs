use anyhow::Context;
use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox, MultiPart, SinglePart},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use uuid::Uuid;

use crate::config::Config;
use crate::services::notifications::{Notice, Notifier, Recipient};

/// SMTP delivery channel.
pub struct EmailService {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl EmailService {
    /// Returns None if SMTP is not fully configured.
    pub fn new(config: &Config) -> Option<Self> {
        let host = config.smtp_host.as_deref()?;
        let username = config.smtp_username.clone()?;
        let password = config.smtp_password.clone()?;
        let from_addr = config.smtp_from.as_deref()?;

        let port = config.smtp_port.unwrap_or(587);
        let creds = Credentials::new(username, password);

        let transport = if port == 465 {
            AsyncSmtpTransport::<Tokio1Executor>::relay(host)
                .ok()?
                .credentials(creds)
                .build()
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
                .ok()?
                .port(port)
                .credentials(creds)
                .build()
        };

        let from: Mailbox = from_addr.parse().ok()?;

        Some(Self { transport, from })
    }

    // ─── Private helpers ─────────────────────────────────────────────────────

    fn new_message_id(&self) -> String {
        format!("<{}@{}>", Uuid::new_v4(), self.from.email.domain())
    }

    /// Wraps inner HTML content in the shared account-email layout.
    fn wrap_html(title: &str, content: &str) -> String {
        format!(
            r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8">
  <meta name="viewport" content="width=device-width,initial-scale=1">
  <title>{title}</title>
</head>
<body style="margin:0;padding:0;background-color:#f1f5f9;font-family:-apple-system,BlinkMacSystemFont,'Segoe UI',Roboto,Helvetica,Arial,sans-serif">
  <table role="presentation" width="100%" cellpadding="0" cellspacing="0" style="background-color:#f1f5f9;padding:40px 16px">
    <tr>
      <td align="center">
        <table role="presentation" width="100%" cellpadding="0" cellspacing="0" style="max-width:520px">
          <tr>
            <td style="background:#ffffff;border-radius:12px;padding:40px;box-shadow:0 1px 3px rgba(0,0,0,0.08)">
              {content}
            </td>
          </tr>
        </table>
      </td>
    </tr>
  </table>
</body>
</html>"#
        )
    }

    fn button(url: &str, label: &str) -> String {
        format!(
            r#"<table role="presentation" cellpadding="0" cellspacing="0" style="margin-bottom:28px">
  <tr>
    <td style="border-radius:8px;background:#2563eb">
      <a href="{url}" style="display:inline-block;padding:13px 28px;color:#ffffff;text-decoration:none;font-weight:600;font-size:15px;border-radius:8px">{label}</a>
    </td>
  </tr>
</table>"#
        )
    }

    /// Subject, plain text and HTML body for a notice.
    fn render(to: &Recipient, notice: &Notice) -> (String, String, String) {
        let name = &to.name;
        match notice {
            Notice::Verification { url } => {
                let text = format!(
                    "Hello {name},\n\n\
                    Please confirm your email address by opening this link (valid 24 hours):\n\
                    {url}\n\n\
                    If you did not create an account, ignore this email."
                );
                let content = format!(
                    r#"<h1 style="margin:0 0 8px 0;font-size:22px;color:#0f172a">Confirm your email</h1>
<p style="margin:0 0 28px 0;font-size:15px;color:#64748b;line-height:1.6">Hello <strong>{name}</strong>, please confirm your email address to activate your account.</p>
{}"#,
                    Self::button(url, "Verify email")
                );
                ("Confirm your email address".into(), text, content)
            }
            Notice::PasswordResetLink { url } => {
                let text = format!(
                    "Hello {name},\n\n\
                    A password reset was requested for your account.\n\n\
                    Open this link to choose a new password (valid 1 hour):\n\
                    {url}\n\n\
                    If you did not request this, ignore this email."
                );
                let content = format!(
                    r#"<h1 style="margin:0 0 8px 0;font-size:22px;color:#0f172a">Reset your password</h1>
<p style="margin:0 0 28px 0;font-size:15px;color:#64748b;line-height:1.6">Hello <strong>{name}</strong>, click the button below to choose a new password.</p>
{}
<p style="margin:0;font-size:13px;color:#94a3b8">This link expires in 1 hour.</p>"#,
                    Self::button(url, "Reset password")
                );
                ("Password reset".into(), text, content)
            }
            Notice::PasswordResetCode { code, valid_minutes } => {
                let text = format!(
                    "Hello {name},\n\n\
                    Your password reset code is: {code}\n\n\
                    This code is valid for {valid_minutes} minutes.\n\n\
                    If you did not request this, ignore this email."
                );
                let content = format!(
                    r#"<h1 style="margin:0 0 8px 0;font-size:22px;color:#0f172a">Password reset code</h1>
<p style="margin:0 0 24px 0;font-size:15px;color:#64748b">Your one-time code:</p>
<p style="margin:0 0 24px 0;font-size:44px;font-weight:800;letter-spacing:14px;color:#0f172a;text-align:center">{code}</p>
<p style="margin:0;font-size:13px;color:#94a3b8">This code expires in <strong>{valid_minutes} minutes</strong>.</p>"#
                );
                ("Your password reset code".into(), text, content)
            }
            Notice::DeliveryFailure => {
                let text = format!(
                    "Hello {name},\n\n\
                    We could not deliver a message to this address. \
                    Please check your email address in your profile."
                );
                let content = format!(
                    r#"<h1 style="margin:0 0 8px 0;font-size:22px;color:#0f172a">Please update your email</h1>
<p style="margin:0;font-size:15px;color:#64748b;line-height:1.6">Hello <strong>{name}</strong>, we could not deliver a message to this address. Please check your email address in your profile.</p>"#
                );
                ("Please update your email address".into(), text, content)
            }
        }
    }

    async fn send_email(&self, to: Mailbox, subject: &str, text: &str, html: &str) -> anyhow::Result<()> {
        let email = Message::builder()
            .message_id(Some(self.new_message_id()))
            .from(self.from.clone())
            .to(to)
            .subject(subject)
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(text.to_string()),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(html.to_string()),
                    ),
            )
            .context("Failed to build email message")?;

        self.transport
            .send(email)
            .await
            .context("Failed to send email")?;

        Ok(())
    }
}

#[async_trait]
impl Notifier for EmailService {
    fn channel(&self) -> &'static str {
        "smtp"
    }

    async fn send(&self, to: &Recipient, notice: &Notice) -> anyhow::Result<()> {
        let mailbox: Mailbox = match format!("{} <{}>", to.name, to.email).parse() {
            Ok(m) => m,
            Err(_) => to.email.parse().context("invalid recipient address")?,
        };
        let (subject, text, content) = Self::render(to, notice);
        let html = Self::wrap_html(&subject, &content);
        self.send_email(mailbox, &subject, &text, &html).await
    }
}
