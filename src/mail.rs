use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::config::MailConfig;

/// Rendered message handed to a [`Mailer`].
#[derive(Debug, Clone, Serialize)]
pub struct Email {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub html: String,
}

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("mail transport error: {0}")]
    Transport(String),
    #[error("mail provider rejected message: HTTP {status}")]
    Rejected { status: u16 },
}

/// Outbound notification sink. Implementations either deliver or fail;
/// callers decide whether a failure is fatal to their flow.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: &Email) -> Result<(), DeliveryError>;
}

/// Development sink: writes the message to the log instead of sending it.
#[derive(Clone, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: &Email) -> Result<(), DeliveryError> {
        info!(to = %email.to, subject = %email.subject, "email not sent (log mailer)");
        debug!(body = %email.html, "email body");
        Ok(())
    }
}

/// Delivers through an HTTP mail API (Resend-compatible JSON payload).
#[derive(Clone)]
pub struct HttpMailer {
    client: Client,
    api_url: String,
    api_key: String,
}

impl HttpMailer {
    pub fn new(api_url: &str, api_key: &str) -> anyhow::Result<Self> {
        let client = Client::builder()
            .user_agent("userapi/0.1 (+reqwest)")
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            api_url: api_url.to_string(),
            api_key: api_key.to_string(),
        })
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send(&self, email: &Email) -> Result<(), DeliveryError> {
        let res = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(email)
            .send()
            .await
            .map_err(|e| DeliveryError::Transport(e.to_string()))?;

        let status = res.status();
        if !status.is_success() {
            return Err(DeliveryError::Rejected {
                status: status.as_u16(),
            });
        }
        info!(to = %email.to, %status, "email sent");
        Ok(())
    }
}

pub fn reset_email(cfg: &MailConfig, to: &str, token: &str, ttl_minutes: i64) -> Email {
    let link = format!("{}/reset-password?token={}", cfg.frontend_url, token);
    Email {
        from: cfg.from.clone(),
        to: to.to_string(),
        subject: "Password Reset Request - User Management API".into(),
        html: format!(
            "<h2>Password Reset Request</h2>\
             <p>You requested a password reset for your account.</p>\
             <p><a href=\"{link}\">Reset Password</a></p>\
             <p><strong>This link will expire in {}.</strong></p>\
             <p>If you didn't request this reset, please ignore this email.</p>",
            human_window(ttl_minutes)
        ),
    }
}

pub fn activation_email(cfg: &MailConfig, to: &str, token: &str, ttl_minutes: i64) -> Email {
    let link = format!("{}/activate?token={}", cfg.frontend_url, token);
    Email {
        from: cfg.from.clone(),
        to: to.to_string(),
        subject: "Account Activation - User Management API".into(),
        html: format!(
            "<h2>Welcome! Please Activate Your Account</h2>\
             <p>To complete your registration, open the link below:</p>\
             <p><a href=\"{link}\">Activate Account</a></p>\
             <p><strong>This link will expire in {}.</strong></p>\
             <p>If you didn't create this account, please ignore this email.</p>",
            human_window(ttl_minutes)
        ),
    }
}

fn human_window(minutes: i64) -> String {
    match minutes {
        m if m % 60 == 0 && m / 60 == 1 => "1 hour".into(),
        m if m % 60 == 0 => format!("{} hours", m / 60),
        m => format!("{m} minutes"),
    }
}
