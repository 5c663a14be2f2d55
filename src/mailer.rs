use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmailMessage {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub html: String,
}

/// Transactional email delivery.
#[async_trait]
pub trait Mailer: Send + Sync + 'static {
    async fn send(&self, message: &EmailMessage) -> Result<()>;
}

/// Delivers through the Resend HTTP API.
pub struct ResendMailer {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
}

impl ResendMailer {
    pub fn new(api_url: impl Into<String>, api_key: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .context("failed to build email HTTP client")?;
        Ok(Self {
            client,
            api_url: api_url.into(),
            api_key: api_key.into(),
        })
    }
}

#[async_trait]
impl Mailer for ResendMailer {
    async fn send(&self, message: &EmailMessage) -> Result<()> {
        let endpoint = format!("{}/emails", self.api_url.trim_end_matches('/'));
        self.client
            .post(endpoint)
            .bearer_auth(&self.api_key)
            .json(message)
            .send()
            .await
            .context("failed to reach email API")?
            .error_for_status()
            .context("email API rejected the message")?;
        Ok(())
    }
}

/// Logs messages instead of sending them; used when no API key is configured.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, message: &EmailMessage) -> Result<()> {
        tracing::info!(
            to = %message.to,
            subject = %message.subject,
            html_bytes = message.html.len(),
            "email delivery disabled; message logged only"
        );
        Ok(())
    }
}
