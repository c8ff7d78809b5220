//! Outgoing email relay.
//!
//! The contact form and the "new account awaiting approval" notice both go
//! through an [`EmailRelay`]. The HTTP relay speaks the common transactional
//! email JSON shape (`from`, `to`, `subject`, `html`) with a bearer API key.

use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::NotificationConfig;
use crate::domain::Account;

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("No recipients configured")]
    NoRecipients,

    #[error("Email provider rejected the message ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("Email provider unreachable: {0}")]
    Transport(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmailMessage {
    pub to: Vec<String>,
    pub subject: String,
    pub html: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
}

#[async_trait::async_trait]
pub trait EmailRelay: Send + Sync {
    async fn send(&self, message: EmailMessage) -> Result<(), RelayError>;
}

#[derive(Serialize)]
struct ProviderPayload<'a> {
    from: &'a str,
    to: &'a [String],
    subject: &'a str,
    html: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_to: Option<&'a str>,
}

pub struct HttpEmailRelay {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    from_address: String,
}

impl HttpEmailRelay {
    pub fn new(config: &NotificationConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .user_agent(concat!("staffdesk/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build email relay client: {e}"))?;

        Ok(Self {
            client,
            api_url: config.api_url.clone(),
            api_key: config.api_key.clone(),
            from_address: config.from_address.clone(),
        })
    }
}

#[async_trait::async_trait]
impl EmailRelay for HttpEmailRelay {
    async fn send(&self, message: EmailMessage) -> Result<(), RelayError> {
        if message.to.is_empty() {
            return Err(RelayError::NoRecipients);
        }

        let payload = ProviderPayload {
            from: &self.from_address,
            to: &message.to,
            subject: &message.subject,
            html: &message.html,
            reply_to: message.reply_to.as_deref(),
        };

        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| RelayError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RelayError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        info!(recipients = message.to.len(), subject = %message.subject, "Email relayed");
        Ok(())
    }
}

/// Used when notifications are disabled: logs and drops.
pub struct DisabledRelay;

#[async_trait::async_trait]
impl EmailRelay for DisabledRelay {
    async fn send(&self, message: EmailMessage) -> Result<(), RelayError> {
        warn!(
            subject = %message.subject,
            "Email relay disabled, message dropped"
        );
        Ok(())
    }
}

/// Picks the relay implementation for the current config.
pub fn relay_from_config(
    config: &NotificationConfig,
) -> anyhow::Result<std::sync::Arc<dyn EmailRelay>> {
    if config.enabled {
        Ok(std::sync::Arc::new(HttpEmailRelay::new(config)?))
    } else {
        Ok(std::sync::Arc::new(DisabledRelay))
    }
}

/// Contact form submission relayed to the front desk.
#[derive(Debug, Clone)]
pub struct ContactSubmission {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub subject: String,
    pub message: String,
}

#[must_use]
pub fn contact_email(submission: &ContactSubmission, recipients: &[String]) -> EmailMessage {
    let esc = |s: &str| html_escape::encode_text(s).to_string();
    let phone = submission
        .phone
        .as_deref()
        .map(|p| format!("<p><strong>Téléphone :</strong> {}</p>", esc(p)))
        .unwrap_or_default();

    EmailMessage {
        to: recipients.to_vec(),
        subject: format!("Nouveau message de contact : {}", submission.subject),
        html: format!(
            "<h2>Nouveau message de contact</h2>\
             <p><strong>Nom :</strong> {}</p>\
             <p><strong>Email :</strong> {}</p>\
             {phone}\
             <p><strong>Sujet :</strong> {}</p>\
             <p>{}</p>",
            esc(&submission.name),
            esc(&submission.email),
            esc(&submission.subject),
            esc(&submission.message).replace('\n', "<br>"),
        ),
        reply_to: Some(submission.email.clone()),
    }
}

#[must_use]
pub fn pending_account_email(account: &Account, recipients: &[String]) -> EmailMessage {
    let esc = |s: &str| html_escape::encode_text(s).to_string();
    let name = account.full_name.as_deref().unwrap_or("(sans nom)");

    EmailMessage {
        to: recipients.to_vec(),
        subject: "Nouveau compte en attente d'approbation".to_string(),
        html: format!(
            "<p>Un nouveau compte attend votre approbation.</p>\
             <p><strong>Nom :</strong> {}</p>\
             <p><strong>Email :</strong> {}</p>",
            esc(name),
            esc(&account.email),
        ),
        reply_to: None,
    }
}
