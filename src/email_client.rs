use std::fmt::Debug;
use std::time::Duration;

use async_trait::async_trait;
use lettre::message::Mailbox;
use lettre::message::MultiPart;
use lettre::transport::smtp::authentication::Credentials;
use lettre::AsyncSmtpTransport;
use lettre::AsyncTransport;
use lettre::Message;
use lettre::Tokio1Executor;
use reqwest::Client;
use secrecy::ExposeSecret;
use secrecy::Secret;
use serde::Serialize;

use crate::configuration::SmtpSettings;
use crate::domain::SubscriberEmail;
use crate::utils::error_chain_fmt;

/// A rendered email for a single recipient
#[derive(Debug, Clone, PartialEq)]
pub struct EmailMessage {
    pub to: SubscriberEmail,
    pub subject: String,
    pub html_body: String,
    pub text_body: String,
}

#[derive(thiserror::Error)]
pub enum EmailError {
    #[error("Invalid address: {0}")]
    InvalidAddress(String),
    #[error("Could not build message")]
    Build(#[from] lettre::error::Error),
    #[error("SMTP relay refused the message")]
    Smtp(#[from] lettre::transport::smtp::Error),
    #[error("Email API request failed")]
    Api(#[from] reqwest::Error),
}

impl Debug for EmailError {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}

/// Sends one message to one recipient. Success or failure only; bounces are
/// not tracked.
///
/// A single instance is shared (`Arc<dyn MailTransport>`) by the API and the
/// dispatch worker, so it must cope with concurrent sends.
#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn send_email(
        &self,
        message: &EmailMessage,
    ) -> Result<(), EmailError>;
}

/// SMTP relay transport (e.g. Gmail with an app password, or Mailpit locally)
pub struct SmtpEmailClient {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    sender: Mailbox,
}

impl SmtpEmailClient {
    pub fn new(
        cfg: &SmtpSettings,
        sender: SubscriberEmail,
        timeout: Duration,
    ) -> Result<Self, anyhow::Error> {
        let builder = match cfg.starttls {
            true => AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&cfg.host)?,
            // no TLS; only for local catchers
            false => AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&cfg.host),
        };
        let mut builder = builder.port(cfg.port).timeout(Some(timeout));
        if !cfg.username.is_empty() {
            builder = builder.credentials(Credentials::new(
                cfg.username.clone(),
                cfg.password.expose_secret().clone(),
            ));
        }
        let sender = sender
            .as_ref()
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid sender address: {e}"))?;
        Ok(Self {
            transport: builder.build(),
            sender,
        })
    }
}

#[async_trait]
impl MailTransport for SmtpEmailClient {
    #[tracing::instrument(name = "Sending email over SMTP", skip_all, fields(recipient = %message.to))]
    async fn send_email(
        &self,
        message: &EmailMessage,
    ) -> Result<(), EmailError> {
        let to: Mailbox = message
            .to
            .as_ref()
            .parse()
            .map_err(|e| EmailError::InvalidAddress(format!("{}: {e}", message.to)))?;
        let email = Message::builder()
            .from(self.sender.clone())
            .to(to)
            .subject(&message.subject)
            .multipart(MultiPart::alternative_plain_html(
                message.text_body.clone(),
                message.html_body.clone(),
            ))?;
        self.transport.send(email).await?;
        Ok(())
    }
}

/// Client for a JSON email REST API (Postmark-compatible `POST /email`).
///
/// Establishing a HTTP connection is expensive, so the `Client` (and its
/// connection pool) lives as long as the `EmailClient`.
pub struct EmailClient {
    http_client: Client,
    base_url: String,
    sender: SubscriberEmail,
    authorization_token: Secret<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct SendEmailRequest<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    html_body: &'a str,
    text_body: &'a str,
}

impl EmailClient {
    pub fn new(
        base_url: String,
        sender: SubscriberEmail,
        authorization_token: Secret<String>,
        timeout: Duration,
    ) -> Result<Self, anyhow::Error> {
        let http_client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http_client,
            base_url,
            sender,
            authorization_token,
        })
    }
}

#[async_trait]
impl MailTransport for EmailClient {
    #[tracing::instrument(name = "Sending email via API", skip_all, fields(recipient = %message.to))]
    async fn send_email(
        &self,
        message: &EmailMessage,
    ) -> Result<(), EmailError> {
        let url = format!("{}/email", self.base_url.trim_end_matches('/'));
        let body = SendEmailRequest {
            from: self.sender.as_ref(),
            to: message.to.as_ref(),
            subject: &message.subject,
            html_body: &message.html_body,
            text_body: &message.text_body,
        };
        self.http_client
            .post(&url)
            .header(
                "X-Postmark-Server-Token",
                self.authorization_token.expose_secret(),
            )
            .json(&body)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}
