// src/mail/mod.rs
//
// Outgoing email. Every provider implements `MailClient`; the app holds one
// behind `DynMailClient`, and the admin diagnostics build throwaway clients
// from request-supplied settings.

use std::sync::Arc;

use thiserror::Error;

use crate::config::{MailProvider, MailSettings};

mod resend;
mod sendgrid;
mod smtp;
pub mod templates;

pub use resend::ResendMailClient;
pub use sendgrid::SendgridMailClient;
pub use smtp::SmtpMailClient;

#[derive(Debug, Error)]
pub enum MailError {
    #[error("email must have either an HTML or a text body")]
    EmptyBody,

    #[error("invalid address: {0}")]
    Address(String),

    #[error("{provider} API error: {status} - {body}")]
    Provider {
        provider: &'static str,
        status: u16,
        body: String,
    },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("smtp error: {0}")]
    Smtp(String),

    #[error("mail provider misconfigured: {0}")]
    Config(String),
}

#[derive(Debug, Clone)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub body_html: Option<String>,
    pub body_text: Option<String>,
}

impl EmailMessage {
    pub fn new(to: impl Into<String>, subject: impl Into<String>) -> Self {
        Self {
            to: to.into(),
            subject: subject.into(),
            body_html: None,
            body_text: None,
        }
    }

    pub fn html(mut self, html: String) -> Self {
        self.body_html = Some(html);
        self
    }

    pub fn text(mut self, text: String) -> Self {
        self.body_text = Some(text);
        self
    }

    fn ensure_body(&self) -> Result<(), MailError> {
        if self.body_html.is_none() && self.body_text.is_none() {
            return Err(MailError::EmptyBody);
        }
        Ok(())
    }
}

#[async_trait::async_trait]
pub trait MailClient: Send + Sync {
    async fn send(&self, message: EmailMessage) -> Result<(), MailError>;
    fn provider(&self) -> &'static str;
    fn from_email(&self) -> &str;
    fn from_name(&self) -> &str;
}

pub type DynMailClient = Arc<dyn MailClient>;

/// Writes the message to the log instead of sending it.
pub struct LogMailClient {
    from_email: String,
    from_name: String,
}

impl LogMailClient {
    pub fn new(settings: &MailSettings) -> Self {
        Self {
            from_email: settings.from_email.clone(),
            from_name: settings.from_name.clone(),
        }
    }
}

#[async_trait::async_trait]
impl MailClient for LogMailClient {
    async fn send(&self, message: EmailMessage) -> Result<(), MailError> {
        message.ensure_body()?;
        log::info!(
            "mail (log provider) from={} to={} subject={:?}",
            self.from_email,
            message.to,
            message.subject
        );
        Ok(())
    }

    fn provider(&self) -> &'static str {
        "log"
    }

    fn from_email(&self) -> &str {
        &self.from_email
    }

    fn from_name(&self) -> &str {
        &self.from_name
    }
}

fn api_key(settings: &MailSettings) -> Result<String, MailError> {
    settings
        .api_key
        .clone()
        .ok_or_else(|| MailError::Config("API key required".to_string()))
}

pub fn create_mail_client(settings: &MailSettings) -> Result<DynMailClient, MailError> {
    match settings.provider {
        MailProvider::Log => Ok(Arc::new(LogMailClient::new(settings))),
        MailProvider::Resend => {
            let client = ResendMailClient::new(settings, api_key(settings)?);
            Ok(Arc::new(client))
        }
        MailProvider::Sendgrid => {
            let client = SendgridMailClient::new(settings, api_key(settings)?);
            Ok(Arc::new(client))
        }
        MailProvider::Smtp => {
            let smtp = settings
                .smtp
                .as_ref()
                .ok_or_else(|| MailError::Config("SMTP settings required".to_string()))?;
            let client = SmtpMailClient::new(settings, smtp)?;
            Ok(Arc::new(client))
        }
    }
}
