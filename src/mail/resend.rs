// src/mail/resend.rs

use reqwest::Client;
use serde::Serialize;

use super::{EmailMessage, MailClient, MailError};
use crate::config::MailSettings;

const DEFAULT_BASE_URL: &str = "https://api.resend.com";

pub struct ResendMailClient {
    client: Client,
    api_key: String,
    base_url: String,
    from_email: String,
    from_name: String,
}

#[derive(Serialize)]
struct ResendEmail<'a> {
    from: String,
    to: [&'a str; 1],
    subject: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    html: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<&'a str>,
}

impl ResendMailClient {
    pub fn new(settings: &MailSettings, api_key: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url: settings
                .api_base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            from_email: settings.from_email.clone(),
            from_name: settings.from_name.clone(),
        }
    }
}

#[async_trait::async_trait]
impl MailClient for ResendMailClient {
    async fn send(&self, message: EmailMessage) -> Result<(), MailError> {
        message.ensure_body()?;

        let email = ResendEmail {
            from: format!("{} <{}>", self.from_name, self.from_email),
            to: [&message.to],
            subject: &message.subject,
            html: message.body_html.as_deref(),
            text: message.body_text.as_deref(),
        };

        let response = self
            .client
            .post(format!("{}/emails", self.base_url.trim_end_matches('/')))
            .bearer_auth(&self.api_key)
            .json(&email)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(MailError::Provider {
                provider: "resend",
                status,
                body,
            });
        }

        Ok(())
    }

    fn provider(&self) -> &'static str {
        "resend"
    }

    fn from_email(&self) -> &str {
        &self.from_email
    }

    fn from_name(&self) -> &str {
        &self.from_name
    }
}
