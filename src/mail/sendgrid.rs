// src/mail/sendgrid.rs

use reqwest::Client;
use serde::Serialize;

use super::{EmailMessage, MailClient, MailError};
use crate::config::MailSettings;

const DEFAULT_BASE_URL: &str = "https://api.sendgrid.com";

pub struct SendgridMailClient {
    client: Client,
    api_key: String,
    base_url: String,
    from_email: String,
    from_name: String,
}

#[derive(Serialize)]
struct SendgridEmail {
    personalizations: Vec<Personalization>,
    from: EmailAddress,
    subject: String,
    content: Vec<Content>,
}

#[derive(Serialize)]
struct Personalization {
    to: Vec<EmailAddress>,
}

#[derive(Serialize)]
struct EmailAddress {
    email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
}

#[derive(Serialize)]
struct Content {
    #[serde(rename = "type")]
    content_type: &'static str,
    value: String,
}

impl SendgridMailClient {
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
impl MailClient for SendgridMailClient {
    async fn send(&self, message: EmailMessage) -> Result<(), MailError> {
        message.ensure_body()?;

        // SendGrid wants text/plain before text/html.
        let mut content = Vec::new();
        if let Some(text) = message.body_text {
            content.push(Content {
                content_type: "text/plain",
                value: text,
            });
        }
        if let Some(html) = message.body_html {
            content.push(Content {
                content_type: "text/html",
                value: html,
            });
        }

        let email = SendgridEmail {
            personalizations: vec![Personalization {
                to: vec![EmailAddress {
                    email: message.to,
                    name: None,
                }],
            }],
            from: EmailAddress {
                email: self.from_email.clone(),
                name: Some(self.from_name.clone()),
            },
            subject: message.subject,
            content,
        };

        let response = self
            .client
            .post(format!("{}/v3/mail/send", self.base_url.trim_end_matches('/')))
            .bearer_auth(&self.api_key)
            .json(&email)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(MailError::Provider {
                provider: "sendgrid",
                status,
                body,
            });
        }

        Ok(())
    }

    fn provider(&self) -> &'static str {
        "sendgrid"
    }

    fn from_email(&self) -> &str {
        &self.from_email
    }

    fn from_name(&self) -> &str {
        &self.from_name
    }
}
