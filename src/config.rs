// src/config.rs

use std::env;
use std::fmt::Display;
use std::str::FromStr;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MailProvider {
    /// Only logs outgoing mail; for local development.
    Log,
    Resend,
    Sendgrid,
    Smtp,
}

impl FromStr for MailProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "log" => Ok(Self::Log),
            "resend" => Ok(Self::Resend),
            "sendgrid" => Ok(Self::Sendgrid),
            "smtp" => Ok(Self::Smtp),
            other => Err(format!("unknown mail provider `{other}`")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SmtpSettings {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct MailSettings {
    pub provider: MailProvider,
    pub from_email: String,
    pub from_name: String,
    pub api_key: Option<String>,
    /// Overrides the provider's HTTP API base url (Resend/SendGrid).
    pub api_base_url: Option<String>,
    pub smtp: Option<SmtpSettings>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub jwt_secret: String,
    pub s3_bucket: String,
    pub s3_endpoint: Option<String>,
    pub s3_public_base_url: String,
    pub mock_s3: bool,
    pub mail: MailSettings,
    pub cron_secret: Option<String>,
    pub job_interval_secs: u64,
    pub app_url: String,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let s3_bucket = optional("S3_BUCKET").unwrap_or_else(|| "trueke-products".to_string());
        let s3_public_base_url = optional("S3_PUBLIC_BASE_URL")
            .unwrap_or_else(|| format!("https://{}.s3.amazonaws.com", s3_bucket));

        Ok(Self {
            database_url: required("DATABASE_URL")?,
            host: optional("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parse_or("PORT", 8080)?,
            jwt_secret: required("JWT_SECRET")?,
            s3_bucket,
            s3_endpoint: optional("S3_ENDPOINT"),
            s3_public_base_url,
            mock_s3: parse_or("MOCK_S3", false)?,
            mail: MailSettings::from_env()?,
            cron_secret: optional("CRON_SECRET"),
            job_interval_secs: parse_or("JOB_INTERVAL_SECS", 3600)?,
            app_url: optional("APP_URL").unwrap_or_else(|| "http://localhost:5173".to_string()),
        })
    }
}

impl MailSettings {
    pub fn from_env() -> Result<Self, ConfigError> {
        let provider: MailProvider = parse_or("MAIL_PROVIDER", MailProvider::Log)?;

        let smtp = if provider == MailProvider::Smtp {
            Some(SmtpSettings {
                host: required("SMTP_HOST")?,
                port: parse_or("SMTP_PORT", 587)?,
                username: required("SMTP_USERNAME")?,
                password: required("SMTP_PASSWORD")?,
            })
        } else {
            None
        };

        let api_key = optional("MAIL_API_KEY");
        if matches!(provider, MailProvider::Resend | MailProvider::Sendgrid) && api_key.is_none() {
            return Err(ConfigError::Missing("MAIL_API_KEY"));
        }

        Ok(Self {
            provider,
            from_email: optional("MAIL_FROM_EMAIL")
                .unwrap_or_else(|| "no-reply@trueke.app".to_string()),
            from_name: optional("MAIL_FROM_NAME").unwrap_or_else(|| "Trueke".to_string()),
            api_key,
            api_base_url: optional("MAIL_API_BASE_URL"),
            smtp,
        })
    }
}

fn optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn required(key: &'static str) -> Result<String, ConfigError> {
    optional(key).ok_or(ConfigError::Missing(key))
}

fn parse_or<T>(key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    match optional(key) {
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            key,
            reason: e.to_string(),
        }),
        None => {
            log::info!("{key} not set, using default");
            Ok(default)
        }
    }
}
