//! Email service module for account mails
//!
//! This module provides functionality for:
//! - Sending account activation emails after registration
//! - Sending account creation emails when an administrator adds a user
//! - Sending password reset emails
//!
//! Mails are sent from a background task; failures are logged and never
//! reach the HTTP client.

use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use thiserror::Error;
use tracing::{info, warn};

use crate::config::SmtpConfig;
use crate::models::UserRecord;

/// Email service errors
#[derive(Debug, Error)]
pub enum EmailError {
    #[error("SMTP transport error: {0}")]
    SmtpError(String),

    #[error("Failed to build email: {0}")]
    BuildError(String),

    #[error("User {0} has no email address")]
    MissingRecipient(String),

    #[error("User {0} has no {1} key")]
    MissingKey(String, &'static str),
}

/// Account mails the service knows how to send
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MailKind {
    Activation,
    Creation,
    PasswordReset,
}

/// Email service for sending transactional emails
#[derive(Clone)]
pub struct EmailService {
    config: SmtpConfig,
    base_url: String,
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl EmailService {
    /// Create a new email service
    ///
    /// # Arguments
    /// * `config` - SMTP server and sender settings
    /// * `base_url` - Public URL prefix for links in mails
    pub fn new(config: SmtpConfig, base_url: String) -> Result<Self, EmailError> {
        let creds = Credentials::new(config.username.clone(), config.password.clone());

        let transport = AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
            .map_err(|e| EmailError::SmtpError(e.to_string()))?
            .credentials(creds)
            .port(config.port)
            .build();

        Ok(Self {
            config,
            base_url,
            transport,
        })
    }

    /// Send an email
    async fn send_email(&self, to: &str, subject: &str, body: String) -> Result<(), EmailError> {
        let from = format!("{} <{}>", self.config.from_name, self.config.from_email);

        let email = Message::builder()
            .from(from.parse().map_err(|e| EmailError::BuildError(format!("{}", e)))?)
            .to(to.parse().map_err(|e| EmailError::BuildError(format!("{}", e)))?)
            .subject(subject)
            .header(ContentType::TEXT_HTML)
            .body(body)
            .map_err(|e| EmailError::BuildError(e.to_string()))?;

        self.transport
            .send(email)
            .await
            .map_err(|e| EmailError::SmtpError(e.to_string()))?;

        Ok(())
    }

    /// Send the activation link to a freshly registered user
    pub async fn send_activation_email(&self, user: &UserRecord) -> Result<(), EmailError> {
        let (to, body) = self.prepare(MailKind::Activation, user)?;
        self.send_email(&to, "Anime Catalog account activation", body).await
    }

    /// Tell a user an administrator created their account
    pub async fn send_creation_email(&self, user: &UserRecord) -> Result<(), EmailError> {
        let (to, body) = self.prepare(MailKind::Creation, user)?;
        self.send_email(&to, "Anime Catalog account created", body).await
    }

    /// Send the password reset link
    pub async fn send_password_reset_mail(&self, user: &UserRecord) -> Result<(), EmailError> {
        let (to, body) = self.prepare(MailKind::PasswordReset, user)?;
        self.send_email(&to, "Anime Catalog password reset", body).await
    }

    /// Send a mail from a background task, logging the outcome
    pub fn dispatch(&self, kind: MailKind, user: UserRecord) {
        let service = self.clone();
        tokio::spawn(async move {
            let result = match kind {
                MailKind::Activation => service.send_activation_email(&user).await,
                MailKind::Creation => service.send_creation_email(&user).await,
                MailKind::PasswordReset => service.send_password_reset_mail(&user).await,
            };
            match result {
                Ok(()) => info!("Sent {:?} email to user '{}'", kind, user.login),
                Err(e) => warn!("Email could not be sent to user '{}': {}", user.login, e),
            }
        });
    }

    fn prepare(&self, kind: MailKind, user: &UserRecord) -> Result<(String, String), EmailError> {
        let to = user
            .email
            .clone()
            .ok_or_else(|| EmailError::MissingRecipient(user.login.clone()))?;
        let body = render(kind, user, &self.base_url)?;
        Ok((to, body))
    }
}

/// Render the HTML body of an account mail
pub fn render(kind: MailKind, user: &UserRecord, base_url: &str) -> Result<String, EmailError> {
    let (key, key_name, path) = match kind {
        MailKind::Activation => (&user.activation_key, "activation", "/account/activate"),
        MailKind::Creation | MailKind::PasswordReset => {
            (&user.reset_key, "reset", "/account/reset/finish")
        }
    };
    let key = key
        .as_deref()
        .ok_or_else(|| EmailError::MissingKey(user.login.clone(), key_name))?;

    let link = format!("{}{}?key={}", base_url, path, urlencoding::encode(key));
    let name = escape_html(user.first_name.as_deref().unwrap_or(&user.login));

    let (title, message, button) = match kind {
        MailKind::Activation => (
            "Activate Your Account",
            "Your Anime Catalog account has been created, please click the button below to activate it:",
            "Activate Account",
        ),
        MailKind::Creation => (
            "Your Account Was Created",
            "An administrator created an Anime Catalog account for you. Click the button below to choose your password:",
            "Set Password",
        ),
        MailKind::PasswordReset => (
            "Reset Your Password",
            "We received a request to reset your password. Click the button below to create a new one:",
            "Reset Password",
        ),
    };

    Ok(format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <title>{title}</title>
</head>
<body style="font-family: Arial, sans-serif; line-height: 1.6; color: #333;">
    <div style="max-width: 600px; margin: 0 auto; padding: 20px;">
        <h1 style="color: #2563eb;">{title}</h1>
        <p>Dear {name},</p>
        <p>{message}</p>
        <p style="text-align: center; margin: 30px 0;">
            <a href="{link}" style="background-color: #2563eb; color: white; padding: 12px 24px; text-decoration: none; border-radius: 6px; display: inline-block;">
                {button}
            </a>
        </p>
        <p>Or copy and paste this link into your browser:</p>
        <p style="word-break: break-all; color: #666;">{link}</p>
        <p style="color: #666; font-size: 14px; margin-top: 30px;">Regards,<br>Anime Catalog</p>
    </div>
</body>
</html>"#
    ))
}

fn escape_html(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '&' => escaped.push_str("&amp;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::BTreeSet;

    fn user() -> UserRecord {
        UserRecord {
            id: 1,
            login: "edward".to_string(),
            password_hash: String::new(),
            first_name: Some("Ed <Radical>".to_string()),
            last_name: None,
            email: Some("ed@bebop.example".to_string()),
            image_url: None,
            activated: false,
            lang_key: Some("en".to_string()),
            activation_key: Some("ACTIVATEabc123456789".to_string()),
            reset_key: None,
            reset_date: None,
            created_by: "anonymousUser".to_string(),
            created_date: Utc::now(),
            last_modified_by: None,
            last_modified_date: None,
            authorities: BTreeSet::new(),
        }
    }

    #[test]
    fn test_activation_mail_links_to_activation_page() {
        let body = render(MailKind::Activation, &user(), "https://anime.example").unwrap();
        assert!(body.contains("https://anime.example/account/activate?key=ACTIVATEabc123456789"));
        assert!(body.contains("Dear Ed &lt;Radical&gt;,"));
    }

    #[test]
    fn test_reset_mail_requires_reset_key() {
        let err = render(MailKind::PasswordReset, &user(), "http://localhost:8080").unwrap_err();
        assert_eq!(err.to_string(), "User edward has no reset key");

        let mut user = user();
        user.reset_key = Some("RESETkey".to_string());
        let body = render(MailKind::PasswordReset, &user, "http://localhost:8080").unwrap();
        assert!(body.contains("http://localhost:8080/account/reset/finish?key=RESETkey"));
    }

    #[test]
    fn test_creation_mail_uses_reset_link_and_login_fallback() {
        let mut user = user();
        user.first_name = None;
        user.reset_key = Some("NEWUSERkey".to_string());
        let body = render(MailKind::Creation, &user, "http://localhost:8080").unwrap();
        assert!(body.contains("/account/reset/finish?key=NEWUSERkey"));
        assert!(body.contains("Dear edward,"));
    }

    #[test]
    fn test_email_error_display() {
        let err = EmailError::MissingRecipient("spike".to_string());
        assert_eq!(err.to_string(), "User spike has no email address");

        let err = EmailError::SmtpError("connection failed".to_string());
        assert_eq!(err.to_string(), "SMTP transport error: connection failed");
    }
}
