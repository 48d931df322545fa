//! Outgoing email

use std::{str::FromStr, sync::Arc};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lettre::{
    message::{header::ContentType, Mailbox, Message, MultiPart, SinglePart},
    transport::smtp::authentication::Credentials,
    SmtpTransport, Transport,
};

use crate::{
    config::EmailConfig,
    error::{AppError, AppResult},
};

/// Delivery seam for outgoing mail
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, to: &str, subject: &str, body: &str) -> AppResult<()>;
}

/// SMTP delivery through lettre
pub struct SmtpMailer {
    config: EmailConfig,
}

impl SmtpMailer {
    pub fn new(config: EmailConfig) -> Self {
        Self { config }
    }

    fn build_message(&self, to: &str, subject: &str, body: &str) -> AppResult<Message> {
        let from_name = self.config.smtp_from_name.as_deref().unwrap_or("Libris");
        let from_mailbox = Mailbox::from_str(&format!("{} <{}>", from_name, self.config.smtp_from))
            .map_err(|e| AppError::Internal(format!("Invalid from address: {}", e)))?;

        let to_mailbox = Mailbox::from_str(to)
            .map_err(|e| AppError::Internal(format!("Invalid to address: {}", e)))?;

        Message::builder()
            .from(from_mailbox)
            .to(to_mailbox)
            .subject(subject)
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(body.to_string()),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(html_body(body)),
                    ),
            )
            .map_err(|e| AppError::Internal(format!("Failed to build email: {}", e)))
    }

    fn transport(&self) -> AppResult<SmtpTransport> {
        let builder = if self.config.smtp_use_tls {
            SmtpTransport::starttls_relay(&self.config.smtp_host)
                .map_err(|e| AppError::Internal(format!("Failed to create SMTP transport: {}", e)))?
        } else {
            SmtpTransport::builder_dangerous(&self.config.smtp_host)
        }
        .port(self.config.smtp_port);

        let builder = match (&self.config.smtp_username, &self.config.smtp_password) {
            (Some(username), Some(password)) => {
                builder.credentials(Credentials::new(username.clone(), password.clone()))
            }
            _ => builder,
        };

        Ok(builder.build())
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, to: &str, subject: &str, body: &str) -> AppResult<()> {
        let email = self.build_message(to, subject, body)?;
        let transport = self.transport()?;

        // SmtpTransport is blocking
        tokio::task::spawn_blocking(move || transport.send(&email))
            .await
            .map_err(|e| AppError::Internal(format!("Email task failed: {}", e)))?
            .map_err(|e| AppError::Internal(format!("Failed to send email: {}", e)))?;

        Ok(())
    }
}

/// Used when email is disabled: the message is only traced
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, to: &str, subject: &str, _body: &str) -> AppResult<()> {
        tracing::debug!(to, subject, "email disabled, message not sent");
        Ok(())
    }
}

#[derive(Clone)]
pub struct EmailService {
    mailer: Arc<dyn Mailer>,
}

impl EmailService {
    pub fn new(config: EmailConfig) -> Self {
        if config.enabled {
            Self::with_mailer(Arc::new(SmtpMailer::new(config)))
        } else {
            Self::with_mailer(Arc::new(LogMailer))
        }
    }

    pub fn with_mailer(mailer: Arc<dyn Mailer>) -> Self {
        Self { mailer }
    }

    /// Send an approved reset token to the account owner
    pub async fn send_reset_token(
        &self,
        to: &str,
        login: &str,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> AppResult<()> {
        let subject = "Your Libris password reset";
        let body = format!(
            r#"
Hello {login},

An administrator approved your password reset request.

Reset token: {token}

The token can be used once and expires on {expires}.

If you did not ask for a reset, contact the library staff.
"#,
            login = login,
            token = token,
            expires = expires_at.format("%Y-%m-%d %H:%M UTC"),
        );

        self.mailer.send(to, subject, &body).await
    }
}

/// HTML alternative of a plain-text body; `pre` keeps the line breaks
fn html_body(text: &str) -> String {
    let escaped = text
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;");
    format!("<html><body><pre>{}</pre></body></html>", escaped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tokio_test::{assert_err, assert_ok};

    #[tokio::test]
    async fn reset_email_carries_token_and_expiry() {
        let mut mock = MockMailer::new();
        mock.expect_send()
            .withf(|to, subject, body| {
                to.to_string() == "jdoe@example.org"
                    && subject.contains("password reset")
                    && body.contains("tok-123")
                    && body.contains("2024-03-02 10:00 UTC")
            })
            .times(1)
            .returning(|_, _, _| Ok(()));

        let service = EmailService::with_mailer(Arc::new(mock));
        let expires = Utc.with_ymd_and_hms(2024, 3, 2, 10, 0, 0).unwrap();
        assert_ok!(
            service
                .send_reset_token("jdoe@example.org", "jdoe", "tok-123", expires)
                .await
        );
    }

    #[test]
    fn html_body_escapes_markup() {
        let html = html_body("Hello <b>jdoe</b> & co\nline two");
        assert_eq!(
            html,
            "<html><body><pre>Hello &lt;b&gt;jdoe&lt;/b&gt; &amp; co\nline two</pre></body></html>"
        );
    }

    #[tokio::test]
    async fn mailer_errors_propagate() {
        let mut mock = MockMailer::new();
        mock.expect_send()
            .returning(|_, _, _| Err(AppError::Internal("smtp down".to_string())));

        let service = EmailService::with_mailer(Arc::new(mock));
        let result = service
            .send_reset_token("a@b.c", "a", "tok", Utc::now())
            .await;
        let err = assert_err!(result);
        assert!(matches!(err, AppError::Internal(_)));
    }

    #[tokio::test]
    async fn disabled_email_uses_log_mailer() {
        let service = EmailService::new(EmailConfig::default());
        assert_ok!(service.send_reset_token("a@b.c", "a", "tok", Utc::now()).await);
    }
}
