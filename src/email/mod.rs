use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use tracing::warn;

use crate::config;

#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("invalid address: {0}")]
    Address(#[from] lettre::address::AddressError),

    #[error("failed to build message: {0}")]
    Build(#[from] lettre::error::Error),

    #[error("smtp error: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),
}

/// Deliver a plain-text email synchronously over SMTP.
///
/// Callers treat delivery as best-effort; prefer [`send_best_effort`]
/// unless the failure needs to surface.
pub fn send(to: &str, subject: &str, body: &str) -> Result<(), MailError> {
    let email_config = &config::config().email;

    let message = Message::builder()
        .from(email_config.from_address.parse()?)
        .to(to.parse()?)
        .subject(subject)
        .body(body.to_string())?;

    let mut builder = SmtpTransport::relay(&email_config.smtp_host)?.port(email_config.smtp_port);
    if !email_config.smtp_username.is_empty() {
        builder = builder.credentials(Credentials::new(
            email_config.smtp_username.clone(),
            email_config.smtp_password.clone(),
        ));
    }

    builder.build().send(&message)?;
    Ok(())
}

/// Fire-and-forget delivery on the blocking pool. Failures are logged and
/// never affect the caller's result.
pub fn send_best_effort(to: &str, subject: &str, body: &str) {
    if !config::config().email.enabled {
        return;
    }

    let to = to.to_string();
    let subject = subject.to_string();
    let body = body.to_string();

    tokio::task::spawn_blocking(move || {
        if let Err(e) = send(&to, &subject, &body) {
            warn!("Failed to send email to {}: {}", to, e);
        }
    });
}
