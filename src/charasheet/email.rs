//! Outbound email abstraction.
//!
//! Rendering and delivery belong to the mail service; this crate only hands
//! over the recipient, the template name and the link to embed. The default
//! `LogMailer` logs the recipient and template, never the link, because reset
//! links carry a live credential.

use anyhow::Result;
use std::sync::Mutex;
use tracing::info;

pub const PASSWORD_RESET_TEMPLATE: &str = "forgotten-password";

#[derive(Clone)]
pub struct EmailMessage {
    pub to_email: String,
    pub template: &'static str,
    pub link: String,
}

impl std::fmt::Debug for EmailMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmailMessage")
            .field("to_email", &self.to_email)
            .field("template", &self.template)
            .finish_non_exhaustive()
    }
}

/// Email delivery used by the forgotten-password flow.
pub trait Mailer: Send + Sync {
    /// Deliver a message or return an error to fail the request.
    ///
    /// # Errors
    /// Returns an error when the message could not be handed over.
    fn send(&self, message: &EmailMessage) -> Result<()>;
}

/// Local sender that records the hand-over in the log.
#[derive(Clone, Debug)]
pub struct LogMailer;

impl Mailer for LogMailer {
    fn send(&self, message: &EmailMessage) -> Result<()> {
        info!(
            to_email = %message.to_email,
            template = message.template,
            "Password reset email handed over"
        );
        Ok(())
    }
}

/// Keeps every message in memory, for tests and local runs that need the link.
#[derive(Debug, Default)]
pub struct CapturingMailer {
    sent: Mutex<Vec<EmailMessage>>,
}

impl CapturingMailer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages sent so far, oldest first.
    #[must_use]
    pub fn sent(&self) -> Vec<EmailMessage> {
        self.sent
            .lock()
            .map(|sent| sent.clone())
            .unwrap_or_default()
    }
}

impl Mailer for CapturingMailer {
    fn send(&self, message: &EmailMessage) -> Result<()> {
        self.sent
            .lock()
            .map_err(|_| anyhow::anyhow!("capturing mailer lock poisoned"))?
            .push(message.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message() -> EmailMessage {
        EmailMessage {
            to_email: "a@example.com".to_string(),
            template: PASSWORD_RESET_TEMPLATE,
            link: "https://charasheet.dev/password-reset/secret-token".to_string(),
        }
    }

    #[test]
    fn debug_output_omits_link() {
        let rendered = format!("{:?}", message());
        assert!(rendered.contains("a@example.com"));
        assert!(!rendered.contains("secret-token"));
    }

    #[test]
    fn capturing_mailer_keeps_messages() -> Result<()> {
        let mailer = CapturingMailer::new();
        mailer.send(&message())?;
        mailer.send(&message())?;
        let sent = mailer.sent();
        assert_eq!(sent.len(), 2);
        assert!(sent[0].link.ends_with("/secret-token"));
        Ok(())
    }

    #[test]
    fn log_mailer_accepts_messages() -> Result<()> {
        LogMailer.send(&message())
    }
}
