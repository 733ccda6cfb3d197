//! Outbound mail transport — SMTP via lettre.
//!
//! The engine treats transport as opaque: success returns a message id,
//! failure returns a typed error the dispatcher classifies. Bounce
//! detection after acceptance belongs to the external bounce pipeline.

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use secrecy::ExposeSecret;
use uuid::Uuid;

use crate::config::SmtpAccount;
use crate::error::TransportError;

/// Accepted-for-delivery receipt.
#[derive(Debug, Clone)]
pub struct SendReceipt {
    pub message_id: String,
}

/// Mail transport contract used by the dispatcher.
#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn send(
        &self,
        account: &SmtpAccount,
        to: &str,
        subject: &str,
        body: &str,
    ) -> Result<SendReceipt, TransportError>;
}

/// SMTP implementation. lettre's `SmtpTransport` is blocking, so the
/// actual network call runs under `spawn_blocking`.
pub struct SmtpSender;

impl SmtpSender {
    pub fn new() -> Self {
        Self
    }
}

impl Default for SmtpSender {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MailTransport for SmtpSender {
    async fn send(
        &self,
        account: &SmtpAccount,
        to: &str,
        subject: &str,
        body: &str,
    ) -> Result<SendReceipt, TransportError> {
        let from = account
            .address
            .parse()
            .map_err(|e| TransportError::Address(format!("from {}: {e}", account.address)))?;
        let to_mailbox = to
            .parse()
            .map_err(|e| TransportError::Address(format!("to {to}: {e}")))?;

        let message_id = generate_message_id(&account.address);

        let email = Message::builder()
            .from(from)
            .to(to_mailbox)
            .subject(subject)
            .message_id(Some(message_id.clone()))
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_string())
            .map_err(|e| TransportError::Compose(e.to_string()))?;

        let creds = Credentials::new(
            account.username.clone(),
            account.password.expose_secret().to_string(),
        );
        let host = account.host.clone();
        let port = account.port;
        let mailbox = account.address.clone();

        let receipt = tokio::task::spawn_blocking(move || {
            let transport = SmtpTransport::relay(&host)
                .map_err(|e| TransportError::Connect(format!("SMTP relay setup: {e}")))?
                .port(port)
                .credentials(creds)
                .build();

            transport
                .send(&email)
                .map_err(|e| classify_smtp_error(&e, &mailbox))?;

            Ok(SendReceipt {
                message_id: message_id.clone(),
            })
        })
        .await
        .map_err(|e| TransportError::Connect(format!("send task panicked: {e}")))??;

        tracing::info!(to, message_id = %receipt.message_id, "Email accepted by SMTP relay");
        Ok(receipt)
    }
}

/// Map a lettre SMTP error onto the engine taxonomy.
///
/// 5xx responses are permanent: authentication rejections count against
/// the mailbox, everything else is treated as recipient-side. 4xx and
/// connection-level failures are transient.
fn classify_smtp_error(
    e: &lettre::transport::smtp::Error,
    mailbox: &str,
) -> TransportError {
    let text = e.to_string();
    if e.is_permanent() {
        let lowered = text.to_lowercase();
        if lowered.contains("auth") || lowered.contains("535") {
            TransportError::Auth {
                mailbox: mailbox.to_string(),
            }
        } else {
            TransportError::Rejected(text)
        }
    } else if e.is_transient() {
        TransportError::Transient(text)
    } else {
        TransportError::Connect(text)
    }
}

/// RFC 5322 style message id under the sender's domain.
fn generate_message_id(from_address: &str) -> String {
    let domain = from_address.rsplit('@').next().unwrap_or("localhost");
    format!("<{}@{}>", Uuid::new_v4(), domain)
}

#[cfg(test)]
mod tests {
    use secrecy::SecretString;

    use super::*;

    fn account() -> SmtpAccount {
        SmtpAccount {
            address: "reach@acme.io".into(),
            host: "smtp.acme.io".into(),
            port: 587,
            username: "reach@acme.io".into(),
            password: SecretString::from("secret"),
        }
    }

    #[test]
    fn message_id_uses_sender_domain() {
        let id = generate_message_id("reach@acme.io");
        assert!(id.starts_with('<'));
        assert!(id.ends_with("@acme.io>"));
    }

    #[test]
    fn message_id_is_unique_per_call() {
        assert_ne!(
            generate_message_id("reach@acme.io"),
            generate_message_id("reach@acme.io")
        );
    }

    #[tokio::test]
    async fn invalid_recipient_fails_before_any_network_io() {
        let sender = SmtpSender::new();
        let result = sender
            .send(&account(), "not-an-address", "Hi", "Body")
            .await;
        assert!(matches!(result, Err(TransportError::Address(_))));
    }

    #[tokio::test]
    async fn invalid_from_address_fails_before_any_network_io() {
        let mut acct = account();
        acct.address = "broken".into();
        let sender = SmtpSender::new();
        let result = sender.send(&acct, "ok@example.com", "Hi", "Body").await;
        assert!(matches!(result, Err(TransportError::Address(_))));
    }
}
