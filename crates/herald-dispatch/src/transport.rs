//! Outbound mail transport.
//!
//! [`Transport`] is the only seam the dispatch routine talks to. Production
//! uses [`SmtpTransport`] (lettre); without an SMTP host configured the
//! binaries fall back to [`LogTransport`], which only writes to the log.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Address, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("invalid email address: {0}")]
    InvalidAddress(String),

    #[error("failed to build message: {0}")]
    Build(String),

    /// Transport-side failure; displays the bare detail reported by the server or client.
    #[error("{0}")]
    Smtp(String),
}

/// One plain-text email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outgoing {
    pub subject: String,
    pub body: String,
    pub from: String,
    pub to: Vec<String>,
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, mail: &Outgoing) -> Result<(), TransportError>;
}

/// Check that `email` is a syntactically valid address.
pub fn validate_address(email: &str) -> Result<(), TransportError> {
    Address::from_str(email)
        .map(|_| ())
        .map_err(|_| TransportError::InvalidAddress(email.to_string()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TlsMode {
    #[default]
    StartTls,
    Tls,
    None,
}

impl FromStr for TlsMode {
    type Err = TransportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "starttls" => Ok(TlsMode::StartTls),
            "tls" => Ok(TlsMode::Tls),
            "none" => Ok(TlsMode::None),
            other => Err(TransportError::InvalidConfig(format!(
                "HERALD_SMTP_TLS must be starttls, tls or none (got '{}')",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub tls: TlsMode,
    /// `None` leaves the connection without a timeout.
    pub timeout_secs: Option<u64>,
}

impl SmtpConfig {
    /// Read `HERALD_SMTP_*`. Returns `Ok(None)` when no host is configured.
    pub fn from_env() -> Result<Option<Self>, TransportError> {
        let Some(host) = env_opt("HERALD_SMTP_HOST") else {
            return Ok(None);
        };

        let port = match env_opt("HERALD_SMTP_PORT") {
            Some(raw) => raw
                .parse()
                .map_err(|_| TransportError::InvalidConfig(format!("invalid HERALD_SMTP_PORT '{}'", raw)))?,
            None => 587,
        };
        let tls = match env_opt("HERALD_SMTP_TLS") {
            Some(raw) => raw.parse()?,
            None => TlsMode::default(),
        };
        let timeout_secs = match env_opt("HERALD_SMTP_TIMEOUT_SECS") {
            Some(raw) => Some(raw.parse().map_err(|_| {
                TransportError::InvalidConfig(format!("invalid HERALD_SMTP_TIMEOUT_SECS '{}'", raw))
            })?),
            None => None,
        };

        Ok(Some(Self {
            host,
            port,
            username: env_opt("HERALD_SMTP_USERNAME"),
            password: env_opt("HERALD_SMTP_PASSWORD"),
            tls,
            timeout_secs,
        }))
    }
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// SMTP delivery through lettre.
#[derive(Clone)]
pub struct SmtpTransport {
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpTransport {
    pub fn new(config: &SmtpConfig) -> Result<Self, TransportError> {
        let mut builder = match config.tls {
            TlsMode::None => AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host),
            TlsMode::Tls => AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
                .map_err(|e| TransportError::Smtp(e.to_string()))?,
            TlsMode::StartTls => AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
                .map_err(|e| TransportError::Smtp(e.to_string()))?,
        };

        builder = builder
            .port(config.port)
            .timeout(config.timeout_secs.map(Duration::from_secs));

        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        info!(
            "SMTP transport configured for {}:{} ({:?})",
            config.host, config.port, config.tls
        );
        Ok(Self {
            transport: builder.build(),
        })
    }
}

fn build_message(mail: &Outgoing) -> Result<Message, TransportError> {
    let from: Mailbox = mail
        .from
        .parse()
        .map_err(|_| TransportError::InvalidAddress(mail.from.clone()))?;

    let mut builder = Message::builder().from(from);
    for to in &mail.to {
        let mailbox: Mailbox = to
            .parse()
            .map_err(|_| TransportError::InvalidAddress(to.clone()))?;
        builder = builder.to(mailbox);
    }

    builder
        .subject(mail.subject.as_str())
        .header(ContentType::TEXT_PLAIN)
        .body(mail.body.clone())
        .map_err(|e| TransportError::Build(e.to_string()))
}

#[async_trait]
impl Transport for SmtpTransport {
    async fn send(&self, mail: &Outgoing) -> Result<(), TransportError> {
        let message = build_message(mail)?;
        self.transport
            .send(message)
            .await
            .map(|_| ())
            .map_err(|e| TransportError::Smtp(e.to_string()))
    }
}

/// Development transport: logs instead of sending. Always succeeds.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogTransport;

#[async_trait]
impl Transport for LogTransport {
    async fn send(&self, mail: &Outgoing) -> Result<(), TransportError> {
        info!(
            from = %mail.from,
            to = ?mail.to,
            subject = %mail.subject,
            "Mail not sent (no SMTP host configured): {} bytes of body",
            mail.body.len()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outgoing(from: &str, to: &str) -> Outgoing {
        Outgoing {
            subject: "Spring sale".into(),
            body: "Everything must go.".into(),
            from: from.into(),
            to: vec![to.into()],
        }
    }

    #[test]
    fn builds_plain_text_message() {
        let message = build_message(&outgoing("shop@example.com", "ann@example.com")).unwrap();
        let envelope = message.envelope();
        assert_eq!(envelope.to().len(), 1);
        assert_eq!(envelope.to()[0].to_string(), "ann@example.com");
    }

    #[test]
    fn bad_recipient_is_reported_by_address() {
        let err = build_message(&outgoing("shop@example.com", "not-an-address")).unwrap_err();
        assert_eq!(err.to_string(), "invalid email address: not-an-address");
    }

    #[test]
    fn smtp_errors_display_the_bare_detail() {
        assert_eq!(TransportError::Smtp("SMTP timeout".into()).to_string(), "SMTP timeout");
    }

    #[test]
    fn validates_addresses() {
        assert!(validate_address("ann@example.com").is_ok());
        assert!(validate_address("ann at example").is_err());
        assert!(validate_address("").is_err());
    }

    #[test]
    fn tls_mode_parses() {
        assert_eq!("tls".parse::<TlsMode>().unwrap(), TlsMode::Tls);
        let err = "ssl".parse::<TlsMode>().unwrap_err();
        assert!(matches!(err, TransportError::InvalidConfig(_)));
        assert!(err.to_string().starts_with("invalid config: HERALD_SMTP_TLS"));
    }

    #[tokio::test]
    async fn log_transport_always_succeeds() {
        let sent = LogTransport.send(&outgoing("shop@example.com", "ann@example.com")).await;
        assert!(sent.is_ok());
    }
}
