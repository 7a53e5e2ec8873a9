use std::str::FromStr;
use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use herald_db::Database;
use herald_types::models::{AttemptStatus, MailingStatus};

use crate::transport::{
    LogTransport, Outgoing, SmtpConfig, SmtpTransport, Transport, TransportError, validate_address,
};

/// `server_response` recorded for every successful delivery.
pub const SUCCESS_RESPONSE: &str = "Email sent successfully.";

const DEFAULT_SENDER: &str = "herald@localhost";

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("mailing {0} does not exist")]
    NotFound(Uuid),

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

/// What dispatch does to the mailing status once every recipient was tried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FinishPolicy {
    /// Status stays `running`; the mailing can be re-run or closed by hand.
    #[default]
    LeaveRunning,
    MarkCompleted,
}

impl FromStr for FinishPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(FinishPolicy::LeaveRunning),
            "completed" => Ok(FinishPolicy::MarkCompleted),
            other => Err(format!("expected 'running' or 'completed', got '{}'", other)),
        }
    }
}

/// Result of one delivery, as it is written to the attempt log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered,
    Failed(String),
}

impl DeliveryOutcome {
    pub fn status(&self) -> AttemptStatus {
        match self {
            DeliveryOutcome::Delivered => AttemptStatus::Success,
            DeliveryOutcome::Failed(_) => AttemptStatus::Failure,
        }
    }

    pub fn server_response(&self) -> &str {
        match self {
            DeliveryOutcome::Delivered => SUCCESS_RESPONSE,
            DeliveryOutcome::Failed(detail) => detail,
        }
    }
}

impl From<Result<(), TransportError>> for DeliveryOutcome {
    fn from(result: Result<(), TransportError>) -> Self {
        match result {
            Ok(()) => DeliveryOutcome::Delivered,
            Err(e) => DeliveryOutcome::Failed(e.to_string()),
        }
    }
}

#[derive(Clone)]
pub struct Dispatcher {
    transport: Arc<dyn Transport>,
    sender: String,
    finish: FinishPolicy,
}

impl Dispatcher {
    pub fn new(transport: Arc<dyn Transport>, sender: impl Into<String>) -> Self {
        Self {
            transport,
            sender: sender.into(),
            finish: FinishPolicy::default(),
        }
    }

    pub fn with_finish_policy(mut self, finish: FinishPolicy) -> Self {
        self.finish = finish;
        self
    }

    pub fn sender(&self) -> &str {
        &self.sender
    }

    pub fn finish_policy(&self) -> FinishPolicy {
        self.finish
    }

    /// Build from `HERALD_MAIL_FROM`, `HERALD_DISPATCH_FINISH` and `HERALD_SMTP_*`.
    /// Without an SMTP host, mail only goes to the log.
    pub fn from_env() -> anyhow::Result<Self> {
        let sender = std::env::var("HERALD_MAIL_FROM").unwrap_or_else(|_| DEFAULT_SENDER.to_string());
        validate_address(&sender)?;

        let finish = match std::env::var("HERALD_DISPATCH_FINISH") {
            Ok(raw) => raw
                .parse::<FinishPolicy>()
                .map_err(|e| anyhow::anyhow!("HERALD_DISPATCH_FINISH: {}", e))?,
            Err(_) => FinishPolicy::default(),
        };

        let transport: Arc<dyn Transport> = match SmtpConfig::from_env()? {
            Some(config) => Arc::new(SmtpTransport::new(&config)?),
            None => {
                warn!("HERALD_SMTP_HOST not set, mail will only be logged");
                Arc::new(LogTransport)
            }
        };

        info!("Dispatcher sending as {} (finish policy {:?})", sender, finish);
        Ok(Self::new(transport, sender).with_finish_policy(finish))
    }

    /// Send the mailing's message to each of its current recipients, one at a
    /// time, appending one attempt per recipient.
    ///
    /// A recipient whose delivery fails gets a `failure` attempt and the loop
    /// moves on. Only an unknown mailing or a store error ends the run early;
    /// an unknown mailing is detected before anything is written.
    pub async fn dispatch(&self, db: &Database, mailing_id: Uuid) -> Result<(), DispatchError> {
        let id = mailing_id.to_string();

        let mailing = db.get_mailing(&id)?.ok_or(DispatchError::NotFound(mailing_id))?;

        db.set_mailing_status(&id, MailingStatus::Running.as_str())?;

        let message = db
            .get_message(&mailing.message_id)?
            .ok_or_else(|| anyhow::anyhow!("Message {} of mailing {} is gone", mailing.message_id, id))?;
        let recipients = db.get_mailing_recipients(&id)?;

        info!("Dispatching mailing {} to {} recipients", id, recipients.len());

        let mut failed = 0usize;
        for recipient in &recipients {
            let mail = Outgoing {
                subject: message.subject.clone(),
                body: message.body.clone(),
                from: self.sender.clone(),
                to: vec![recipient.email.clone()],
            };

            let outcome = DeliveryOutcome::from(self.transport.send(&mail).await);
            if let DeliveryOutcome::Failed(detail) = &outcome {
                failed += 1;
                warn!("Mailing {}: delivery to {} failed: {}", id, recipient.email, detail);
            }

            db.insert_attempt(
                &Uuid::new_v4().to_string(),
                &id,
                outcome.status().as_str(),
                outcome.server_response(),
            )?;
        }

        if self.finish == FinishPolicy::MarkCompleted {
            db.set_mailing_status(&id, MailingStatus::Completed.as_str())?;
        }

        info!(
            "Mailing {} finished: {} delivered, {} failed",
            id,
            recipients.len() - failed,
            failed
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use herald_db::mailings::MailingFields;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Fails for the listed addresses with the given detail, succeeds otherwise.
    #[derive(Default)]
    struct ScriptedTransport {
        failures: HashMap<String, String>,
        sent: Mutex<Vec<Outgoing>>,
    }

    impl ScriptedTransport {
        fn failing(address: &str, detail: &str) -> Self {
            let mut failures = HashMap::new();
            failures.insert(address.to_string(), detail.to_string());
            Self { failures, sent: Mutex::new(Vec::new()) }
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn send(&self, mail: &Outgoing) -> Result<(), TransportError> {
            self.sent.lock().unwrap().push(mail.clone());
            match self.failures.get(&mail.to[0]) {
                Some(detail) => Err(TransportError::Smtp(detail.clone())),
                None => Ok(()),
            }
        }
    }

    struct Fixture {
        db: Database,
        mailing: Uuid,
    }

    fn fixture(emails: &[&str]) -> Fixture {
        let db = Database::open_in_memory().unwrap();
        let owner = Uuid::new_v4().to_string();
        db.create_user(&owner, "owner", None, "hash").unwrap();
        db.insert_message("msg", "Spring sale", "Everything must go.", &owner).unwrap();

        let mut recipient_ids = Vec::new();
        for email in emails {
            let id = Uuid::new_v4().to_string();
            db.insert_recipient(&id, email, "Someone", None, &owner).unwrap();
            recipient_ids.push(id);
        }

        let mailing = Uuid::new_v4();
        db.create_mailing(
            &mailing.to_string(),
            &owner,
            &MailingFields {
                start_time: "2026-03-01T08:00:00Z",
                end_time: "2026-03-02T08:00:00Z",
                status: "created",
                message_id: "msg",
                recipient_ids: &recipient_ids,
            },
        )
        .unwrap();

        Fixture { db, mailing }
    }

    fn status_of(db: &Database, mailing: Uuid) -> String {
        db.get_mailing(&mailing.to_string()).unwrap().unwrap().status
    }

    #[tokio::test]
    async fn one_failure_does_not_stop_the_others() {
        let f = fixture(&["a@example.com", "b@example.com", "c@example.com"]);
        let transport = Arc::new(ScriptedTransport::failing("b@example.com", "SMTP timeout"));
        let dispatcher = Dispatcher::new(transport.clone(), "shop@example.com");

        dispatcher.dispatch(&f.db, f.mailing).await.unwrap();

        let attempts = f.db.list_attempts(Some(&f.mailing.to_string())).unwrap();
        assert_eq!(attempts.len(), 3);
        let successes: Vec<_> = attempts.iter().filter(|a| a.status == "success").collect();
        let failures: Vec<_> = attempts.iter().filter(|a| a.status == "failure").collect();
        assert_eq!(successes.len(), 2);
        assert!(successes.iter().all(|a| a.server_response == SUCCESS_RESPONSE));
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].server_response, "SMTP timeout");
        assert!(attempts.iter().all(|a| a.mailing_id == f.mailing.to_string()));

        assert_eq!(status_of(&f.db, f.mailing), "running");
        assert_eq!(transport.sent.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn each_send_carries_the_message_to_one_recipient() {
        let f = fixture(&["a@example.com", "b@example.com"]);
        let transport = Arc::new(ScriptedTransport::default());
        let dispatcher = Dispatcher::new(transport.clone(), "shop@example.com");

        dispatcher.dispatch(&f.db, f.mailing).await.unwrap();

        let sent = transport.sent.lock().unwrap();
        let mut to: Vec<&str> = sent.iter().map(|m| m.to[0].as_str()).collect();
        to.sort();
        assert_eq!(to, vec!["a@example.com", "b@example.com"]);
        for mail in sent.iter() {
            assert_eq!(mail.to.len(), 1);
            assert_eq!(mail.from, "shop@example.com");
            assert_eq!(mail.subject, "Spring sale");
            assert_eq!(mail.body, "Everything must go.");
        }
    }

    #[tokio::test]
    async fn empty_mailing_still_starts_running() {
        let f = fixture(&[]);
        let dispatcher = Dispatcher::new(Arc::new(ScriptedTransport::default()), "shop@example.com");

        dispatcher.dispatch(&f.db, f.mailing).await.unwrap();

        assert!(f.db.list_attempts(Some(&f.mailing.to_string())).unwrap().is_empty());
        assert_eq!(status_of(&f.db, f.mailing), "running");
    }

    #[tokio::test]
    async fn unknown_mailing_writes_nothing() {
        let f = fixture(&["a@example.com"]);
        let transport = Arc::new(ScriptedTransport::default());
        let dispatcher = Dispatcher::new(transport.clone(), "shop@example.com");
        let missing = Uuid::new_v4();

        let err = dispatcher.dispatch(&f.db, missing).await.unwrap_err();

        assert!(matches!(err, DispatchError::NotFound(id) if id == missing));
        assert!(f.db.list_attempts(None).unwrap().is_empty());
        assert_eq!(status_of(&f.db, f.mailing), "created");
        assert!(transport.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn redispatch_appends_attempts() {
        let f = fixture(&["a@example.com", "b@example.com"]);
        let dispatcher = Dispatcher::new(Arc::new(ScriptedTransport::default()), "shop@example.com");

        dispatcher.dispatch(&f.db, f.mailing).await.unwrap();
        dispatcher.dispatch(&f.db, f.mailing).await.unwrap();

        assert_eq!(f.db.list_attempts(Some(&f.mailing.to_string())).unwrap().len(), 4);
        assert_eq!(status_of(&f.db, f.mailing), "running");
    }

    #[tokio::test]
    async fn completed_policy_closes_the_mailing() {
        let f = fixture(&["a@example.com"]);
        let dispatcher = Dispatcher::new(
            Arc::new(ScriptedTransport::failing("a@example.com", "mailbox full")),
            "shop@example.com",
        )
        .with_finish_policy(FinishPolicy::MarkCompleted);

        dispatcher.dispatch(&f.db, f.mailing).await.unwrap();

        assert_eq!(status_of(&f.db, f.mailing), "completed");
    }

    #[test]
    fn finish_policy_parses() {
        assert_eq!("completed".parse::<FinishPolicy>(), Ok(FinishPolicy::MarkCompleted));
        assert_eq!("running".parse::<FinishPolicy>(), Ok(FinishPolicy::LeaveRunning));
        assert!("done".parse::<FinishPolicy>().is_err());
    }
}
