use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Lifecycle of a mailing. Dispatch moves it to `Running`; reaching
/// `Completed` depends on the configured finish policy or a manual edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MailingStatus {
    #[default]
    Created,
    Running,
    Completed,
}

impl MailingStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            MailingStatus::Created => "created",
            MailingStatus::Running => "running",
            MailingStatus::Completed => "completed",
        }
    }
}

impl fmt::Display for MailingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MailingStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(MailingStatus::Created),
            "running" => Ok(MailingStatus::Running),
            "completed" => Ok(MailingStatus::Completed),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// Outcome recorded for one delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttemptStatus {
    Success,
    Failure,
}

impl AttemptStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AttemptStatus::Success => "success",
            AttemptStatus::Failure => "failure",
        }
    }
}

impl fmt::Display for AttemptStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AttemptStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(AttemptStatus::Success),
            "failure" => Ok(AttemptStatus::Failure),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown status '{0}'")]
pub struct UnknownStatus(pub String);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: Option<String>,
    pub phone_number: Option<String>,
    pub country: Option<String>,
    pub groups: Vec<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recipient {
    pub id: Uuid,
    pub email: String,
    pub full_name: String,
    pub comment: Option<String>,
    pub owner_id: Uuid,
    pub created_at: DateTime<Utc>,
}

/// Content template sent by a mailing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub subject: String,
    pub body: String,
    pub owner_id: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mailing {
    pub id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub status: MailingStatus,
    pub message_id: Uuid,
    pub owner_id: Uuid,
    pub recipient_ids: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// Immutable log entry for one delivery within one dispatch run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailingAttempt {
    pub id: Uuid,
    pub mailing_id: Uuid,
    pub attempt_time: DateTime<Utc>,
    pub status: AttemptStatus,
    pub server_response: String,
}
