//! Database row types. These map directly to SQLite rows and stay
//! independent of the herald-types API models; `into_model` bridges the two.

use chrono::{DateTime, Utc};
use tracing::warn;
use uuid::Uuid;

use herald_types::api::MailingStats;
use herald_types::models::{
    AttemptStatus, Mailing, MailingAttempt, MailingStatus, Message, Recipient, User,
};

pub struct UserRow {
    pub id: String,
    pub username: String,
    pub email: Option<String>,
    pub password: String,
    pub phone_number: Option<String>,
    pub country: Option<String>,
    pub created_at: String,
}

pub struct RecipientRow {
    pub id: String,
    pub email: String,
    pub full_name: String,
    pub comment: Option<String>,
    pub owner_id: String,
    pub created_at: String,
}

pub struct MessageRow {
    pub id: String,
    pub subject: String,
    pub body: String,
    pub owner_id: String,
    pub created_at: String,
}

pub struct MailingRow {
    pub id: String,
    pub start_time: String,
    pub end_time: String,
    pub status: String,
    pub message_id: String,
    pub owner_id: String,
    pub created_at: String,
}

pub struct AttemptRow {
    pub id: String,
    pub mailing_id: String,
    pub attempt_time: String,
    pub status: String,
    pub server_response: String,
}

pub struct StatsRow {
    pub mailing_id: String,
    pub status: String,
    pub success: i64,
    pub failure: i64,
    pub total: i64,
}

impl UserRow {
    pub fn into_model(self, groups: Vec<String>) -> User {
        User {
            id: parse_uuid(&self.id, "user.id"),
            username: self.username,
            email: self.email,
            phone_number: self.phone_number,
            country: self.country,
            groups,
            created_at: parse_time(&self.created_at, "user.created_at"),
        }
    }
}

impl RecipientRow {
    pub fn into_model(self) -> Recipient {
        Recipient {
            id: parse_uuid(&self.id, "recipient.id"),
            owner_id: parse_uuid(&self.owner_id, "recipient.owner_id"),
            created_at: parse_time(&self.created_at, "recipient.created_at"),
            email: self.email,
            full_name: self.full_name,
            comment: self.comment,
        }
    }
}

impl MessageRow {
    pub fn into_model(self) -> Message {
        Message {
            id: parse_uuid(&self.id, "message.id"),
            owner_id: parse_uuid(&self.owner_id, "message.owner_id"),
            created_at: parse_time(&self.created_at, "message.created_at"),
            subject: self.subject,
            body: self.body,
        }
    }
}

impl MailingRow {
    pub fn into_model(self, recipient_ids: Vec<String>) -> Mailing {
        Mailing {
            id: parse_uuid(&self.id, "mailing.id"),
            start_time: parse_time(&self.start_time, "mailing.start_time"),
            end_time: parse_time(&self.end_time, "mailing.end_time"),
            status: self.status.parse().unwrap_or_else(|e| {
                warn!("Corrupt status on mailing '{}': {}", self.id, e);
                MailingStatus::Created
            }),
            message_id: parse_uuid(&self.message_id, "mailing.message_id"),
            owner_id: parse_uuid(&self.owner_id, "mailing.owner_id"),
            recipient_ids: recipient_ids
                .iter()
                .map(|id| parse_uuid(id, "mailing_recipients.recipient_id"))
                .collect(),
            created_at: parse_time(&self.created_at, "mailing.created_at"),
        }
    }
}

impl AttemptRow {
    pub fn into_model(self) -> MailingAttempt {
        MailingAttempt {
            id: parse_uuid(&self.id, "attempt.id"),
            mailing_id: parse_uuid(&self.mailing_id, "attempt.mailing_id"),
            attempt_time: parse_time(&self.attempt_time, "attempt.attempt_time"),
            status: self.status.parse().unwrap_or_else(|e| {
                warn!("Corrupt status on attempt '{}': {}", self.id, e);
                AttemptStatus::Failure
            }),
            server_response: self.server_response,
        }
    }
}

impl StatsRow {
    pub fn into_model(self) -> MailingStats {
        MailingStats {
            mailing_id: parse_uuid(&self.mailing_id, "mailing.id"),
            status: self.status.parse().unwrap_or_else(|e| {
                warn!("Corrupt status on mailing '{}': {}", self.mailing_id, e);
                MailingStatus::Created
            }),
            success: self.success.max(0) as u64,
            failure: self.failure.max(0) as u64,
            total: self.total.max(0) as u64,
        }
    }
}

fn parse_uuid(raw: &str, field: &str) -> Uuid {
    raw.parse().unwrap_or_else(|e| {
        warn!("Corrupt {} '{}': {}", field, raw, e);
        Uuid::default()
    })
}

fn parse_time(raw: &str, field: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            // Rows written by hand through sqlite3 use "YYYY-MM-DD HH:MM:SS" without timezone.
            chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            warn!("Corrupt {} '{}': {}", field, raw, e);
            DateTime::default()
        })
}
