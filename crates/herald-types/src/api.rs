use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{MailingStatus, Message, Mailing, MailingAttempt, Recipient};

// -- JWT Claims --

/// JWT claims issued at login. Group membership is deliberately absent:
/// it is looked up per request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub username: String,
    pub exp: usize,
}

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub user_id: Uuid,
    pub token: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub user_id: Uuid,
    pub username: String,
    pub token: String,
}

// -- Profile --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateProfileRequest {
    pub username: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone_number: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
}

// -- Recipients --

/// Used for both create and full update.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RecipientRequest {
    pub email: String,
    pub full_name: String,
    #[serde(default)]
    pub comment: Option<String>,
}

// -- Messages --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MessageRequest {
    pub subject: String,
    pub body: String,
}

// -- Mailings --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MailingRequest {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    #[serde(default)]
    pub status: MailingStatus,
    pub message_id: Uuid,
    #[serde(default)]
    pub recipient_ids: Vec<Uuid>,
}

// -- Notices --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Success,
    Error,
}

/// User-facing message attached to a redirect.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub text: String,
}

impl Notice {
    pub fn success(text: impl Into<String>) -> Self {
        Self { level: NoticeLevel::Success, text: text.into() }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self { level: NoticeLevel::Error, text: text.into() }
    }
}

// -- Statistics --

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailingStats {
    pub mailing_id: Uuid,
    pub status: MailingStatus,
    pub success: u64,
    pub failure: u64,
    pub total: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HomeSummary {
    pub total_mailings: u64,
    pub running_mailings: u64,
    pub unique_recipients: u64,
}

// -- Export --

/// Whole-store snapshot written by `herald-admin export-mailing-data`.
#[derive(Debug, Serialize, Deserialize)]
pub struct DataExport {
    pub recipients: Vec<Recipient>,
    pub messages: Vec<Message>,
    pub mailings: Vec<Mailing>,
    pub mailing_attempts: Vec<MailingAttempt>,
}
