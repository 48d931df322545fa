//! Messages and notifications delivered to users

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use super::Pagination;

/// Message origin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    System,
    Borrowing,
    Overdue,
    Reset,
    Direct,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::System => "system",
            MessageKind::Borrowing => "borrowing",
            MessageKind::Overdue => "overdue",
            MessageKind::Reset => "reset",
            MessageKind::Direct => "direct",
        }
    }
}

impl std::str::FromStr for MessageKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "system" => Ok(MessageKind::System),
            "borrowing" => Ok(MessageKind::Borrowing),
            "overdue" => Ok(MessageKind::Overdue),
            "reset" => Ok(MessageKind::Reset),
            "direct" => Ok(MessageKind::Direct),
            _ => Err(format!("Invalid message kind: {}", s)),
        }
    }
}

impl_text_enum!(MessageKind);

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Message {
    pub id: i32,
    pub recipient_id: i32,
    pub sender_id: Option<i32>,
    pub kind: MessageKind,
    pub subject: String,
    pub body: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

/// A message waiting to be stored
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub recipient_id: i32,
    pub sender_id: Option<i32>,
    pub kind: MessageKind,
    pub subject: String,
    pub body: String,
}

impl NewMessage {
    /// System notification with no human sender
    pub fn notice(
        recipient_id: i32,
        kind: MessageKind,
        subject: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            recipient_id,
            sender_id: None,
            kind,
            subject: subject.into(),
            body: body.into(),
        }
    }
}

/// Staff-to-user message
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct SendMessage {
    pub recipient_id: i32,
    #[validate(length(min = 1, max = 255, message = "Subject must be 1 to 255 characters"))]
    pub subject: String,
    #[validate(length(min = 1, max = 10000, message = "Body must be 1 to 10000 characters"))]
    pub body: String,
}

#[derive(Debug, Deserialize, IntoParams, ToSchema)]
pub struct MessageQuery {
    pub unread_only: Option<bool>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

impl MessageQuery {
    pub fn pagination(&self) -> Pagination {
        Pagination {
            page: self.page,
            per_page: self.per_page,
        }
    }
}
