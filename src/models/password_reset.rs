//! Admin-gated password reset requests
//!
//! A request starts `pending`. An administrator approves it (a single-use
//! token valid for a limited time is issued) or rejects it. Using the token
//! moves the request to `completed`.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use crate::error::AppError;

/// Reset request status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ResetStatus {
    Pending,
    Approved,
    Rejected,
    Completed,
}

impl ResetStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResetStatus::Pending => "pending",
            ResetStatus::Approved => "approved",
            ResetStatus::Rejected => "rejected",
            ResetStatus::Completed => "completed",
        }
    }
}

impl std::str::FromStr for ResetStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ResetStatus::Pending),
            "approved" => Ok(ResetStatus::Approved),
            "rejected" => Ok(ResetStatus::Rejected),
            "completed" => Ok(ResetStatus::Completed),
            _ => Err(format!("Invalid reset status: {}", s)),
        }
    }
}

impl_text_enum!(ResetStatus);

/// Admin decision on a pending request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ResetAction {
    Approve,
    Reject,
}

impl ResetAction {
    pub fn target(&self) -> ResetStatus {
        match self {
            ResetAction::Approve => ResetStatus::Approved,
            ResetAction::Reject => ResetStatus::Rejected,
        }
    }
}

/// Reset request row
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct PasswordReset {
    pub id: Uuid,
    pub user_id: i32,
    pub status: ResetStatus,
    #[serde(skip_serializing)]
    pub token_hash: Option<String>,
    pub token_expires_at: Option<DateTime<Utc>>,
    pub reason: Option<String>,
    pub admin_note: Option<String>,
    pub handled_by: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub handled_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl PasswordReset {
    /// Whether the issued token may still be exchanged for a new password
    pub fn check_token_usable(&self, now: DateTime<Utc>) -> Result<(), AppError> {
        match self.status {
            ResetStatus::Approved => {}
            ResetStatus::Completed => {
                return Err(AppError::BadRequest("Reset token has already been used".to_string()))
            }
            _ => return Err(AppError::BadRequest("Invalid reset token".to_string())),
        }
        match self.token_expires_at {
            Some(expires) if now < expires => Ok(()),
            _ => Err(AppError::BadRequest("Reset token has expired".to_string())),
        }
    }
}

/// Reset request as listed for administrators
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct PasswordResetView {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub request: PasswordReset,
    pub user_login: String,
    pub user_email: Option<String>,
}

/// A freshly generated reset token: the raw value goes to the user,
/// only the hash is persisted.
#[derive(Debug, Clone)]
pub struct ResetToken {
    pub raw: String,
    pub hash: String,
    pub expires_at: DateTime<Utc>,
}

impl ResetToken {
    pub fn generate(now: DateTime<Utc>, validity_hours: i64) -> Self {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        let raw = URL_SAFE_NO_PAD.encode(bytes);
        let hash = hash_token(&raw);
        Self {
            raw,
            hash,
            expires_at: now + Duration::hours(validity_hours),
        }
    }
}

/// Hex SHA-256 of a raw token
pub fn hash_token(raw: &str) -> String {
    hex::encode(Sha256::digest(raw.trim().as_bytes()))
}

/// Public reset request
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateResetRequest {
    #[validate(length(min = 1, max = 255, message = "Login or email is required"))]
    pub login_or_email: String,
    #[validate(length(max = 1000, message = "Reason is limited to 1000 characters"))]
    pub reason: Option<String>,
}

/// Response to a reset submission
#[derive(Debug, Serialize, ToSchema)]
pub struct ResetSubmitted {
    /// Identifier to poll for the request status
    pub request_id: Uuid,
    pub status: ResetStatus,
}

/// Status answer for a polling client
#[derive(Debug, Serialize, ToSchema)]
pub struct ResetStatusResponse {
    pub request_id: Uuid,
    pub status: ResetStatus,
    /// Present exactly once, on the first poll after approval
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reset_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_expires_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub admin_note: Option<String>,
}

/// Admin decision body
#[derive(Debug, Deserialize, ToSchema)]
pub struct ReviewResetRequest {
    pub action: ResetAction,
    pub note: Option<String>,
}

/// Exchange a token for a new password
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CompleteReset {
    #[validate(length(min = 1, message = "Token is required"))]
    pub token: String,
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub new_password: String,
}

#[derive(Debug, Default, Deserialize, IntoParams, ToSchema)]
pub struct ResetQuery {
    pub status: Option<ResetStatus>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

impl ResetQuery {
    pub fn pagination(&self) -> super::Pagination {
        super::Pagination {
            page: self.page,
            per_page: self.per_page,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(status: ResetStatus, expires: Option<DateTime<Utc>>) -> PasswordReset {
        let now = Utc::now();
        PasswordReset {
            id: Uuid::new_v4(),
            user_id: 1,
            status,
            token_hash: Some(hash_token("abc")),
            token_expires_at: expires,
            reason: None,
            admin_note: None,
            handled_by: Some(2),
            created_at: now,
            handled_at: Some(now),
            completed_at: None,
        }
    }

    #[test]
    fn generated_token_expires_after_validity_window() {
        let now = Utc::now();
        let token = ResetToken::generate(now, 24);
        assert_eq!(token.expires_at - now, Duration::hours(24));
        assert_eq!(token.hash, hash_token(&token.raw));
        assert_eq!(token.hash.len(), 64);
    }

    #[test]
    fn generated_tokens_are_distinct() {
        let now = Utc::now();
        assert_ne!(ResetToken::generate(now, 1).raw, ResetToken::generate(now, 1).raw);
    }

    #[test]
    fn approved_token_is_usable_until_expiry() {
        let now = Utc::now();
        let req = request(ResetStatus::Approved, Some(now + Duration::hours(1)));
        assert!(req.check_token_usable(now).is_ok());
        assert!(req.check_token_usable(now + Duration::hours(2)).is_err());
    }

    #[test]
    fn completed_or_pending_tokens_are_refused() {
        let now = Utc::now();
        let later = Some(now + Duration::hours(1));
        assert!(request(ResetStatus::Completed, later).check_token_usable(now).is_err());
        assert!(request(ResetStatus::Pending, later).check_token_usable(now).is_err());
        assert!(request(ResetStatus::Rejected, later).check_token_usable(now).is_err());
    }

    #[test]
    fn action_body_parses() {
        let body: ReviewResetRequest =
            serde_json::from_str(r#"{"action":"approve","note":"verified by phone"}"#).unwrap();
        assert_eq!(body.action.target(), ResetStatus::Approved);
        assert!(serde_json::from_str::<ReviewResetRequest>(r#"{"action":"maybe"}"#).is_err());
    }
}
