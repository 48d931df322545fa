//! Admin-gated password reset workflow

use std::{collections::HashMap, sync::Arc};

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{email::EmailService, messages::MessagesService, users::hash_password};
use crate::{
    error::{AppError, AppResult},
    models::{
        message::{MessageKind, NewMessage},
        password_reset::{
            hash_token, CompleteReset, CreateResetRequest, PasswordReset, PasswordResetView,
            ResetAction, ResetQuery, ResetStatus, ResetStatusResponse, ResetSubmitted, ResetToken,
            ReviewResetRequest,
        },
        user::UserClaims,
    },
    repository::Repository,
};

/// Raw tokens waiting to be collected by the polling client.
///
/// Each token can be taken once; only its hash is ever persisted.
#[derive(Clone, Default)]
pub struct TokenOutbox {
    inner: Arc<Mutex<HashMap<Uuid, (String, DateTime<Utc>)>>>,
}

impl TokenOutbox {
    pub async fn put(&self, request_id: Uuid, token: &ResetToken, now: DateTime<Utc>) {
        let mut map = self.inner.lock().await;
        map.retain(|_, (_, expires)| *expires > now);
        map.insert(request_id, (token.raw.clone(), token.expires_at));
    }

    /// Remove and return the token for `request_id` if it has not expired
    pub async fn take(&self, request_id: Uuid, now: DateTime<Utc>) -> Option<(String, DateTime<Utc>)> {
        let mut map = self.inner.lock().await;
        map.remove(&request_id).filter(|(_, expires)| *expires > now)
    }

    pub async fn discard(&self, request_id: Uuid) {
        self.inner.lock().await.remove(&request_id);
    }
}

/// Answer for a submission that did not create a request
fn unbound_submission() -> ResetSubmitted {
    ResetSubmitted {
        request_id: Uuid::new_v4(),
        status: ResetStatus::Pending,
    }
}

#[derive(Clone)]
pub struct PasswordResetsService {
    repository: Repository,
    email: EmailService,
    messages: MessagesService,
    outbox: TokenOutbox,
    validity_hours: i64,
}

impl PasswordResetsService {
    pub fn new(
        repository: Repository,
        email: EmailService,
        messages: MessagesService,
        validity_hours: i64,
    ) -> Self {
        Self {
            repository,
            email,
            messages,
            outbox: TokenOutbox::default(),
            validity_hours,
        }
    }

    /// File a reset request. The answer is identical whether or not the
    /// account exists.
    ///
    /// The id of a stored request is only ever returned to the caller that
    /// created it: when a request is already pending for the account, the
    /// caller gets an unbound id that keeps polling as `pending`.
    pub async fn submit(&self, data: CreateResetRequest) -> AppResult<ResetSubmitted> {
        let lookup = data.login_or_email.trim();
        let Some(user) = self.repository.users.get_by_login_or_email(lookup).await? else {
            tracing::debug!("password reset requested for unknown account");
            return Ok(unbound_submission());
        };

        if self.repository.password_resets.find_pending_for_user(user.id).await?.is_some() {
            tracing::debug!(user_id = user.id, "password reset already pending");
            return Ok(unbound_submission());
        }

        let reason = data.reason.as_deref().map(str::trim).filter(|r| !r.is_empty());
        let request = match self.repository.password_resets.create(user.id, reason).await {
            Ok(request) => request,
            // Lost a race with a concurrent submission for the same account
            Err(AppError::Conflict(_)) => return Ok(unbound_submission()),
            Err(e) => return Err(e),
        };

        tracing::info!(request_id = %request.id, user_id = user.id, "password reset requested");
        Ok(ResetSubmitted {
            request_id: request.id,
            status: request.status,
        })
    }

    /// Public status poll. The raw token is released on the first poll
    /// after approval and never again.
    pub async fn status(&self, id: Uuid) -> AppResult<ResetStatusResponse> {
        let Some(request) = self.repository.password_resets.get_by_id(id).await? else {
            return Ok(ResetStatusResponse {
                request_id: id,
                status: ResetStatus::Pending,
                reset_token: None,
                token_expires_at: None,
                admin_note: None,
            });
        };

        let now = Utc::now();
        let (reset_token, token_expires_at) = match request.status {
            ResetStatus::Approved => match self.outbox.take(id, now).await {
                Some((raw, expires)) => (Some(raw), Some(expires)),
                None => (None, request.token_expires_at),
            },
            _ => (None, None),
        };

        Ok(ResetStatusResponse {
            request_id: id,
            status: request.status,
            reset_token,
            token_expires_at,
            admin_note: match request.status {
                ResetStatus::Rejected => request.admin_note,
                _ => None,
            },
        })
    }

    pub async fn list(&self, claims: &UserClaims, query: &ResetQuery) -> AppResult<(Vec<PasswordResetView>, i64)> {
        claims.require_admin()?;
        self.repository.password_resets.list(query).await
    }

    /// Approve or reject a pending request
    pub async fn decide(
        &self,
        claims: &UserClaims,
        id: Uuid,
        decision: ReviewResetRequest,
    ) -> AppResult<PasswordReset> {
        claims.require_admin()?;

        let request = self
            .repository
            .password_resets
            .get_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Reset request {} not found", id)))?;

        if request.status != ResetStatus::Pending {
            return Err(AppError::Conflict(format!(
                "Reset request is already {}",
                request.status
            )));
        }

        let now = Utc::now();
        let token = match decision.action {
            ResetAction::Approve => Some(ResetToken::generate(now, self.validity_hours)),
            ResetAction::Reject => None,
        };
        let note = decision.note.as_deref().map(str::trim).filter(|n| !n.is_empty());

        let updated = self
            .repository
            .password_resets
            .decide(id, decision.action.target(), note, claims.user_id, token.as_ref(), now)
            .await?
            .ok_or_else(|| AppError::Conflict("Reset request was already handled".to_string()))?;

        tracing::info!(
            request_id = %id,
            user_id = updated.user_id,
            admin_id = claims.user_id,
            to = %updated.status,
            "password reset request decided"
        );

        let user = self.repository.users.get_by_id(updated.user_id).await?;
        match token {
            Some(token) => {
                self.outbox.put(id, &token, now).await;
                if let Some(ref address) = user.email {
                    if let Err(e) = self
                        .email
                        .send_reset_token(address, &user.login, &token.raw, token.expires_at)
                        .await
                    {
                        tracing::warn!(request_id = %id, error = %e, "failed to email reset token");
                    }
                }
                self.messages
                    .notify(NewMessage::notice(
                        user.id,
                        MessageKind::Reset,
                        "Password reset approved",
                        format!(
                            "Your password reset request was approved. The reset token is valid for {} hours.",
                            self.validity_hours
                        ),
                    ))
                    .await;
            }
            None => {
                let body = match note {
                    Some(note) => format!("Your password reset request was rejected: {}", note),
                    None => "Your password reset request was rejected.".to_string(),
                };
                self.messages
                    .notify(NewMessage::notice(user.id, MessageKind::Reset, "Password reset rejected", body))
                    .await;
            }
        }

        Ok(updated)
    }

    /// Exchange a reset token for a new password
    pub async fn complete(&self, data: CompleteReset) -> AppResult<()> {
        let request = self
            .repository
            .password_resets
            .find_by_token_hash(&hash_token(&data.token))
            .await?
            .ok_or_else(|| AppError::BadRequest("Invalid reset token".to_string()))?;

        let now = Utc::now();
        request.check_token_usable(now)?;

        let password_hash = hash_password(&data.new_password)?;
        self.repository
            .password_resets
            .complete(request.id, request.user_id, &password_hash, now)
            .await?;
        self.outbox.discard(request.id).await;

        tracing::info!(request_id = %request.id, user_id = request.user_id, "password reset completed");

        self.messages
            .notify(NewMessage::notice(
                request.user_id,
                MessageKind::Reset,
                "Password changed",
                "Your password was changed using a reset token.",
            ))
            .await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[tokio::test]
    async fn outbox_hands_token_out_once() {
        let outbox = TokenOutbox::default();
        let now = Utc::now();
        let id = Uuid::new_v4();
        let token = ResetToken::generate(now, 24);

        outbox.put(id, &token, now).await;

        let (raw, expires) = outbox.take(id, now).await.unwrap();
        assert_eq!(raw, token.raw);
        assert_eq!(expires, token.expires_at);
        assert!(outbox.take(id, now).await.is_none());
    }

    #[tokio::test]
    async fn unbound_submissions_never_repeat_an_id() {
        let outbox = TokenOutbox::default();
        let now = Utc::now();
        let first = unbound_submission();
        let second = unbound_submission();
        assert_ne!(first.request_id, second.request_id);
        assert_eq!(second.status, ResetStatus::Pending);

        outbox.put(first.request_id, &ResetToken::generate(now, 24), now).await;
        assert!(outbox.take(second.request_id, now).await.is_none());
    }

    #[tokio::test]
    async fn outbox_drops_expired_tokens() {
        let outbox = TokenOutbox::default();
        let now = Utc::now();
        let id = Uuid::new_v4();
        outbox.put(id, &ResetToken::generate(now, 1), now).await;

        assert!(outbox.take(id, now + Duration::hours(2)).await.is_none());
    }

    #[tokio::test]
    async fn discarded_token_cannot_be_taken() {
        let outbox = TokenOutbox::default();
        let now = Utc::now();
        let id = Uuid::new_v4();
        outbox.put(id, &ResetToken::generate(now, 24), now).await;
        outbox.discard(id).await;
        assert!(outbox.take(id, now).await.is_none());
    }
}
