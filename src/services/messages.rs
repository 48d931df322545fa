//! Messages and system notifications

use crate::{
    error::AppResult,
    models::message::{Message, MessageKind, MessageQuery, NewMessage, SendMessage},
    repository::Repository,
};

#[derive(Clone)]
pub struct MessagesService {
    repository: Repository,
}

impl MessagesService {
    pub fn new(repository: Repository) -> Self {
        Self { repository }
    }

    pub async fn list(&self, recipient_id: i32, query: &MessageQuery) -> AppResult<(Vec<Message>, i64)> {
        self.repository.messages.list(recipient_id, query).await
    }

    pub async fn unread_count(&self, recipient_id: i32) -> AppResult<i64> {
        self.repository.messages.unread_count(recipient_id).await
    }

    pub async fn mark_read(&self, id: i32, recipient_id: i32) -> AppResult<Message> {
        self.repository.messages.mark_read(id, recipient_id).await
    }

    pub async fn mark_all_read(&self, recipient_id: i32) -> AppResult<u64> {
        self.repository.messages.mark_all_read(recipient_id).await
    }

    pub async fn delete(&self, id: i32, recipient_id: i32) -> AppResult<()> {
        self.repository.messages.delete(id, recipient_id).await
    }

    /// Direct message from a staff member to a user
    pub async fn send(&self, sender_id: i32, message: SendMessage) -> AppResult<Message> {
        // 404 for unknown recipients rather than a foreign key error
        self.repository.users.get_by_id(message.recipient_id).await?;

        let created = self
            .repository
            .messages
            .create(&NewMessage {
                recipient_id: message.recipient_id,
                sender_id: Some(sender_id),
                kind: MessageKind::Direct,
                subject: message.subject.trim().to_string(),
                body: message.body,
            })
            .await?;

        tracing::info!(message_id = created.id, sender_id, recipient_id = created.recipient_id, "direct message sent");
        Ok(created)
    }

    /// Store a system notification. Failures are logged, never propagated:
    /// the state change that triggered the notice has already happened.
    pub async fn notify(&self, message: NewMessage) {
        if let Err(e) = self.repository.messages.create(&message).await {
            tracing::warn!(
                recipient_id = message.recipient_id,
                kind = %message.kind,
                error = %e,
                "failed to store notification"
            );
        }
    }
}
