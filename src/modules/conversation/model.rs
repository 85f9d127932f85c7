use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;
use uuid::Uuid;
use validator::Validate;

use crate::modules::{
    conversation::schema::ConversationEntity,
    message::schema::{MessageEntity, MessageType},
    profile::model::PublicProfile,
};

/// A conversation joined with its actual latest message and the caller's unread count.
#[derive(Debug, Clone, FromRow)]
pub struct ConversationRow {
    #[sqlx(flatten)]
    pub conversation: ConversationEntity,
    pub latest_message_id: Option<Uuid>,
    pub latest_content: Option<String>,
    pub latest_type: Option<MessageType>,
    pub latest_sender_id: Option<Uuid>,
    pub latest_created_at: Option<chrono::DateTime<chrono::Utc>>,
    pub unread_count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LastMessageSnippet {
    pub id: Uuid,
    pub content: Option<String>,
    pub message_type: MessageType,
    pub sender_id: Uuid,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl From<&MessageEntity> for LastMessageSnippet {
    fn from(message: &MessageEntity) -> Self {
        Self {
            id: message.id,
            content: message.content.clone(),
            message_type: message.message_type,
            sender_id: message.sender_id,
            created_at: message.created_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationView {
    pub id: Uuid,
    pub other_participant: PublicProfile,
    pub last_message: Option<LastMessageSnippet>,
    pub unread_count: i64,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
    /// Set when the stored last-message pointer lags the real latest message.
    pub stale: bool,
}

impl ConversationRow {
    pub fn latest_snippet(&self) -> Option<LastMessageSnippet> {
        match (self.latest_message_id, self.latest_type, self.latest_sender_id, self.latest_created_at)
        {
            (Some(id), Some(message_type), Some(sender_id), Some(created_at)) => {
                Some(LastMessageSnippet {
                    id,
                    content: self.latest_content.clone(),
                    message_type,
                    sender_id,
                    created_at,
                })
            }
            _ => None,
        }
    }

    /// Builds the list entry. Snippet and recency come from the real latest
    /// message, so a send whose pointer update failed still sorts correctly.
    pub fn into_view(self, other_participant: PublicProfile) -> ConversationView {
        let last_message = self.latest_snippet();
        let stale = self.conversation.last_message_id != self.latest_message_id;
        let updated_at = match &last_message {
            Some(snippet) => self.conversation.updated_at.max(snippet.created_at),
            None => self.conversation.updated_at,
        };

        ConversationView {
            id: self.conversation.id,
            other_participant,
            last_message,
            unread_count: self.unread_count,
            created_at: self.conversation.created_at,
            updated_at,
            stale,
        }
    }
}

/// Most recently active first; ties broken by id, descending.
pub fn sort_by_recency(views: &mut [ConversationView]) {
    views.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then_with(|| b.id.cmp(&a.id)));
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewConversationRequest {
    pub other_profile_id: Uuid,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct MessagesQuery {
    #[validate(range(min = 1, max = 200, message = "Limit must be between 1 and 200"))]
    pub limit: Option<i64>,
    pub cursor: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkReadResponse {
    pub updated: u64,
}
