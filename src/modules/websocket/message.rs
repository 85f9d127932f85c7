use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::modules::{
    conversation::model::ConversationView,
    message::{
        model::MessageDraft,
        schema::{MessageEntity, MessageType},
    },
};

/// A message the client wants to send.
///
/// With `conversationId` it goes into that conversation; with only
/// `receiverId` the conversation is found or opened first.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutgoingMessage {
    pub conversation_id: Option<Uuid>,
    pub receiver_id: Option<Uuid>,
    #[serde(default)]
    pub message_type: MessageType,
    pub content: Option<String>,
    pub product_id: Option<Uuid>,
    pub image_url: Option<String>,
}

impl OutgoingMessage {
    pub fn into_parts(self) -> (Option<Uuid>, MessageDraft) {
        let draft = MessageDraft {
            message_type: self.message_type,
            content: self.content,
            product_id: self.product_id,
            image_url: self.image_url,
            receiver_id: self.receiver_id,
        };
        (self.conversation_id, draft)
    }
}

/// Frames sent by the client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientMessage {
    /// Must be the first frame; carries the access token.
    #[serde(rename_all = "camelCase")]
    Auth { token: String },

    /// Opens the live timeline of one conversation.
    #[serde(rename_all = "camelCase")]
    JoinConversation { conversation_id: Uuid },

    #[serde(rename_all = "camelCase")]
    LeaveConversation { conversation_id: Uuid },

    SendMessage(OutgoingMessage),

    #[serde(rename_all = "camelCase")]
    MarkRead { conversation_id: Uuid },

    RefreshConversations,

    Ping,
}

/// Frames sent to the client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerMessage {
    #[serde(rename_all = "camelCase")]
    AuthSuccess { profile_id: Uuid },

    #[serde(rename_all = "camelCase")]
    AuthFailed { reason: String },

    /// Full conversation list, most recent first.
    #[serde(rename_all = "camelCase")]
    ConversationList { conversations: Vec<ConversationView> },

    /// One conversation changed; clients move it to its new position.
    #[serde(rename_all = "camelCase")]
    ConversationUpdated { conversation: ConversationView },

    #[serde(rename_all = "camelCase")]
    ConversationHistory {
        conversation_id: Uuid,
        messages: Vec<MessageEntity>,
        cursor: Option<String>,
    },

    #[serde(rename_all = "camelCase")]
    NewMessage { conversation_id: Uuid, message: MessageEntity },

    #[serde(rename_all = "camelCase")]
    MessageUpdated { conversation_id: Uuid, message: MessageEntity },

    #[serde(rename_all = "camelCase")]
    MessageDeleted { conversation_id: Uuid, message_id: Uuid },

    /// Acknowledges a `sendMessage` frame.
    #[serde(rename_all = "camelCase")]
    MessageSent { message: MessageEntity, conversation_synced: bool },

    #[serde(rename_all = "camelCase")]
    MarkedRead { conversation_id: Uuid, updated: u64 },

    Pong,

    #[serde(rename_all = "camelCase")]
    Error { message: String },
}
