use serde::{Deserialize, Serialize};
use sqlx::prelude::{FromRow, Type};
use uuid::Uuid;

#[derive(Debug, PartialEq, Eq, Clone, Copy, Default, Type, Serialize, Deserialize)]
#[sqlx(type_name = "message_type", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    #[default]
    Text,
    Image,
    Product,
}

#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageEntity {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub receiver_id: Uuid,
    pub content: Option<String>,
    pub message_type: MessageType,
    pub product_id: Option<Uuid>,
    pub image_url: Option<String>,
    pub read_at: Option<chrono::DateTime<chrono::Utc>>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl MessageEntity {
    /// Timeline order: creation time, then id for messages created in the same instant.
    pub fn order_key(&self) -> (chrono::DateTime<chrono::Utc>, Uuid) {
        (self.created_at, self.id)
    }

    pub fn involves(&self, profile_id: &Uuid) -> bool {
        self.sender_id == *profile_id || self.receiver_id == *profile_id
    }
}
