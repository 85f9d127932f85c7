use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    api::error,
    modules::message::schema::{MessageEntity, MessageType},
};

#[derive(Debug, Clone)]
pub struct InsertMessage {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub receiver_id: Uuid,
    pub content: Option<String>,
    pub message_type: MessageType,
    pub product_id: Option<Uuid>,
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct MessageLimits {
    pub max_length: usize,
}

/// Message content as submitted by a client, before it is checked.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageDraft {
    #[serde(default)]
    pub message_type: MessageType,
    pub content: Option<String>,
    pub product_id: Option<Uuid>,
    pub image_url: Option<String>,
    /// Optional; when present it must be the other participant.
    pub receiver_id: Option<Uuid>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

impl MessageDraft {
    pub fn text(content: impl Into<String>) -> Self {
        Self { content: Some(content.into()), ..Default::default() }
    }

    /// Checks the draft against the message rules and returns it trimmed.
    pub fn into_valid(self, limits: MessageLimits) -> Result<Self, error::SystemError> {
        let content = non_blank(self.content);
        let image_url = non_blank(self.image_url);

        if let Some(text) = &content {
            if text.chars().count() > limits.max_length {
                return Err(error::SystemError::bad_request(format!(
                    "Message cannot be longer than {} characters",
                    limits.max_length
                )));
            }
        }

        match self.message_type {
            MessageType::Text if content.is_none() => {
                Err(error::SystemError::bad_request("Message cannot be empty"))
            }
            MessageType::Image if image_url.is_none() => {
                Err(error::SystemError::bad_request("Image messages need an image"))
            }
            MessageType::Product if self.product_id.is_none() => {
                Err(error::SystemError::bad_request("Product messages need a product"))
            }
            _ => Ok(Self { content, image_url, ..self }),
        }
    }

    pub fn into_insert(
        self,
        id: Uuid,
        conversation_id: Uuid,
        sender_id: Uuid,
        receiver_id: Uuid,
    ) -> InsertMessage {
        InsertMessage {
            id,
            conversation_id,
            sender_id,
            receiver_id,
            content: self.content,
            message_type: self.message_type,
            product_id: self.product_id,
            image_url: self.image_url,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    /// Absent on first contact; `receiver_id` inside the draft is used instead.
    pub conversation_id: Option<Uuid>,
    #[serde(flatten)]
    pub draft: MessageDraft,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendOutcome {
    pub message: MessageEntity,
    /// False when the message was stored but the conversation's last-message
    /// pointer could not be updated.
    pub conversation_synced: bool,
}

/// Position in a conversation timeline, encoded as `"{created_at}|{id}"`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MessageCursor {
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub id: Uuid,
}

impl MessageCursor {
    pub fn from_message(message: &MessageEntity) -> Self {
        Self { created_at: message.created_at, id: message.id }
    }

    pub fn parse(raw: &str) -> Result<Self, error::SystemError> {
        let invalid = || error::SystemError::bad_request("Invalid cursor format");

        let (created_at, id) = raw.split_once('|').ok_or_else(invalid)?;
        let created_at = chrono::DateTime::parse_from_rfc3339(created_at)
            .map_err(|_| invalid())?
            .with_timezone(&chrono::Utc);
        let id = Uuid::parse_str(id).map_err(|_| invalid())?;

        Ok(Self { created_at, id })
    }

    pub fn encode(&self) -> String {
        format!(
            "{}|{}",
            self.created_at.to_rfc3339_opts(chrono::SecondsFormat::Micros, true),
            self.id
        )
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePage {
    pub messages: Vec<MessageEntity>,
    pub cursor: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    const LIMITS: MessageLimits = MessageLimits { max_length: 10 };

    #[test]
    fn test_text_draft_is_trimmed() {
        let draft = MessageDraft::text("  hello  ").into_valid(LIMITS).unwrap();
        assert_eq!(draft.content.as_deref(), Some("hello"));
    }

    #[test]
    fn test_blank_text_is_rejected() {
        let result = MessageDraft::text("   ").into_valid(LIMITS);
        assert!(matches!(result, Err(error::SystemError::BadRequest(_))));
    }

    #[test]
    fn test_length_is_counted_in_characters() {
        assert!(MessageDraft::text("éééééééééé").into_valid(LIMITS).is_ok());
        assert!(MessageDraft::text("ééééééééééé").into_valid(LIMITS).is_err());
    }

    #[test]
    fn test_image_and_product_need_their_reference() {
        let image = MessageDraft { message_type: MessageType::Image, ..Default::default() };
        assert!(image.into_valid(LIMITS).is_err());

        let image = MessageDraft {
            message_type: MessageType::Image,
            image_url: Some("https://cdn.example/a.png".into()),
            ..Default::default()
        };
        assert!(image.into_valid(LIMITS).is_ok());

        let product = MessageDraft { message_type: MessageType::Product, ..Default::default() };
        assert!(product.into_valid(LIMITS).is_err());

        let product = MessageDraft {
            message_type: MessageType::Product,
            product_id: Some(Uuid::now_v7()),
            ..Default::default()
        };
        assert!(product.into_valid(LIMITS).unwrap().content.is_none());
    }

    #[test]
    fn test_unknown_message_type_is_rejected_at_parse() {
        let parsed = serde_json::from_str::<MessageDraft>(r#"{"messageType":"video","content":"x"}"#);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_send_request_flattens_draft() {
        let request: SendMessageRequest = serde_json::from_str(
            r#"{"receiverId":"0190f5d4-3c1e-7000-8000-000000000002","content":"Is this available?"}"#,
        )
        .unwrap();

        assert!(request.conversation_id.is_none());
        assert_eq!(request.draft.message_type, MessageType::Text);
        assert!(request.draft.receiver_id.is_some());
    }

    #[test]
    fn test_cursor_format() {
        let cursor = MessageCursor {
            created_at: chrono::DateTime::parse_from_rfc3339("2025-01-02T03:04:05.123456Z")
                .unwrap()
                .with_timezone(&chrono::Utc),
            id: Uuid::parse_str("0190f5d4-3c1e-7000-8000-000000000001").unwrap(),
        };

        let encoded = cursor.encode();
        assert_eq!(encoded, "2025-01-02T03:04:05.123456Z|0190f5d4-3c1e-7000-8000-000000000001");
        assert!(!encoded.contains('+'));
        assert_eq!(MessageCursor::parse(&encoded).unwrap(), cursor);
        assert!(MessageCursor::parse("2025-01-02T03:04:05Z").is_err());
        assert!(MessageCursor::parse("yesterday|0190f5d4-3c1e-7000-8000-000000000001").is_err());
    }
}
