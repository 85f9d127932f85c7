use serde::Deserialize;
use uuid::Uuid;

use crate::{api::error, modules::message::schema::MessageEntity};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeOp {
    Insert,
    Update,
    Delete,
}

/// Payload published by the `messages` row trigger.
#[derive(Debug, Clone, Deserialize)]
pub struct ChangeNotification {
    pub op: ChangeOp,
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub receiver_id: Uuid,
}

impl ChangeNotification {
    pub fn parse(payload: &str) -> Result<Self, error::SystemError> {
        Ok(serde_json::from_str(payload)?)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeletedMessage {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub receiver_id: Uuid,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MessageChange {
    Inserted(MessageEntity),
    Updated(MessageEntity),
    Deleted(DeletedMessage),
}

impl MessageChange {
    pub fn conversation_id(&self) -> Uuid {
        match self {
            MessageChange::Inserted(m) | MessageChange::Updated(m) => m.conversation_id,
            MessageChange::Deleted(d) => d.conversation_id,
        }
    }

    pub fn message_id(&self) -> Uuid {
        match self {
            MessageChange::Inserted(m) | MessageChange::Updated(m) => m.id,
            MessageChange::Deleted(d) => d.id,
        }
    }

    /// True when `profile_id` sent or received the message.
    pub fn involves(&self, profile_id: &Uuid) -> bool {
        match self {
            MessageChange::Inserted(m) | MessageChange::Updated(m) => m.involves(profile_id),
            MessageChange::Deleted(d) => d.sender_id == *profile_id || d.receiver_id == *profile_id,
        }
    }
}

/// A change stamped with its position in the feed.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    pub seq: u64,
    pub change: MessageChange,
}

#[derive(Debug, Clone, PartialEq)]
pub enum HubEvent {
    Change(ChangeEvent),
    /// The upstream feed was interrupted; changes may have been missed.
    Gap,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_trigger_payload() {
        let payload = r#"{"op":"INSERT","id":"0190f5d4-3c1e-7000-8000-000000000001","conversation_id":"0190f5d4-3c1e-7000-8000-000000000002","sender_id":"0190f5d4-3c1e-7000-8000-000000000003","receiver_id":"0190f5d4-3c1e-7000-8000-000000000004"}"#;

        let notification = ChangeNotification::parse(payload).unwrap();
        assert_eq!(notification.op, ChangeOp::Insert);
        assert_eq!(notification.id.to_string(), "0190f5d4-3c1e-7000-8000-000000000001");
    }

    #[test]
    fn test_parse_rejects_unknown_op() {
        let payload = r#"{"op":"TRUNCATE","id":"0190f5d4-3c1e-7000-8000-000000000001","conversation_id":"0190f5d4-3c1e-7000-8000-000000000002","sender_id":"0190f5d4-3c1e-7000-8000-000000000003","receiver_id":"0190f5d4-3c1e-7000-8000-000000000004"}"#;
        assert!(matches!(
            ChangeNotification::parse(payload),
            Err(error::SystemError::JsonError(_))
        ));
    }

    #[test]
    fn test_deleted_change_involvement() {
        let sender = Uuid::now_v7();
        let change = MessageChange::Deleted(DeletedMessage {
            id: Uuid::now_v7(),
            conversation_id: Uuid::now_v7(),
            sender_id: sender,
            receiver_id: Uuid::now_v7(),
        });

        assert!(change.involves(&sender));
        assert!(!change.involves(&Uuid::now_v7()));
    }
}
