use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationEntity {
    pub id: Uuid,
    pub participant_1: Uuid,
    pub participant_2: Uuid,
    pub last_message_id: Option<Uuid>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl ConversationEntity {
    pub fn has_participant(&self, profile_id: &Uuid) -> bool {
        self.participant_1 == *profile_id || self.participant_2 == *profile_id
    }

    /// The participant that is not `profile_id`, or `None` for outsiders.
    pub fn other_participant(&self, profile_id: &Uuid) -> Option<Uuid> {
        if self.participant_1 == *profile_id {
            Some(self.participant_2)
        } else if self.participant_2 == *profile_id {
            Some(self.participant_1)
        } else {
            None
        }
    }

    pub fn pair_key(&self) -> PairKey {
        PairKey::new(self.participant_1, self.participant_2)
    }
}

/// Unordered participant pair in canonical `(low, high)` form.
///
/// Mirrors the `(LEAST, GREATEST)` unique index on `conversations`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PairKey {
    pub low: Uuid,
    pub high: Uuid,
}

impl PairKey {
    pub fn new(a: Uuid, b: Uuid) -> Self {
        if a <= b {
            Self { low: a, high: b }
        } else {
            Self { low: b, high: a }
        }
    }
}
