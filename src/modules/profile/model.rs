use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;
use uuid::Uuid;
use validator::Validate;

use crate::constants::UNKNOWN_USER_NAME;
use crate::modules::profile::schema::ProfileEntity;

/// Fields of a profile that any signed-in user may see.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicProfile {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub username: String,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
}

impl PublicProfile {
    /// Stand-in for a participant whose profile could not be loaded.
    pub fn unknown(id: Uuid) -> Self {
        Self {
            id,
            user_id: None,
            username: UNKNOWN_USER_NAME.to_string(),
            display_name: Some(UNKNOWN_USER_NAME.to_string()),
            avatar_url: None,
        }
    }

    pub fn is_placeholder(&self) -> bool {
        self.user_id.is_none()
    }
}

impl From<&ProfileEntity> for PublicProfile {
    fn from(entity: &ProfileEntity) -> Self {
        Self {
            id: entity.id,
            user_id: Some(entity.user_id),
            username: entity.username.clone(),
            display_name: entity.display_name.clone(),
            avatar_url: entity.avatar_url.clone(),
        }
    }
}

#[derive(Deserialize, Validate)]
pub struct BatchProfilesRequest {
    #[validate(length(min = 1, max = 100, message = "Between 1 and 100 ids are allowed"))]
    pub ids: Vec<Uuid>,
}

#[derive(Deserialize, Validate)]
pub struct UsernameQuery {
    #[validate(length(min = 3, max = 30, message = "Username must be 3 to 30 characters long"))]
    pub username: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsernameAvailability {
    pub username: String,
    pub available: bool,
}
