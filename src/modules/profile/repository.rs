use uuid::Uuid;

use crate::{
    api::error,
    modules::profile::{model::PublicProfile, schema::ProfileEntity},
};

#[async_trait::async_trait]
pub trait ProfileRepository {
    async fn find_by_user_id(
        &self,
        user_id: &Uuid,
    ) -> Result<Option<ProfileEntity>, error::SystemError>;

    async fn find_by_id(&self, id: &Uuid) -> Result<Option<ProfileEntity>, error::SystemError>;

    /// Public fields for every id that exists; unknown ids are omitted.
    async fn find_public_by_ids(
        &self,
        ids: &[Uuid],
    ) -> Result<Vec<PublicProfile>, error::SystemError>;

    async fn username_exists(&self, username: &str) -> Result<bool, error::SystemError>;
}
