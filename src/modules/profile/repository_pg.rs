use uuid::Uuid;

use crate::{
    api::error,
    modules::profile::{
        model::PublicProfile, repository::ProfileRepository, schema::ProfileEntity,
    },
};

#[derive(Clone)]
pub struct ProfileRepositoryPg {
    pool: sqlx::PgPool,
}

impl ProfileRepositoryPg {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl ProfileRepository for ProfileRepositoryPg {
    async fn find_by_user_id(
        &self,
        user_id: &Uuid,
    ) -> Result<Option<ProfileEntity>, error::SystemError> {
        let profile =
            sqlx::query_as::<_, ProfileEntity>("SELECT * FROM profiles WHERE user_id = $1")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(profile)
    }

    async fn find_by_id(&self, id: &Uuid) -> Result<Option<ProfileEntity>, error::SystemError> {
        let profile = sqlx::query_as::<_, ProfileEntity>("SELECT * FROM profiles WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(profile)
    }

    async fn find_public_by_ids(
        &self,
        ids: &[Uuid],
    ) -> Result<Vec<PublicProfile>, error::SystemError> {
        if ids.is_empty() {
            return Ok(vec![]);
        }

        let profiles = sqlx::query_as::<_, PublicProfile>(
            r#"
            SELECT id, user_id, username, display_name, avatar_url
            FROM profiles
            WHERE id = ANY($1)
            "#,
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(profiles)
    }

    async fn username_exists(&self, username: &str) -> Result<bool, error::SystemError> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM profiles WHERE lower(username) = lower($1))",
        )
        .bind(username)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }
}
