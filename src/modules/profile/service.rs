use std::{collections::HashSet, sync::Arc};

use log::{info, warn};
use uuid::Uuid;

use crate::{
    api::error,
    configs::KeyValueCache,
    constants::MAX_PROFILE_BATCH,
    modules::profile::{
        model::PublicProfile, repository::ProfileRepository, schema::ProfileEntity,
    },
    utils::retry::{with_retry, RetryPolicy},
};

#[derive(Debug, Clone, Copy)]
pub struct ProfileConfig {
    pub backend: RetryPolicy,
    /// Policy for waiting on a profile row that signup has not written yet.
    pub ready: RetryPolicy,
    pub cache_ttl: usize,
}

#[derive(Clone)]
pub struct ProfileService<P, K>
where
    P: ProfileRepository + Send + Sync,
    K: KeyValueCache + Send + Sync,
{
    repo: Arc<P>,
    cache: Arc<K>,
    config: ProfileConfig,
}

fn profile_id_key(user_id: &Uuid) -> String {
    format!("profile_id:{user_id}")
}

impl<P, K> ProfileService<P, K>
where
    P: ProfileRepository + Send + Sync,
    K: KeyValueCache + Send + Sync,
{
    pub fn with_dependencies(repo: Arc<P>, cache: Arc<K>, config: ProfileConfig) -> Self {
        info!("ProfileService initialized with dependencies");
        ProfileService { repo, cache, config }
    }

    /// Maps an authenticated identity to its profile id.
    ///
    /// A missing profile row is reported as `ProfileNotReady` once the
    /// readiness policy is exhausted; callers treat it as recoverable.
    pub async fn resolve_profile_id(&self, user_id: Uuid) -> Result<Uuid, error::SystemError> {
        let key = profile_id_key(&user_id);
        match self.cache.get::<Uuid>(&key).await {
            Ok(Some(profile_id)) => return Ok(profile_id),
            Ok(None) => {}
            Err(e) => warn!("Profile cache read failed for {user_id}: {e}"),
        }

        let profile_id =
            with_retry(&self.config.ready, "profile.resolve", || self.lookup_profile_id(user_id))
                .await?;

        if let Err(e) = self.cache.set(&key, &profile_id, self.config.cache_ttl).await {
            warn!("Profile cache write failed for {user_id}: {e}");
        }

        Ok(profile_id)
    }

    async fn lookup_profile_id(&self, user_id: Uuid) -> Result<Uuid, error::SystemError> {
        self.repo
            .find_by_user_id(&user_id)
            .await?
            .map(|profile| profile.id)
            .ok_or(error::SystemError::ProfileNotReady)
    }

    pub async fn get_me(&self, user_id: Uuid) -> Result<ProfileEntity, error::SystemError> {
        let profile_id = self.resolve_profile_id(user_id).await?;
        with_retry(&self.config.backend, "profile.find_by_id", || self.repo.find_by_id(&profile_id))
            .await?
            .ok_or(error::SystemError::ProfileNotReady)
    }

    pub async fn get_public(&self, profile_id: Uuid) -> Result<PublicProfile, error::SystemError> {
        let profile = with_retry(&self.config.backend, "profile.find_by_id", || {
            self.repo.find_by_id(&profile_id)
        })
        .await?
        .ok_or_else(|| error::SystemError::not_found("Profile not found"))?;

        Ok(PublicProfile::from(&profile))
    }

    /// Batched public lookup. Ids that do not exist are left out of the result.
    pub async fn get_public_batch(
        &self,
        ids: &[Uuid],
    ) -> Result<Vec<PublicProfile>, error::SystemError> {
        let mut seen = HashSet::with_capacity(ids.len());
        let unique: Vec<Uuid> =
            ids.iter().copied().filter(|id| seen.insert(*id)).take(MAX_PROFILE_BATCH).collect();

        with_retry(&self.config.backend, "profile.find_public_by_ids", || {
            self.repo.find_public_by_ids(&unique)
        })
        .await
    }

    pub async fn username_available(&self, username: &str) -> Result<bool, error::SystemError> {
        let username = username.trim();
        if username.is_empty() {
            return Err(error::SystemError::bad_request("Username cannot be empty"));
        }

        let exists = with_retry(&self.config.backend, "profile.username_exists", || {
            self.repo.username_exists(username)
        })
        .await?;

        Ok(!exists)
    }
}
