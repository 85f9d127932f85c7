use actix_web::{get, post, web, HttpRequest};
use uuid::Uuid;

use crate::{
    api::{error, success},
    configs::RedisCache,
    middlewares::get_claims,
    modules::profile::{
        model::{BatchProfilesRequest, PublicProfile, UsernameAvailability, UsernameQuery},
        repository_pg::ProfileRepositoryPg,
        schema::ProfileEntity,
        service::ProfileService,
    },
    utils::{ValidatedJson, ValidatedQuery},
};

pub type ProfileSvc = ProfileService<ProfileRepositoryPg, RedisCache>;

#[get("/me")]
pub async fn get_me(
    profile_service: web::Data<ProfileSvc>,
    req: HttpRequest,
) -> Result<success::Success<ProfileEntity>, error::Error> {
    let user_id = get_claims(&req)?.sub;
    let profile = profile_service.get_me(user_id).await?;
    Ok(success::Success::ok(profile).message("Profile retrieved successfully"))
}

#[get("/availability")]
pub async fn username_availability(
    profile_service: web::Data<ProfileSvc>,
    query: ValidatedQuery<UsernameQuery>,
) -> Result<success::Success<UsernameAvailability>, error::Error> {
    let username = query.0.username;
    let available = profile_service.username_available(&username).await?;
    Ok(success::Success::ok(UsernameAvailability { username, available }))
}

#[post("/batch")]
pub async fn get_profiles_batch(
    profile_service: web::Data<ProfileSvc>,
    body: ValidatedJson<BatchProfilesRequest>,
) -> Result<success::Success<Vec<PublicProfile>>, error::Error> {
    let profiles = profile_service.get_public_batch(&body.0.ids).await?;
    Ok(success::Success::ok(profiles))
}

#[get("/{id:[0-9a-fA-F-]{36}}")]
pub async fn get_profile(
    profile_service: web::Data<ProfileSvc>,
    profile_id: web::Path<Uuid>,
) -> Result<success::Success<PublicProfile>, error::Error> {
    let profile = profile_service.get_public(profile_id.into_inner()).await?;
    Ok(success::Success::ok(profile).message("Profile retrieved successfully"))
}
