use actix_web::{get, post, web, HttpRequest};
use uuid::Uuid;

use crate::{
    api::{error, success},
    middlewares::get_claims,
    modules::{
        conversation::{
            model::{ConversationView, MarkReadResponse, MessagesQuery, NewConversationRequest},
            repository_pg::ConversationRepositoryPg,
            schema::ConversationEntity,
            service::ConversationService,
        },
        message::{model::MessagePage, repository_pg::MessageRepositoryPg},
        profile::{handle::ProfileSvc, repository_pg::ProfileRepositoryPg},
    },
    utils::ValidatedQuery,
};

pub type ConversationSvc =
    ConversationService<ConversationRepositoryPg, ProfileRepositoryPg, MessageRepositoryPg>;

#[get("")]
pub async fn get_conversations(
    conversation_svc: web::Data<ConversationSvc>,
    profile_svc: web::Data<ProfileSvc>,
    req: HttpRequest,
) -> Result<success::Success<Vec<ConversationView>>, error::Error> {
    let profile_id = profile_svc.resolve_profile_id(get_claims(&req)?.sub).await?;

    let conversations = conversation_svc.list_conversations(profile_id).await?;

    Ok(success::Success::ok(conversations).message("Successfully retrieved conversations"))
}

#[post("")]
pub async fn create_conversation(
    conversation_svc: web::Data<ConversationSvc>,
    profile_svc: web::Data<ProfileSvc>,
    body: web::Json<NewConversationRequest>,
    req: HttpRequest,
) -> Result<success::Success<ConversationEntity>, error::Error> {
    let profile_id = profile_svc.resolve_profile_id(get_claims(&req)?.sub).await?;

    let conversation =
        conversation_svc.get_or_create_conversation(profile_id, body.other_profile_id).await?;

    Ok(success::Success::ok(conversation).message("Conversation ready"))
}

#[get("/{conversation_id}/messages")]
pub async fn get_messages(
    conversation_svc: web::Data<ConversationSvc>,
    profile_svc: web::Data<ProfileSvc>,
    conversation_id: web::Path<Uuid>,
    query: ValidatedQuery<MessagesQuery>,
    req: HttpRequest,
) -> Result<success::Success<MessagePage>, error::Error> {
    let profile_id = profile_svc.resolve_profile_id(get_claims(&req)?.sub).await?;
    let query = query.0;

    let page = conversation_svc
        .get_messages(*conversation_id, profile_id, query.limit, query.cursor.as_deref())
        .await?;

    Ok(success::Success::ok(page).message("Successfully retrieved messages"))
}

#[post("/{conversation_id}/read")]
pub async fn mark_read(
    conversation_svc: web::Data<ConversationSvc>,
    profile_svc: web::Data<ProfileSvc>,
    conversation_id: web::Path<Uuid>,
    req: HttpRequest,
) -> Result<success::Success<MarkReadResponse>, error::Error> {
    let profile_id = profile_svc.resolve_profile_id(get_claims(&req)?.sub).await?;

    let updated = conversation_svc.mark_read(*conversation_id, profile_id).await?;

    Ok(success::Success::ok(MarkReadResponse { updated }))
}
