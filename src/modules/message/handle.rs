use actix_web::{post, web, HttpRequest};

use crate::{
    api::{error, success},
    middlewares::get_claims,
    modules::{
        conversation::repository_pg::ConversationRepositoryPg,
        message::{
            model::{SendMessageRequest, SendOutcome},
            repository_pg::MessageRepositoryPg,
            service::MessageService,
        },
        profile::{handle::ProfileSvc, repository_pg::ProfileRepositoryPg},
    },
};

pub type MessageSvc =
    MessageService<ConversationRepositoryPg, ProfileRepositoryPg, MessageRepositoryPg>;

#[post("")]
pub async fn send_message(
    message_svc: web::Data<MessageSvc>,
    profile_svc: web::Data<ProfileSvc>,
    body: web::Json<SendMessageRequest>,
    req: HttpRequest,
) -> Result<success::Success<SendOutcome>, error::Error> {
    let sender_id = profile_svc.resolve_profile_id(get_claims(&req)?.sub).await?;
    let SendMessageRequest { conversation_id, draft } = body.into_inner();

    let outcome = message_svc.send(sender_id, conversation_id, draft).await?;

    Ok(success::Success::created(outcome).message("Message sent"))
}
