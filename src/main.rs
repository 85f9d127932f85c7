use actix_cors::Cors;
use actix_web::{
    self, App, HttpServer,
    middleware::{Logger, from_fn},
    web,
};
use std::sync::{Arc, LazyLock};

use crate::{
    configs::{RedisCache, connect_database, run_migrations},
    middlewares::authentication,
    modules::{
        conversation::{repository_pg::ConversationRepositoryPg, service::ConversationService},
        message::{model::MessageLimits, repository_pg::MessageRepositoryPg, service::MessageService},
        profile::{
            repository_pg::ProfileRepositoryPg,
            service::{ProfileConfig, ProfileService},
        },
        realtime::{hub::RealtimeHub, listener},
        websocket::{handler::websocket_handler, session::SessionDeps},
    },
    utils::retry::RetryPolicy,
};

mod api;
mod configs;
mod constants;
mod middlewares;
mod modules;
#[cfg(test)]
mod test;
mod utils;

pub static ENV: LazyLock<constants::Env> = LazyLock::new(|| {
    dotenvy::dotenv().ok();
    configs::init_logging();
    log::info!("Environment variables loaded from .env file");
    constants::Env::default()
});

#[actix_web::get("/")]
async fn health_check() -> &'static str {
    "Server is running"
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    let db_pool =
        connect_database().await.map_err(|_| std::io::Error::other("Database connection error"))?;
    run_migrations(&db_pool).await.map_err(|_| std::io::Error::other("Database migration error"))?;

    let redis_pool =
        RedisCache::new().await.map_err(|_| std::io::Error::other("Redis connection error"))?;

    let profile_repo = Arc::new(ProfileRepositoryPg::new(db_pool.clone()));
    let conversation_repo = Arc::new(ConversationRepositoryPg::new(db_pool.clone()));
    let message_repo = Arc::new(MessageRepositoryPg::new(db_pool.clone()));
    let backend_retry = RetryPolicy::backend(&ENV);

    let profile_service = ProfileService::with_dependencies(
        profile_repo.clone(),
        Arc::new(redis_pool),
        ProfileConfig {
            backend: backend_retry,
            ready: RetryPolicy::profile_ready(&ENV),
            cache_ttl: ENV.profile_cache_ttl,
        },
    );
    let conversation_service = ConversationService::with_dependencies(
        conversation_repo.clone(),
        profile_repo,
        message_repo.clone(),
        backend_retry,
    );
    let message_service = MessageService::with_dependencies(
        conversation_service.clone(),
        conversation_repo,
        message_repo.clone(),
        MessageLimits { max_length: ENV.max_message_length },
        backend_retry,
    );

    let hub = RealtimeHub::new(ENV.realtime_buffer);
    actix_web::rt::spawn(listener::run(db_pool.clone(), hub.clone(), message_repo));

    let session_deps = web::Data::new(SessionDeps {
        profiles: profile_service.clone(),
        conversations: conversation_service.clone(),
        messages: message_service.clone(),
        hub,
    });

    log::info!("Starting server at http://{}:{}", ENV.ip.as_str(), ENV.port);
    HttpServer::new(move || {
        let cors = Cors::default()
            .allowed_origin(&ENV.frontend_url)
            .allow_any_method()
            .allow_any_header()
            .supports_credentials()
            .max_age(3600);

        App::new()
            .wrap(cors)
            .wrap(Logger::default())
            .app_data(web::Data::new(profile_service.clone()))
            .app_data(web::Data::new(conversation_service.clone()))
            .app_data(web::Data::new(message_service.clone()))
            .app_data(session_deps.clone())
            .service(health_check)
            .route("/ws", web::get().to(websocket_handler))
            .service(
                web::scope("/api")
                    .wrap(from_fn(authentication))
                    .configure(modules::profile::route::configure)
                    .configure(modules::conversation::route::configure)
                    .configure(modules::message::route::configure),
            )
    })
    .bind((ENV.ip.as_str(), ENV.port))?
    .workers(2)
    .run()
    .await
}
