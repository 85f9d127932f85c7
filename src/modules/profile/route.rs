use crate::modules::profile::handle::*;
use actix_web::web::{scope, ServiceConfig};

pub fn configure(cfg: &mut ServiceConfig) {
    cfg.service(
        scope("/profiles")
            .service(get_me)
            .service(username_availability)
            .service(get_profiles_batch)
            .service(get_profile),
    );
}
