use actix_web::{http::StatusCode, HttpResponse};
use std::borrow::Cow;

/// JSON envelope of every successful `/api` response: `{data, message}`.
#[derive(serde::Serialize)]
pub struct Envelope<T: serde::Serialize> {
    pub data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<Cow<'static, str>>,
}

pub struct Success<T: serde::Serialize> {
    pub status: StatusCode,
    pub body: Envelope<T>,
}

impl<T: serde::Serialize> Success<T> {
    pub fn ok(data: T) -> Self {
        Self { status: StatusCode::OK, body: Envelope { data, message: None } }
    }

    pub fn created(data: T) -> Self {
        Self { status: StatusCode::CREATED, body: Envelope { data, message: None } }
    }

    pub fn message(mut self, msg: impl Into<Cow<'static, str>>) -> Self {
        self.body.message = Some(msg.into());
        self
    }
}

impl<T: serde::Serialize> actix_web::Responder for Success<T> {
    type Body = actix_web::body::BoxBody;

    fn respond_to(self, _req: &actix_web::HttpRequest) -> HttpResponse<Self::Body> {
        HttpResponse::build(self.status).json(self.body)
    }
}
