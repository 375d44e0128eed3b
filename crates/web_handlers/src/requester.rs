use std::future::{Ready, ready};

use actix_web::{Error, HttpRequest, dev::Payload, http::header};

/// Bearer token of the caller, passed through unchanged to the persistence API
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequesterToken(pub String);

impl RequesterToken {
    /// The raw token
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl actix_web::FromRequest for RequesterToken {
    type Error = Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        let token = req
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|token| !token.is_empty());

        ready(match token {
            Some(token) => Ok(RequesterToken(token.to_string())),
            None => Err(actix_web::error::ErrorUnauthorized(
                "Missing or invalid authorization header",
            )),
        })
    }
}
