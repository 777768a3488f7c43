//! Caller identity.
//!
//! Authentication happens upstream. The proxy in front of this server passes the authenticated user in the
//! `x-actor-id` header, and marks administrators with `x-actor-role: admin`. The system role is reserved for the
//! engine itself and can never be claimed by a request.
use actix_web::{dev::Payload, http::header::HeaderMap, FromRequest, HttpRequest};
use futures::future::{ready, Ready};
use log::*;
use settlement_engine::order_objects::{Actor, Role};

use crate::errors::ServerError;

pub const ACTOR_ID_HEADER: &str = "x-actor-id";
pub const ACTOR_ROLE_HEADER: &str = "x-actor-role";

/// The [`Actor`] making the request, extracted from the request headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller(pub Actor);

impl Caller {
    pub fn actor(&self) -> &Actor {
        &self.0
    }

    pub fn into_inner(self) -> Actor {
        self.0
    }
}

impl FromRequest for Caller {
    type Error = ServerError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(actor_from_headers(req.headers()).map(Caller))
    }
}

pub fn actor_from_headers(headers: &HeaderMap) -> Result<Actor, ServerError> {
    let id = headers
        .get(ACTOR_ID_HEADER)
        .ok_or(ServerError::MissingIdentity)?
        .to_str()
        .map_err(|e| ServerError::InvalidRequestHeader(format!("{ACTOR_ID_HEADER} is not valid text. {e}")))?
        .trim();
    if id.is_empty() {
        return Err(ServerError::MissingIdentity);
    }
    let role = role_from_headers(headers)?;
    match role {
        Role::Admin => Ok(Actor::admin(id)),
        _ => Ok(Actor::user(id)),
    }
}

/// The role claimed in the request headers. Requests without a role header are ordinary users.
pub fn role_from_headers(headers: &HeaderMap) -> Result<Role, ServerError> {
    let role = match headers.get(ACTOR_ROLE_HEADER) {
        None => return Ok(Role::User),
        Some(v) => v
            .to_str()
            .map_err(|e| ServerError::InvalidRequestHeader(format!("{ACTOR_ROLE_HEADER} is not valid text. {e}")))?,
    };
    match role.trim().to_ascii_lowercase().as_str() {
        "" | "user" => Ok(Role::User),
        "admin" => Ok(Role::Admin),
        other => {
            warn!("💻️ Rejecting a request that claims the '{other}' role");
            Err(ServerError::InvalidRequestHeader(format!("'{other}' is not a role that can be claimed")))
        },
    }
}
