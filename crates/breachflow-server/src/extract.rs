//! Request context extracted from headers, and the JSON body extractor.
//!
//! Authentication happens upstream. By the time a request reaches this
//! service the gateway has already resolved the caller's tenant and user and
//! forwarded them as `X-Tenant-Id` and `X-Actor-Id`.

use std::str::FromStr;

use axum::{
    Json,
    extract::{FromRequest, FromRequestParts, Request, rejection::JsonRejection},
    http::request::Parts,
};
use breachflow_types::{ActorId, TenantId};

use crate::error::ApiError;

pub const TENANT_HEADER: &str = "x-tenant-id";
pub const ACTOR_HEADER: &str = "x-actor-id";

/// Tenant (always required) and acting user (required for mutations).
#[derive(Debug, Clone, Copy)]
pub struct RequestContext {
    pub tenant_id: TenantId,
    actor_id: Option<ActorId>,
}

impl RequestContext {
    /// The acting user, or 400 when the header was absent.
    pub fn actor(&self) -> Result<ActorId, ApiError> {
        self.actor_id
            .ok_or_else(|| ApiError::BadRequest(format!("missing {ACTOR_HEADER} header")))
    }
}

impl<S: Send + Sync> FromRequestParts<S> for RequestContext {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let tenant_id = header::<TenantId>(parts, TENANT_HEADER)?
            .ok_or_else(|| ApiError::BadRequest(format!("missing {TENANT_HEADER} header")))?;
        let actor_id = header::<ActorId>(parts, ACTOR_HEADER)?;

        Ok(Self {
            tenant_id,
            actor_id,
        })
    }
}

fn header<T>(parts: &Parts, name: &str) -> Result<Option<T>, ApiError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let Some(value) = parts.headers.get(name) else {
        return Ok(None);
    };

    let value = value
        .to_str()
        .map_err(|_| ApiError::BadRequest(format!("{name} header is not valid UTF-8")))?;

    value
        .trim()
        .parse()
        .map(Some)
        .map_err(|e| ApiError::BadRequest(format!("invalid {name} header: {e}")))
}

/// [`Json`] whose rejections render as [`ApiError`] bodies.
#[derive(Debug, Clone, Copy, Default)]
pub struct ApiJson<T>(pub T);

impl<T, S> FromRequest<S> for ApiJson<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        Ok(Self(value))
    }
}
