//! Axum extractors for the token-gated registry surface.

use axum::extract::FromRequestParts;
use axum::http::header;
use axum::http::request::Parts;

use crate::http::HttpError;
use crate::token::Claims;

/// The raw token out of `Authorization: Bearer …`.
///
/// Missing or malformed header → 401 unauthenticated; signature and expiry
/// checks happen in the middleware holding the signer.
#[derive(Clone)]
pub struct Bearer(pub String);

impl<S> FromRequestParts<S> for Bearer
where
    S: Send + Sync,
{
    type Rejection = HttpError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let value = parts
            .headers
            .get(header::AUTHORIZATION)
            .ok_or_else(|| HttpError::unauthorized().msg("missing authorization header"))?;

        let value = value
            .to_str()
            .map_err(|_| HttpError::unauthorized().msg("authorization header is not valid UTF-8"))?;

        let token = value
            .strip_prefix("Bearer ")
            .ok_or_else(|| HttpError::unauthorized().msg("authorization scheme must be Bearer"))?;

        Ok(Self(token.to_owned()))
    }
}

/// Verified claims inserted by the registry's auth middleware.
#[derive(Clone)]
pub struct AccessClaims(pub Claims);

impl<S> FromRequestParts<S> for AccessClaims
where
    S: Send + Sync,
{
    type Rejection = HttpError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Claims>()
            .cloned()
            .map(Self)
            .ok_or_else(|| HttpError::internal().msg("auth middleware did not run"))
    }
}
