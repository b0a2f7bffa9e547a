//! Request extractors.

use async_trait::async_trait;
use axum::{extract::FromRequestParts, http::header::AUTHORIZATION, http::request::Parts};

use crate::error::TripError;
use crate::gate::RequestGate;
use crate::model::UserId;

/// The authenticated user a request acts as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor(pub UserId);

#[async_trait]
impl FromRequestParts<RequestGate> for Actor {
    type Rejection = TripError;

    async fn from_request_parts(
        parts: &mut Parts,
        gate: &RequestGate,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .map(|value| {
                value
                    .to_str()
                    .map_err(|_| TripError::Unauthenticated("invalid authorization header".into()))
            })
            .transpose()?;

        let user_id = gate.authenticate(header)?;
        tracing::Span::current().record("user_id", user_id);
        Ok(Actor(user_id))
    }
}
