//! Per-request admission.

use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::{field, info_span, Instrument};
use uuid::Uuid;

use crate::gate::RequestGate;
use crate::ratelimit::ClientKey;

/// Rate-limit the client and run the rest of the request inside its span.
///
/// The client key is the peer IP; requests without connection info (in-process
/// callers) share the `unknown` budget.
pub async fn admission(State(gate): State<RequestGate>, request: Request, next: Next) -> Response {
    let key = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| ClientKey::from(*addr))
        .unwrap_or_else(|| ClientKey::new("unknown"));

    let span = info_span!(
        "request",
        request_id = %Uuid::new_v4(),
        client = %key,
        method = %request.method(),
        path = %request.uri().path(),
        user_id = field::Empty,
    );

    async move {
        if let Err(err) = gate.admit(&key) {
            return err.into_response();
        }
        next.run(request).await
    }
    .instrument(span)
    .await
}
