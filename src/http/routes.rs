//! Router assembly.

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use super::handlers::*;
use super::middleware::admission;
use crate::gate::RequestGate;

/// Build the application router.
///
/// `/health` bypasses admission; every other route is rate limited.
/// `POST /users` is the only admitted route that needs no bearer token.
pub fn create_router(gate: RequestGate) -> Router {
    let api = Router::new()
        .route("/users", post(register_user))
        .route("/profile", get(get_profile).patch(update_profile))
        .route("/groups", get(list_groups).post(create_group))
        .route("/groups/:id", get(get_group))
        .route("/groups/:id/members", get(list_members).post(add_member))
        .route(
            "/groups/:id/destinations",
            get(list_destinations).post(create_destination),
        )
        .route("/groups/:id/votings", get(list_votings).post(create_voting))
        .route("/groups/:id/expenses", get(list_expenses).post(create_expense))
        .route("/votings/:id/votes", post(cast_vote))
        .route_layer(middleware::from_fn_with_state(gate.clone(), admission))
        .with_state(gate);

    Router::new()
        .route("/health", get(health))
        .merge(api)
        .layer(TraceLayer::new_for_http())
}
