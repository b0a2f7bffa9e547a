//! HTTP surface.
//!
//! Routes live in [`routes`]; every non-health route goes through the
//! admission middleware and then resolves the acting user with [`Actor`].

mod error;
mod extract;
mod handlers;
mod middleware;
mod routes;
mod server;

pub use error::ErrorBody;
pub use extract::Actor;
pub use routes::create_router;
pub use server::HttpServer;
