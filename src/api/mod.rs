//! HTTP API
//!
//! Client-facing endpoints for hashchain rotation and dice bets.

pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod server;

pub use handlers::AppState;
pub use server::{build_app, ApiServer};
