use crate::state::AppState;
use axum::Router;

pub mod cookie;
pub mod dto;
pub mod extractors;
pub mod handlers;
mod oauth;
pub mod repo;
pub mod services;

pub fn router() -> Router<AppState> {
    handlers::auth_routes()
}
