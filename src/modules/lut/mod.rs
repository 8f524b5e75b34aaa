use crate::state::AppState;
use axum::Router;
use axum::middleware;
use axum::routing::{get, post};

pub mod dto;
pub mod error;
pub mod handler;
pub mod model;
pub mod parser;
pub mod repository;
pub mod service;

pub fn router(state: AppState) -> axum::Router<AppState> {
    Router::new()
        .route("/", get(handler::list_luts).post(handler::create_lut))
        .route("/validate", post(handler::validate_lut))
        .route("/{id}", get(handler::get_lut).delete(handler::delete_lut))
        .route_layer(middleware::from_fn_with_state(
            state,
            crate::middleware::auth::admin_guard,
        ))
}
