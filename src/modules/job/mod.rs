use crate::state::AppState;
use axum::Router;
use axum::middleware;
use axum::routing::{get, post};

pub mod dto;
pub mod handler;
pub mod model;
pub mod service;
pub mod store;

pub fn router(state: AppState) -> axum::Router<AppState> {
    let trigger_routes = Router::new()
        .route("/actions/apply-lut", post(handler::apply_lut))
        .route_layer(middleware::from_fn_with_state(
            state,
            crate::middleware::signature::verify_signature,
        ));

    let status_routes = Router::new().route("/jobs/{id}", get(handler::get_job));

    trigger_routes.merge(status_routes)
}
