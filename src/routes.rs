use crate::docs::ApiDoc;
use crate::state::AppState;
use axum::Router;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tower_http::cors::{Any, CorsLayer};

pub fn configure_routes(state: AppState) -> Router<AppState> {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .nest(
            "/api/v1",
            api_routes()
                .merge(crate::modules::job::router(state.clone()))
                .nest("/luts", crate::modules::lut::router(state)),
        )
        .layer(cors)
}

fn api_routes() -> Router<AppState> {
    Router::new().route("/health", axum::routing::get(|| async { "ok" }))
}
