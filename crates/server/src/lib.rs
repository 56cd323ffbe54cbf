pub mod config;
pub mod error;
pub mod routes;
pub mod state;

use axum::routing::get;
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use state::AppState;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Vanity Stream API",
        version = "0.1.0",
        description = "Streams live progress of vanity address searches run by external workers"
    ),
    paths(
        routes::health_check,
        routes::generate,
        routes::generate_json,
        routes::generate_both,
        routes::generate_both_json,
    ),
    components(schemas(
        routes::HealthResponse,
        routes::GenerateParams,
        events::Position,
    )),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "generate", description = "Vanity address search streams (SSE)"),
    )
)]
pub struct ApiDoc;

pub fn create_router(state: AppState) -> Router {
    let web_dir = state.web_dir().map(|dir| dir.to_path_buf());

    let api_router = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api/openapi.json", ApiDoc::openapi()))
        .route("/health", get(routes::health_check))
        .route(
            "/generate",
            get(routes::generate).post(routes::generate_json),
        )
        .route(
            "/generate-both",
            get(routes::generate_both).post(routes::generate_both_json),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    if let Some(web_dir) = web_dir {
        let index_file = web_dir.join("index.html");
        let serve_dir = ServeDir::new(&web_dir).not_found_service(ServeFile::new(&index_file));
        api_router.fallback_service(serve_dir)
    } else {
        api_router
    }
}
