mod handlers;
mod middleware;
mod response;
mod state;

pub use response::ApiSuccess;
pub use state::HttpState;

use axum::{Router, http::HeaderValue, middleware as axum_middleware, routing::get};
use tower_http::cors::CorsLayer;

use crate::config::ServerSettings;
use crate::infra::error::InfraError;

use self::middleware::{log_error_responses, set_request_context};

fn api_routes() -> Router<HttpState> {
    Router::new()
        .route("/", get(handlers::index))
        .route("/meta/legend", get(handlers::legend))
        .route("/canteens", get(handlers::list_canteens))
        .route("/canteens/{canteen_id}", get(handlers::get_canteen))
        .route("/canteens/{canteen_id}/lines", get(handlers::list_lines))
        .route(
            "/canteens/{canteen_id}/lines/{line_id}",
            get(handlers::get_line),
        )
        .route("/plans", get(handlers::list_plans))
        .route("/plans/{date}", get(handlers::get_plan))
}

/// Build the API router mounted under `server.base`, with CORS when configured.
pub fn build_router(state: HttpState, server: &ServerSettings) -> Result<Router, InfraError> {
    let routes = if server.base == "/" {
        api_routes()
    } else {
        Router::new().nest(&server.base, api_routes())
    };

    let mut router = routes
        .fallback(handlers::route_not_found)
        .with_state(state)
        .layer(axum_middleware::from_fn(log_error_responses))
        .layer(axum_middleware::from_fn(set_request_context));

    if let Some(origin) = server.cors_allow_origin.as_deref() {
        let origin = HeaderValue::from_str(origin).map_err(|err| {
            InfraError::configuration(format!("invalid CORS origin `{origin}`: {err}"))
        })?;
        router = router.layer(CorsLayer::new().allow_origin(origin));
    }

    Ok(router)
}
