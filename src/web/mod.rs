//! JSON REST surface over the occupancy manager.

pub mod error;
pub mod handlers;
pub mod models;

use axum::{
    Router,
    http::Method,
    routing::{get, post},
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::occupancy::OccupancyManager;
use handlers::{
    assign_deceased, create_chamber, create_deceased, delete_chamber, delete_deceased,
    find_available_chamber, get_deceased, healthcheck, list_chambers, reconcile_chambers,
    update_chamber, update_deceased,
};

pub use error::{ApiError, ApiResult, ErrorResponse};

#[derive(Clone)]
pub struct AppState {
    pub manager: OccupancyManager,
}

impl AppState {
    pub fn new(manager: OccupancyManager) -> Self {
        Self { manager }
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(healthcheck))
        .route(
            "/chambers",
            post(create_chamber)
                .get(list_chambers)
                .put(update_chamber)
                .delete(delete_chamber),
        )
        .route("/chambers/available", get(find_available_chamber))
        .route("/chambers/reconcile", post(reconcile_chambers))
        .route(
            "/deceased",
            post(create_deceased)
                .get(get_deceased)
                .put(update_deceased)
                .delete(delete_deceased),
        )
        .route("/deceased/assign", post(assign_deceased))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_headers(Any)
                .allow_methods([
                    Method::GET,
                    Method::POST,
                    Method::PUT,
                    Method::DELETE,
                    Method::OPTIONS,
                ]),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
