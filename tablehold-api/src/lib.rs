use axum::{
    http::Method,
    middleware::from_fn_with_state,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod admin;
pub mod bookings;
pub mod conflicts;
pub mod error;
pub mod holds;
pub mod middleware;
pub mod slot_input;
pub mod state;
pub mod sweep;

pub use error::AppError;
pub use state::{AppState, AuthConfig};

pub fn app(state: AppState) -> Router {
    // CORS Middleware
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE, Method::OPTIONS])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
            axum::http::header::USER_AGENT,
        ]);

    let authenticated = Router::new()
        .route("/v1/holds", post(holds::create_hold))
        .route("/v1/holds/{lock_id}", get(holds::get_hold).delete(holds::release_hold))
        .route("/v1/holds/{lock_id}/extend", post(holds::extend_hold))
        .route("/v1/holds/{lock_id}/confirm", post(holds::confirm_hold))
        .route("/v1/conflicts/check", post(conflicts::check_conflicts))
        .route("/v1/bookings", post(bookings::create_booking))
        .route(
            "/v1/bookings/{id}",
            get(bookings::get_booking)
                .patch(bookings::update_booking)
                .delete(bookings::delete_booking),
        )
        .route("/v1/admin/conflicts/resolve", post(admin::resolve_conflict))
        .route_layer(from_fn_with_state(state.clone(), middleware::auth_middleware));

    let internal = Router::new()
        .route("/internal/sweep", post(sweep::run_sweep))
        .route_layer(from_fn_with_state(state.clone(), middleware::sweep_secret_middleware));

    Router::new()
        .route("/health", get(health))
        .merge(authenticated)
        .merge(internal)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(from_fn_with_state(state.clone(), middleware::rate_limit_middleware))
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
