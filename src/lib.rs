//! trainhub: trainees submit assignments, trainers grade them, and a Google
//! spreadsheet keeps the records.

pub mod config;
pub mod db;
pub mod error;
pub mod routes;
pub mod session;
pub mod sheets;
pub mod state;
pub mod templates;
pub mod uploads;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub use config::Config;
pub use error::{AppError, SheetError};
pub use state::AppState;

pub fn build_router(state: AppState) -> Router {
    templates::init(&state.config.template_dir);
    let max_upload_bytes = state.config.max_upload_bytes;

    Router::new()
        .route("/", get(routes::index))
        .route("/login", post(routes::login))
        .route("/register", post(routes::register))
        .route("/logout", post(routes::logout))
        .route("/submissions", post(routes::submit))
        .route("/grade", post(routes::grade))
        .route("/trainee-files", post(routes::upload_for_trainee))
        .route("/resources", post(routes::add_resource))
        .route("/resources/delete", post(routes::delete_resource))
        .route("/attendance", post(routes::save_attendance))
        .route("/profile", post(routes::update_profile))
        .route("/api/submissions/:submission_id", get(routes::submission_status))
        .route("/healthz", get(routes::healthz))
        .nest_service("/static", tower_http::services::ServeDir::new("static"))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(state))
}
