use axum::http::{header, HeaderValue, Method};
use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post, put},
    Router,
};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::{auth::AuthenticatedUser, state::AppState};

pub mod admins;
pub mod documents;
pub mod health;
pub mod students;

pub fn create_router(state: AppState) -> Router<()> {
    let cors = cors_layer(state.config.cors_allowed_origin.as_deref());
    let body_limit = state.config.upload_max_bytes;

    let documents_routes = Router::new()
        .route(
            "/",
            get(documents::list_documents).post(documents::upload_document),
        )
        .route("/upload", post(documents::upload_document))
        .route("/user", get(documents::list_user_documents))
        .route("/college", get(documents::list_college_documents))
        .route(
            "/:id",
            get(documents::get_document).delete(documents::delete_document),
        )
        .route("/:id/status", put(documents::update_document_status));

    let students_routes = Router::new()
        .route("/", post(students::register_student))
        .route("/:id", get(students::get_student))
        .route("/:id/send-status-email", post(students::send_status_email));

    let admins_routes = Router::new()
        .route("/", post(admins::register_admin))
        .route("/students", get(admins::list_students))
        .route("/student/:id", get(admins::get_student))
        .route(
            "/documents/:id/status",
            put(documents::update_document_status),
        )
        .route("/:id", get(admins::get_admin))
        .route("/:id/documents", get(admins::list_student_documents));

    let protected_state = state.clone();
    let protected_routes = Router::new()
        .nest("/api/documents", documents_routes)
        .nest("/api/students", students_routes)
        .nest("/api/admins", admins_routes)
        .layer(middleware::from_extractor_with_state::<AuthenticatedUser, _>(protected_state));

    Router::new()
        .merge(protected_routes)
        .route("/api/health", get(health::health_check))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(DefaultBodyLimit::max(body_limit))
}

fn cors_layer(allowed_origins: Option<&str>) -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    let Some(origins) = allowed_origins else {
        return base.allow_origin(AllowOrigin::mirror_request());
    };

    let headers: Vec<HeaderValue> = origins
        .split(',')
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .filter_map(|value| match value.parse::<HeaderValue>() {
            Ok(header) => Some(header),
            Err(_) => {
                tracing::warn!(origin = %value, "ignoring invalid CORS allowed origin");
                None
            }
        })
        .collect();

    base.allow_origin(AllowOrigin::list(headers))
}
