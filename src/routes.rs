// src/routes.rs

use axum::{
    Router,
    http::{HeaderValue, Method, header},
    middleware,
    routing::{delete, get, post},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    handlers::{admin, session},
    state::AppState,
    utils::jwt::{admin_middleware, auth_middleware},
};

/// Assembles the main application router.
///
/// * Exam-taker routes under `/api/assignments` need a valid token.
/// * Authoring and reporting under `/api/admin` need the admin role as well.
pub fn create_router(state: AppState) -> Router {
    let origins = [
        HeaderValue::from_static("http://localhost:3000"),
        HeaderValue::from_static("http://127.0.0.1:3000"),
    ];

    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    let session_routes = Router::new()
        .route("/{assignment_id}/modules", get(session::list_modules))
        .route(
            "/{assignment_id}/modules/{group_member_id}",
            get(session::module_state),
        )
        .route(
            "/{assignment_id}/modules/{group_member_id}/start",
            post(session::start_module),
        )
        .route(
            "/{assignment_id}/modules/{group_member_id}/responses",
            post(session::submit_response),
        )
        .route(
            "/{assignment_id}/modules/{group_member_id}/complete",
            post(session::complete_module),
        )
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    let admin_routes = Router::new()
        .route(
            "/modules/{module_id}/versions",
            post(admin::publish_module_version),
        )
        .route("/module-versions/{id}", get(admin::get_module_version))
        .route("/groups", post(admin::create_group))
        .route("/assignments", post(admin::create_assignment))
        .route("/assignments/{id}", delete(admin::delete_assignment))
        .route(
            "/assignments/{id}/exam-takers/{exam_taker_id}",
            get(admin::progress_report),
        )
        // Auth first, then the role check
        .layer(middleware::from_fn(admin_middleware))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .nest("/api/assignments", session_routes)
        .nest("/api/admin", admin_routes)
        // Same order as before: CORS outermost, trace inside it
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
