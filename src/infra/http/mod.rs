//! axum router, middleware and handlers.

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod state;

pub use error::ApiError;
pub use middleware::{AuthenticatedUser, RequestContext};
pub use state::{AppState, HealthProbe};

use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware as axum_middleware,
    routing::{get, post},
};

use self::middleware::{log_responses, require_access_token, set_request_context};

/// Assemble the public router. `upload_body_limit` caps request bodies on `/files`.
pub fn build_router(state: AppState, upload_body_limit: usize) -> Router {
    let auth = Router::new()
        .route("/auth/sign-up", post(handlers::sign_up))
        .route("/auth/sign-in", post(handlers::sign_in))
        .route("/auth/refresh", post(handlers::refresh));

    let posts = Router::new()
        .route(
            "/posts",
            get(handlers::list_posts).post(handlers::create_post),
        )
        .route(
            "/posts/{id}",
            get(handlers::get_post)
                .patch(handlers::update_post)
                .delete(handlers::delete_post),
        )
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            require_access_token,
        ));

    let files = Router::new()
        .route("/files", post(handlers::upload_file))
        .layer(DefaultBodyLimit::max(upload_body_limit));

    Router::new()
        .route("/healthz", get(handlers::health))
        .merge(auth)
        .merge(posts)
        .merge(files)
        .with_state(state)
        .layer(axum_middleware::from_fn(log_responses))
        .layer(axum_middleware::from_fn(set_request_context))
}
