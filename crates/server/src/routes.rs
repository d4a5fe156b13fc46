//! Route configuration.

use crate::auth::auth_middleware;
use crate::handlers;
use crate::metrics::metrics_handler;
use crate::state::AppState;
use axum::Router;
use axum::middleware;
use axum::routing::{delete, get, post};
use tower_http::trace::TraceLayer;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/v1/capabilities", get(handlers::get_capabilities))
        .route("/v1/auth/whoami", get(handlers::whoami))
        // Unauthenticated for load balancers and health checkers
        .route("/v1/health", get(handlers::health_check))
        // Documents
        .route(
            "/v1/documents",
            post(handlers::register_document).get(handlers::list_documents),
        )
        .route("/v1/documents/{document_id}", get(handlers::get_document))
        .route(
            "/v1/documents/{document_id}/verify",
            get(handlers::verify_document),
        )
        // Signatures
        .route(
            "/v1/documents/{document_id}/signatures",
            get(handlers::list_signatures),
        )
        .route(
            "/v1/documents/{document_id}/signatures/demo",
            post(handlers::sign_demo),
        )
        .route(
            "/v1/documents/{document_id}/signatures/hsm",
            post(handlers::sign_hsm),
        )
        .route(
            "/v1/documents/{document_id}/signatures/token/prepare",
            post(handlers::prepare_token),
        )
        .route(
            "/v1/documents/{document_id}/signatures/token/complete",
            post(handlers::complete_token),
        )
        .route(
            "/v1/documents/{document_id}/signatures/token/reject",
            post(handlers::reject_token),
        )
        .route("/v1/signatures/{signature_id}", get(handlers::get_signature))
        // Admin endpoints (all require documents:admin)
        .route(
            "/v1/admin/tokens",
            post(handlers::create_token).get(handlers::list_tokens),
        )
        .route(
            "/v1/admin/tokens/{token_id}",
            delete(handlers::revoke_token),
        );

    let mut router = Router::new().merge(api_routes);

    // Exposed only when enabled in config.
    if state.config.server.metrics_enabled {
        router = router.route("/metrics", get(metrics_handler));
    }

    router
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
