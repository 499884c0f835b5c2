//! # Enroll HTTP API Module
//!
//! This module implements the HTTP surface using axum.
//!
//! ## Endpoints
//!
//! - `POST /interaction` - Handle one inbound chat interaction
//! - `POST /tick` - Run one scheduler round on demand
//! - `GET /status` - Engine record counts
//! - `GET /health` - Health check
//! - `GET|PUT /records/branches` (and `fields`, `messages`, `menu-keys`,
//!   `notifications`, `groups`, `settings`) - Record access for the
//!   external admin tool
//!
//! ## Security Configuration (Environment Variables)
//!
//! - `ENROLL_CORS_ORIGINS`: Comma-separated list of allowed origins, or "*" for all (default: localhost only)
//! - `ENROLL_RATE_LIMIT`: Requests per second (default: 100, 0 to disable)
//! - `ENROLL_API_KEY`: If set, requires Bearer token authentication

mod guard;
mod handlers;
mod types;

// Re-exports for external use
pub use guard::{create_rate_limiter, get_api_key_from_env, get_rate_limit_from_env};
// Re-export handlers and types for integration tests (via `enroll::api::*`)
#[allow(unused_imports)]
pub use handlers::{
    get_settings_handler, health_handler, interaction_handler, list_branches_handler, list_fields_handler,
    list_groups_handler, list_menu_keys_handler, list_messages_handler,
    list_notifications_handler, put_branch_handler, put_field_handler, put_group_handler,
    put_menu_key_handler, put_message_handler, put_notification_handler, put_settings_handler,
    status_handler, tick_handler,
};
#[allow(unused_imports)]
pub use types::{
    EventBody, HealthResponse, InteractionRequest, InteractionResponse, SaveResponse,
    StatusResponse, TickResponse,
};

use crate::runtime::{DirBlobs, Transport};
use axum::{
    Router,
    http::{HeaderValue, Method, header},
    middleware as axum_middleware,
    routing::{get, post},
};
use enroll_core::{EnrollError, RedbStore};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

// =============================================================================
// SERVER STATE
// =============================================================================

/// Shared server state: the store, the transport and the blob root.
#[derive(Clone)]
pub struct AppState {
    /// The persistent record store.
    pub store: Arc<RwLock<RedbStore>>,
    /// Outbound delivery adapter.
    pub transport: Arc<dyn Transport>,
    /// Blob storage for uploads and message photos.
    pub blobs: Arc<DirBlobs>,
    /// Serializes scheduler rounds across the interval loop and `/tick`.
    pub scheduler_lease: Arc<Mutex<()>>,
}

impl AppState {
    /// Create new app state around an opened store.
    #[must_use]
    pub fn new(store: RedbStore, transport: Arc<dyn Transport>, blobs: DirBlobs) -> Self {
        Self {
            store: Arc::new(RwLock::new(store)),
            transport,
            blobs: Arc::new(blobs),
            scheduler_lease: Arc::new(Mutex::new(())),
        }
    }
}

// =============================================================================
// CORS CONFIGURATION
// =============================================================================

/// Build CORS layer from environment configuration.
///
/// Reads `ENROLL_CORS_ORIGINS`:
/// - If "*": allows all origins (development mode - use with caution!)
/// - If not set: defaults to localhost only (restrictive default)
/// - Otherwise: parses comma-separated list of allowed origins
fn build_cors_layer() -> CorsLayer {
    let origins_env = std::env::var("ENROLL_CORS_ORIGINS").ok();

    match origins_env.as_deref() {
        Some("*") => {
            tracing::warn!(
                "CORS: Allowing ALL origins (ENROLL_CORS_ORIGINS=*). This is insecure for production!"
            );
            CorsLayer::permissive()
        }
        Some(origins) => {
            let allowed_origins: Vec<HeaderValue> = origins
                .split(',')
                .filter_map(|s| {
                    let trimmed = s.trim();
                    match trimmed.parse::<HeaderValue>() {
                        Ok(hv) => {
                            tracing::info!("CORS: Allowing origin: {}", trimmed);
                            Some(hv)
                        }
                        Err(e) => {
                            tracing::warn!("CORS: Invalid origin '{}': {}", trimmed, e);
                            None
                        }
                    }
                })
                .collect();

            if allowed_origins.is_empty() {
                tracing::warn!(
                    "CORS: No valid origins in ENROLL_CORS_ORIGINS, defaulting to localhost only"
                );
                build_localhost_cors()
            } else {
                CorsLayer::new()
                    .allow_origin(allowed_origins)
                    .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
                    .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
            }
        }
        None => {
            tracing::info!("CORS: No ENROLL_CORS_ORIGINS set, defaulting to localhost only");
            build_localhost_cors()
        }
    }
}

/// Build a restrictive CORS layer that only allows localhost origins.
fn build_localhost_cors() -> CorsLayer {
    let localhost_origins = vec![
        "http://localhost:3000".parse::<HeaderValue>().ok(),
        "http://localhost:8080".parse::<HeaderValue>().ok(),
        "http://127.0.0.1:3000".parse::<HeaderValue>().ok(),
        "http://127.0.0.1:8080".parse::<HeaderValue>().ok(),
    ];
    let origins: Vec<HeaderValue> = localhost_origins.into_iter().flatten().collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}

// =============================================================================
// ROUTER CREATION
// =============================================================================

/// Create the axum router with all endpoints and middleware.
///
/// Middleware stack (outer to inner):
/// 1. CORS - handles preflight requests
/// 2. Tracing - logs all requests
/// 3. Rate Limiting - protects against DoS (if enabled)
/// 4. Authentication - validates API key (if configured)
pub fn create_router(state: AppState) -> Router {
    let cors = build_cors_layer();

    let rate_limit = get_rate_limit_from_env();
    let rate_limiter = if rate_limit > 0 {
        tracing::info!("Rate limiting enabled: {} requests/second", rate_limit);
        Some(create_rate_limiter(rate_limit))
    } else {
        tracing::info!("Rate limiting disabled");
        None
    };

    let has_auth = get_api_key_from_env().is_some();
    if has_auth {
        tracing::info!("API key authentication enabled");
    } else {
        tracing::warn!(
            "API key authentication DISABLED - all endpoints are publicly accessible! \
             Set ENROLL_API_KEY environment variable to enable authentication."
        );
    }

    let mut router = Router::new()
        .route("/health", get(handlers::health_handler))
        .route("/status", get(handlers::status_handler))
        .route("/interaction", post(handlers::interaction_handler))
        .route("/tick", post(handlers::tick_handler))
        .route(
            "/records/branches",
            get(handlers::list_branches_handler).put(handlers::put_branch_handler),
        )
        .route(
            "/records/fields",
            get(handlers::list_fields_handler).put(handlers::put_field_handler),
        )
        .route(
            "/records/messages",
            get(handlers::list_messages_handler).put(handlers::put_message_handler),
        )
        .route(
            "/records/menu-keys",
            get(handlers::list_menu_keys_handler).put(handlers::put_menu_key_handler),
        )
        .route(
            "/records/notifications",
            get(handlers::list_notifications_handler).put(handlers::put_notification_handler),
        )
        .route(
            "/records/groups",
            get(handlers::list_groups_handler).put(handlers::put_group_handler),
        )
        .route(
            "/records/settings",
            get(handlers::get_settings_handler).put(handlers::put_settings_handler),
        );

    // Apply authentication middleware (innermost - runs last on request)
    if has_auth {
        router = router.layer(axum_middleware::from_fn(guard::api_key_auth_middleware));
    }

    // Apply rate limiting middleware
    if let Some(limiter) = rate_limiter {
        router = router.layer(axum_middleware::from_fn_with_state(
            limiter,
            guard::rate_limit_middleware,
        ));
    }

    // Apply CORS, body limit, and tracing (outermost layers)
    router
        .layer(axum::extract::DefaultBodyLimit::max(2 * 1024 * 1024))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// =============================================================================
// SERVER STARTUP
// =============================================================================

/// Start the HTTP server and the scheduler loop.
pub async fn run_server(addr: &str, state: AppState, tick_secs: u64) -> Result<(), EnrollError> {
    let router = create_router(state.clone());

    tokio::spawn(crate::scheduler::run_scheduler(state, tick_secs));

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| EnrollError::IoError(format!("Bind failed: {e}")))?;

    tracing::info!("Enroll HTTP server listening on {}", addr);

    axum::serve(listener, router)
        .await
        .map_err(|e| EnrollError::IoError(format!("Server error: {e}")))
}
