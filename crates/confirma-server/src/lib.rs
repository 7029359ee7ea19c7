//! Confirma Web Server
//!
//! Axum-based REST API over the Confirma core.
//!
//! - Every route is scoped to one client under `/api/clients/:client_id`
//! - Matching and rule mutations are serialized per client; clients proceed independently
//! - Every mutation is recorded in the audit log with the caller's actor name
//! - A background sweeper fires due automation actions
//! - Sanitized error responses

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::{
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use tokio::sync::OwnedMutexGuard;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use confirma_core::db::Database;
use confirma_core::{EngineConfig, Notifier, NotifierClient};

mod handlers;
mod scheduler;

pub use scheduler::start_automation_sweeper;

/// Maximum request body size (1 MB)
pub const MAX_BODY_SIZE: usize = 1024 * 1024;

/// Maximum pagination limit
pub const MAX_PAGE_LIMIT: i64 = 1000;

/// Header naming the operator or service behind a request, for the audit log
pub const ACTOR_HEADER: &str = "x-confirma-actor";

/// Server configuration
#[derive(Clone)]
pub struct ServerConfig {
    pub engine: EngineConfig,
    /// Run the automation sweeper alongside the API
    pub run_sweeper: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            run_sweeper: true,
        }
    }
}

/// One async lock per client.
///
/// An entry only lives while someone holds or waits on it: every `lock` call
/// drops entries whose only reference is the map's own, so the map is bounded
/// by the number of clients with requests in flight.
#[derive(Default)]
pub struct ClientLocks {
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl ClientLocks {
    /// Wait for exclusive access to a client's matching and rule state
    pub async fn lock(&self, client_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = match self.locks.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            locks.retain(|id, lock| id == client_id || Arc::strong_count(lock) > 1);
            locks
                .entry(client_id.to_string())
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        match self.locks.lock() {
            Ok(guard) => guard.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }
}

/// Shared application state
pub struct AppState {
    pub db: Database,
    pub engine: EngineConfig,
    pub notifier: Arc<dyn Notifier>,
    pub client_locks: ClientLocks,
}

/// Actor for audit logging: the `x-confirma-actor` header, or "api"
pub fn get_actor(headers: &HeaderMap) -> String {
    headers
        .get(ACTOR_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.chars().take(64).collect())
        .unwrap_or_else(|| "api".to_string())
}

/// Create the application router with the notifier from the environment
pub fn create_router(db: Database, config: ServerConfig) -> Router {
    create_router_with_notifier(db, config, Arc::new(NotifierClient::from_env()))
}

/// Create the application router with an explicit notifier (for testing)
pub fn create_router_with_notifier(
    db: Database,
    config: ServerConfig,
    notifier: Arc<dyn Notifier>,
) -> Router {
    let state = Arc::new(AppState {
        db,
        engine: config.engine,
        notifier,
        client_locks: ClientLocks::default(),
    });

    let client_routes = Router::new()
        // Trades
        .route(
            "/trades",
            get(handlers::list_trades).post(handlers::create_trade),
        )
        .route("/trades/:id", get(handlers::get_trade))
        .route("/trades/:id/close", post(handlers::close_trade))
        .route("/trades/:id/account", get(handlers::resolve_trade_account))
        // Confirmations
        .route(
            "/confirmations",
            get(handlers::list_confirmations).post(handlers::ingest_confirmation),
        )
        .route("/confirmations/:id", get(handlers::get_confirmation))
        .route("/confirmations/:id/match", post(handlers::match_confirmation))
        .route("/match-pending", post(handlers::match_pending))
        // Matches
        .route("/matches", get(handlers::list_matches))
        .route(
            "/matches/:id",
            get(handlers::get_match).delete(handlers::reverse_match),
        )
        // Settlement rules
        .route(
            "/rules",
            get(handlers::list_rules).post(handlers::create_rule),
        )
        .route("/rules/reorder", post(handlers::reorder_rules))
        .route(
            "/rules/:id",
            put(handlers::update_rule).delete(handlers::delete_rule),
        )
        // Automation
        .route(
            "/settings",
            get(handlers::get_settings).put(handlers::update_settings),
        )
        .route("/actions", get(handlers::list_actions))
        .route("/actions/:id/cancel", post(handlers::cancel_action))
        // Audit trail
        .route("/audit", get(handlers::list_audit_log));

    let api_routes = Router::new().nest("/clients/:client_id", client_routes);

    Router::new()
        .nest("/api", api_routes)
        .route("/health", get(health))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Start the server with custom configuration
pub async fn serve_with_config(
    db: Database,
    host: &str,
    port: u16,
    config: ServerConfig,
) -> anyhow::Result<()> {
    let notifier: Arc<dyn Notifier> = Arc::new(NotifierClient::from_env());
    info!("Notifications via {}", notifier.name());

    if config.run_sweeper {
        start_automation_sweeper(db.clone(), notifier.clone(), config.engine.automation.clone());
    } else {
        warn!("Automation sweeper disabled; scheduled actions will not fire from this process");
    }

    let app = create_router_with_notifier(db, config, notifier);
    let addr = format!("{}:{}", host, port);

    info!("Starting server at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============================================================================
// Error Handling
// ============================================================================

/// Application error type with proper HTTP status codes
pub struct AppError {
    status: StatusCode,
    message: String,
    internal: Option<anyhow::Error>,
}

impl AppError {
    pub fn bad_request(msg: &str) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: msg.to_string(),
            internal: None,
        }
    }

    pub fn not_found(msg: &str) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: msg.to_string(),
            internal: None,
        }
    }

    pub fn internal(msg: &str) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: "An internal error occurred".to_string(),
            internal: Some(anyhow::anyhow!("{}", msg)),
        }
    }

    pub fn conflict(msg: &str) -> Self {
        Self {
            status: StatusCode::CONFLICT,
            message: msg.to_string(),
            internal: None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Log the full internal error if present
        if let Some(err) = &self.internal {
            error!(error = %err, "Internal error");
        }

        let body = Json(serde_json::json!({
            "error": self.message
        }));

        (self.status, body).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        let err = err.into();

        // Domain errors carry a message meant for the caller
        if let Some(core) = err.downcast_ref::<confirma_core::Error>() {
            use confirma_core::Error as CoreError;
            let status = match core {
                CoreError::NotFound(_) => Some(StatusCode::NOT_FOUND),
                CoreError::InvalidData(_)
                | CoreError::Normalization(_)
                | CoreError::DuplicatePriority(_) => Some(StatusCode::BAD_REQUEST),
                CoreError::DuplicateRule(_) | CoreError::ConcurrentModification(_) => {
                    Some(StatusCode::CONFLICT)
                }
                CoreError::NoRuleMatched { .. } => Some(StatusCode::UNPROCESSABLE_ENTITY),
                _ => None,
            };
            if let Some(status) = status {
                return Self {
                    status,
                    message: core.to_string(),
                    internal: None,
                };
            }
        }

        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            // Return generic message to client
            message: "An internal error occurred".to_string(),
            // Keep full error for logging
            internal: Some(err),
        }
    }
}

#[cfg(test)]
mod tests;
