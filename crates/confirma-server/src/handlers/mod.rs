//! HTTP request handlers organized by domain
//!
//! Each submodule contains handlers for a specific API area.

pub mod actions;
pub mod audit;
pub mod confirmations;
pub mod matches;
pub mod rules;
pub mod settings;
pub mod trades;

// Re-export all handlers for use in router
pub use actions::*;
pub use audit::*;
pub use confirmations::*;
pub use matches::*;
pub use rules::*;
pub use settings::*;
pub use trades::*;

use axum::extract::Request;
use serde::de::DeserializeOwned;

use crate::{AppError, MAX_BODY_SIZE};

/// Read and parse a JSON request body
pub(crate) async fn read_json<T: DeserializeOwned>(request: Request) -> Result<T, AppError> {
    let bytes = axum::body::to_bytes(request.into_body(), MAX_BODY_SIZE)
        .await
        .map_err(|_| AppError::bad_request("Invalid request body"))?;
    serde_json::from_slice(&bytes).map_err(|e| AppError::bad_request(&format!("Invalid JSON: {}", e)))
}
