//! Per-client audit trail

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    Json,
};
use serde::Deserialize;

use crate::{get_actor, AppError, AppState, MAX_PAGE_LIMIT};
use confirma_core::AuditEntry;

const DEFAULT_TRAIL_LIMIT: i64 = 100;

#[derive(Debug, Default, Deserialize)]
pub struct TrailQuery {
    /// Only entries with this action (e.g. `match`, `action_fired`)
    pub action: Option<String>,
    pub limit: Option<i64>,
}

/// GET /api/clients/:client_id/audit
///
/// Reading the trail is recorded on the same trail.
pub async fn list_audit_log(
    State(state): State<Arc<AppState>>,
    Path(client_id): Path<String>,
    Query(query): Query<TrailQuery>,
    headers: HeaderMap,
) -> Result<Json<Vec<AuditEntry>>, AppError> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_TRAIL_LIMIT)
        .clamp(1, MAX_PAGE_LIMIT);
    let action = query.action.as_deref().filter(|a| !a.is_empty());

    let trail = state.db.list_audit_log(&client_id, action, limit)?;

    state.db.log_audit(
        &client_id,
        &get_actor(&headers),
        "view_audit",
        None,
        None,
        Some(&format!("action={} limit={}", action.unwrap_or("*"), limit)),
    )?;

    Ok(Json(trail))
}
