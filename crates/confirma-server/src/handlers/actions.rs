//! Scheduled action handlers

use std::sync::Arc;

use axum::{
    extract::{Path, Query, Request, State},
    Json,
};
use chrono::Utc;
use serde::Deserialize;

use crate::{get_actor, AppError, AppState};
use confirma_core::models::{ActionState, ScheduledAction};

/// Query parameters for listing actions
#[derive(Debug, Deserialize)]
pub struct ActionListQuery {
    pub state: Option<String>,
}

/// GET /api/clients/:client_id/actions - List scheduled actions
pub async fn list_actions(
    State(state): State<Arc<AppState>>,
    Path(client_id): Path<String>,
    Query(params): Query<ActionListQuery>,
) -> Result<Json<Vec<ScheduledAction>>, AppError> {
    let action_state = params
        .state
        .as_deref()
        .map(str::parse::<ActionState>)
        .transpose()
        .map_err(|e| AppError::bad_request(&e))?;

    Ok(Json(
        state.db.list_scheduled_actions(&client_id, action_state)?,
    ))
}

/// POST /api/clients/:client_id/actions/:id/cancel - Cancel a scheduled action
pub async fn cancel_action(
    State(state): State<Arc<AppState>>,
    Path((client_id, id)): Path<(String, i64)>,
    request: Request,
) -> Result<Json<ScheduledAction>, AppError> {
    let actor = get_actor(request.headers());

    if !state.db.cancel_action(&client_id, id, Utc::now())? {
        return Err(AppError::conflict("Action already fired or canceled"));
    }

    state.db.log_audit(
        &client_id,
        &actor,
        "cancel",
        Some("scheduled_action"),
        Some(id),
        None,
    )?;

    let action = state
        .db
        .get_scheduled_action(&client_id, id)?
        .ok_or_else(|| AppError::not_found("Action not found"))?;
    Ok(Json(action))
}
