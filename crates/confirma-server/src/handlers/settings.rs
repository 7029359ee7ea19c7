//! Automation settings handlers

use std::sync::Arc;

use axum::{
    extract::{Path, Request, State},
    Json,
};
use chrono::Utc;
use serde::Serialize;

use super::read_json;
use crate::{get_actor, AppError, AppState};
use confirma_core::automation;
use confirma_core::models::{AutomationSettings, AutomationSettingsUpdate};

/// Response for a settings update
#[derive(Debug, Serialize)]
pub struct SettingsUpdateResponse {
    pub settings: AutomationSettings,
    /// Scheduled actions canceled because their toggle was turned off
    pub canceled_actions: usize,
}

/// GET /api/clients/:client_id/settings - Automation settings
pub async fn get_settings(
    State(state): State<Arc<AppState>>,
    Path(client_id): Path<String>,
) -> Result<Json<AutomationSettings>, AppError> {
    Ok(Json(state.db.get_automation_settings(&client_id)?))
}

/// PUT /api/clients/:client_id/settings - Partially update automation settings
pub async fn update_settings(
    State(state): State<Arc<AppState>>,
    Path(client_id): Path<String>,
    request: Request,
) -> Result<Json<SettingsUpdateResponse>, AppError> {
    let actor = get_actor(request.headers());
    let update: AutomationSettingsUpdate = read_json(request).await?;

    let _guard = state.client_locks.lock(&client_id).await;
    let (settings, canceled_actions) = automation::update_settings(
        &state.db,
        &client_id,
        &update,
        &state.engine.automation,
        Utc::now(),
    )?;

    state.db.log_audit(
        &client_id,
        &actor,
        "update",
        Some("automation_settings"),
        None,
        Some(&format!(
            "confirm={}/{}m, dispute={}/{}m, canceled={}",
            settings.auto_confirm_enabled,
            settings.confirm_delay_minutes,
            settings.auto_dispute_enabled,
            settings.dispute_delay_minutes,
            canceled_actions
        )),
    )?;

    Ok(Json(SettingsUpdateResponse {
        settings,
        canceled_actions,
    }))
}
