//! Settlement rule handlers
//!
//! Every mutation returns the client's full rule set in priority order.

use std::sync::Arc;

use axum::{
    extract::{Path, Request, State},
    Json,
};
use serde::Deserialize;

use super::read_json;
use crate::{get_actor, AppError, AppState};
use confirma_core::models::{NewSettlementRule, SettlementRule};

/// Request body for reordering rules
#[derive(Debug, Deserialize)]
pub struct ReorderRulesRequest {
    /// Every rule id of the client, highest priority first
    pub order: Vec<i64>,
}

fn describe(rule: &NewSettlementRule) -> String {
    format!(
        "counterparty={}, direction={}, product={}, modality={}",
        rule.counterparty.as_deref().unwrap_or("*"),
        rule.direction.as_str(),
        rule.product.as_str(),
        rule.modality.as_str()
    )
}

/// GET /api/clients/:client_id/rules - List rules by priority
pub async fn list_rules(
    State(state): State<Arc<AppState>>,
    Path(client_id): Path<String>,
) -> Result<Json<Vec<SettlementRule>>, AppError> {
    Ok(Json(state.db.list_settlement_rules(&client_id)?))
}

/// POST /api/clients/:client_id/rules - Create a rule
pub async fn create_rule(
    State(state): State<Arc<AppState>>,
    Path(client_id): Path<String>,
    request: Request,
) -> Result<Json<Vec<SettlementRule>>, AppError> {
    let actor = get_actor(request.headers());
    let rule: NewSettlementRule = read_json(request).await?;

    let _guard = state.client_locks.lock(&client_id).await;
    let (created, rules) = state.db.create_settlement_rule(&client_id, &rule)?;

    state.db.log_audit(
        &client_id,
        &actor,
        "create",
        Some("settlement_rule"),
        Some(created),
        Some(&describe(&rule)),
    )?;

    Ok(Json(rules))
}

/// PUT /api/clients/:client_id/rules/:id - Replace a rule, optionally moving it
pub async fn update_rule(
    State(state): State<Arc<AppState>>,
    Path((client_id, id)): Path<(String, i64)>,
    request: Request,
) -> Result<Json<Vec<SettlementRule>>, AppError> {
    let actor = get_actor(request.headers());
    let rule: NewSettlementRule = read_json(request).await?;

    let _guard = state.client_locks.lock(&client_id).await;
    let rules = state.db.update_settlement_rule(&client_id, id, &rule)?;

    state.db.log_audit(
        &client_id,
        &actor,
        "update",
        Some("settlement_rule"),
        Some(id),
        Some(&describe(&rule)),
    )?;

    Ok(Json(rules))
}

/// DELETE /api/clients/:client_id/rules/:id - Delete a rule
pub async fn delete_rule(
    State(state): State<Arc<AppState>>,
    Path((client_id, id)): Path<(String, i64)>,
    request: Request,
) -> Result<Json<Vec<SettlementRule>>, AppError> {
    let actor = get_actor(request.headers());

    let _guard = state.client_locks.lock(&client_id).await;
    let rules = state.db.delete_settlement_rule(&client_id, id)?;

    state.db.log_audit(
        &client_id,
        &actor,
        "delete",
        Some("settlement_rule"),
        Some(id),
        Some(&format!("remaining={}", rules.len())),
    )?;

    Ok(Json(rules))
}

/// POST /api/clients/:client_id/rules/reorder - Replace the whole priority order
pub async fn reorder_rules(
    State(state): State<Arc<AppState>>,
    Path(client_id): Path<String>,
    request: Request,
) -> Result<Json<Vec<SettlementRule>>, AppError> {
    let actor = get_actor(request.headers());
    let req: ReorderRulesRequest = read_json(request).await?;

    let _guard = state.client_locks.lock(&client_id).await;
    let rules = state.db.reorder_settlement_rules(&client_id, &req.order)?;

    let order: Vec<String> = req.order.iter().map(|id| id.to_string()).collect();
    state.db.log_audit(
        &client_id,
        &actor,
        "reorder",
        Some("settlement_rule"),
        None,
        Some(&format!("order={}", order.join(","))),
    )?;

    Ok(Json(rules))
}
