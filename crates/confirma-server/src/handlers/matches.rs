//! Match review and reversal handlers

use std::sync::Arc;

use axum::{
    extract::{Path, Query, Request, State},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::{get_actor, AppError, AppState};
use confirma_core::db::Reversal;
use confirma_core::models::{Confirmation, Match, ScheduledAction, Trade};
use confirma_core::{compare_fields, FieldVerdict, MatchResolver};

/// Query parameters for listing matches
#[derive(Debug, Deserialize)]
pub struct MatchListQuery {
    #[serde(default)]
    pub include_reversed: bool,
}

/// A match with both sides and a field-by-field discrepancy report
#[derive(Debug, Serialize)]
pub struct MatchDetail {
    #[serde(rename = "match")]
    pub matched: Match,
    pub trade: Trade,
    pub confirmation: Confirmation,
    pub fields: Vec<FieldVerdict>,
    pub actions: Vec<ScheduledAction>,
}

/// GET /api/clients/:client_id/matches - List matches
pub async fn list_matches(
    State(state): State<Arc<AppState>>,
    Path(client_id): Path<String>,
    Query(params): Query<MatchListQuery>,
) -> Result<Json<Vec<Match>>, AppError> {
    Ok(Json(
        state.db.list_matches(&client_id, params.include_reversed)?,
    ))
}

/// GET /api/clients/:client_id/matches/:id - Match detail with discrepancy report
pub async fn get_match(
    State(state): State<Arc<AppState>>,
    Path((client_id, id)): Path<(String, i64)>,
) -> Result<Json<MatchDetail>, AppError> {
    let matched = state
        .db
        .get_match(&client_id, id)?
        .ok_or_else(|| AppError::not_found("Match not found"))?;
    let trade = state.db.require_trade(&client_id, matched.trade_id)?;
    let confirmation = state
        .db
        .require_confirmation(&client_id, matched.confirmation_id)?;

    // Recomputed against the current tolerance
    let fields = compare_fields(
        &trade.fields,
        &confirmation.fields,
        &state.engine.matching.tolerance(),
    );
    let actions = state.db.list_actions_for_match(matched.id)?;

    Ok(Json(MatchDetail {
        matched,
        trade,
        confirmation,
        fields,
        actions,
    }))
}

/// DELETE /api/clients/:client_id/matches/:id - Reverse a match
pub async fn reverse_match(
    State(state): State<Arc<AppState>>,
    Path((client_id, id)): Path<(String, i64)>,
    request: Request,
) -> Result<Json<Reversal>, AppError> {
    let actor = get_actor(request.headers());

    let _guard = state.client_locks.lock(&client_id).await;
    let resolver = MatchResolver::new(&state.db, &state.engine.matching);
    let reversal = resolver.reverse_match(&client_id, id)?;

    state.db.log_audit(
        &client_id,
        &actor,
        "reverse",
        Some("match"),
        Some(id),
        Some(&format!(
            "trade={}, confirmation={}, canceled_actions={}",
            reversal.reversed.trade_id,
            reversal.reversed.confirmation_id,
            reversal.canceled_actions
        )),
    )?;

    Ok(Json(reversal))
}
