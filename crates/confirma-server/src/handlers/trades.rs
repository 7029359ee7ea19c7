//! Trade handlers

use std::sync::Arc;

use axum::{
    extract::{Path, Query, Request, State},
    Json,
};
use serde::{Deserialize, Serialize};

use super::read_json;
use crate::{get_actor, AppError, AppState};
use confirma_core::models::{AccountBinding, Match, NewTrade, Trade, TradeStatus};
use confirma_core::MatchResolver;

/// Query parameters for listing trades
#[derive(Debug, Deserialize)]
pub struct TradeListQuery {
    pub status: Option<String>,
}

/// Trade with its active match, if any
#[derive(Debug, Serialize)]
pub struct TradeDetail {
    #[serde(flatten)]
    pub trade: Trade,
    pub active_match: Option<Match>,
}

/// Request body for closing a trade
#[derive(Debug, Deserialize)]
pub struct CloseTradeRequest {
    pub status: TradeStatus,
}

/// GET /api/clients/:client_id/trades - List trades, optionally by status
pub async fn list_trades(
    State(state): State<Arc<AppState>>,
    Path(client_id): Path<String>,
    Query(params): Query<TradeListQuery>,
) -> Result<Json<Vec<Trade>>, AppError> {
    let status = params
        .status
        .as_deref()
        .map(str::parse::<TradeStatus>)
        .transpose()
        .map_err(|e| AppError::bad_request(&e))?;

    let trades = state.db.list_trades(&client_id, status)?;
    Ok(Json(trades))
}

/// POST /api/clients/:client_id/trades - Record a trade
pub async fn create_trade(
    State(state): State<Arc<AppState>>,
    Path(client_id): Path<String>,
    request: Request,
) -> Result<Json<Trade>, AppError> {
    let actor = get_actor(request.headers());
    let new_trade: NewTrade = read_json(request).await?;

    let id = state.db.insert_trade(&client_id, &new_trade)?;

    state.db.log_audit(
        &client_id,
        &actor,
        "create",
        Some("trade"),
        Some(id),
        Some(&format!(
            "trade_number={}",
            new_trade.fields.trade_number.as_deref().unwrap_or("-")
        )),
    )?;

    Ok(Json(state.db.require_trade(&client_id, id)?))
}

/// GET /api/clients/:client_id/trades/:id - Trade with its active match
pub async fn get_trade(
    State(state): State<Arc<AppState>>,
    Path((client_id, id)): Path<(String, i64)>,
) -> Result<Json<TradeDetail>, AppError> {
    let trade = state
        .db
        .get_trade(&client_id, id)?
        .ok_or_else(|| AppError::not_found("Trade not found"))?;
    let active_match = state.db.get_active_match_for_trade(&client_id, id)?;

    Ok(Json(TradeDetail {
        trade,
        active_match,
    }))
}

/// POST /api/clients/:client_id/trades/:id/close - Move a matched or disputed trade to confirmed or rejected
pub async fn close_trade(
    State(state): State<Arc<AppState>>,
    Path((client_id, id)): Path<(String, i64)>,
    request: Request,
) -> Result<Json<Trade>, AppError> {
    let actor = get_actor(request.headers());
    let req: CloseTradeRequest = read_json(request).await?;

    let trade = state.db.close_trade(&client_id, id, req.status)?;

    state.db.log_audit(
        &client_id,
        &actor,
        "close",
        Some("trade"),
        Some(id),
        Some(&format!("status={}", trade.status)),
    )?;

    Ok(Json(trade))
}

/// GET /api/clients/:client_id/trades/:id/account - Settlement accounts for a trade
pub async fn resolve_trade_account(
    State(state): State<Arc<AppState>>,
    Path((client_id, id)): Path<(String, i64)>,
) -> Result<Json<AccountBinding>, AppError> {
    let resolver = MatchResolver::new(&state.db, &state.engine.matching);
    let binding = resolver.resolve_account(&client_id, id)?;
    Ok(Json(binding))
}
