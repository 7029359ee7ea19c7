//! Confirmation ingestion and matching handlers

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, Request, State},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use super::read_json;
use crate::{get_actor, AppError, AppState};
use confirma_core::ingest::fields_from_extracted;
use confirma_core::models::{Confirmation, ConfirmationStatus, NewConfirmation, TradeFields};
use confirma_core::{BatchMatchReport, MatchOutcome, MatchResolver};

/// Query parameters for listing confirmations
#[derive(Debug, Deserialize)]
pub struct ConfirmationListQuery {
    pub status: Option<String>,
}

/// Request body for ingesting a confirmation.
///
/// Fields are given either flat (`counterparty`, `amount`, ...) or as the
/// parser's raw `extracted` map, never both.
#[derive(Debug, Deserialize)]
pub struct IngestConfirmationRequest {
    #[serde(flatten)]
    pub confirmation: NewConfirmation,
    #[serde(default)]
    pub extracted: Option<HashMap<String, Value>>,
    /// Run matching right after ingestion
    #[serde(default)]
    pub auto_match: bool,
}

/// Response for an ingested confirmation
#[derive(Debug, Serialize)]
pub struct IngestResponse {
    pub confirmation: Confirmation,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<MatchOutcome>,
}

/// GET /api/clients/:client_id/confirmations - List confirmations, optionally by status
pub async fn list_confirmations(
    State(state): State<Arc<AppState>>,
    Path(client_id): Path<String>,
    Query(params): Query<ConfirmationListQuery>,
) -> Result<Json<Vec<Confirmation>>, AppError> {
    let status = params
        .status
        .as_deref()
        .map(str::parse::<ConfirmationStatus>)
        .transpose()
        .map_err(|e| AppError::bad_request(&e))?;

    Ok(Json(state.db.list_confirmations(&client_id, status)?))
}

/// POST /api/clients/:client_id/confirmations - Ingest a confirmation
pub async fn ingest_confirmation(
    State(state): State<Arc<AppState>>,
    Path(client_id): Path<String>,
    request: Request,
) -> Result<Json<IngestResponse>, AppError> {
    let actor = get_actor(request.headers());
    let req: IngestConfirmationRequest = read_json(request).await?;

    let mut new_confirmation = req.confirmation;
    if let Some(extracted) = &req.extracted {
        if new_confirmation.fields != TradeFields::default() {
            return Err(AppError::bad_request(
                "Give either flat fields or an extracted map, not both",
            ));
        }
        new_confirmation.fields = fields_from_extracted(extracted)?;
    }

    let id = state.db.ingest_confirmation(&client_id, &new_confirmation)?;

    state.db.log_audit(
        &client_id,
        &actor,
        "ingest",
        Some("confirmation"),
        Some(id),
        Some(&format!(
            "source={}",
            new_confirmation.source.as_deref().unwrap_or("-")
        )),
    )?;

    let outcome = if req.auto_match {
        let _guard = state.client_locks.lock(&client_id).await;
        let resolver = MatchResolver::new(&state.db, &state.engine.matching);
        let outcome = resolver.perform_matching(&client_id, id, &actor)?;
        audit_outcome(&state, &actor, &client_id, &outcome)?;
        Some(outcome)
    } else {
        None
    };

    let confirmation = state.db.require_confirmation(&client_id, id)?;
    Ok(Json(IngestResponse {
        confirmation,
        outcome,
    }))
}

/// GET /api/clients/:client_id/confirmations/:id - Get a confirmation
pub async fn get_confirmation(
    State(state): State<Arc<AppState>>,
    Path((client_id, id)): Path<(String, i64)>,
) -> Result<Json<Confirmation>, AppError> {
    let confirmation = state
        .db
        .get_confirmation(&client_id, id)?
        .ok_or_else(|| AppError::not_found("Confirmation not found"))?;
    Ok(Json(confirmation))
}

/// POST /api/clients/:client_id/confirmations/:id/match - Match one confirmation
pub async fn match_confirmation(
    State(state): State<Arc<AppState>>,
    Path((client_id, id)): Path<(String, i64)>,
    request: Request,
) -> Result<Json<MatchOutcome>, AppError> {
    let actor = get_actor(request.headers());

    let _guard = state.client_locks.lock(&client_id).await;
    let resolver = MatchResolver::new(&state.db, &state.engine.matching);
    let outcome = resolver.perform_matching(&client_id, id, &actor)?;

    audit_outcome(&state, &actor, &client_id, &outcome)?;
    Ok(Json(outcome))
}

/// POST /api/clients/:client_id/match-pending - Match every open confirmation
pub async fn match_pending(
    State(state): State<Arc<AppState>>,
    Path(client_id): Path<String>,
    request: Request,
) -> Result<Json<BatchMatchReport>, AppError> {
    let actor = get_actor(request.headers());

    let _guard = state.client_locks.lock(&client_id).await;
    let resolver = MatchResolver::new(&state.db, &state.engine.matching);
    let report = resolver.perform_matching_all_pending(&client_id, &actor)?;

    for outcome in &report.outcomes {
        audit_outcome(&state, &actor, &client_id, outcome)?;
    }
    info!(
        "match-pending for {}: {} processed, {} conflicts",
        client_id, report.processed, report.conflicts
    );

    Ok(Json(report))
}

fn audit_outcome(
    state: &AppState,
    actor: &str,
    client_id: &str,
    outcome: &MatchOutcome,
) -> Result<(), AppError> {
    match outcome {
        MatchOutcome::Matched { matched, .. } => {
            state.db.log_audit(
                client_id,
                actor,
                "match",
                Some("match"),
                Some(matched.id),
                Some(&format!(
                    "trade={}, confirmation={}, confidence={}, classification={}",
                    matched.trade_id,
                    matched.confirmation_id,
                    matched.confidence,
                    matched.classification.as_str()
                )),
            )?;
        }
        MatchOutcome::Duplicate {
            confirmation_id,
            existing_match_id,
        } => {
            state.db.log_audit(
                client_id,
                actor,
                "duplicate",
                Some("confirmation"),
                Some(*confirmation_id),
                Some(&format!("match={}", existing_match_id)),
            )?;
        }
        MatchOutcome::Unrecognized {
            confirmation_id,
            best_confidence,
            ..
        } => {
            state.db.log_audit(
                client_id,
                actor,
                "unrecognized",
                Some("confirmation"),
                Some(*confirmation_id),
                Some(&format!(
                    "best_confidence={}",
                    best_confidence
                )),
            )?;
        }
        MatchOutcome::Skipped { .. } => {}
    }
    Ok(())
}
