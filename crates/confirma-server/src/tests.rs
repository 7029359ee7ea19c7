//! Server API tests

use super::*;
use axum::{body::Body, http::Request};
use confirma_core::models::{ConfirmationStatus, DirectionFilter, TradeStatus};
use confirma_core::test_utils::{
    physical_rule, sample_confirmation_fields, sample_trade_fields, setup_db, CLIENT, OTHER_CLIENT,
};
use confirma_core::{AutomationConfig, MockNotifier};
use http_body_util::BodyExt;
use serde_json::json;
use tower::ServiceExt;

fn test_config() -> ServerConfig {
    ServerConfig {
        run_sweeper: false,
        ..Default::default()
    }
}

fn setup_test_app() -> (Router, Database, Arc<MockNotifier>) {
    let db = setup_db();
    let notifier = Arc::new(MockNotifier::new());
    let app = create_router_with_notifier(db.clone(), test_config(), notifier.clone());
    (app, db, notifier)
}

async fn get_body_json(response: axum::response::Response) -> serde_json::Value {
    let body = response.into_body();
    let bytes = body.collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<serde_json::Value>) -> Response {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(ACTOR_HEADER, "ops@acme.example");
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    app.clone().oneshot(request).await.unwrap()
}

fn client_uri(client: &str, path: &str) -> String {
    format!("/api/clients/{}{}", client, path)
}

async fn create_trade(app: &Router, client: &str) -> i64 {
    let response = send(
        app,
        "POST",
        &client_uri(client, "/trades"),
        Some(serde_json::to_value(sample_trade_fields()).unwrap()),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    get_body_json(response).await["id"].as_i64().unwrap()
}

async fn ingest(app: &Router, client: &str, body: serde_json::Value) -> serde_json::Value {
    let response = send(app, "POST", &client_uri(client, "/confirmations"), Some(body)).await;
    assert_eq!(response.status(), StatusCode::OK);
    get_body_json(response).await
}

// ========== Health ==========

#[tokio::test]
async fn test_health() {
    let (app, _, _) = setup_test_app();
    let response = send(&app, "GET", "/health", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(get_body_json(response).await["status"], "ok");
}

// ========== Trade API Tests ==========

#[tokio::test]
async fn test_create_and_list_trades() {
    let (app, _, _) = setup_test_app();
    let id = create_trade(&app, CLIENT).await;

    let response = send(&app, "GET", &client_uri(CLIENT, "/trades?status=unmatched"), None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let trades = get_body_json(response).await;
    assert_eq!(trades.as_array().unwrap().len(), 1);
    assert_eq!(trades[0]["id"], id);
    assert_eq!(trades[0]["counterparty"], "Banco Uno");

    // Another client sees nothing
    let response = send(&app, "GET", &client_uri(OTHER_CLIENT, "/trades"), None).await;
    assert!(get_body_json(response).await.as_array().unwrap().is_empty());

    let response = send(&app, "GET", &client_uri(OTHER_CLIENT, &format!("/trades/{}", id)), None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_list_trades_bad_status() {
    let (app, _, _) = setup_test_app();
    let response = send(&app, "GET", &client_uri(CLIENT, "/trades?status=bogus"), None).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_invalid_json_rejected() {
    let (app, _, _) = setup_test_app();
    let request = Request::builder()
        .method("POST")
        .uri(client_uri(CLIENT, "/trades"))
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

// ========== Matching API Tests ==========

#[tokio::test]
async fn test_ingest_with_auto_match() {
    let (app, db, _) = setup_test_app();
    let trade_id = create_trade(&app, CLIENT).await;

    let mut body = serde_json::to_value(sample_confirmation_fields()).unwrap();
    body["auto_match"] = json!(true);
    body["source"] = json!("email");
    let json = ingest(&app, CLIENT, body).await;

    assert_eq!(json["confirmation"]["status"], "matched");
    assert_eq!(json["outcome"]["outcome"], "matched");
    assert_eq!(json["outcome"]["match"]["trade_id"], trade_id);
    assert_eq!(json["outcome"]["match"]["confidence"], 100);
    assert_eq!(json["outcome"]["match"]["classification"], "confirmed");
    assert_eq!(json["outcome"]["match"]["resolved_by"], "ops@acme.example");
    // No rule configured yet: the match stands, the account is missing
    assert!(json["outcome"]["account"].is_null());
    assert!(json["outcome"]["account_error"]
        .as_str()
        .unwrap()
        .contains("no settlement rule"));

    let trade = db.require_trade(CLIENT, trade_id).unwrap();
    assert_eq!(trade.status, TradeStatus::Matched);
}

#[tokio::test]
async fn test_ingest_extracted_map() {
    let (app, _, _) = setup_test_app();
    create_trade(&app, CLIENT).await;

    let json = ingest(
        &app,
        CLIENT,
        json!({
            "source": "attachment",
            "auto_match": true,
            "extracted": {
                "N° Operación": "FX 1001",
                "Contraparte": "Banco Uno",
                "Fecha Operación": "15/01/2025",
                "Fecha Valuta": "17/01/2025",
                "Sentido": "Compra",
                "Moneda 1": "USD",
                "Moneda 2": "CLP",
                "Monto": "1.000.000,00",
                "Tipo de Cambio": "890,50"
            }
        }),
    )
    .await;

    assert_eq!(json["confirmation"]["trade_number"], "FX 1001");
    assert_eq!(json["outcome"]["outcome"], "matched");
}

#[tokio::test]
async fn test_ingest_rejects_fields_and_extracted() {
    let (app, _, _) = setup_test_app();
    let response = send(
        &app,
        "POST",
        &client_uri(CLIENT, "/confirmations"),
        Some(json!({ "counterparty": "Banco Uno", "extracted": { "monto": "100" } })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_match_detail_reports_discrepancies() {
    let (app, _, _) = setup_test_app();
    create_trade(&app, CLIENT).await;

    let mut fields = sample_confirmation_fields();
    fields.amount = Some("1.000.500,00".into());
    let json = ingest(&app, CLIENT, serde_json::to_value(fields).unwrap()).await;
    let conf_id = json["confirmation"]["id"].as_i64().unwrap();

    let response = send(
        &app,
        "POST",
        &client_uri(CLIENT, &format!("/confirmations/{}/match", conf_id)),
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let outcome = get_body_json(response).await;
    assert_eq!(outcome["match"]["classification"], "disputed");
    assert_eq!(outcome["match"]["differing_fields"], json!(["amount"]));
    let match_id = outcome["match"]["id"].as_i64().unwrap();

    let response = send(&app, "GET", &client_uri(CLIENT, &format!("/matches/{}", match_id)), None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let detail = get_body_json(response).await;
    let amount = detail["fields"]
        .as_array()
        .unwrap()
        .iter()
        .find(|v| v["field"] == "amount")
        .unwrap();
    assert_eq!(amount["outcome"], "differs");
    assert_eq!(amount["confirmation_value"], "1.000.500,00");
    assert_eq!(detail["trade"]["status"], "disputed");
}

#[tokio::test]
async fn test_match_pending_and_duplicate() {
    let (app, db, _) = setup_test_app();
    create_trade(&app, CLIENT).await;

    let body = serde_json::to_value(sample_confirmation_fields()).unwrap();
    ingest(&app, CLIENT, body.clone()).await;
    // The bank resends the same confirmation
    let resent = ingest(&app, CLIENT, body).await;
    let resent_id = resent["confirmation"]["id"].as_i64().unwrap();

    let response = send(&app, "POST", &client_uri(CLIENT, "/match-pending"), None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let report = get_body_json(response).await;
    assert_eq!(report["processed"], 2);
    assert_eq!(report["matched"], 1);
    assert_eq!(report["duplicates"], 1);

    let resent = db.require_confirmation(CLIENT, resent_id).unwrap();
    assert_eq!(resent.status, ConfirmationStatus::Duplicate);
}

#[tokio::test]
async fn test_unknown_confirmation_is_404() {
    let (app, _, _) = setup_test_app();
    let response = send(&app, "POST", &client_uri(CLIENT, "/confirmations/999/match"), None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_reverse_match() {
    let (app, db, _) = setup_test_app();
    let trade_id = create_trade(&app, CLIENT).await;

    let mut body = serde_json::to_value(sample_confirmation_fields()).unwrap();
    body["auto_match"] = json!(true);
    let json = ingest(&app, CLIENT, body).await;
    let match_id = json["outcome"]["match"]["id"].as_i64().unwrap();

    let response = send(&app, "DELETE", &client_uri(CLIENT, &format!("/matches/{}", match_id)), None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let reversal = get_body_json(response).await;
    assert!(!reversal["match"]["reversed_at"].is_null());

    assert_eq!(db.require_trade(CLIENT, trade_id).unwrap().status, TradeStatus::Unmatched);

    // Reversed matches are hidden unless asked for
    let response = send(&app, "GET", &client_uri(CLIENT, "/matches"), None).await;
    assert!(get_body_json(response).await.as_array().unwrap().is_empty());
    let response = send(&app, "GET", &client_uri(CLIENT, "/matches?include_reversed=true"), None).await;
    assert_eq!(get_body_json(response).await.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_close_trade() {
    let (app, _, _) = setup_test_app();
    let trade_id = create_trade(&app, CLIENT).await;

    // Unmatched trades cannot be closed
    let response = send(
        &app,
        "POST",
        &client_uri(CLIENT, &format!("/trades/{}/close", trade_id)),
        Some(json!({ "status": "confirmed" })),
    )
    .await;
    assert_ne!(response.status(), StatusCode::OK);

    let mut body = serde_json::to_value(sample_confirmation_fields()).unwrap();
    body["auto_match"] = json!(true);
    ingest(&app, CLIENT, body).await;

    let response = send(
        &app,
        "POST",
        &client_uri(CLIENT, &format!("/trades/{}/close", trade_id)),
        Some(json!({ "status": "confirmed" })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(get_body_json(response).await["status"], "confirmed");
}

// ========== Settlement Rule API Tests ==========

#[tokio::test]
async fn test_rule_lifecycle() {
    let (app, db, _) = setup_test_app();
    let rules_uri = client_uri(CLIENT, "/rules");

    let generic = serde_json::to_value(physical_rule(None, DirectionFilter::Any, "Account X")).unwrap();
    let response = send(&app, "POST", &rules_uri, Some(generic)).await;
    assert_eq!(response.status(), StatusCode::OK);

    let mut specific =
        serde_json::to_value(physical_rule(Some("Banco Uno"), DirectionFilter::Buy, "Account Y")).unwrap();
    specific["priority"] = json!(1);
    let response = send(&app, "POST", &rules_uri, Some(specific)).await;
    let rules = get_body_json(response).await;
    assert_eq!(rules[0]["priority"], 1);
    assert_eq!(rules[0]["pay"]["bank"], "Account Y");
    assert_eq!(rules[1]["priority"], 2);
    let generic_id = rules[1]["id"].as_i64().unwrap();
    let specific_id = rules[0]["id"].as_i64().unwrap();

    // Audited against the rule that was created, not the last in the list
    let created: Vec<Option<i64>> = db
        .list_audit_log(CLIENT, Some("create"), 10)
        .unwrap()
        .iter()
        .filter(|e| e.entity_type.as_deref() == Some("settlement_rule"))
        .map(|e| e.entity_id)
        .collect();
    assert_eq!(created, vec![Some(specific_id), Some(generic_id)]);

    // The specific rule wins for the sample trade
    let trade_id = create_trade(&app, CLIENT).await;
    let response = send(
        &app,
        "GET",
        &client_uri(CLIENT, &format!("/trades/{}/account", trade_id)),
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(get_body_json(response).await["rule_id"], specific_id);

    let response = send(
        &app,
        "POST",
        &client_uri(CLIENT, "/rules/reorder"),
        Some(json!({ "order": [generic_id, specific_id] })),
    )
    .await;
    let rules = get_body_json(response).await;
    assert_eq!(rules[0]["id"], generic_id);
    assert_eq!(rules[0]["priority"], 1);

    let response = send(&app, "DELETE", &client_uri(CLIENT, &format!("/rules/{}", generic_id)), None).await;
    let rules = get_body_json(response).await;
    assert_eq!(rules.as_array().unwrap().len(), 1);
    assert_eq!(rules[0]["priority"], 1);
}

#[tokio::test]
async fn test_duplicate_rule_conflicts() {
    let (app, _, _) = setup_test_app();
    let rules_uri = client_uri(CLIENT, "/rules");
    let rule = serde_json::to_value(physical_rule(Some("Banco Uno"), DirectionFilter::Buy, "Account Y")).unwrap();

    let response = send(&app, "POST", &rules_uri, Some(rule.clone())).await;
    assert_eq!(response.status(), StatusCode::OK);
    let response = send(&app, "POST", &rules_uri, Some(rule)).await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_reorder_with_missing_id_rejected() {
    let (app, _, _) = setup_test_app();
    let rule = serde_json::to_value(physical_rule(None, DirectionFilter::Any, "Account X")).unwrap();
    send(&app, "POST", &client_uri(CLIENT, "/rules"), Some(rule)).await;

    let response = send(
        &app,
        "POST",
        &client_uri(CLIENT, "/rules/reorder"),
        Some(json!({ "order": [] })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_resolve_without_rule_is_unprocessable() {
    let (app, _, _) = setup_test_app();
    let trade_id = create_trade(&app, CLIENT).await;
    let response = send(
        &app,
        "GET",
        &client_uri(CLIENT, &format!("/trades/{}/account", trade_id)),
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let json = get_body_json(response).await;
    assert!(json["error"].as_str().unwrap().contains("Banco Uno"));
}

// ========== Automation API Tests ==========

#[tokio::test]
async fn test_settings_and_action_cancel() {
    let (app, _, _) = setup_test_app();

    let response = send(&app, "GET", &client_uri(CLIENT, "/settings"), None).await;
    let settings = get_body_json(response).await;
    assert_eq!(settings["auto_confirm_enabled"], false);

    let response = send(
        &app,
        "PUT",
        &client_uri(CLIENT, "/settings"),
        Some(json!({ "auto_confirm_enabled": true, "confirm_delay_minutes": 30 })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(get_body_json(response).await["settings"]["confirm_delay_minutes"], 30);

    create_trade(&app, CLIENT).await;
    let mut body = serde_json::to_value(sample_confirmation_fields()).unwrap();
    body["auto_match"] = json!(true);
    let json = ingest(&app, CLIENT, body).await;
    assert_eq!(json["outcome"]["scheduled"]["kind"], "confirm");
    let action_id = json["outcome"]["scheduled"]["id"].as_i64().unwrap();

    let response = send(&app, "GET", &client_uri(CLIENT, "/actions?state=scheduled"), None).await;
    assert_eq!(get_body_json(response).await.as_array().unwrap().len(), 1);

    let cancel_uri = client_uri(CLIENT, &format!("/actions/{}/cancel", action_id));
    let response = send(&app, "POST", &cancel_uri, None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(get_body_json(response).await["state"], "canceled");

    let response = send(&app, "POST", &cancel_uri, None).await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_settings_out_of_range_rejected() {
    let (app, _, _) = setup_test_app();
    let response = send(
        &app,
        "PUT",
        &client_uri(CLIENT, "/settings"),
        Some(json!({ "dispute_delay_minutes": -5 })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_sweeper_fires_due_action() {
    let (app, db, notifier) = setup_test_app();

    send(
        &app,
        "PUT",
        &client_uri(CLIENT, "/settings"),
        Some(json!({ "auto_confirm_enabled": true, "confirm_delay_minutes": 0 })),
    )
    .await;
    let trade_id = create_trade(&app, CLIENT).await;
    let mut body = serde_json::to_value(sample_confirmation_fields()).unwrap();
    body["auto_match"] = json!(true);
    ingest(&app, CLIENT, body).await;

    let handle = start_automation_sweeper(db.clone(), notifier.clone(), AutomationConfig::default());

    let mut fired = false;
    for _ in 0..40 {
        if !notifier.sent().is_empty() {
            fired = true;
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    }
    handle.abort();

    assert!(fired, "sweeper should fire the due confirm action");
    assert_eq!(notifier.sent().len(), 1);
    assert_eq!(db.require_trade(CLIENT, trade_id).unwrap().status, TradeStatus::Confirmed);
}

// ========== Audit Tests ==========

#[tokio::test]
async fn test_mutations_are_audited_with_actor() {
    let (app, _, _) = setup_test_app();
    create_trade(&app, CLIENT).await;

    let response = send(&app, "GET", &client_uri(CLIENT, "/audit?limit=10"), None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let entries = get_body_json(response).await;
    let create = entries
        .as_array()
        .unwrap()
        .iter()
        .find(|e| e["action"] == "create" && e["entity_type"] == "trade")
        .unwrap();
    assert_eq!(create["actor"], "ops@acme.example");
    assert_eq!(create["client_id"], CLIENT);
}

#[tokio::test]
async fn test_audit_trail_is_per_client() {
    let (app, _, _) = setup_test_app();
    create_trade(&app, CLIENT).await;
    create_trade(&app, OTHER_CLIENT).await;
    create_trade(&app, OTHER_CLIENT).await;

    let response = send(&app, "GET", &client_uri(CLIENT, "/audit?action=create"), None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let entries = get_body_json(response).await;
    let entries = entries.as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["client_id"], CLIENT);

    // The earlier read shows up on the reader's own trail only
    let response = send(&app, "GET", &client_uri(CLIENT, "/audit?action=view_audit"), None).await;
    assert_eq!(get_body_json(response).await.as_array().unwrap().len(), 1);
    let response = send(&app, "GET", &client_uri(OTHER_CLIENT, "/audit?action=view_audit"), None).await;
    assert!(get_body_json(response).await.as_array().unwrap().is_empty());

    let response = send(&app, "GET", "/api/audit", None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_client_locks_drop_idle_entries() {
    let locks = ClientLocks::default();

    let held = locks.lock("acme").await;
    drop(locks.lock("globex").await);
    assert_eq!(locks.tracked(), 2);

    // globex is idle and goes; acme is still held and stays
    drop(locks.lock("initech").await);
    assert_eq!(locks.tracked(), 2);

    drop(held);
    drop(locks.lock("initech").await);
    assert_eq!(locks.tracked(), 1);
}

#[test]
fn test_get_actor_default() {
    let headers = HeaderMap::new();
    assert_eq!(get_actor(&headers), "api");
}
