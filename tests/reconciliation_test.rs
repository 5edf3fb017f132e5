mod common;

use common::*;
use payout_gateway::adapters::{ConnectorRegistry, TokenAuthConnector};
use payout_gateway::domain::error::GatewayError;
use payout_gateway::domain::gateway::GatewayConnector;
use payout_gateway::domain::payment::{PaymentStatus, ReconcileOutcome};
use payout_gateway::infra::http::{HttpResponse, RetryPolicy, Retrying};
use payout_gateway::services::ReconciliationEngine;
use serde_json::json;
use std::sync::Arc;

#[tokio::test]
async fn reconcile_twice_is_idempotent() {
    let mock = mock();
    mock.add_response(TOKEN, token_ok("tok-recon-0001"));
    for _ in 0..2 {
        mock.add_response(&settlement_key("BEN-1"), Ok(settled(json!(100.004), "IBB-1")));
    }
    let engine = ReconciliationEngine::new(
        ConnectorRegistry::build(token_config(), Arc::new(mock.clone())),
        4,
    );

    let first = engine.reconcile(vec![accepted_item("BEN-1", "100.00")]).await;
    assert_eq!(first.entries[0].outcome, Some(ReconcileOutcome::Reconciled));
    let reconciled = first.into_items();
    assert_eq!(reconciled[0].status(), PaymentStatus::Reconciled);

    let snapshot = reconciled[0].clone();
    let second = engine.reconcile(reconciled).await;

    assert_eq!(
        second.entries[0].outcome,
        Some(ReconcileOutcome::AlreadyReconciled)
    );
    assert_eq!(second.entries[0].item, snapshot);
    assert_eq!(mock.calls_to(TOKEN).len(), 1);
}

#[tokio::test]
async fn tolerance_decides_match_or_mismatch() {
    let mock = mock();
    mock.add_response(TOKEN, token_ok("tok-recon-0001"));
    mock.add_response(&settlement_key("BEN-OK"), Ok(settled(json!("100.004"), "IBB-OK")));
    mock.add_response(&settlement_key("BEN-OFF"), Ok(settled(json!(100.02), "IBB-OFF")));
    let engine = ReconciliationEngine::new(
        ConnectorRegistry::build(token_config(), Arc::new(mock.clone())),
        2,
    );

    let report = engine
        .reconcile(vec![
            accepted_item("BEN-OK", "100.00"),
            accepted_item("BEN-OFF", "100.00"),
        ])
        .await;

    let summary = report.summary();
    assert_eq!(summary.reconciled, 1);
    assert_eq!(summary.mismatched, 1);

    let off = &report.entries[1].item;
    assert_eq!(off.status(), PaymentStatus::ReconciliationFailed);
    assert_eq!(
        off.reconciliation_response().unwrap()["error_message"],
        "Amount mismatch: expected 100.00, got 100.02"
    );
    assert!(!report.entries[1].outcome.as_ref().unwrap().is_reconciled());
}

#[tokio::test]
async fn unsettled_transaction_keeps_accepted_status() {
    let mock = mock();
    mock.add_response(TOKEN, token_ok("tok-recon-0001"));
    mock.add_response(
        &settlement_key("BEN-9"),
        Ok(HttpResponse::json(200, json!({ "status": "404", "statusDesc": "Not found" }))),
    );
    let connector = TokenAuthConnector::new(token_config(), Arc::new(mock.clone()));
    let mut item = accepted_item("BEN-9", "10");

    let outcome = connector.reconcile(&mut item).await.unwrap();

    assert_eq!(
        outcome,
        ReconcileOutcome::NotSettled {
            gateway_status: Some("404".into())
        }
    );
    assert_eq!(item.status(), PaymentStatus::Accepted);
    assert_eq!(item.reconciliation_response().unwrap()["statusDesc"], "Not found");
}

#[tokio::test]
async fn transport_failure_is_surfaced_not_reconciled() {
    let mock = mock();
    mock.add_response(TOKEN, token_ok("tok-recon-0001"));
    mock.add_response(
        &settlement_key("BEN-5"),
        Err(GatewayError::Transport("connection reset".into())),
    );
    let engine = ReconciliationEngine::new(
        ConnectorRegistry::build(token_config(), Arc::new(mock.clone())),
        2,
    );

    let report = engine.reconcile(vec![accepted_item("BEN-5", "10")]).await;

    let entry = &report.entries[0];
    assert!(entry.outcome.is_none());
    assert!(entry.error.as_deref().unwrap().contains("connection reset"));
    assert_eq!(entry.item.status(), PaymentStatus::Accepted);
    assert_eq!(report.summary().failed, 1);
}

#[tokio::test(start_paused = true)]
async fn lookup_rides_out_a_server_error() {
    let mock = mock();
    mock.add_response(TOKEN, token_ok("tok-recon-0001"));
    mock.add_response(&settlement_key("BEN-6"), Ok(HttpResponse::new(503, "busy")));
    mock.add_response(&settlement_key("BEN-6"), Ok(settled(json!(250), "IBB-6")));
    let transport = Retrying::new(mock.clone(), RetryPolicy::default());
    let connector = TokenAuthConnector::new(token_config(), Arc::new(transport));
    let mut item = accepted_item("BEN-6", "250");

    let outcome = connector.reconcile(&mut item).await.unwrap();

    assert_eq!(outcome, ReconcileOutcome::Reconciled);
    assert_eq!(mock.calls_to(&settlement_key("BEN-6")).len(), 2);
}

#[tokio::test]
async fn signature_gateway_reports_unsupported() {
    let mock = mock();
    let engine = ReconciliationEngine::new(
        ConnectorRegistry::build(signature_config(), Arc::new(mock.clone())),
        2,
    );

    let report = engine
        .reconcile(vec![accepted_item("BEN-7", "10"), item("BEN-8", "10")])
        .await;

    assert_eq!(report.entries[0].outcome, Some(ReconcileOutcome::Unsupported));
    assert_eq!(report.entries[1].outcome, Some(ReconcileOutcome::Skipped));
    assert_eq!(report.entries[0].item.status(), PaymentStatus::Accepted);
    assert_eq!(mock.call_count(), 0);
}
