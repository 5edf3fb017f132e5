use {
    super::worker::{WorkerPanic, run_bounded},
    crate::domain::{
        error::GatewayError,
        gateway::GatewayConnector,
        payment::{PaymentItem, ReconcileOutcome},
    },
    serde::Serialize,
    std::sync::Arc,
    uuid::Uuid,
};

#[derive(Debug, Serialize)]
pub struct ReconciliationEntry {
    pub item: PaymentItem,
    /// `None` when the settlement check itself failed; see `error`.
    pub outcome: Option<ReconcileOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReconciliationSummary {
    pub reconciled: usize,
    pub already_reconciled: usize,
    pub mismatched: usize,
    pub not_settled: usize,
    pub unsupported: usize,
    pub skipped: usize,
    pub failed: usize,
}

#[derive(Debug, Serialize)]
pub struct ReconciliationReport {
    pub run_id: Uuid,
    pub entries: Vec<ReconciliationEntry>,
}

impl ReconciliationReport {
    pub fn summary(&self) -> ReconciliationSummary {
        let mut summary = ReconciliationSummary::default();
        for entry in &self.entries {
            match &entry.outcome {
                Some(ReconcileOutcome::Reconciled) => summary.reconciled += 1,
                Some(ReconcileOutcome::AlreadyReconciled) => summary.already_reconciled += 1,
                Some(ReconcileOutcome::Mismatch { .. }) => summary.mismatched += 1,
                Some(ReconcileOutcome::NotSettled { .. }) => summary.not_settled += 1,
                Some(ReconcileOutcome::Unsupported) => summary.unsupported += 1,
                Some(ReconcileOutcome::Skipped) => summary.skipped += 1,
                None => summary.failed += 1,
            }
        }
        summary
    }

    pub fn into_items(self) -> Vec<PaymentItem> {
        self.entries.into_iter().map(|e| e.item).collect()
    }
}

/// Verifies settlement of items believed paid. Items in any other state are
/// reported as skipped without a gateway call. Failed checks leave the item
/// as it was, for a later pass.
pub struct ReconciliationEngine {
    connector: Arc<dyn GatewayConnector>,
    workers: usize,
}

impl ReconciliationEngine {
    pub fn new(connector: Arc<dyn GatewayConnector>, workers: usize) -> Self {
        Self {
            connector,
            workers: workers.max(1),
        }
    }

    pub async fn reconcile(&self, items: Vec<PaymentItem>) -> ReconciliationReport {
        self.run(Uuid::now_v7(), items).await
    }

    #[tracing::instrument(
        skip_all,
        fields(run_id = %run_id, gateway = self.connector.name(), items = items.len())
    )]
    async fn run(&self, run_id: Uuid, items: Vec<PaymentItem>) -> ReconciliationReport {
        let outcomes = run_bounded(items, self.workers, |item| {
            check_one(self.connector.clone(), item)
        })
        .await;

        let report = ReconciliationReport {
            run_id,
            entries: outcomes.into_iter().map(into_entry).collect(),
        };
        let summary = report.summary();
        tracing::info!(
            reconciled = summary.reconciled,
            mismatched = summary.mismatched,
            not_settled = summary.not_settled,
            failed = summary.failed,
            skipped = summary.skipped,
            "reconciliation run finished"
        );
        report
    }
}

async fn check_one(
    connector: Arc<dyn GatewayConnector>,
    mut item: PaymentItem,
) -> (PaymentItem, Result<ReconcileOutcome, GatewayError>) {
    if !item.status().is_believed_paid() {
        return (item, Ok(ReconcileOutcome::Skipped));
    }
    let result = connector.reconcile(&mut item).await;
    (item, result)
}

fn into_entry(
    outcome: Result<(PaymentItem, Result<ReconcileOutcome, GatewayError>), WorkerPanic<PaymentItem>>,
) -> ReconciliationEntry {
    match outcome {
        Ok((item, Ok(outcome))) => ReconciliationEntry {
            item,
            outcome: Some(outcome),
            error: None,
        },
        Ok((item, Err(e))) => {
            tracing::warn!(invoice = %item.code(), error = %e, "settlement check failed");
            ReconciliationEntry {
                item,
                outcome: None,
                error: Some(e.to_string()),
            }
        }
        Err(WorkerPanic { input, message }) => ReconciliationEntry {
            item: input,
            outcome: None,
            error: Some(message),
        },
    }
}
