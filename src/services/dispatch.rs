//! Batch dispatch of pending payment items.
//!
//! Items are cut into fixed-size batches. Each batch starts with one
//! `prepare_batch` call on the connector (a forced token refresh for
//! token-auth gateways), then fans out over a bounded worker pool and waits
//! for every item. Accepted items are handed to the approver in one call once
//! all batches are done.

use {
    super::worker::{WorkerPanic, run_bounded},
    crate::{
        config::DispatchConfig,
        domain::{
            error::GatewayError,
            gateway::{BoxFuture, GatewayConnector, PaymentApprover},
            id::InvoiceCode,
            payment::{BatchResult, PaymentItem, PaymentStatus},
        },
    },
    parking_lot::Mutex,
    serde::Serialize,
    std::sync::Arc,
    uuid::Uuid,
};

#[derive(Debug, Serialize)]
pub struct DispatchReport {
    pub run_id: Uuid,
    /// One entry per input item, in input order.
    pub results: Vec<BatchResult>,
    pub approved: Vec<InvoiceCode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approval_error: Option<String>,
}

impl DispatchReport {
    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|r| r.success).count()
    }

    pub fn failed(&self) -> usize {
        self.results.len() - self.succeeded()
    }

    pub fn into_items(self) -> Vec<PaymentItem> {
        self.results.into_iter().map(|r| r.item).collect()
    }
}

pub struct DispatchEngine {
    connector: Arc<dyn GatewayConnector>,
    approver: Arc<dyn PaymentApprover>,
    config: DispatchConfig,
}

impl DispatchEngine {
    pub fn new(
        connector: Arc<dyn GatewayConnector>,
        approver: Arc<dyn PaymentApprover>,
        config: DispatchConfig,
    ) -> Self {
        Self {
            connector,
            approver,
            config,
        }
    }

    pub async fn dispatch(&self, items: Vec<PaymentItem>) -> DispatchReport {
        self.run(Uuid::now_v7(), items).await
    }

    #[tracing::instrument(
        skip_all,
        fields(run_id = %run_id, gateway = self.connector.name(), items = items.len())
    )]
    async fn run(&self, run_id: Uuid, items: Vec<PaymentItem>) -> DispatchReport {
        let batch_size = self.config.batch_size.max(1);
        let workers = self.config.workers();
        let mut results = Vec::with_capacity(items.len());

        let mut remaining = items.into_iter().peekable();
        let mut batch_no = 0usize;
        while remaining.peek().is_some() {
            let batch: Vec<PaymentItem> = remaining.by_ref().take(batch_size).collect();
            batch_no += 1;

            if let Err(e) = self.connector.prepare_batch().await {
                tracing::warn!(batch = batch_no, error = %e, "batch preparation failed");
            }

            let outcomes = run_bounded(batch, workers, |item| {
                send_one(self.connector.clone(), item)
            })
            .await;
            let before = results.len();
            results.extend(outcomes.into_iter().map(into_batch_result));

            let accepted = results[before..].iter().filter(|r| r.success).count();
            tracing::info!(
                batch = batch_no,
                size = results.len() - before,
                accepted,
                "batch dispatched"
            );
        }

        let approved_items: Vec<PaymentItem> = results
            .iter()
            .filter(|r| r.success)
            .map(|r| r.item.clone())
            .collect();
        let approved = approved_items.iter().map(|i| i.code().clone()).collect();

        let approval_error = if approved_items.is_empty() {
            None
        } else {
            match self.approver.approve_for_payment(&approved_items).await {
                Ok(()) => None,
                Err(e) => {
                    tracing::error!(error = %e, count = approved_items.len(), "approval hand-off failed");
                    Some(e.to_string())
                }
            }
        };

        let report = DispatchReport {
            run_id,
            results,
            approved,
            approval_error,
        };
        tracing::info!(
            succeeded = report.succeeded(),
            failed = report.failed(),
            "dispatch run finished"
        );
        report
    }
}

async fn send_one(
    connector: Arc<dyn GatewayConnector>,
    mut item: PaymentItem,
) -> (PaymentItem, Result<(), GatewayError>) {
    if item.status() != PaymentStatus::Pending {
        let err = GatewayError::Validation(format!("item is {}, not pending", item.status()));
        return (item, Err(err));
    }
    let result = connector.send_payment(&mut item).await;
    (item, result)
}

fn into_batch_result(
    outcome: Result<(PaymentItem, Result<(), GatewayError>), WorkerPanic<PaymentItem>>,
) -> BatchResult {
    match outcome {
        Ok((item, Ok(()))) => BatchResult {
            response: item.payment_response().cloned(),
            item,
            success: true,
            error: None,
        },
        Ok((item, Err(e))) => {
            if e.is_transient() {
                tracing::warn!(invoice = %item.code(), error = %e, "payment not sent, left pending");
            } else {
                tracing::warn!(invoice = %item.code(), status = %item.status(), error = %e, "payment failed");
            }
            BatchResult {
                response: item.payment_response().cloned(),
                item,
                success: false,
                error: Some(e.to_string()),
            }
        }
        Err(WorkerPanic { mut input, message }) => {
            input.record_failure(format!("dispatch task failed: {message}"));
            BatchResult {
                response: None,
                item: input,
                success: false,
                error: Some(message),
            }
        }
    }
}

/// Approver that keeps what it was given. Used by the CLI, which prints the
/// approved set instead of forwarding it.
#[derive(Default)]
pub struct CollectingApprover {
    approved: Mutex<Vec<PaymentItem>>,
    calls: Mutex<usize>,
}

impl CollectingApprover {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn approved(&self) -> Vec<PaymentItem> {
        self.approved.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        *self.calls.lock()
    }
}

impl PaymentApprover for CollectingApprover {
    fn approve_for_payment<'a>(
        &'a self,
        items: &'a [PaymentItem],
    ) -> BoxFuture<'a, Result<(), GatewayError>> {
        Box::pin(async move {
            *self.calls.lock() += 1;
            self.approved.lock().extend_from_slice(items);
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::domain::{money::Amount, payment::ReconcileOutcome},
        rust_decimal::Decimal,
        serde_json::json,
        std::sync::atomic::{AtomicUsize, Ordering},
    };

    /// Accepts even-numbered codes, rejects the rest.
    struct ParityConnector {
        prepared: AtomicUsize,
    }

    impl GatewayConnector for ParityConnector {
        fn name(&self) -> &'static str {
            "parity"
        }

        fn prepare_batch(&self) -> BoxFuture<'_, Result<(), GatewayError>> {
            Box::pin(async move {
                self.prepared.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
        }

        fn send_payment<'a>(
            &'a self,
            item: &'a mut PaymentItem,
        ) -> BoxFuture<'a, Result<(), GatewayError>> {
            Box::pin(async move {
                let n: u32 = item.code().suffix(3).parse().unwrap_or(1);
                if n % 2 == 0 {
                    item.record_acceptance(Some(format!("TX-{n}")), json!({"ok": true}))
                } else {
                    item.record_rejection(json!({"ok": false}), "odd")?;
                    Err(GatewayError::rejected(Some("odd"), "odd"))
                }
            })
        }

        fn reconcile<'a>(
            &'a self,
            _item: &'a mut PaymentItem,
        ) -> BoxFuture<'a, Result<ReconcileOutcome, GatewayError>> {
            Box::pin(async { Ok(ReconcileOutcome::Unsupported) })
        }
    }

    fn items(n: u32) -> Vec<PaymentItem> {
        (0..n)
            .map(|i| {
                PaymentItem::new(
                    InvoiceCode::new(format!("BEN-{i:03}")).unwrap(),
                    Amount::new(Decimal::from(1000 + i)).unwrap(),
                    "79000000",
                )
            })
            .collect()
    }

    #[tokio::test]
    async fn approves_exactly_the_accepted_items() {
        let connector = Arc::new(ParityConnector {
            prepared: AtomicUsize::new(0),
        });
        let approver = Arc::new(CollectingApprover::new());
        let engine = DispatchEngine::new(
            connector.clone(),
            approver.clone(),
            DispatchConfig {
                batch_size: 4,
                max_workers: 3,
            },
        );

        let report = engine.dispatch(items(10)).await;

        assert_eq!(report.results.len(), 10);
        assert_eq!(report.succeeded(), 5);
        assert_eq!(connector.prepared.load(Ordering::SeqCst), 3);
        assert_eq!(approver.call_count(), 1);
        let codes: Vec<String> = approver
            .approved()
            .iter()
            .map(|i| i.code().to_string())
            .collect();
        assert_eq!(
            codes,
            vec!["BEN-000", "BEN-002", "BEN-004", "BEN-006", "BEN-008"]
        );
        for (i, result) in report.results.iter().enumerate() {
            assert_eq!(result.item.code().to_string(), format!("BEN-{i:03}"));
        }
    }

    #[tokio::test]
    async fn non_pending_items_are_not_sent() {
        let connector = Arc::new(ParityConnector {
            prepared: AtomicUsize::new(0),
        });
        let approver = Arc::new(CollectingApprover::new());
        let engine = DispatchEngine::new(connector, approver.clone(), DispatchConfig::default());

        let mut batch = items(1);
        batch[0].record_acceptance(Some("TX-OLD".into()), json!({})).unwrap();
        let report = engine.dispatch(batch).await;

        assert!(!report.results[0].success);
        assert_eq!(report.results[0].item.transaction_id(), Some("TX-OLD"));
        assert_eq!(approver.call_count(), 0);
    }

    #[tokio::test]
    async fn empty_run_skips_the_approver() {
        let approver = Arc::new(CollectingApprover::new());
        let engine = DispatchEngine::new(
            Arc::new(ParityConnector {
                prepared: AtomicUsize::new(0),
            }),
            approver.clone(),
            DispatchConfig::default(),
        );

        let report = engine.dispatch(Vec::new()).await;

        assert!(report.results.is_empty());
        assert_eq!(approver.call_count(), 0);
    }
}
