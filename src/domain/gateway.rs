use {
    super::error::GatewayError,
    super::payment::{PaymentItem, ReconcileOutcome},
    std::{future::Future, pin::Pin},
};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A payment gateway as the engines see it.
///
/// `send_payment` returns `Ok(())` only when the gateway definitively accepted
/// the transfer; the item then carries the gateway transaction id. Every other
/// answer is recorded on the item and surfaced as an error value, so the
/// caller can classify it without the connector ever panicking.
pub trait GatewayConnector: Send + Sync {
    fn name(&self) -> &'static str;

    /// Called once before each dispatch batch.
    fn prepare_batch(&self) -> BoxFuture<'_, Result<(), GatewayError>> {
        Box::pin(async { Ok(()) })
    }

    fn send_payment<'a>(
        &'a self,
        item: &'a mut PaymentItem,
    ) -> BoxFuture<'a, Result<(), GatewayError>>;

    fn reconcile<'a>(
        &'a self,
        item: &'a mut PaymentItem,
    ) -> BoxFuture<'a, Result<ReconcileOutcome, GatewayError>>;
}

/// Downstream collaborator that moves accepted items to its own
/// "approved for payment" state.
pub trait PaymentApprover: Send + Sync {
    fn approve_for_payment<'a>(
        &'a self,
        items: &'a [PaymentItem],
    ) -> BoxFuture<'a, Result<(), GatewayError>>;
}
