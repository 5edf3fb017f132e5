pub mod dispatch;
pub mod reconciliation;
pub mod worker;

pub use dispatch::{CollectingApprover, DispatchEngine, DispatchReport};
pub use reconciliation::{ReconciliationEngine, ReconciliationReport, ReconciliationSummary};
