//! Lead distribution and the background jobs around it.
//!
//! - Engine (routes a new lead to its subscribers)
//! - Sweeper (delivers deferred distributions once due)
//! - Ingestion (documents → leads)
//! - Reconciliation (paid customers → live billing state)
//! - Accounts (onboarding, billing webhook events)
//! - Alerts (admin mail for permanently failed jobs)

pub mod accounts;
pub mod alerts;
pub mod engine;
pub mod ingestion;
pub mod jobs;
pub mod reconciliation;
pub mod scheduler;
pub mod sweeper;

pub use accounts::{AccountService, EventEffect};
pub use alerts::AdminAlertReporter;
pub use engine::{DistributionEngine, DistributionOutcome};
pub use ingestion::{IngestionJob, IngestionSummary};
pub use jobs::*;
pub use reconciliation::{PaymentReconciler, ReconcileSummary};
pub use scheduler::*;
pub use sweeper::{SweepSummary, Sweeper};
