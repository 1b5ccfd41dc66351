//! Durable job queue for the lead router.
//!
//! - [`QueueRuntime`] owns one worker pool per [`QueueName`] and the
//!   recurring-trigger scheduler
//! - [`QueueStore`] persists jobs; [`PgQueueStore`] for production,
//!   [`MemoryQueueStore`] for development and tests
//! - handlers return a [`JobResult`]; a [`JobFailure::Terminal`] skips the
//!   remaining attempts
//!
//! Delivery is at-least-once: a worker that dies mid-job leaves a lock that
//! expires after `lock_ttl`, and the job is claimed again.

pub mod backoff;
pub mod entry;
pub mod error;
pub mod memory;
pub mod outcome;
pub mod postgres;
pub mod report;
pub mod runtime;
pub mod schedule;
pub mod store;

pub use backoff::{BackoffPolicy, BackoffStrategy};
pub use entry::{FailureDisposition, JobEntry, JobHandle, JobOpts, JobStatus, QueueName};
pub use error::QueueError;
pub use memory::MemoryQueueStore;
pub use outcome::{JobContext, JobFailure, JobHandler, JobResult};
pub use postgres::PgQueueStore;
pub use report::{entity_ref, FailureKind, FailureReporter, PermanentFailure};
pub use runtime::{QueueRuntime, RuntimeConfig};
pub use schedule::Schedule;
pub use store::{QueueCounts, QueueStore, RecurringTrigger};
