//! Admin alerts for permanently failed jobs.

use async_trait::async_trait;
use integrations::NotificationSender;
use jobq::{FailureReporter, PermanentFailure};
use std::sync::Arc;
use tracing::{info, warn};

/// Mails the operator when a job will not run again.
pub struct AdminAlertReporter {
    mailer: Arc<dyn NotificationSender>,
    admin_email: String,
}

impl AdminAlertReporter {
    pub fn new(mailer: Arc<dyn NotificationSender>, admin_email: impl Into<String>) -> Self {
        Self {
            mailer,
            admin_email: admin_email.into(),
        }
    }
}

/// Subject line and body for a failure alert.
pub fn render_alert(failure: &PermanentFailure) -> (String, String) {
    let subject = format!("{} job {} failed", failure.queue, failure.kind.as_str());
    let mut details = format!(
        "Job: {}\nQueue: {}\nKind: {}\nAttempts: {}\nError: {}\n",
        failure.job_id,
        failure.queue,
        failure.kind.as_str(),
        failure.attempts,
        failure.error,
    );
    if let Some(entity) = &failure.entity {
        details.push_str(&format!("Entity: {entity}\n"));
    }
    details.push_str(&format!("Payload: {}\n", failure.payload));
    (subject, details)
}

#[async_trait]
impl FailureReporter for AdminAlertReporter {
    async fn report(&self, failure: &PermanentFailure) {
        let (subject, details) = render_alert(failure);
        match self
            .mailer
            .send_error_alert(&self.admin_email, &subject, &details)
            .await
        {
            Ok(()) => info!(job_id = %failure.job_id, "Admin alert sent"),
            Err(e) => {
                telemetry::metrics().notifications_failed.inc();
                warn!(job_id = %failure.job_id, error = %e, "Failed to send admin alert");
            }
        }
    }
}
