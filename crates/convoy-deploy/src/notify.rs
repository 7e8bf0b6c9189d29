//! Notification side channel for deployment outcomes.
//!
//! Post-submission failures are never pushed back to the original
//! caller; they surface through the deployment-status read path and
//! through a [`Notifier`]. The default implementation logs through
//! tracing; tests use [`CapturingNotifier`] to assert on emissions.

use std::sync::Mutex;

use tracing::{error, info};

pub trait Notifier: Send + Sync + 'static {
    fn failure(&self, message: &str);
    fn recovery(&self, message: &str);
}

/// Default notifier: structured log lines, nothing else.
#[derive(Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn failure(&self, message: &str) {
        error!(%message, "deployment failure");
    }

    fn recovery(&self, message: &str) {
        info!(%message, "deployment recovery");
    }
}

/// Records every notification for later assertion.
#[derive(Debug, Default)]
pub struct CapturingNotifier {
    failures: Mutex<Vec<String>>,
    recoveries: Mutex<Vec<String>>,
}

impl CapturingNotifier {
    pub fn failures(&self) -> Vec<String> {
        self.failures.lock().unwrap().clone()
    }

    pub fn recoveries(&self) -> Vec<String> {
        self.recoveries.lock().unwrap().clone()
    }
}

impl Notifier for CapturingNotifier {
    fn failure(&self, message: &str) {
        self.failures.lock().unwrap().push(message.to_string());
    }

    fn recovery(&self, message: &str) {
        self.recoveries.lock().unwrap().push(message.to_string());
    }
}
