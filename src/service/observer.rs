//! Queries launchd for the live registration of a label

use std::sync::Arc;

use tracing::{debug, warn};

use crate::process::{CommandLine, ProcessError, ProcessRunner, LAUNCHCTL};

/// Reads registration state from `launchctl list <label>`
pub struct StatusObserver<R> {
    runner: Arc<R>,
}

impl<R: ProcessRunner> StatusObserver<R> {
    pub fn new(runner: Arc<R>) -> Self {
        Self { runner }
    }

    /// Whether `label` is registered. The check is a plain substring match
    /// on the listing; a non-zero exit means not registered. Errors only
    /// when the query command itself could not be run.
    pub async fn query(&self, label: &str) -> Result<bool, ProcessError> {
        let command = CommandLine::new(LAUNCHCTL).arg("list").arg(label);
        let output = self.runner.run(&command).await?;

        // launchctl names the label on stderr when it is *not* loaded
        let registered = output.success() && output.stdout.contains(label);
        debug!(label, registered, code = ?output.code, "registration queried");
        Ok(registered)
    }

    /// Like [`query`](Self::query), with a failed query read as not registered
    pub async fn is_registered(&self, label: &str) -> bool {
        match self.query(label).await {
            Ok(registered) => registered,
            Err(e) => {
                warn!(?e, label, "status query failed, treating as not registered");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeLaunchd, RecordingRunner};

    const LABEL: &str = "com.hangulcommand.userkeymapping";

    #[tokio::test]
    async fn test_registered_label() {
        let launchd = FakeLaunchd::new();
        launchd.register(LABEL);
        let observer = StatusObserver::new(Arc::new(launchd.runner()));

        assert!(observer.query(LABEL).await.unwrap());
        assert!(observer.is_registered(LABEL).await);
    }

    #[tokio::test]
    async fn test_unregistered_label_mentioned_on_stderr() {
        let launchd = FakeLaunchd::new();
        let observer = StatusObserver::new(Arc::new(launchd.runner()));

        assert!(!observer.query(LABEL).await.unwrap());
        assert!(!observer.is_registered(LABEL).await);
    }

    #[tokio::test]
    async fn test_failed_query_is_not_registered() {
        let observer = StatusObserver::new(Arc::new(RecordingRunner::unspawnable()));

        assert!(observer.query(LABEL).await.is_err());
        assert!(!observer.is_registered(LABEL).await);
    }

    #[tokio::test]
    async fn test_query_command() {
        let runner = Arc::new(RecordingRunner::succeeding());
        let observer = StatusObserver::new(Arc::clone(&runner));
        observer.is_registered(LABEL).await;

        let calls = runner.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].program(), LAUNCHCTL);
        assert_eq!(calls[0].arguments(), &["list".to_string(), LABEL.to_string()]);
    }
}
