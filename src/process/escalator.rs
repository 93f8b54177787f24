//! Privileged execution behind one administrator consent prompt
//!
//! A transaction is an ordered list of structured steps. The escalator
//! composes them into a single shell command line and hands that line to
//! the system once, so the user is asked for consent exactly once.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use shlex::QuoteError;
use tracing::{debug, error, info, warn};

use super::quote;
use super::runner::{CommandLine, ProcessRunner};

/// Service manager used for activation and status queries
pub const LAUNCHCTL: &str = "/bin/launchctl";

const OSASCRIPT: &str = "/usr/bin/osascript";

/// One privileged filesystem or service-manager operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrivilegedStep {
    /// Create a directory and its parents; failure is ignored
    CreateDir(PathBuf),
    /// Move a file into place
    Move { from: PathBuf, to: PathBuf },
    /// Set the owning user and group of a file
    ChangeOwner {
        path: PathBuf,
        owner: String,
        group: String,
    },
    /// Deactivate whatever job a descriptor file describes; a job that is
    /// not loaded is fine
    UnloadService(PathBuf),
    /// Activate the agent described by a descriptor file
    LoadService(PathBuf),
    /// Deactivate the agent with this label; an absent agent is fine
    RemoveService(String),
    /// Delete a file; an absent file is fine
    RemoveFile(PathBuf),
}

impl PrivilegedStep {
    /// The command this step runs
    pub fn command(&self) -> CommandLine {
        match self {
            Self::CreateDir(path) => CommandLine::new("/bin/mkdir").arg("-p").arg(path_arg(path)),
            Self::Move { from, to } => CommandLine::new("/bin/mv")
                .arg("-f")
                .arg(path_arg(from))
                .arg(path_arg(to)),
            Self::ChangeOwner { path, owner, group } => CommandLine::new("/usr/sbin/chown")
                .arg(format!("{owner}:{group}"))
                .arg(path_arg(path)),
            Self::UnloadService(path) => {
                CommandLine::new(LAUNCHCTL).arg("unload").arg(path_arg(path))
            }
            Self::LoadService(path) => CommandLine::new(LAUNCHCTL).arg("load").arg(path_arg(path)),
            Self::RemoveService(label) => CommandLine::new(LAUNCHCTL).arg("remove").arg(label),
            Self::RemoveFile(path) => CommandLine::new("/bin/rm").arg("-f").arg(path_arg(path)),
        }
    }

    /// Whether a failure of this step must not abort the transaction
    pub fn tolerates_failure(&self) -> bool {
        matches!(
            self,
            Self::CreateDir(_)
                | Self::UnloadService(_)
                | Self::RemoveService(_)
                | Self::RemoveFile(_)
        )
    }
}

fn path_arg(path: &std::path::Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Ordered steps executed under a single consent prompt
///
/// There is no per-step rollback: the first strict step that fails stops
/// the transaction and the whole transaction is reported failed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrivilegedTransaction {
    steps: Vec<PrivilegedStep>,
}

impl PrivilegedTransaction {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn step(mut self, step: PrivilegedStep) -> Self {
        self.steps.push(step);
        self
    }

    pub fn steps(&self) -> &[PrivilegedStep] {
        &self.steps
    }

    /// Compose the steps into one shell command line
    pub fn to_shell(&self) -> Result<String, QuoteError> {
        let mut parts = Vec::with_capacity(self.steps.len());
        for step in &self.steps {
            let command = step.command();
            let line = quote::shell_join(command.argv())?;
            if step.tolerates_failure() {
                parts.push(format!("{{ {line} 2>/dev/null || true; }}"));
            } else {
                parts.push(line);
            }
        }
        Ok(parts.join(" && "))
    }
}

/// Executes privileged transactions
pub trait PrivilegeEscalator: Send + Sync + 'static {
    /// Run the transaction as one composed shell command under elevated
    /// privilege. True only when the execution mechanism reports no error;
    /// inner exit codes are not inspected.
    fn run_elevated(&self, transaction: &PrivilegedTransaction) -> impl Future<Output = bool> + Send;
}

/// Escalates through AppleScript's `do shell script ... with administrator privileges`
pub struct OsascriptEscalator<R> {
    runner: Arc<R>,
}

impl<R: ProcessRunner> OsascriptEscalator<R> {
    pub fn new(runner: Arc<R>) -> Self {
        Self { runner }
    }

    /// Run one shell command line with administrator privileges
    pub async fn run_shell(&self, shell_command: &str) -> bool {
        let script = format!(
            "do shell script {} with administrator privileges",
            quote::applescript_string(shell_command)
        );
        let command = CommandLine::new(OSASCRIPT).arg("-e").arg(script);

        match self.runner.run(&command).await {
            Ok(output) if output.success() => {
                info!("privileged command completed");
                true
            }
            Ok(output) => {
                warn!(
                    code = ?output.code,
                    stderr = %output.stderr.trim(),
                    "privileged command failed or consent was declined"
                );
                false
            }
            Err(e) => {
                error!(?e, "failed to launch privilege escalation");
                false
            }
        }
    }
}

impl<R: ProcessRunner> PrivilegeEscalator for OsascriptEscalator<R> {
    async fn run_elevated(&self, transaction: &PrivilegedTransaction) -> bool {
        let shell_command = match transaction.to_shell() {
            Ok(line) => line,
            Err(e) => {
                error!(?e, "privileged transaction cannot be quoted");
                return false;
            }
        };
        debug!(%shell_command, steps = transaction.steps().len(), "escalating");
        self.run_shell(&shell_command).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingRunner;

    fn install_transaction() -> PrivilegedTransaction {
        PrivilegedTransaction::new()
            .step(PrivilegedStep::CreateDir("/Library/LaunchAgents".into()))
            .step(PrivilegedStep::Move {
                from: "/tmp/agent.plist".into(),
                to: "/Library/LaunchAgents/agent.plist".into(),
            })
            .step(PrivilegedStep::ChangeOwner {
                path: "/Library/LaunchAgents/agent.plist".into(),
                owner: "root".into(),
                group: "admin".into(),
            })
            .step(PrivilegedStep::LoadService("/Library/LaunchAgents/agent.plist".into()))
    }

    #[test]
    fn test_transaction_to_shell() {
        let line = install_transaction().to_shell().unwrap();
        assert_eq!(
            line,
            "{ /bin/mkdir -p /Library/LaunchAgents 2>/dev/null || true; } && \
             /bin/mv -f /tmp/agent.plist /Library/LaunchAgents/agent.plist && \
             /usr/sbin/chown root:admin /Library/LaunchAgents/agent.plist && \
             /bin/launchctl load /Library/LaunchAgents/agent.plist"
        );
    }

    #[test]
    fn test_removal_steps_tolerate_absence() {
        let tx = PrivilegedTransaction::new()
            .step(PrivilegedStep::RemoveService("com.example.agent".into()))
            .step(PrivilegedStep::RemoveFile("/Library/LaunchAgents/agent.plist".into()));
        assert!(tx.steps().iter().all(PrivilegedStep::tolerates_failure));

        let line = tx.to_shell().unwrap();
        assert!(line.contains("/bin/launchctl remove com.example.agent 2>/dev/null || true"));
        assert!(line.contains("/bin/rm -f /Library/LaunchAgents/agent.plist"));
    }

    #[test]
    fn test_unload_before_reload_is_tolerated() {
        let agent = "/Library/LaunchAgents/agent.plist";
        let tx = PrivilegedTransaction::new()
            .step(PrivilegedStep::UnloadService(agent.into()))
            .step(PrivilegedStep::LoadService(agent.into()));
        assert!(tx.steps()[0].tolerates_failure());
        assert!(!tx.steps()[1].tolerates_failure());
        assert_eq!(
            tx.to_shell().unwrap(),
            "{ /bin/launchctl unload /Library/LaunchAgents/agent.plist 2>/dev/null || true; } && \
             /bin/launchctl load /Library/LaunchAgents/agent.plist"
        );
    }

    #[test]
    fn test_hostile_path_is_quoted() {
        let tx = PrivilegedTransaction::new()
            .step(PrivilegedStep::RemoveFile("/tmp/x; rm -rf /".into()));
        let line = tx.to_shell().unwrap();
        assert!(!line.contains("/tmp/x; rm"));
    }

    #[tokio::test]
    async fn test_osascript_invocation() {
        let runner = Arc::new(RecordingRunner::succeeding());
        let escalator = OsascriptEscalator::new(Arc::clone(&runner));

        assert!(escalator.run_elevated(&install_transaction()).await);

        let calls = runner.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].program(), OSASCRIPT);
        assert_eq!(calls[0].arguments()[0], "-e");
        let script = &calls[0].arguments()[1];
        assert!(script.starts_with("do shell script \""));
        assert!(script.ends_with("\" with administrator privileges"));
        assert!(script.contains("/bin/launchctl load"));
    }

    #[tokio::test]
    async fn test_declined_consent_is_failure() {
        let runner = Arc::new(RecordingRunner::exiting(1, "execution error: User canceled. (-128)"));
        let escalator = OsascriptEscalator::new(runner);
        assert!(!escalator.run_elevated(&install_transaction()).await);
    }

    #[tokio::test]
    async fn test_spawn_failure_is_failure() {
        let runner = Arc::new(RecordingRunner::unspawnable());
        let escalator = OsascriptEscalator::new(runner);
        assert!(!escalator.run_shell("true").await);
    }
}
