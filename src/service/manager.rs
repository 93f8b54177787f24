//! Install and uninstall transactions for the remapping agent
//!
//! Enable writes the helper script, stages the descriptor, then moves it
//! into the protected agents directory and loads it inside one privileged
//! transaction. Disable unloads the agent and deletes both artifacts.
//!
//! Whatever the privileged step reports, the agent's state is re-read
//! from launchd afterwards and that reading decides the outcome.

use std::io;
use std::sync::Arc;

use tokio::sync::{broadcast, Mutex, OwnedMutexGuard};
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::descriptor::{
    discard_artifact, stage_descriptor, write_helper_script, HelperScript, ServiceDescriptor,
};
use crate::events::LifecycleEvent;
use crate::process::{PrivilegeEscalator, PrivilegedStep, PrivilegedTransaction, ProcessRunner};
use crate::state::{ServiceState, StateStore};

use super::error::{InstallError, Operation};
use super::observer::StatusObserver;

/// Owns the enable/disable lifecycle and keeps the [`StateStore`] in sync
/// with launchd. Cheap to clone; clones share the same busy guard.
pub struct ServiceLifecycleManager<R, E> {
    inner: Arc<Inner<R, E>>,
}

impl<R, E> Clone for ServiceLifecycleManager<R, E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct Inner<R, E> {
    config: Config,
    observer: StatusObserver<R>,
    escalator: E,
    store: StateStore,
    event_tx: broadcast::Sender<LifecycleEvent>,
    /// Held for the whole of an enable/disable transaction
    transaction: Arc<Mutex<()>>,
}

/// Releases the busy guard and drops `loading` however the transaction ends
struct TransitionGuard {
    _lock: OwnedMutexGuard<()>,
    store: StateStore,
}

impl Drop for TransitionGuard {
    fn drop(&mut self) {
        self.store.clear_loading();
    }
}

impl<R: ProcessRunner, E: PrivilegeEscalator> ServiceLifecycleManager<R, E> {
    pub fn new(
        config: Config,
        observer: StatusObserver<R>,
        escalator: E,
        store: StateStore,
        event_tx: broadcast::Sender<LifecycleEvent>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                observer,
                escalator,
                store,
                event_tx,
                transaction: Arc::new(Mutex::new(())),
            }),
        }
    }

    pub fn store(&self) -> &StateStore {
        &self.inner.store
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Re-read the agent's state from launchd into the store.
    /// A failed query reads as disabled and records the error.
    pub async fn query_status(&self) -> ServiceState {
        let (state, query_error) = self.inner.observe().await;
        self.inner.store.refresh(state, query_error);
        state
    }

    /// Install the helper script and descriptor and load the agent.
    /// Re-running while enabled reinstalls everything.
    pub async fn enable(&self) -> Result<(), InstallError> {
        self.run(Operation::Enable).await
    }

    /// Unload the agent and delete its artifacts
    pub async fn disable(&self) -> Result<(), InstallError> {
        self.run(Operation::Disable).await
    }

    async fn run(&self, operation: Operation) -> Result<(), InstallError> {
        let guard = self.inner.begin(operation)?;

        // A dispatched transaction always runs to completion, even if the
        // caller stops waiting for it.
        let inner = Arc::clone(&self.inner);
        let task = tokio::spawn(async move {
            let _guard = guard;
            inner.transition(operation).await
        });

        match task.await {
            Ok(result) => result,
            Err(e) => {
                error!(?e, %operation, "lifecycle task did not complete");
                let err = InstallError::Interrupted(operation);
                self.inner.store.abort(err.to_string());
                self.inner.emit_failure(operation, &err);
                Err(err)
            }
        }
    }
}

impl<R: ProcessRunner, E: PrivilegeEscalator> Inner<R, E> {
    fn begin(&self, operation: Operation) -> Result<TransitionGuard, InstallError> {
        let lock = match Arc::clone(&self.transaction).try_lock_owned() {
            Ok(lock) => lock,
            Err(_) => {
                warn!(%operation, "rejected: another transition is in flight");
                let err = InstallError::Busy;
                self.emit_failure(operation, &err);
                return Err(err);
            }
        };

        self.store.begin();
        info!(%operation, label = %self.config.label, "transition started");
        self.emit(LifecycleEvent::TransitionStarted { operation });

        Ok(TransitionGuard {
            _lock: lock,
            store: self.store.clone(),
        })
    }

    async fn transition(&self, operation: Operation) -> Result<(), InstallError> {
        let transaction = match operation {
            Operation::Enable => match self.prepare_install().await {
                Ok(transaction) => transaction,
                Err(e) => {
                    warn!(?e, "install aborted before privileged step");
                    self.discard_install().await;
                    self.store.abort(e.to_string());
                    self.emit_failure(operation, &e);
                    return Err(e);
                }
            },
            Operation::Disable => self.uninstall_transaction(),
        };

        let escalated = self.escalator.run_elevated(&transaction).await;
        let (observed, query_error) = self.observe().await;

        let result = if observed == operation.target() {
            if !escalated {
                warn!(%operation, "privileged step reported failure but agent is {}", observed);
            }
            Ok(())
        } else if !escalated {
            Err(InstallError::PermissionDenied)
        } else {
            Err(InstallError::VerificationMismatch {
                operation,
                observed,
            })
        };

        match &result {
            Ok(()) => {
                self.store.finish(observed, query_error);
                info!(%operation, state = %observed, "transition succeeded");
                self.emit(LifecycleEvent::TransitionSucceeded {
                    operation,
                    state: observed,
                });
            }
            Err(e) => {
                if operation == Operation::Enable {
                    self.discard_install().await;
                }
                self.store.finish(observed, Some(e.to_string()));
                warn!(%operation, state = %observed, error = %e, "transition failed");
                self.emit_failure(operation, e);
            }
        }

        result
    }

    /// Write the unprivileged artifacts and build the install transaction
    async fn prepare_install(&self) -> Result<PrivilegedTransaction, InstallError> {
        let config = &self.config;
        let script_path = &config.script_path;

        let script = HelperScript::default()
            .render()
            .map_err(|e| InstallError::ScriptWriteFailed {
                path: script_path.clone(),
                source: io::Error::new(io::ErrorKind::InvalidInput, e),
            })?;
        write_helper_script(script_path, &script)
            .await
            .map_err(|source| InstallError::ScriptWriteFailed {
                path: script_path.clone(),
                source,
            })?;

        let descriptor =
            ServiceDescriptor::for_script(&config.label, script_path, config.descriptor_path());
        let staging = config.staging_path();
        stage_descriptor(&staging, &descriptor.render())
            .await
            .map_err(|source| InstallError::DescriptorWriteFailed {
                path: staging.clone(),
                source,
            })?;

        info!(script = ?script_path, staged = ?staging, "artifacts written");

        Ok(PrivilegedTransaction::new()
            .step(PrivilegedStep::CreateDir(config.agents_dir.clone()))
            .step(PrivilegedStep::UnloadService(descriptor.install_path.clone()))
            .step(PrivilegedStep::Move {
                from: staging,
                to: descriptor.install_path.clone(),
            })
            .step(PrivilegedStep::ChangeOwner {
                path: descriptor.install_path.clone(),
                owner: config.owner.clone(),
                group: config.group.clone(),
            })
            .step(PrivilegedStep::LoadService(descriptor.install_path)))
    }

    /// Clean up after a failed install. The staged descriptor always goes;
    /// the helper script stays while launchd may still run it.
    async fn discard_install(&self) {
        discard_artifact(&self.config.staging_path()).await;
        match self.observer.query(&self.config.label).await {
            Ok(false) => discard_artifact(&self.config.script_path).await,
            Ok(true) => debug!("agent still registered, keeping helper script"),
            Err(e) => warn!(?e, "status unknown, keeping helper script"),
        }
    }

    fn uninstall_transaction(&self) -> PrivilegedTransaction {
        PrivilegedTransaction::new()
            .step(PrivilegedStep::RemoveService(self.config.label.clone()))
            .step(PrivilegedStep::RemoveFile(self.config.descriptor_path()))
            .step(PrivilegedStep::RemoveFile(self.config.script_path.clone()))
    }

    /// Query launchd, failing closed
    async fn observe(&self) -> (ServiceState, Option<String>) {
        let (state, query_error) = match self.observer.query(&self.config.label).await {
            Ok(true) => (ServiceState::Enabled, None),
            Ok(false) => (ServiceState::Disabled, None),
            Err(e) => {
                warn!(?e, "status query failed, reporting disabled");
                (
                    ServiceState::Disabled,
                    Some(format!("could not query key mapping status: {e}")),
                )
            }
        };
        self.emit(LifecycleEvent::StatusRefreshed { state });
        (state, query_error)
    }

    fn emit(&self, event: LifecycleEvent) {
        // No subscribers is fine
        let _ = self.event_tx.send(event);
    }

    fn emit_failure(&self, operation: Operation, err: &InstallError) {
        self.emit(LifecycleEvent::TransitionFailed {
            operation,
            kind: err.kind(),
            message: err.to_string(),
        });
    }
}
