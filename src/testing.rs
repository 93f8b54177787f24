//! Test doubles for launchd and privilege escalation

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::Notify;

use crate::process::{
    CommandLine, CommandOutput, PrivilegeEscalator, PrivilegedStep, PrivilegedTransaction,
    ProcessError, ProcessRunner, LAUNCHCTL,
};

fn spawn_error(program: &str) -> ProcessError {
    ProcessError::Spawn {
        program: program.to_string(),
        source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
    }
}

/// Runner replying with a fixed result and recording every call
pub struct RecordingRunner {
    reply: Option<CommandOutput>,
    calls: Mutex<Vec<CommandLine>>,
}

impl RecordingRunner {
    pub fn succeeding() -> Self {
        Self::replying(Some(CommandOutput {
            code: Some(0),
            ..Default::default()
        }))
    }

    pub fn exiting(code: i32, stderr: &str) -> Self {
        Self::replying(Some(CommandOutput {
            code: Some(code),
            stdout: String::new(),
            stderr: stderr.to_string(),
        }))
    }

    pub fn unspawnable() -> Self {
        Self::replying(None)
    }

    fn replying(reply: Option<CommandOutput>) -> Self {
        Self {
            reply,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<CommandLine> {
        self.calls.lock().unwrap().clone()
    }
}

impl ProcessRunner for RecordingRunner {
    async fn run(&self, command: &CommandLine) -> Result<CommandOutput, ProcessError> {
        self.calls.lock().unwrap().push(command.clone());
        self.reply.clone().ok_or_else(|| spawn_error(command.program()))
    }
}

/// In-memory launchd registry shared by the fake runner and escalator
#[derive(Clone, Default)]
pub struct FakeLaunchd {
    registered: Arc<Mutex<HashSet<String>>>,
    query_fails: Arc<AtomicBool>,
}

impl FakeLaunchd {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, label: &str) {
        self.registered.lock().unwrap().insert(label.to_string());
    }

    pub fn is_registered(&self, label: &str) -> bool {
        self.registered.lock().unwrap().contains(label)
    }

    /// Make `launchctl list` fail to launch
    pub fn fail_queries(&self, fail: bool) {
        self.query_fails.store(fail, Ordering::SeqCst);
    }

    pub fn runner(&self) -> FakeLaunchctl {
        FakeLaunchctl {
            launchd: self.clone(),
        }
    }
}

/// Answers `launchctl list <label>` from a [`FakeLaunchd`]
pub struct FakeLaunchctl {
    launchd: FakeLaunchd,
}

impl ProcessRunner for FakeLaunchctl {
    async fn run(&self, command: &CommandLine) -> Result<CommandOutput, ProcessError> {
        if self.launchd.query_fails.load(Ordering::SeqCst) {
            return Err(spawn_error(command.program()));
        }

        match (command.program(), command.arguments()) {
            (LAUNCHCTL, [verb, label]) if verb == "list" => {
                if self.launchd.is_registered(label) {
                    Ok(CommandOutput {
                        code: Some(0),
                        stdout: format!("{{\n\t\"Label\" = \"{label}\";\n\t\"LastExitStatus\" = 0;\n}};\n"),
                        stderr: String::new(),
                    })
                } else {
                    Ok(CommandOutput {
                        code: Some(113),
                        stdout: String::new(),
                        stderr: format!("Could not find service \"{label}\" in domain for port\n"),
                    })
                }
            }
            _ => Ok(CommandOutput {
                code: Some(0),
                ..Default::default()
            }),
        }
    }
}

/// Applies privileged steps to the local filesystem and a [`FakeLaunchd`]
pub struct FakeEscalator {
    launchd: FakeLaunchd,
    label: String,
    deny: AtomicBool,
    load_registers: AtomicBool,
    panics: AtomicBool,
    gate: Option<Arc<Notify>>,
    entered: Arc<Notify>,
    invocations: AtomicUsize,
    failures: AtomicUsize,
}

impl FakeEscalator {
    pub fn new(launchd: &FakeLaunchd, label: &str) -> Self {
        Self {
            launchd: launchd.clone(),
            label: label.to_string(),
            deny: AtomicBool::new(false),
            load_registers: AtomicBool::new(true),
            panics: AtomicBool::new(false),
            gate: None,
            entered: Arc::new(Notify::new()),
            invocations: AtomicUsize::new(0),
            failures: AtomicUsize::new(0),
        }
    }

    /// Hold every transaction until the returned gate is notified
    pub fn gated(mut self) -> (Self, Arc<Notify>) {
        let gate = Arc::new(Notify::new());
        self.gate = Some(Arc::clone(&gate));
        (self, gate)
    }

    /// Notified when a transaction reaches the escalator
    pub fn entered(&self) -> Arc<Notify> {
        Arc::clone(&self.entered)
    }

    /// Simulate the consent prompt being dismissed
    pub fn deny_consent(&self, deny: bool) {
        self.deny.store(deny, Ordering::SeqCst);
    }

    /// Simulate an agent that launchd refuses to keep loaded
    pub fn load_registers(&self, registers: bool) {
        self.load_registers.store(registers, Ordering::SeqCst);
    }

    /// Simulate the escalation task dying mid-transaction
    pub fn panic_in_transaction(&self, panics: bool) {
        self.panics.store(panics, Ordering::SeqCst);
    }

    pub fn invocations(&self) -> usize {
        self.invocations.load(Ordering::SeqCst)
    }

    /// Transactions that ran with consent but hit a failing strict step
    pub fn failed_transactions(&self) -> usize {
        self.failures.load(Ordering::SeqCst)
    }

    fn apply(&self, step: &PrivilegedStep) -> bool {
        let ok = match step {
            PrivilegedStep::CreateDir(path) => std::fs::create_dir_all(path).is_ok(),
            PrivilegedStep::Move { from, to } => std::fs::rename(from, to).is_ok(),
            PrivilegedStep::ChangeOwner { path, .. } => path.exists(),
            PrivilegedStep::UnloadService(path) => {
                path.exists() && self.launchd.registered.lock().unwrap().remove(&self.label)
            }
            PrivilegedStep::LoadService(path) => {
                // launchd refuses to load a job that is already loaded
                if !path.exists() || self.launchd.is_registered(&self.label) {
                    return false;
                }
                if self.load_registers.load(Ordering::SeqCst) {
                    self.launchd.register(&self.label);
                }
                true
            }
            PrivilegedStep::RemoveService(label) => {
                self.launchd.registered.lock().unwrap().remove(label)
            }
            PrivilegedStep::RemoveFile(path) => std::fs::remove_file(path).is_ok(),
        };
        ok || step.tolerates_failure()
    }
}

impl PrivilegeEscalator for FakeEscalator {
    async fn run_elevated(&self, transaction: &PrivilegedTransaction) -> bool {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        self.entered.notify_one();
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }

        if self.panics.load(Ordering::SeqCst) {
            panic!("escalation task crashed");
        }
        if self.deny.load(Ordering::SeqCst) {
            return false;
        }

        let ok = transaction.steps().iter().all(|step| self.apply(step));
        if !ok {
            self.failures.fetch_add(1, Ordering::SeqCst);
        }
        ok
    }
}
