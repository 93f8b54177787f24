//! Configuration loading and management

use std::path::PathBuf;

use anyhow::{Context, Result};

/// Launchd label of the remapping agent
pub const DEFAULT_LABEL: &str = "com.hangulcommand.userkeymapping";

/// Well-known location of the helper script
pub const DEFAULT_SCRIPT_PATH: &str = "/Users/Shared/bin/hangulkeymapping";

/// Protected directory launchd reads agent descriptors from
pub const DEFAULT_AGENTS_DIR: &str = "/Library/LaunchAgents";

/// Daemon configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Reverse-domain label identifying the agent
    pub label: String,

    /// Helper script invoked by the agent at load
    pub script_path: PathBuf,

    /// Directory holding the installed service descriptor
    pub agents_dir: PathBuf,

    /// Unprivileged directory the descriptor is staged in before the move
    pub staging_dir: PathBuf,

    /// Owner and group applied to the installed descriptor
    pub owner: String,
    pub group: String,

    /// Path to the Unix domain socket for IPC
    pub socket_path: PathBuf,

    /// Directory for runtime data
    pub data_dir: PathBuf,
}

impl Config {
    /// Load configuration from environment and defaults
    pub fn load() -> Result<Self> {
        let home = std::env::var("HOME").context("HOME is not set")?;
        let data_dir = PathBuf::from(&home)
            .join(".local")
            .join("share")
            .join("hangul-keymap");

        let socket_path = data_dir.join("daemon.sock");

        Ok(Self {
            label: DEFAULT_LABEL.to_string(),
            script_path: PathBuf::from(DEFAULT_SCRIPT_PATH),
            agents_dir: PathBuf::from(DEFAULT_AGENTS_DIR),
            staging_dir: std::env::temp_dir(),
            owner: "root".to_string(),
            group: "admin".to_string(),
            socket_path,
            data_dir,
        })
    }

    /// Ensure data directory exists
    pub fn ensure_dirs(&self) -> Result<()> {
        std::fs::create_dir_all(&self.data_dir)
            .with_context(|| format!("failed to create {}", self.data_dir.display()))?;
        Ok(())
    }

    /// Where the service descriptor lives once installed
    pub fn descriptor_path(&self) -> PathBuf {
        self.agents_dir.join(self.descriptor_file_name())
    }

    /// Where the descriptor is rendered before the privileged move
    pub fn staging_path(&self) -> PathBuf {
        self.staging_dir.join(self.descriptor_file_name())
    }

    fn descriptor_file_name(&self) -> String {
        format!("{}.plist", self.label)
    }

    /// Configuration with every filesystem location under `root`
    #[cfg(test)]
    pub fn rooted_at(root: &std::path::Path) -> Self {
        Self {
            label: DEFAULT_LABEL.to_string(),
            script_path: root.join("Users/Shared/bin/hangulkeymapping"),
            agents_dir: root.join("Library/LaunchAgents"),
            staging_dir: root.join("tmp"),
            owner: "root".to_string(),
            group: "admin".to_string(),
            socket_path: root.join("daemon.sock"),
            data_dir: root.join("data"),
        }
    }
}
