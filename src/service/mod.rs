//! Agent lifecycle: status queries and install/uninstall transactions

mod error;
mod manager;
mod observer;

pub use error::{ErrorKind, InstallError, Operation};
pub use manager::ServiceLifecycleManager;
pub use observer::StatusObserver;
