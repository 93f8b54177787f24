//! Observable mapping state
//!
//! The store is the single owner of what presentation layers see:
//! - state: Unknown until first queried, then Disabled or Enabled
//! - loading: true while an enable/disable transaction is in flight
//! - last error: message of the most recent failure, if any

mod store;

pub use store::{MappingStatus, ServiceState, StateStore};
