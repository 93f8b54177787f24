//! Service descriptor and helper script artifacts
//!
//! Rendering is pure and deterministic; writing places the rendered text
//! at unprivileged locations ahead of the privileged transaction.

mod render;
mod writer;

pub use render::{HelperScript, ServiceDescriptor};
pub use writer::{discard_artifact, stage_descriptor, write_helper_script};
