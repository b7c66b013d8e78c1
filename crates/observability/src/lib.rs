//! Process-wide logging setup shared by the binaries.

/// Tracing subscriber installation.
pub mod tracing;

pub use crate::tracing::{LogFormat, init, init_with};
