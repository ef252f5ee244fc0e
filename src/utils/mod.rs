//! Shared utilities.

/// Error types shared by the host, the caller and the bridge.
pub mod error;
