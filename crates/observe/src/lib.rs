//! Observability helpers shared between the binaries and the test suites:
//! initialization logic for logging plus a panic hook that routes panics
//! through `tracing` so they end up in the structured log stream.

pub mod panic_hook;
pub mod tracing;
