//! Shared plumbing for the chapter demos.
//!
//! Every binary under `src/bin` is a standalone program. They share the
//! logging setup, and the division lesson keeps its function here so the
//! benchmark can link against it.

pub mod division;
pub mod telemetry;
