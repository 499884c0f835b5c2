//! # enroll (library)
//!
//! Library surface of the Enroll binary: the HTTP API, the CLI, the
//! scheduler loop and the runtime adapters. Exposed as a library so the
//! integration tests can drive the router directly.

pub mod api;
pub mod cli;
pub mod runtime;
pub mod scheduler;
