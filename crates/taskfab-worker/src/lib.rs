//! # taskfab-worker
//!
//! The worker runtime: connects to a dispatcher, registers its identity,
//! and runs the bounded execution pool described in [`runtime`].

pub mod runtime;

pub use runtime::WorkerRuntime;
