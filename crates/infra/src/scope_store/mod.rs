//! Adapters for the evaluator's external collaborators.
//!
//! - [`in_memory`]: process-local stores for tests and development
//! - [`postgres`]: production adapters over a `sqlx` pool

pub mod in_memory;
pub mod postgres;
