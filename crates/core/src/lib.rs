//! leadpulse core - domain entities, services, and traits.
//!
//! This crate contains the lead pipeline's business logic and its real-time
//! fan-out. It is database-agnostic and defines traits that are implemented
//! by the `storage-sqlite` crate.

pub mod constants;
pub mod errors;
pub mod events;
pub mod leads;

// Re-export error types
pub use errors::Error;
pub use errors::Result;
