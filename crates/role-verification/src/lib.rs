//! Role-based identity verification: per-user verification records, role-specific
//! document requirements, document review, and the admin approval workflow that ties
//! them together.

pub mod config;
pub mod error;
pub mod telemetry;
pub mod workflows;
