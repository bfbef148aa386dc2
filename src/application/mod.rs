//! Stateful reconciliation components.
//!
//! The real-time engine drives the hybrid decision policy per event; the
//! policy reaches the scorer only through the shared, breaker-protected
//! gateway. Batch matching, governance and stress replay build on the same
//! pieces.

pub mod audit;
pub mod batch;
pub mod breaker;
pub mod feedback;
pub mod gateway;
pub mod policy;
pub mod realtime;
pub mod security;
pub mod sla;
pub mod stress;
pub mod workflow;
