//! Concrete adapters for the domain ports.

pub mod audit;
pub mod retraining;
pub mod scoring;
