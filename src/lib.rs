//! Throttle Guard - Sliding-window request throttling with cooldown
//!
//! This crate decides whether a caller may proceed based on its recent
//! request streak. Callers that exceed the allowed streak are rejected until
//! a cooldown elapses, and a background reaper keeps the attempt ledger from
//! growing without bound.

pub mod config;
pub mod error;
pub mod throttle;
