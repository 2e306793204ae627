//! Broker adapters.

pub mod dhan;
