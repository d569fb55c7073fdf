//! Test utilities for the filegate server.
//!
//! This crate provides utilities to facilitate end-to-end testing of the gateway. See the modules
//! for all available utilities.

pub mod server;
pub mod tracing;
