//! The file gateway server component.
//!
//! This builds on top of the [`filegate_service`], and exposes its file operations as an `HTTP`
//! API: multipart uploads, deletes, server-side copies, and signed upload policies for direct
//! client uploads.

pub mod cli;
pub mod config;
pub mod endpoints;
pub mod error;
pub mod extractors;
pub mod healthcheck;
pub mod observability;
pub mod state;
pub mod web;
