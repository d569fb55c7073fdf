//! The service layer provides the storage abstraction behind the file gateway.
//!
//! A [`StorageService`] wraps one [`StorageBackend`](backend::StorageBackend) and exposes four
//! operations on validated requests: uploading a local file, deleting a file, copying a file
//! server-side, and issuing a signed upload [`Policy`] for direct client uploads.
//!
//! Concrete backends live in [`backend`]: a local filesystem, S3-compatible APIs, Google Cloud
//! Storage, and an in-memory backend for tests. Each backend owns the [`PolicyIssuer`] holding
//! the signing secret.
//!
//! It is designed as a library crate to be used by the `server`.
#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

pub mod backend;
mod error;
mod path;
pub mod policy;
mod request;
mod service;
mod stream;

pub use error::{Error, Result};
pub use path::{MAX_PATH_LEN, RemotePath};
pub use policy::{Policy, PolicyIssuer};
pub use request::{CopyRequest, DeleteRequest, PolicyRequest, UploadRequest};
pub use service::{DEFAULT_OPERATION_TIMEOUT, StorageConfig, StorageService};
pub use stream::PayloadStream;
