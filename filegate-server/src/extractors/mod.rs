//! Request extractors for the gateway endpoints.

mod body;
mod upload;

pub use body::FormOrJson;
pub use upload::SpooledUpload;
