//! Media storage for the wesio chat backend
//!
//! Uploads, downloads and deletes chat media in an S3-compatible object
//! store and issues expiring share links, either presigned by the store or
//! signed for the CDN edge.

pub mod config;
pub mod error;
pub mod media;
pub mod telemetry;

pub use error::{Error, Result};
