//! Video catalog served straight out of an object store bucket.
//!
//! Series and episode metadata is derived from filenames and kept in flat
//! JSON documents, thumbnails are cached locally (and in the bucket), and
//! video bytes are proxied with HTTP range support.

pub mod catalog;
pub mod config;
pub mod filename;
pub mod gateway;
pub mod metadata;
pub mod streaming;
pub mod thumbnails;

#[cfg(test)]
pub(crate) mod testing;
