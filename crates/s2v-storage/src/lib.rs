//! S3-compatible OSS client for generated media.
//!
//! This crate provides:
//! - File upload returning a caller-facing URL (public base URL or a
//!   presigned GET, depending on bucket configuration)
//! - Object download to bytes or file
//!
//! A missing URL is always recoverable for callers: the pipeline falls
//! back to a local static path reference.

pub mod client;
pub mod error;

pub use client::{OssClient, OssConfig};
pub use error::{StorageError, StorageResult};
