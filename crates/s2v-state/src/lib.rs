//! Crash-consistent JSON state store.
//!
//! This crate provides:
//! - Atomic temp-file + rename writes (a reader never observes a
//!   partially written document)
//! - The per-user/per-story directory layout for documents and media
//! - A tolerant shots-document reader (bare list or object-wrapped)
//! - Raw provider-response archival for post-hoc debugging

pub mod error;
pub mod layout;
pub mod repository;

pub use error::{StateError, StateResult};
pub use layout::StoryLayout;
pub use repository::StoryRepository;
