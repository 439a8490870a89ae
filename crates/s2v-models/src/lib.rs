//! Shared data models for the s2v backend.
//!
//! This crate provides Serde-serializable types for:
//! - Shots and storyboard drafts
//! - Stories and render operations
//! - Request/response schemas of the exposed pipeline operations

pub mod operation;
pub mod request;
pub mod shot;
pub mod story;

// Re-export common types
pub use operation::{Operation, OperationStatus};
pub use request::{
    CreateStoryboardRequest, CreateStoryboardResponse, RegenerateShotRequest,
    RegenerateShotResponse, RenderVideoRequest, RenderVideoResponse, ValidationError,
};
pub use shot::{Shot, ShotDraft};
pub use story::Story;
