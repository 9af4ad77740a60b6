//! Core types shared across Figgy facilities
//!
//! This crate provides foundational types used by the persistence pipeline,
//! the error facility and the logging facility:
//!
//! - **Identifiers**: ResourceId, FileId
//! - **Schema constants**: Canonical field keys and event names

pub mod ids;
pub mod schema;

pub use ids::{FileId, ResourceId};
