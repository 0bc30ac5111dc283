//! Core types for pkgtree.
//!
//! This crate provides the reference model shared by the enumeration
//! engine and its front ends: hard and virtual item references, the
//! package group collaborator type, errors, and builder configuration.

mod config;
mod error;
mod group;
mod reference;

pub use config::{BuilderConfig, BuilderConfigBuilder, BuilderConfigBuilderError};
pub use error::{BuilderError, EnumerationError, ListfileError};
pub use group::PackageGroup;
pub use reference::{
    ItemReference, ParentLink, Reference, ReferenceId, ReferenceKey, ReferenceState,
    VirtualItemReference,
};
