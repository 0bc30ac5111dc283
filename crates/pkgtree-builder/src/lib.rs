//! Lazy package tree enumeration engine for pkgtree.
//!
//! This crate builds a browsable tree over groups of packages, where each
//! package is described by a flat listfile of `\`-separated paths.
//!
//! # Overview
//!
//! `pkgtree-builder` expands the tree one level at a time, on demand:
//!
//! - **Lazy expansion**: a reference's children are computed only when
//!   the reference is submitted
//! - **Background workers** bounded by a configurable concurrency ceiling
//! - **Parent gating**: a reference waits until its parent is enumerated
//! - **Overlays** merging the same path across packages of a group
//! - **Events** via broadcast channels
//!
//! # Example
//!
//! ```rust,no_run
//! use pkgtree_builder::{BuilderConfig, TreeBuilder};
//!
//! # async fn run() -> Result<(), pkgtree_builder::BuilderError> {
//! let builder = TreeBuilder::new(BuilderConfig::new(["/games/wow/Data"]));
//! builder.reload()?;
//! builder.start()?;
//!
//! builder.wait_idle().await;
//! for reference in builder.drain_enumerated() {
//!     if reference.is_directory() {
//!         builder.submit_work(reference);
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Events
//!
//! Subscribe to group, package and expansion events:
//!
//! ```rust,no_run
//! use pkgtree_builder::{BuilderConfig, BuilderEvent, TreeBuilder};
//!
//! let builder = TreeBuilder::new(BuilderConfig::default());
//! let mut events = builder.subscribe();
//!
//! tokio::spawn(async move {
//!     while let Ok(event) = events.recv().await {
//!         if let BuilderEvent::EnumerationFinished(reference) = event {
//!             println!("Expanded {}", reference.key());
//!         }
//!     }
//! });
//! ```

mod builder;
mod context;
mod dispatch;
mod enumerator;
mod events;
mod listfile;
mod mapping;
mod published;
mod scheduler;
mod stats;
mod worker;

pub use builder::{ReloadOutcome, TreeBuilder};
pub use enumerator::{Expansion, HardEnumerator};
pub use events::BuilderEvent;
pub use listfile::{
    LISTFILE_EXTENSIONS, ListfileDirectoryLoader, PackageGroupLoader, read_listfile,
};
pub use mapping::{ClaimOutcome, VirtualMappingTable};
pub use published::EnumeratedReferences;
pub use scheduler::{Scheduler, SubmitOutcome, WorkItem};
pub use stats::{BuilderProgress, BuilderStats};

// Re-export core types for convenience
pub use pkgtree_core::{
    BuilderConfig, BuilderConfigBuilder, BuilderConfigBuilderError, BuilderError,
    EnumerationError, ItemReference, ListfileError, PackageGroup, ParentLink, Reference,
    ReferenceId, ReferenceKey, ReferenceState, VirtualItemReference,
};
