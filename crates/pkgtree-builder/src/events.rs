//! Notifications raised by the builder.

use pkgtree_core::Reference;

/// Events delivered to subscribers, from whichever thread produced them.
#[derive(Debug, Clone)]
pub enum BuilderEvent {
    /// A package group was loaded; carries its top-level overlay.
    PackageGroupAdded(Reference),
    /// A package was registered inside its group (not yet expanded).
    PackageEnumerated(Reference),
    /// A hard reference finished its one-level expansion.
    EnumerationFinished(Reference),
    /// A hard reference failed to expand and was reverted to
    /// `NotEnumerated`.
    EnumerationFailed {
        reference: Reference,
        message: String,
    },
}

impl BuilderEvent {
    /// The reference the event is about.
    pub fn reference(&self) -> &Reference {
        match self {
            Self::PackageGroupAdded(reference)
            | Self::PackageEnumerated(reference)
            | Self::EnumerationFinished(reference) => reference,
            Self::EnumerationFailed { reference, .. } => reference,
        }
    }

    /// Check if this event reports a failure.
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::EnumerationFailed { .. })
    }
}
