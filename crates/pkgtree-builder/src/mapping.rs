//! Virtual mapping table: which overlay stands for a hard path.

use std::sync::Arc;

use compact_str::CompactString;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use pkgtree_core::{ItemReference, VirtualItemReference};

/// Result of registering a newly discovered hard reference.
#[derive(Debug, Clone)]
pub enum ClaimOutcome {
    /// First package to provide this path.
    First,
    /// A second package provided the path and a new overlay was created.
    Overlaid(Arc<VirtualItemReference>),
    /// The reference was appended to an existing overlay.
    Extended(Arc<VirtualItemReference>),
    /// The existing overlay was sealed, so a successor including the
    /// reference replaced it in the table.
    Replaced(Arc<VirtualItemReference>),
    /// The package had already claimed this path.
    Duplicate,
}

enum Slot {
    Claimed(Arc<ItemReference>),
    Overlay(Arc<VirtualItemReference>),
}

/// Maps `(group, path)` to the overlay covering it.
///
/// At most one overlay exists per `(group, path)`; the first overlay
/// registered wins.
#[derive(Default)]
pub struct VirtualMappingTable {
    slots: DashMap<(CompactString, CompactString), Slot>,
}

impl VirtualMappingTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self {
            slots: DashMap::new(),
        }
    }

    fn slot_key(hard: &ItemReference) -> (CompactString, CompactString) {
        let key = hard.key();
        (key.group.clone(), key.path.clone())
    }

    /// Register `overlay` for the group and path of `hard`.
    ///
    /// Returns `false` without changing anything if an overlay is already
    /// registered there.
    pub fn add_virtual_mapping(
        &self,
        hard: &ItemReference,
        overlay: Arc<VirtualItemReference>,
    ) -> bool {
        match self.slots.entry(Self::slot_key(hard)) {
            Entry::Vacant(vacant) => {
                vacant.insert(Slot::Overlay(overlay));
                true
            }
            Entry::Occupied(mut occupied) => match occupied.get() {
                Slot::Overlay(_) => false,
                Slot::Claimed(_) => {
                    occupied.insert(Slot::Overlay(overlay));
                    true
                }
            },
        }
    }

    /// Overlay registered for the group and path of `hard`, if any.
    pub fn get_virtual_reference(&self, hard: &ItemReference) -> Option<Arc<VirtualItemReference>> {
        self.slots
            .get(&Self::slot_key(hard))
            .and_then(|slot| match slot.value() {
                Slot::Overlay(overlay) => Some(Arc::clone(overlay)),
                Slot::Claimed(_) => None,
            })
    }

    /// Record that `hard`'s package provides its path.
    ///
    /// The first package claims the path. A second package turns the claim
    /// into an overlay with the first claimant as primary; later packages
    /// are appended as overridden references. An overlay that is already
    /// sealed is left untouched and replaced by a successor, so the state
    /// observed through it never moves back.
    pub fn claim(&self, hard: &Arc<ItemReference>) -> ClaimOutcome {
        match self.slots.entry(Self::slot_key(hard)) {
            Entry::Vacant(vacant) => {
                vacant.insert(Slot::Claimed(Arc::clone(hard)));
                ClaimOutcome::First
            }
            Entry::Occupied(mut occupied) => {
                let (overlay, replaced) = match occupied.get() {
                    Slot::Claimed(first) if first.package_name() == hard.package_name() => {
                        return ClaimOutcome::Duplicate;
                    }
                    Slot::Claimed(first) => (
                        VirtualItemReference::with_overridden(
                            Arc::clone(first),
                            vec![Arc::clone(hard)],
                        ),
                        false,
                    ),
                    Slot::Overlay(overlay) if overlay.provides_package(hard.package_name()) => {
                        return ClaimOutcome::Duplicate;
                    }
                    Slot::Overlay(overlay) => {
                        if overlay.add_overridden(Arc::clone(hard)) {
                            return ClaimOutcome::Extended(Arc::clone(overlay));
                        }
                        (overlay.extended_with(Arc::clone(hard)), true)
                    }
                };
                occupied.insert(Slot::Overlay(Arc::clone(&overlay)));
                if replaced {
                    ClaimOutcome::Replaced(overlay)
                } else {
                    ClaimOutcome::Overlaid(overlay)
                }
            }
        }
    }

    /// Number of registered overlays.
    pub fn overlay_count(&self) -> usize {
        self.slots
            .iter()
            .filter(|slot| matches!(slot.value(), Slot::Overlay(_)))
            .count()
    }

    /// Forget every claim and overlay.
    pub fn clear(&self) {
        self.slots.clear();
    }
}
