//! Hard and virtual item references.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Weak};

use compact_str::CompactString;
use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use strum::Display;

use crate::group::PackageGroup;

/// Enumeration progress of a reference.
///
/// Transitions run `NotEnumerated -> Enumerating -> Enumerated`. The only
/// way back is a failed expansion reverting `Enumerating` to
/// `NotEnumerated`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display,
)]
pub enum ReferenceState {
    /// Children have not been listed yet.
    NotEnumerated,
    /// Queued or currently being expanded.
    Enumerating,
    /// Immediate children are known.
    Enumerated,
}

impl ReferenceState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::NotEnumerated,
            1 => Self::Enumerating,
            _ => Self::Enumerated,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            Self::NotEnumerated => 0,
            Self::Enumerating => 1,
            Self::Enumerated => 2,
        }
    }
}

/// Identity of a hard reference: group, package and item path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ReferenceKey {
    /// Owning package group name.
    pub group: CompactString,
    /// Package name within the group (empty for a group root).
    pub package: CompactString,
    /// Path inside the package (empty for a package root).
    pub path: CompactString,
}

impl ReferenceKey {
    /// Create a new reference key.
    pub fn new(
        group: impl Into<CompactString>,
        package: impl Into<CompactString>,
        path: impl Into<CompactString>,
    ) -> Self {
        Self {
            group: group.into(),
            package: package.into(),
            path: path.into(),
        }
    }
}

impl fmt::Display for ReferenceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.group, self.package, self.path)
    }
}

/// Identity used by the scheduler to track queued and dispatched work.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ReferenceId {
    /// A concrete path in one package.
    Hard(ReferenceKey),
    /// An overlay, identified by its primary reference.
    Virtual(ReferenceKey),
}

/// Non-owning link from a reference to its parent.
#[derive(Clone)]
pub enum ParentLink {
    Hard(Weak<ItemReference>),
    Virtual(Weak<VirtualItemReference>),
}

impl ParentLink {
    /// Resolve the parent, if it is still alive.
    pub fn upgrade(&self) -> Option<Reference> {
        match self {
            Self::Hard(weak) => weak.upgrade().map(Reference::Hard),
            Self::Virtual(weak) => weak.upgrade().map(Reference::Virtual),
        }
    }
}

impl fmt::Debug for ParentLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.upgrade() {
            Some(parent) => write!(f, "ParentLink({})", parent.key()),
            None => write!(f, "ParentLink(<dropped>)"),
        }
    }
}

/// A reference to one concrete path inside one concrete package.
///
/// Equality and hashing only consider the identity triple, so the same
/// item found by two expansion passes compares equal.
pub struct ItemReference {
    key: ReferenceKey,
    group: Arc<PackageGroup>,
    parent: Option<ParentLink>,
    state: AtomicU8,
    children: Mutex<Vec<Arc<ItemReference>>>,
}

impl ItemReference {
    /// Create a new reference in `NotEnumerated` state.
    pub fn new(
        group: &Arc<PackageGroup>,
        package: impl Into<CompactString>,
        path: impl Into<CompactString>,
        parent: Option<ParentLink>,
    ) -> Arc<Self> {
        Arc::new(Self {
            key: ReferenceKey::new(group.name(), package, path),
            group: Arc::clone(group),
            parent,
            state: AtomicU8::new(ReferenceState::NotEnumerated.as_u8()),
            children: Mutex::new(Vec::new()),
        })
    }

    /// Create the synthetic root of a group, `(group, "", "")`.
    pub fn group_root(group: &Arc<PackageGroup>) -> Arc<Self> {
        Self::new(group, "", "", None)
    }

    /// Create a child of this reference in the same package.
    pub fn new_child(self: &Arc<Self>, path: impl Into<CompactString>) -> Arc<Self> {
        Self::new(
            &self.group,
            self.key.package.clone(),
            path,
            Some(ParentLink::Hard(Arc::downgrade(self))),
        )
    }

    /// Identity of this reference.
    pub fn key(&self) -> &ReferenceKey {
        &self.key
    }

    /// Owning package group.
    pub fn group(&self) -> &Arc<PackageGroup> {
        &self.group
    }

    /// Package the item lives in.
    pub fn package_name(&self) -> &str {
        &self.key.package
    }

    /// Path of the item inside its package.
    pub fn item_path(&self) -> &str {
        &self.key.path
    }

    /// Display name: the last path segment, the package name for a
    /// package root, or the group name for a group root.
    pub fn name(&self) -> &str {
        if self.key.path.is_empty() {
            if self.key.package.is_empty() {
                return &self.key.group;
            }
            return &self.key.package;
        }
        let separator = self.group.separator();
        let trimmed = self.key.path.trim_end_matches(separator);
        trimmed.rsplit(separator).next().unwrap_or(trimmed)
    }

    /// Whether this reference can have children.
    pub fn is_directory(&self) -> bool {
        self.key.path.is_empty() || self.key.path.ends_with(self.group.separator())
    }

    /// Current enumeration state.
    pub fn state(&self) -> ReferenceState {
        ReferenceState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Move from `NotEnumerated` to `Enumerating`.
    ///
    /// Returns `false` if the reference was not `NotEnumerated`.
    pub fn try_begin_enumeration(&self) -> bool {
        self.state
            .compare_exchange(
                ReferenceState::NotEnumerated.as_u8(),
                ReferenceState::Enumerating.as_u8(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Mark the reference as fully enumerated.
    pub fn mark_enumerated(&self) {
        self.state
            .fetch_max(ReferenceState::Enumerated.as_u8(), Ordering::AcqRel);
    }

    /// Revert a failed expansion from `Enumerating` to `NotEnumerated`.
    ///
    /// Returns `false` if the reference was not `Enumerating`.
    pub fn reset_enumeration(&self) -> bool {
        self.state
            .compare_exchange(
                ReferenceState::Enumerating.as_u8(),
                ReferenceState::NotEnumerated.as_u8(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// The parent reference, if any and still alive.
    pub fn parent(&self) -> Option<Reference> {
        self.parent.as_ref().and_then(ParentLink::upgrade)
    }

    /// Whether this reference was created with a parent link.
    pub fn has_parent(&self) -> bool {
        self.parent.is_some()
    }

    /// Snapshot of the children in discovery order.
    pub fn children(&self) -> Vec<Arc<ItemReference>> {
        self.children.lock().clone()
    }

    /// Number of known children.
    pub fn child_count(&self) -> usize {
        self.children.lock().len()
    }

    /// Append children in order, skipping any whose identity is already
    /// present. Returns the children that were actually added.
    pub fn append_children(
        &self,
        candidates: impl IntoIterator<Item = Arc<ItemReference>>,
    ) -> Vec<Arc<ItemReference>> {
        let mut children = self.children.lock();
        let mut added = Vec::new();
        for candidate in candidates {
            if children.iter().any(|child| child.key == candidate.key) {
                continue;
            }
            children.push(Arc::clone(&candidate));
            added.push(candidate);
        }
        added
    }
}

impl PartialEq for ItemReference {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for ItemReference {}

impl Hash for ItemReference {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

impl fmt::Debug for ItemReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ItemReference")
            .field("key", &self.key)
            .field("state", &self.state())
            .field("children", &self.child_count())
            .finish()
    }
}

/// An overlay merging every package that provides the same logical path.
///
/// The state is never stored: it is derived from the backing hard
/// references each time it is read, plus a flag recording that the
/// overlay itself has been handed to a worker.
pub struct VirtualItemReference {
    primary: Arc<ItemReference>,
    overridden: Mutex<Vec<Arc<ItemReference>>>,
    scheduled: AtomicBool,
}

impl VirtualItemReference {
    /// Create an overlay backed by a single hard reference.
    pub fn new(primary: Arc<ItemReference>) -> Arc<Self> {
        Self::with_overridden(primary, Vec::new())
    }

    /// Create an overlay with a primary and overridden references.
    pub fn with_overridden(
        primary: Arc<ItemReference>,
        overridden: Vec<Arc<ItemReference>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            primary,
            overridden: Mutex::new(overridden),
            scheduled: AtomicBool::new(false),
        })
    }

    /// Identity of the overlay (its primary's identity).
    pub fn key(&self) -> &ReferenceKey {
        self.primary.key()
    }

    /// The primary backing reference.
    pub fn primary(&self) -> &Arc<ItemReference> {
        &self.primary
    }

    /// Overridden backing references in registration order.
    pub fn overridden(&self) -> Vec<Arc<ItemReference>> {
        self.overridden.lock().clone()
    }

    /// Primary followed by every overridden reference.
    pub fn hard_references(&self) -> Vec<Arc<ItemReference>> {
        let overridden = self.overridden.lock();
        let mut all = Vec::with_capacity(overridden.len() + 1);
        all.push(Arc::clone(&self.primary));
        all.extend(overridden.iter().cloned());
        all
    }

    /// Register another package's reference for the same path.
    ///
    /// Returns `false` if the reference belongs to another group or path,
    /// if its package already backs this overlay, or if the overlay is
    /// [sealed](Self::is_sealed).
    pub fn add_overridden(&self, hard: Arc<ItemReference>) -> bool {
        let key = hard.key();
        if key.group != self.primary.key().group || key.path != self.primary.key().path {
            return false;
        }
        if key.package == self.primary.key().package {
            return false;
        }
        let mut overridden = self.overridden.lock();
        if overridden.iter().any(|r| r.key().package == key.package) {
            return false;
        }
        if self.derive_state(&overridden) != ReferenceState::NotEnumerated {
            return false;
        }
        overridden.push(hard);
        true
    }

    /// Whether `package` backs this overlay.
    pub fn provides_package(&self, package: &str) -> bool {
        self.primary.package_name() == package
            || self
                .overridden
                .lock()
                .iter()
                .any(|r| r.package_name() == package)
    }

    /// A sealed overlay has been claimed by a worker or has otherwise left
    /// `NotEnumerated`. It accepts no new parts, so its state never moves
    /// back.
    pub fn is_sealed(&self) -> bool {
        let overridden = self.overridden.lock();
        self.derive_state(&overridden) != ReferenceState::NotEnumerated
    }

    /// A new overlay backed by the same references plus `hard`.
    ///
    /// Used in place of [`add_overridden`](Self::add_overridden) once this
    /// overlay is sealed. The new overlay starts unscheduled.
    pub fn extended_with(&self, hard: Arc<ItemReference>) -> Arc<Self> {
        let mut overridden = self.overridden();
        overridden.push(hard);
        Self::with_overridden(Arc::clone(&self.primary), overridden)
    }

    /// The reference shown to users: the last-loaded backing package.
    pub fn display_reference(&self) -> Arc<ItemReference> {
        self.overridden
            .lock()
            .last()
            .cloned()
            .unwrap_or_else(|| Arc::clone(&self.primary))
    }

    /// Derived enumeration state.
    pub fn state(&self) -> ReferenceState {
        let overridden = self.overridden.lock();
        self.derive_state(&overridden)
    }

    fn derive_state(&self, overridden: &[Arc<ItemReference>]) -> ReferenceState {
        let mut parts = std::iter::once(&self.primary).chain(overridden.iter());
        if parts
            .clone()
            .all(|part| part.state() == ReferenceState::Enumerated)
        {
            return ReferenceState::Enumerated;
        }
        let waiting = parts.any(|part| part.state() == ReferenceState::NotEnumerated);
        if self.scheduled.load(Ordering::Acquire) || !waiting {
            ReferenceState::Enumerating
        } else {
            ReferenceState::NotEnumerated
        }
    }

    /// Claim the overlay for a worker.
    ///
    /// Returns `false` unless the overlay is currently `NotEnumerated`.
    pub fn try_schedule(&self) -> bool {
        let overridden = self.overridden.lock();
        if self.derive_state(&overridden) != ReferenceState::NotEnumerated {
            return false;
        }
        self.scheduled
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Release the worker claim taken by [`try_schedule`](Self::try_schedule).
    pub fn finish_schedule(&self) {
        self.scheduled.store(false, Ordering::Release);
    }

    /// Mark a synthetic overlay (one with no listfile entry of its own)
    /// as enumerated.
    pub fn mark_synthetic_enumerated(&self) {
        for part in self.hard_references() {
            part.mark_enumerated();
        }
    }

    /// The parent of the primary reference.
    pub fn parent(&self) -> Option<Reference> {
        self.primary.parent()
    }

    /// Children of every backing reference, merged by path.
    ///
    /// Order follows first discovery; for a path provided by several
    /// packages the last-loaded package's reference is returned.
    pub fn merged_children(&self) -> Vec<Arc<ItemReference>> {
        let mut merged: IndexMap<CompactString, Arc<ItemReference>> = IndexMap::new();
        for part in self.hard_references() {
            for child in part.children() {
                merged.insert(child.key().path.clone(), child);
            }
        }
        merged.into_values().collect()
    }
}

impl fmt::Debug for VirtualItemReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VirtualItemReference")
            .field("key", self.key())
            .field("state", &self.state())
            .field("overridden", &self.overridden.lock().len())
            .finish()
    }
}

/// Either kind of reference, as handled by the scheduler and front ends.
#[derive(Debug, Clone)]
pub enum Reference {
    Hard(Arc<ItemReference>),
    Virtual(Arc<VirtualItemReference>),
}

impl Reference {
    /// Identity of the underlying reference.
    pub fn key(&self) -> &ReferenceKey {
        match self {
            Self::Hard(hard) => hard.key(),
            Self::Virtual(overlay) => overlay.key(),
        }
    }

    /// Scheduler identity.
    pub fn id(&self) -> ReferenceId {
        match self {
            Self::Hard(hard) => ReferenceId::Hard(hard.key().clone()),
            Self::Virtual(overlay) => ReferenceId::Virtual(overlay.key().clone()),
        }
    }

    /// Current (or derived) enumeration state.
    pub fn state(&self) -> ReferenceState {
        match self {
            Self::Hard(hard) => hard.state(),
            Self::Virtual(overlay) => overlay.state(),
        }
    }

    /// Parent reference, if any and still alive.
    pub fn parent(&self) -> Option<Reference> {
        match self {
            Self::Hard(hard) => hard.parent(),
            Self::Virtual(overlay) => overlay.parent(),
        }
    }

    /// Non-owning link to this reference.
    pub fn downgrade(&self) -> ParentLink {
        match self {
            Self::Hard(hard) => ParentLink::Hard(Arc::downgrade(hard)),
            Self::Virtual(overlay) => ParentLink::Virtual(Arc::downgrade(overlay)),
        }
    }

    /// Backing hard references (the reference itself for a hard one).
    pub fn hard_references(&self) -> Vec<Arc<ItemReference>> {
        match self {
            Self::Hard(hard) => vec![Arc::clone(hard)],
            Self::Virtual(overlay) => overlay.hard_references(),
        }
    }

    /// Display name.
    pub fn name(&self) -> CompactString {
        match self {
            Self::Hard(hard) => hard.name().into(),
            Self::Virtual(overlay) => overlay.display_reference().name().into(),
        }
    }

    /// Whether the reference can have children.
    pub fn is_directory(&self) -> bool {
        match self {
            Self::Hard(hard) => hard.is_directory(),
            Self::Virtual(overlay) => overlay.primary().is_directory(),
        }
    }

    /// Whether this is an overlay.
    pub fn is_virtual(&self) -> bool {
        matches!(self, Self::Virtual(_))
    }

    /// The hard reference, if this is one.
    pub fn as_hard(&self) -> Option<&Arc<ItemReference>> {
        match self {
            Self::Hard(hard) => Some(hard),
            Self::Virtual(_) => None,
        }
    }

    /// The overlay, if this is one.
    pub fn as_virtual(&self) -> Option<&Arc<VirtualItemReference>> {
        match self {
            Self::Hard(_) => None,
            Self::Virtual(overlay) => Some(overlay),
        }
    }
}

impl PartialEq for Reference {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for Reference {}

impl Hash for Reference {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id().hash(state);
    }
}

impl From<Arc<ItemReference>> for Reference {
    fn from(hard: Arc<ItemReference>) -> Self {
        Self::Hard(hard)
    }
}

impl From<Arc<VirtualItemReference>> for Reference {
    fn from(overlay: Arc<VirtualItemReference>) -> Self {
        Self::Virtual(overlay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn group() -> Arc<PackageGroup> {
        Arc::new(
            PackageGroup::new("/data")
                .with_package("common.MPQ", ["World\\", "World\\a.wmo"])
                .with_package("patch.MPQ", ["World\\", "World\\b.wmo"]),
        )
    }

    #[test]
    fn test_equality_is_identity() {
        let group = group();
        let a = ItemReference::new(&group, "common.MPQ", "World\\", None);
        let b = ItemReference::new(&group, "common.MPQ", "World\\", None);
        let c = ItemReference::new(&group, "patch.MPQ", "World\\", None);

        b.mark_enumerated();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_state_transitions() {
        let group = group();
        let reference = ItemReference::new(&group, "common.MPQ", "", None);
        assert_eq!(reference.state(), ReferenceState::NotEnumerated);

        assert!(reference.try_begin_enumeration());
        assert!(!reference.try_begin_enumeration());
        assert_eq!(reference.state(), ReferenceState::Enumerating);

        reference.mark_enumerated();
        assert_eq!(reference.state(), ReferenceState::Enumerated);
        assert!(!reference.reset_enumeration());
        assert_eq!(reference.state(), ReferenceState::Enumerated);
    }

    #[test]
    fn test_reset_reverts_failed_expansion() {
        let group = group();
        let reference = ItemReference::new(&group, "common.MPQ", "", None);
        assert!(reference.try_begin_enumeration());
        assert!(reference.reset_enumeration());
        assert_eq!(reference.state(), ReferenceState::NotEnumerated);
    }

    #[test]
    fn test_names() {
        let group = group();
        let root = ItemReference::group_root(&group);
        let package = ItemReference::new(&group, "common.MPQ", "", None);
        let dir = package.new_child("World\\Maps\\");
        let file = dir.new_child("World\\Maps\\Azeroth.wdt");

        assert_eq!(root.name(), "/data");
        assert_eq!(package.name(), "common.MPQ");
        assert_eq!(dir.name(), "Maps");
        assert_eq!(file.name(), "Azeroth.wdt");
        assert!(dir.is_directory());
        assert!(!file.is_directory());
    }

    #[test]
    fn test_parent_link_is_weak() {
        let group = group();
        let package = ItemReference::new(&group, "common.MPQ", "", None);
        let child = package.new_child("World\\");
        assert_eq!(child.parent().map(|p| p.key().clone()), Some(package.key().clone()));

        drop(package);
        assert!(child.parent().is_none());
        assert!(child.has_parent());
    }

    #[test]
    fn test_append_children_skips_duplicates() {
        let group = group();
        let package = ItemReference::new(&group, "common.MPQ", "", None);
        let added = package.append_children([
            package.new_child("World\\"),
            package.new_child("World\\"),
            package.new_child("a.txt"),
        ]);
        assert_eq!(added.len(), 2);
        assert_eq!(package.child_count(), 2);
    }

    #[test]
    fn test_virtual_state_primary_first() {
        let group = group();
        let primary = ItemReference::new(&group, "common.MPQ", "World\\", None);
        let other = ItemReference::new(&group, "patch.MPQ", "World\\", None);
        let overlay = VirtualItemReference::with_overridden(primary.clone(), vec![other.clone()]);

        assert_eq!(overlay.state(), ReferenceState::NotEnumerated);
        assert!(overlay.try_schedule());
        assert_eq!(overlay.state(), ReferenceState::Enumerating);

        primary.mark_enumerated();
        assert_eq!(overlay.state(), ReferenceState::Enumerating);
        other.mark_enumerated();
        assert_eq!(overlay.state(), ReferenceState::Enumerated);
    }

    #[test]
    fn test_virtual_state_overridden_first() {
        let group = group();
        let primary = ItemReference::new(&group, "common.MPQ", "World\\", None);
        let other = ItemReference::new(&group, "patch.MPQ", "World\\", None);
        let overlay = VirtualItemReference::with_overridden(primary.clone(), vec![other.clone()]);

        assert!(overlay.try_schedule());
        other.mark_enumerated();
        assert_eq!(overlay.state(), ReferenceState::Enumerating);
        primary.mark_enumerated();
        assert_eq!(overlay.state(), ReferenceState::Enumerated);
    }

    #[test]
    fn test_add_overridden_rules() {
        let group = group();
        let primary = ItemReference::new(&group, "common.MPQ", "World\\", None);
        let overlay = VirtualItemReference::new(primary.clone());

        assert!(!overlay.add_overridden(ItemReference::new(&group, "common.MPQ", "World\\", None)));
        assert!(!overlay.add_overridden(ItemReference::new(&group, "patch.MPQ", "Other\\", None)));
        assert!(overlay.add_overridden(ItemReference::new(&group, "patch.MPQ", "World\\", None)));
        assert!(!overlay.add_overridden(ItemReference::new(&group, "patch.MPQ", "World\\", None)));

        assert_eq!(overlay.hard_references().len(), 2);
        assert_eq!(overlay.display_reference().package_name(), "patch.MPQ");
    }

    #[test]
    fn test_sealed_overlay_takes_no_parts() {
        let group = group();
        let primary = ItemReference::new(&group, "common.MPQ", "World\\", None);
        let other = ItemReference::new(&group, "expansion.MPQ", "World\\", None);
        let late = ItemReference::new(&group, "patch.MPQ", "World\\", None);
        let overlay = VirtualItemReference::with_overridden(primary.clone(), vec![other.clone()]);
        assert!(!overlay.is_sealed());

        primary.mark_enumerated();
        other.mark_enumerated();
        assert!(overlay.is_sealed());
        assert!(overlay.provides_package("expansion.MPQ"));
        assert!(!overlay.provides_package("patch.MPQ"));

        assert!(!overlay.add_overridden(late.clone()));
        assert_eq!(overlay.state(), ReferenceState::Enumerated);

        let successor = overlay.extended_with(late);
        assert_eq!(successor.key(), overlay.key());
        assert_eq!(successor.hard_references().len(), 3);
        assert_eq!(successor.state(), ReferenceState::NotEnumerated);
        assert_eq!(overlay.state(), ReferenceState::Enumerated);
    }

    #[test]
    fn test_scheduled_overlay_is_sealed() {
        let group = group();
        let primary = ItemReference::new(&group, "common.MPQ", "World\\", None);
        let overlay = VirtualItemReference::new(primary);

        assert!(overlay.try_schedule());
        assert!(!overlay.add_overridden(ItemReference::new(&group, "patch.MPQ", "World\\", None)));
        assert_eq!(overlay.state(), ReferenceState::Enumerating);
    }

    #[test]
    fn test_merged_children_prefers_later_packages() {
        let group = group();
        let primary = ItemReference::new(&group, "common.MPQ", "World\\", None);
        let other = ItemReference::new(&group, "patch.MPQ", "World\\", None);
        primary.append_children([primary.new_child("World\\a.wmo"), primary.new_child("World\\c.wmo")]);
        other.append_children([other.new_child("World\\c.wmo"), other.new_child("World\\b.wmo")]);

        let overlay = VirtualItemReference::with_overridden(primary, vec![other]);
        let merged = overlay.merged_children();
        let paths: Vec<_> = merged.iter().map(|c| c.item_path().to_string()).collect();
        assert_eq!(paths, vec!["World\\a.wmo", "World\\c.wmo", "World\\b.wmo"]);
        assert_eq!(merged[1].package_name(), "patch.MPQ");
    }

    #[test]
    fn test_reference_id_distinguishes_kinds() {
        let group = group();
        let hard = ItemReference::new(&group, "common.MPQ", "World\\", None);
        let overlay = VirtualItemReference::new(hard.clone());

        let as_hard = Reference::from(hard);
        let as_virtual = Reference::from(overlay);
        assert_eq!(as_hard.key(), as_virtual.key());
        assert_ne!(as_hard, as_virtual);
        assert!(as_virtual.is_virtual());
    }
}
