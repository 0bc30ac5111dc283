//! One-level expansion of a hard reference.

use std::collections::HashSet;
use std::sync::Arc;

use compact_str::CompactString;
use pkgtree_core::{EnumerationError, ItemReference, VirtualItemReference};
use tracing::debug;

use crate::mapping::{ClaimOutcome, VirtualMappingTable};

/// Children found by one expansion.
#[derive(Debug, Default)]
pub struct Expansion {
    /// Newly discovered children in listfile order.
    pub discovered: Vec<Arc<ItemReference>>,
    /// Overlays created because another package already provided one of
    /// the discovered paths.
    pub overlays: Vec<Arc<VirtualItemReference>>,
}

/// Expands exactly one directory level of a hard reference.
pub struct HardEnumerator<'a> {
    mapping: &'a VirtualMappingTable,
    assume_sorted: bool,
}

impl<'a> HardEnumerator<'a> {
    /// Create an enumerator registering discoveries in `mapping`.
    pub fn new(mapping: &'a VirtualMappingTable) -> Self {
        Self {
            mapping,
            assume_sorted: false,
        }
    }

    /// Stop scanning a listfile at the first miss after a run of matches.
    pub fn assume_sorted(mut self, assume_sorted: bool) -> Self {
        self.assume_sorted = assume_sorted;
        self
    }

    /// List the immediate children of `hard` and append the new ones to
    /// its child list.
    ///
    /// Directories are created `NotEnumerated`; files are created
    /// `Enumerated` since they have nothing left to list. The state of
    /// `hard` itself is left untouched.
    pub fn expand(&self, hard: &Arc<ItemReference>) -> Result<Expansion, EnumerationError> {
        let group = hard.group();
        let listfile = group
            .listfile(hard.package_name())
            .ok_or_else(|| EnumerationError::missing_listfile(group.name(), hard.package_name()))?;

        let separator = group.separator();
        let prefix = hard.item_path();
        // Siblings differing only in ASCII case are one item; the first
        // spelling wins.
        let mut seen: HashSet<CompactString> = hard
            .children()
            .iter()
            .map(|child| child.key().path.to_ascii_lowercase())
            .collect();

        let mut candidates = Vec::new();
        let mut matched_any = false;

        for entry in listfile {
            let Some(remainder) = strip_prefix_ignore_case(entry, prefix) else {
                if self.assume_sorted && matched_any {
                    break;
                }
                continue;
            };
            matched_any = true;

            if remainder.is_empty() {
                continue;
            }

            let (segment, is_directory) = match remainder.find(separator) {
                Some(index) => (&remainder[..index + separator.len_utf8()], true),
                None => (remainder, false),
            };

            let mut path = CompactString::new(prefix);
            path.push_str(segment);
            if !seen.insert(path.to_ascii_lowercase()) {
                continue;
            }

            let child = hard.new_child(path);
            if !is_directory {
                child.mark_enumerated();
            }
            candidates.push(child);
        }

        let discovered = hard.append_children(candidates);

        let mut overlays = Vec::new();
        for child in &discovered {
            match self.mapping.claim(child) {
                ClaimOutcome::Overlaid(overlay) => {
                    debug!(path = %child.item_path(), "Path provided by several packages, overlay created");
                    overlays.push(overlay);
                }
                ClaimOutcome::Replaced(_) => {
                    debug!(path = %child.item_path(), "Overlay already expanding, successor registered");
                }
                ClaimOutcome::First | ClaimOutcome::Extended(_) | ClaimOutcome::Duplicate => {}
            }
        }

        Ok(Expansion {
            discovered,
            overlays,
        })
    }
}

/// Strip `prefix` from `entry`, comparing ASCII letters case-insensitively.
fn strip_prefix_ignore_case<'e>(entry: &'e str, prefix: &str) -> Option<&'e str> {
    let head = entry.as_bytes().get(..prefix.len())?;
    if !head.eq_ignore_ascii_case(prefix.as_bytes()) {
        return None;
    }
    entry.get(prefix.len()..)
}
