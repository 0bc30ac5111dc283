//! Worker body: enumerate one dispatched reference.

use std::sync::Arc;

use pkgtree_core::{EnumerationError, ItemReference, Reference, ReferenceState};
use tracing::{debug, warn};

use crate::context::EngineContext;
use crate::enumerator::HardEnumerator;
use crate::events::BuilderEvent;
use crate::scheduler::WorkItem;

/// Releases a work item however the worker exits.
///
/// Any hard reference the worker claimed but did not finish is reverted
/// to `NotEnumerated` and reported as a failure, so a panic never leaves a
/// reference stuck in `Enumerating`.
struct DispatchGuard<'a> {
    context: &'a EngineContext,
    item: &'a WorkItem,
    claimed: Vec<Arc<ItemReference>>,
}

impl<'a> DispatchGuard<'a> {
    fn new(context: &'a EngineContext, item: &'a WorkItem) -> Self {
        Self {
            context,
            item,
            claimed: Vec::new(),
        }
    }

    fn claim(&mut self, hard: &Arc<ItemReference>) {
        self.claimed.push(Arc::clone(hard));
    }
}

impl Drop for DispatchGuard<'_> {
    fn drop(&mut self) {
        for hard in &self.claimed {
            if hard.reset_enumeration() {
                warn!(reference = %hard.key(), "Worker exited mid-expansion, reference reverted");
                self.context.stats.record_failure();
                self.context.notify(BuilderEvent::EnumerationFailed {
                    reference: Reference::Hard(Arc::clone(hard)),
                    message: "worker exited before finishing the expansion".to_string(),
                });
            }
        }
        if let Reference::Virtual(overlay) = &self.item.reference {
            overlay.finish_schedule();
        }
        self.context.scheduler.complete(self.item);
    }
}

/// Enumerate a dispatched reference.
///
/// A hard reference is expanded directly. An overlay expands its primary
/// and then each overridden reference in registration order, skipping any
/// that another worker already owns or finished.
pub(crate) fn run(context: &EngineContext, item: WorkItem) {
    let mut guard = DispatchGuard::new(context, &item);

    match &item.reference {
        Reference::Hard(hard) => {
            guard.claim(hard);
            expand_and_report(context, item.generation, hard);
        }
        Reference::Virtual(overlay) => {
            for part in overlay.hard_references() {
                if !part.try_begin_enumeration() {
                    continue;
                }
                guard.claim(&part);
                expand_and_report(context, item.generation, &part);
            }
            debug!(
                reference = %overlay.key(),
                state = %overlay.state(),
                "Overlay expansion pass finished"
            );
        }
    }
}

fn expand_and_report(context: &EngineContext, generation: u64, hard: &Arc<ItemReference>) {
    match enumerate_hard_reference(context, generation, hard) {
        Ok(()) => {}
        Err(EnumerationError::Interrupted) => {
            hard.reset_enumeration();
            debug!(reference = %hard.key(), "Skipping reference from a previous reload");
        }
        Err(error) => report_failure(context, hard, error),
    }
}

fn report_failure(context: &EngineContext, hard: &Arc<ItemReference>, error: EnumerationError) {
    hard.reset_enumeration();
    context.stats.record_failure();
    warn!(reference = %hard.key(), %error, "Enumeration failed");
    context.notify(BuilderEvent::EnumerationFailed {
        reference: Reference::Hard(Arc::clone(hard)),
        message: error.to_string(),
    });
}

/// Expand one level of `hard`, publish the new children as one batch,
/// then mark `hard` enumerated and announce it.
///
/// Work dispatched before a reload is abandoned with
/// [`EnumerationError::Interrupted`] instead of expanding a discarded tree.
pub(crate) fn enumerate_hard_reference(
    context: &EngineContext,
    generation: u64,
    hard: &Arc<ItemReference>,
) -> Result<(), EnumerationError> {
    debug_assert_eq!(hard.state(), ReferenceState::Enumerating);
    if context.scheduler.generation() != generation {
        return Err(EnumerationError::Interrupted);
    }

    let expansion = HardEnumerator::new(&context.mapping)
        .assume_sorted(context.assume_sorted)
        .expand(hard)?;

    let children = expansion.discovered.len();
    let batch = expansion.discovered.into_iter().map(Reference::Hard);
    let current = context.published.publish(generation, batch);

    hard.mark_enumerated();

    if !current {
        debug!(reference = %hard.key(), "Discarding expansion from a previous reload");
        return Ok(());
    }

    context.stats.record_expansion(children, expansion.overlays.len());

    debug!(reference = %hard.key(), children, "Reference enumerated");
    context.notify(BuilderEvent::EnumerationFinished(Reference::Hard(Arc::clone(hard))));
    Ok(())
}
