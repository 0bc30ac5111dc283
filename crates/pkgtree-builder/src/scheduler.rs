//! Work and wait queues.
//!
//! Every reference the scheduler knows about is in exactly one of three
//! places: the work queue (ready to enumerate), the wait queue (blocked
//! on its parent), or dispatched to a worker. All three are guarded by a
//! single lock so submissions from any thread stay consistent with the
//! dispatch and resubmission loops.

use std::collections::{HashSet, VecDeque};

use parking_lot::Mutex;
use pkgtree_core::{Reference, ReferenceId, ReferenceState};
use tokio::sync::Notify;
use tokio::sync::futures::Notified;
use tracing::trace;

/// What a submission did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Appended to the work queue.
    Queued,
    /// Parked in the wait queue until the parent is enumerated.
    Waiting,
    /// Already enumerated, already tracked, or claimed by another worker.
    Ignored,
}

/// A reference handed to a worker, tagged with the reload generation it
/// was submitted under.
#[derive(Debug, Clone)]
pub struct WorkItem {
    pub reference: Reference,
    pub generation: u64,
}

#[derive(Default)]
struct Queues {
    work: VecDeque<Reference>,
    wait: VecDeque<Reference>,
    tracked: HashSet<ReferenceId>,
    in_flight: usize,
    generation: u64,
}

impl Queues {
    fn is_idle(&self) -> bool {
        self.work.is_empty() && self.wait.is_empty() && self.in_flight == 0
    }
}

/// Scheduler state shared between submitters and the engine loops.
#[derive(Default)]
pub struct Scheduler {
    queues: Mutex<Queues>,
    work_available: Notify,
    waiters_changed: Notify,
    idle: Notify,
}

fn parent_ready(reference: &Reference) -> bool {
    reference
        .parent()
        .is_none_or(|parent| parent.state() == ReferenceState::Enumerated)
}

impl Scheduler {
    /// Create an empty scheduler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Submit a reference for enumeration.
    pub fn submit(&self, reference: Reference) -> SubmitOutcome {
        let outcome = {
            let mut queues = self.queues.lock();
            Self::submit_locked(&mut queues, reference)
        };
        match outcome {
            SubmitOutcome::Queued => self.work_available.notify_one(),
            SubmitOutcome::Waiting => self.waiters_changed.notify_one(),
            SubmitOutcome::Ignored => {}
        }
        outcome
    }

    fn submit_locked(queues: &mut Queues, reference: Reference) -> SubmitOutcome {
        if reference.state() == ReferenceState::Enumerated {
            return SubmitOutcome::Ignored;
        }
        let id = reference.id();
        if queues.tracked.contains(&id) {
            return SubmitOutcome::Ignored;
        }
        if !parent_ready(&reference) {
            trace!(reference = %reference.key(), "Parent not enumerated, deferring");
            queues.tracked.insert(id);
            queues.wait.push_back(reference);
            return SubmitOutcome::Waiting;
        }
        let claimed = match &reference {
            Reference::Hard(hard) => hard.try_begin_enumeration(),
            Reference::Virtual(overlay) => overlay.try_schedule(),
        };
        if !claimed {
            return SubmitOutcome::Ignored;
        }
        queues.tracked.insert(id);
        queues.work.push_back(reference);
        SubmitOutcome::Queued
    }

    /// Move every waiting reference whose parent is now enumerated back
    /// through submission. Returns how many left the wait queue.
    pub fn promote_waiting(&self) -> usize {
        let (promoted, queued) = {
            let mut queues = self.queues.lock();
            if queues.wait.is_empty() {
                return 0;
            }
            let waiting = std::mem::take(&mut queues.wait);
            let mut promoted = 0;
            let mut queued = 0;
            for reference in waiting {
                if !parent_ready(&reference) {
                    queues.wait.push_back(reference);
                    continue;
                }
                promoted += 1;
                queues.tracked.remove(&reference.id());
                if Self::submit_locked(&mut queues, reference) == SubmitOutcome::Queued {
                    queued += 1;
                }
            }
            if queues.is_idle() {
                self.idle.notify_waiters();
            }
            (promoted, queued)
        };
        if queued > 0 {
            self.work_available.notify_one();
        }
        promoted
    }

    /// Pop the oldest ready reference and count it as dispatched.
    pub fn pop_ready(&self) -> Option<WorkItem> {
        let mut queues = self.queues.lock();
        let reference = queues.work.pop_front()?;
        queues.in_flight += 1;
        Some(WorkItem {
            reference,
            generation: queues.generation,
        })
    }

    /// Release a dispatched item. Items from an earlier generation are
    /// ignored.
    pub fn complete(&self, item: &WorkItem) {
        {
            let mut queues = self.queues.lock();
            if item.generation != queues.generation {
                return;
            }
            queues.tracked.remove(&item.reference.id());
            queues.in_flight = queues.in_flight.saturating_sub(1);
            if queues.is_idle() {
                self.idle.notify_waiters();
            }
        }
        self.waiters_changed.notify_one();
    }

    /// Drop every queued, waiting and dispatched entry and start a new
    /// generation. Returns the new generation.
    pub fn clear(&self) -> u64 {
        let mut queues = self.queues.lock();
        queues.work.clear();
        queues.wait.clear();
        queues.tracked.clear();
        queues.in_flight = 0;
        queues.generation += 1;
        self.idle.notify_waiters();
        queues.generation
    }

    /// Current reload generation.
    pub fn generation(&self) -> u64 {
        self.queues.lock().generation
    }

    /// Wake the dispatch loop without submitting anything.
    pub fn wake_dispatch(&self) {
        self.work_available.notify_one();
    }

    pub(crate) fn work_available(&self) -> Notified<'_> {
        self.work_available.notified()
    }

    pub(crate) fn waiters_changed(&self) -> Notified<'_> {
        self.waiters_changed.notified()
    }

    pub(crate) fn idle_notified(&self) -> Notified<'_> {
        self.idle.notified()
    }

    /// References ready to enumerate.
    pub fn queued(&self) -> usize {
        self.queues.lock().work.len()
    }

    /// References blocked on their parent.
    pub fn waiting(&self) -> usize {
        self.queues.lock().wait.len()
    }

    /// References currently dispatched to workers.
    pub fn in_flight(&self) -> usize {
        self.queues.lock().in_flight
    }

    /// Nothing queued, waiting or dispatched.
    pub fn is_idle(&self) -> bool {
        self.queues.lock().is_idle()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pkgtree_core::{ItemReference, PackageGroup, ParentLink, VirtualItemReference};
    use std::sync::Arc;

    fn group() -> Arc<PackageGroup> {
        Arc::new(PackageGroup::new("/data").with_package("common.MPQ", ["a\\", "a\\b.txt"]))
    }

    #[test]
    fn test_submit_is_fifo() {
        let group = group();
        let scheduler = Scheduler::new();
        let first = ItemReference::new(&group, "common.MPQ", "a\\", None);
        let second = ItemReference::new(&group, "common.MPQ", "b\\", None);

        assert_eq!(scheduler.submit(first.clone().into()), SubmitOutcome::Queued);
        assert_eq!(scheduler.submit(second.clone().into()), SubmitOutcome::Queued);
        assert_eq!(first.state(), ReferenceState::Enumerating);

        let item = scheduler.pop_ready().unwrap();
        assert_eq!(item.reference.key(), first.key());
        let item = scheduler.pop_ready().unwrap();
        assert_eq!(item.reference.key(), second.key());
        assert!(scheduler.pop_ready().is_none());
        assert_eq!(scheduler.in_flight(), 2);
    }

    #[test]
    fn test_duplicate_submission_is_ignored() {
        let group = group();
        let scheduler = Scheduler::new();
        let reference = ItemReference::new(&group, "common.MPQ", "a\\", None);

        assert_eq!(scheduler.submit(reference.clone().into()), SubmitOutcome::Queued);
        assert_eq!(scheduler.submit(reference.clone().into()), SubmitOutcome::Ignored);
        assert_eq!(scheduler.queued(), 1);

        let item = scheduler.pop_ready().unwrap();
        assert_eq!(scheduler.submit(reference.clone().into()), SubmitOutcome::Ignored);
        assert_eq!(scheduler.queued(), 0);

        reference.mark_enumerated();
        scheduler.complete(&item);
        assert_eq!(scheduler.submit(reference.into()), SubmitOutcome::Ignored);
        assert!(scheduler.is_idle());
    }

    #[test]
    fn test_waits_for_parent() {
        let group = group();
        let scheduler = Scheduler::new();
        let parent = ItemReference::new(&group, "common.MPQ", "", None);
        let child = parent.new_child("a\\");

        assert_eq!(scheduler.submit(child.clone().into()), SubmitOutcome::Waiting);
        assert_eq!(child.state(), ReferenceState::NotEnumerated);
        assert_eq!(scheduler.promote_waiting(), 0);
        assert!(scheduler.pop_ready().is_none());

        parent.mark_enumerated();
        assert_eq!(scheduler.promote_waiting(), 1);
        assert_eq!(scheduler.waiting(), 0);
        let item = scheduler.pop_ready().unwrap();
        assert_eq!(item.reference.key(), child.key());
        assert_eq!(child.state(), ReferenceState::Enumerating);
    }

    #[test]
    fn test_virtual_parent_gates_packages() {
        let group = group();
        let scheduler = Scheduler::new();
        let root = ItemReference::group_root(&group);
        let top = VirtualItemReference::new(root);
        let package = ItemReference::new(
            &group,
            "common.MPQ",
            "",
            Some(ParentLink::Virtual(Arc::downgrade(&top))),
        );

        assert_eq!(scheduler.submit(package.clone().into()), SubmitOutcome::Waiting);
        top.mark_synthetic_enumerated();
        scheduler.promote_waiting();
        assert_eq!(scheduler.queued(), 1);
    }

    #[test]
    fn test_clear_starts_new_generation() {
        let group = group();
        let scheduler = Scheduler::new();
        let reference = ItemReference::new(&group, "common.MPQ", "a\\", None);
        scheduler.submit(reference.into());
        let item = scheduler.pop_ready().unwrap();

        let generation = scheduler.clear();
        assert_eq!(generation, item.generation + 1);
        assert!(scheduler.is_idle());

        // A stale completion must not disturb the new generation.
        let fresh = ItemReference::new(&group, "common.MPQ", "b\\", None);
        scheduler.submit(fresh.into());
        let _fresh_item = scheduler.pop_ready().unwrap();
        scheduler.complete(&item);
        assert_eq!(scheduler.in_flight(), 1);
    }
}
