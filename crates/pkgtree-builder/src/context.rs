//! State shared by the facade, the engine loops and the workers.

use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::broadcast;

use crate::events::BuilderEvent;
use crate::mapping::VirtualMappingTable;
use crate::published::EnumeratedReferences;
use crate::scheduler::Scheduler;
use crate::stats::BuilderStats;

pub(crate) struct EngineContext {
    pub(crate) scheduler: Scheduler,
    pub(crate) mapping: VirtualMappingTable,
    pub(crate) published: EnumeratedReferences,
    pub(crate) stats: BuilderStats,
    pub(crate) assume_sorted: bool,
    events: broadcast::Sender<BuilderEvent>,
    groups_ready: AtomicBool,
}

impl EngineContext {
    pub(crate) fn new(event_capacity: usize, assume_sorted: bool) -> Self {
        let (events, _) = broadcast::channel(event_capacity.max(1));
        Self {
            scheduler: Scheduler::new(),
            mapping: VirtualMappingTable::new(),
            published: EnumeratedReferences::new(),
            stats: BuilderStats::default(),
            assume_sorted,
            events,
            groups_ready: AtomicBool::new(false),
        }
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<BuilderEvent> {
        self.events.subscribe()
    }

    /// Fire-and-forget; having no subscribers is not an error.
    pub(crate) fn notify(&self, event: BuilderEvent) {
        let _ = self.events.send(event);
    }

    pub(crate) fn groups_ready(&self) -> bool {
        self.groups_ready.load(Ordering::Acquire)
    }

    pub(crate) fn set_groups_ready(&self, ready: bool) {
        self.groups_ready.store(ready, Ordering::Release);
        if ready {
            self.scheduler.wake_dispatch();
        }
    }
}
