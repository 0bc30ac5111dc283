//! Dispatch and resubmission loops.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::{JoinError, JoinSet};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace};

use crate::context::EngineContext;
use crate::worker;

/// Pull ready work and run it on at most `ceiling` concurrent workers.
///
/// On cancellation no new work is started, but workers already running
/// are awaited so no reference is abandoned mid-expansion.
pub(crate) async fn dispatch_loop(
    context: Arc<EngineContext>,
    ceiling: usize,
    token: CancellationToken,
) {
    let ceiling = ceiling.max(1);
    let mut workers: JoinSet<()> = JoinSet::new();
    info!(ceiling, "Dispatch loop started");

    loop {
        while let Some(result) = workers.try_join_next() {
            reap(result);
        }
        if token.is_cancelled() {
            break;
        }

        if workers.len() < ceiling && context.groups_ready() {
            if let Some(item) = context.scheduler.pop_ready() {
                trace!(reference = %item.reference.key(), active = workers.len(), "Dispatching");
                context.stats.record_dispatch();
                let worker_context = Arc::clone(&context);
                workers.spawn_blocking(move || worker::run(&worker_context, item));
                continue;
            }
        }

        tokio::select! {
            _ = token.cancelled() => {}
            _ = context.scheduler.work_available() => {}
            Some(result) = workers.join_next(), if !workers.is_empty() => reap(result),
        }
    }

    let remaining = workers.len();
    if remaining > 0 {
        debug!(remaining, "Waiting for in-flight workers");
    }
    while let Some(result) = workers.join_next().await {
        reap(result);
    }
    info!("Dispatch loop stopped");
}

fn reap(result: Result<(), JoinError>) {
    if let Err(error) = result {
        error!(%error, "Enumeration worker did not complete");
    }
}

/// Promote waiting references once their parent is enumerated.
///
/// Wakes on scheduler activity, with `interval` as a fallback for parents
/// whose state changed outside the engine.
pub(crate) async fn resubmission_loop(
    context: Arc<EngineContext>,
    interval: Duration,
    token: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    debug!(?interval, "Resubmission loop started");

    loop {
        let promoted = context.scheduler.promote_waiting();
        if promoted > 0 {
            trace!(promoted, "Promoted waiting references");
        }

        tokio::select! {
            _ = token.cancelled() => break,
            _ = context.scheduler.waiters_changed() => {}
            _ = ticker.tick() => {}
        }
    }
    debug!("Resubmission loop stopped");
}
