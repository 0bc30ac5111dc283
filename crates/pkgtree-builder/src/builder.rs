//! Builder facade: lifecycle, reloads and the public submission API.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use pkgtree_core::{
    BuilderConfig, BuilderError, ItemReference, PackageGroup, ParentLink, Reference,
    VirtualItemReference,
};
use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::context::EngineContext;
use crate::dispatch::{dispatch_loop, resubmission_loop};
use crate::events::BuilderEvent;
use crate::listfile::{ListfileDirectoryLoader, PackageGroupLoader};
use crate::scheduler::SubmitOutcome;
use crate::stats::BuilderProgress;

/// Result of a reload request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadOutcome {
    /// The tree was discarded and rebuilt.
    Reloaded { groups: usize },
    /// The configured sources match the loaded ones.
    Unchanged,
    /// Another reload was already running.
    InProgress,
}

enum Lifecycle {
    Stopped,
    Running {
        token: CancellationToken,
        loops: Vec<JoinHandle<()>>,
    },
}

/// Clears the reload flag when a reload exits, successfully or not.
struct ReloadGuard<'a>(&'a AtomicBool);

impl Drop for ReloadGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Lazily builds a browsable tree over one or more package groups.
///
/// Each directory level is listed only when its reference is submitted.
/// Expansion runs on background workers; the front end drains newly
/// discovered references with [`drain_enumerated`](Self::drain_enumerated)
/// and listens for [`BuilderEvent`]s.
///
/// # Example
///
/// ```rust,no_run
/// use pkgtree_builder::{BuilderConfig, TreeBuilder};
///
/// # async fn run() -> Result<(), pkgtree_builder::BuilderError> {
/// let builder = TreeBuilder::new(BuilderConfig::new(["/games/wow/Data"]));
/// builder.reload()?;
/// builder.start()?;
/// builder.wait_idle().await;
/// for reference in builder.drain_enumerated() {
///     println!("{}", reference.key());
/// }
/// builder.shutdown().await;
/// # Ok(())
/// # }
/// ```
pub struct TreeBuilder {
    context: Arc<EngineContext>,
    config: BuilderConfig,
    loader: Arc<dyn PackageGroupLoader>,
    configured_sources: Mutex<Vec<PathBuf>>,
    loaded_sources: Mutex<Option<Vec<PathBuf>>>,
    groups: Mutex<Vec<Arc<VirtualItemReference>>>,
    reloading: AtomicBool,
    lifecycle: Mutex<Lifecycle>,
    retired: Mutex<Vec<JoinHandle<()>>>,
}

impl TreeBuilder {
    /// Create a builder loading groups from listfile directories.
    pub fn new(config: BuilderConfig) -> Self {
        let loader = ListfileDirectoryLoader::new(config.separator);
        Self::with_loader(config, loader)
    }

    /// Create a builder with a custom package group loader.
    pub fn with_loader(config: BuilderConfig, loader: impl PackageGroupLoader + 'static) -> Self {
        let context = EngineContext::new(config.event_capacity, config.assume_sorted_listfiles);
        Self {
            context: Arc::new(context),
            configured_sources: Mutex::new(config.package_sources.clone()),
            config,
            loader: Arc::new(loader),
            loaded_sources: Mutex::new(None),
            groups: Mutex::new(Vec::new()),
            reloading: AtomicBool::new(false),
            lifecycle: Mutex::new(Lifecycle::Stopped),
            retired: Mutex::new(Vec::new()),
        }
    }

    /// Subscribe to builder events.
    pub fn subscribe(&self) -> broadcast::Receiver<BuilderEvent> {
        self.context.subscribe()
    }

    /// Start the dispatch and resubmission loops on the current tokio
    /// runtime.
    pub fn start(&self) -> Result<(), BuilderError> {
        let handle = Handle::try_current().map_err(|_| BuilderError::NoRuntime)?;
        let mut lifecycle = self.lifecycle.lock();
        if matches!(*lifecycle, Lifecycle::Running { .. }) {
            return Err(BuilderError::invalid_state("start", "running"));
        }

        let token = CancellationToken::new();
        let ceiling = self.config.concurrency_ceiling();
        let dispatch = handle.spawn(dispatch_loop(
            Arc::clone(&self.context),
            ceiling,
            token.clone(),
        ));
        let resubmit = handle.spawn(resubmission_loop(
            Arc::clone(&self.context),
            self.config.resubmit_interval(),
            token.clone(),
        ));

        info!(ceiling, "Tree builder started");
        *lifecycle = Lifecycle::Running {
            token,
            loops: vec![dispatch, resubmit],
        };
        Ok(())
    }

    /// Ask both loops to exit after their current iteration.
    ///
    /// In-flight workers finish their expansion; nothing is rolled back.
    pub fn stop(&self) -> Result<(), BuilderError> {
        let mut lifecycle = self.lifecycle.lock();
        match std::mem::replace(&mut *lifecycle, Lifecycle::Stopped) {
            Lifecycle::Stopped => Err(BuilderError::invalid_state("stop", "stopped")),
            Lifecycle::Running { token, loops } => {
                token.cancel();
                self.retired.lock().extend(loops);
                info!("Tree builder stopping");
                Ok(())
            }
        }
    }

    /// Stop (if running) and wait for both loops and all in-flight
    /// workers to exit.
    pub async fn shutdown(&self) {
        if self.is_running() {
            let _ = self.stop();
        }
        let loops = std::mem::take(&mut *self.retired.lock());
        for handle in loops {
            if let Err(error) = handle.await {
                warn!(%error, "Builder loop did not exit cleanly");
            }
        }
    }

    /// Whether the loops are running.
    pub fn is_running(&self) -> bool {
        matches!(*self.lifecycle.lock(), Lifecycle::Running { .. })
    }

    /// Replace the configured package group sources.
    ///
    /// Takes effect on the next [`reload`](Self::reload).
    pub fn set_package_sources<I, P>(&self, sources: I)
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        *self.configured_sources.lock() = sources.into_iter().map(Into::into).collect();
    }

    /// Whether the configured sources differ from the ones last loaded.
    pub fn has_package_directory_changed(&self) -> bool {
        let configured = self.configured_sources.lock().clone();
        match &*self.loaded_sources.lock() {
            Some(loaded) => *loaded != configured,
            None => true,
        }
    }

    /// Rebuild the tree if the configured sources changed.
    ///
    /// Every group is loaded before anything is discarded, so a load
    /// failure leaves the current tree intact. A reload requested while
    /// another is running returns [`ReloadOutcome::InProgress`] at once.
    pub fn reload(&self) -> Result<ReloadOutcome, BuilderError> {
        if self
            .reloading
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Reload already in progress");
            return Ok(ReloadOutcome::InProgress);
        }
        let _guard = ReloadGuard(&self.reloading);

        if !self.has_package_directory_changed() {
            return Ok(ReloadOutcome::Unchanged);
        }

        let sources = self.configured_sources.lock().clone();
        info!(sources = sources.len(), "Reloading package groups");

        let mut loaded = Vec::with_capacity(sources.len());
        for source in &sources {
            let group = self.loader.load(source)?;
            debug!(
                group = %group.name(),
                packages = group.package_count(),
                entries = group.total_entries(),
                "Package group loaded"
            );
            loaded.push(Arc::new(group));
        }

        self.context.set_groups_ready(false);
        let generation = self.context.scheduler.clear();
        self.context.mapping.clear();
        self.context.published.reset(generation);
        self.context.stats.reset();
        self.groups.lock().clear();

        for group in &loaded {
            self.install_group(group);
        }

        *self.loaded_sources.lock() = Some(sources);
        self.context.set_groups_ready(true);
        info!(groups = loaded.len(), generation, "Reload complete");
        Ok(ReloadOutcome::Reloaded {
            groups: loaded.len(),
        })
    }

    /// Register a loaded group: its synthetic top-level overlay, one
    /// placeholder per package, and the initial work.
    fn install_group(&self, group: &Arc<PackageGroup>) {
        let root = ItemReference::group_root(group);
        let top = VirtualItemReference::new(Arc::clone(&root));
        top.mark_synthetic_enumerated();
        self.context
            .mapping
            .add_virtual_mapping(&root, Arc::clone(&top));
        self.groups.lock().push(Arc::clone(&top));
        self.context
            .notify(BuilderEvent::PackageGroupAdded(Reference::Virtual(Arc::clone(&top))));

        let packages: Vec<_> = group
            .package_names()
            .map(|name| {
                ItemReference::new(
                    group,
                    name,
                    "",
                    Some(ParentLink::Virtual(Arc::downgrade(&top))),
                )
            })
            .collect();
        let packages = root.append_children(packages);

        for package in packages {
            let reference = Reference::Hard(package);
            self.context
                .notify(BuilderEvent::PackageEnumerated(reference.clone()));
            self.context.scheduler.submit(reference);
        }
    }

    /// Submit a reference for one-level expansion.
    ///
    /// Already enumerated or already scheduled references are ignored; a
    /// reference whose parent is not enumerated yet waits until it is.
    pub fn submit_work(&self, reference: impl Into<Reference>) -> SubmitOutcome {
        self.context.scheduler.submit(reference.into())
    }

    /// Take every reference discovered since the last drain.
    pub fn drain_enumerated(&self) -> Vec<Reference> {
        self.context.published.drain()
    }

    /// Overlay covering `hard`'s path in its group, if any.
    pub fn get_virtual_reference(&self, hard: &ItemReference) -> Option<Arc<VirtualItemReference>> {
        self.context.mapping.get_virtual_reference(hard)
    }

    /// Register an overlay for `hard`'s path. First writer wins.
    pub fn add_virtual_mapping(
        &self,
        hard: &ItemReference,
        overlay: Arc<VirtualItemReference>,
    ) -> bool {
        self.context.mapping.add_virtual_mapping(hard, overlay)
    }

    /// Top-level overlays of the loaded groups, in source order.
    pub fn package_groups(&self) -> Vec<Arc<VirtualItemReference>> {
        self.groups.lock().clone()
    }

    /// Nothing queued, waiting or dispatched.
    pub fn is_idle(&self) -> bool {
        self.context.scheduler.is_idle()
    }

    /// Wait until nothing is queued, waiting or dispatched.
    ///
    /// References waiting on a parent that is never enumerated keep the
    /// builder busy, so callers should only submit children of expanded
    /// references or bound the wait with a timeout.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.context.scheduler.idle_notified();
            if self.is_idle() {
                return;
            }
            notified.await;
        }
    }

    /// Maximum number of concurrent workers.
    pub fn concurrency_ceiling(&self) -> usize {
        self.config.concurrency_ceiling()
    }

    /// Current statistics and queue depths.
    pub fn progress(&self) -> BuilderProgress {
        let scheduler = &self.context.scheduler;
        BuilderProgress {
            queued: scheduler.queued(),
            waiting: scheduler.waiting(),
            in_flight: scheduler.in_flight(),
            ..self.context.stats.snapshot()
        }
    }
}

impl Drop for TreeBuilder {
    fn drop(&mut self) {
        if let Lifecycle::Running { token, .. } = &*self.lifecycle.lock() {
            token.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pkgtree_core::{ListfileError, ReferenceState};
    use std::path::Path;

    struct StaticLoader;

    impl PackageGroupLoader for StaticLoader {
        fn load(&self, source: &Path) -> Result<PackageGroup, ListfileError> {
            Ok(PackageGroup::new(source).with_package("common.MPQ", ["a\\", "a\\b.txt"]))
        }
    }

    fn builder(sources: &[&str]) -> TreeBuilder {
        TreeBuilder::with_loader(BuilderConfig::new(sources.iter().copied()), StaticLoader)
    }

    #[test]
    fn test_start_requires_runtime() {
        let builder = builder(&["/data"]);
        assert!(matches!(builder.start(), Err(BuilderError::NoRuntime)));
    }

    #[test]
    fn test_stop_before_start_fails() {
        let builder = builder(&["/data"]);
        assert!(matches!(
            builder.stop(),
            Err(BuilderError::InvalidState { .. })
        ));
    }

    #[test]
    fn test_reload_seeds_packages() {
        let builder = builder(&["/data"]);
        let mut events = builder.subscribe();

        let outcome = builder.reload().unwrap();
        assert_eq!(outcome, ReloadOutcome::Reloaded { groups: 1 });

        let groups = builder.package_groups();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].state(), ReferenceState::Enumerated);

        let packages = groups[0].primary().children();
        assert_eq!(packages.len(), 1);
        assert_eq!(packages[0].state(), ReferenceState::Enumerating);
        assert_eq!(builder.progress().queued, 1);

        assert!(matches!(
            events.try_recv().unwrap(),
            BuilderEvent::PackageGroupAdded(_)
        ));
        assert!(matches!(
            events.try_recv().unwrap(),
            BuilderEvent::PackageEnumerated(_)
        ));
    }

    #[test]
    fn test_reload_only_when_sources_change() {
        let builder = builder(&["/data"]);
        assert!(builder.has_package_directory_changed());
        builder.reload().unwrap();
        assert!(!builder.has_package_directory_changed());
        assert_eq!(builder.reload().unwrap(), ReloadOutcome::Unchanged);

        builder.set_package_sources(["/data", "/patch"]);
        assert!(builder.has_package_directory_changed());
        assert_eq!(
            builder.reload().unwrap(),
            ReloadOutcome::Reloaded { groups: 2 }
        );
    }

    #[test]
    fn test_group_root_maps_to_top_overlay() {
        let builder = builder(&["/data"]);
        builder.reload().unwrap();

        let top = builder.package_groups().remove(0);
        let package = top.primary().children().remove(0);
        let found = builder.get_virtual_reference(&package).unwrap();
        assert!(Arc::ptr_eq(&found, &top));
    }
}
