//! The coordinating loop
//!
//! An [`Orchestrator`] owns the download pool, the materialize pool and the
//! action channel. Each poll it collects finished tasks from both pools,
//! routes their dependents through the [`RoutingTable`], updates per-asset
//! state and posts [`Action`]s for the consumer.

pub mod action;
pub mod routing;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Instant;

use crate::asset::{AssetDescriptor, AssetId, AssetPhase, AssetState};
use crate::core::{Error, Result, StreamerConfig, Vec3};
use crate::scheduler::{Completion, TaskPool};
use crate::services::{ArtifactStore, Collaborators, Services};
use crate::streaming::solid_angle;
use crate::task::{Task, TaskKind, TaskTag};

pub use action::{Action, ActionReceiver};
pub use routing::{PoolClass, RoutingTable};

use action::ActionSink;

/// Cooperative stop flag checked once per loop iteration
#[derive(Clone, Debug, Default)]
pub struct ShutdownHandle(Arc<AtomicBool>);

impl ShutdownHandle {
    pub fn request(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// A task failure as recorded by the orchestrator
#[derive(Clone, Debug, PartialEq)]
pub struct AssetFailure {
    pub asset: AssetId,
    pub task: Option<TaskTag>,
    pub error: String,
}

/// Counts from one [`Orchestrator::poll`]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PollReport {
    pub succeeded: usize,
    pub failed: usize,
    pub routed: usize,
}

/// How a run ended
#[derive(Clone, Debug, Default)]
pub struct RunReport {
    pub failures: Vec<AssetFailure>,
    /// Stopped by a shutdown request rather than running out of work
    pub shutdown: bool,
    /// Tasks still queued or running when the loop exited
    pub outstanding: usize,
}

/// Orchestrator running on its own thread
pub struct StreamHandle {
    shutdown: ShutdownHandle,
    join: JoinHandle<Result<RunReport>>,
}

impl StreamHandle {
    /// Ask the loop to stop after its current iteration
    pub fn stop(&self) {
        self.shutdown.request();
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Wait for the loop to exit
    pub fn join(self) -> Result<RunReport> {
        self.join
            .join()
            .map_err(|_| Error::WorkerPanicked("orchestrator thread panicked".into()))?
    }
}

pub struct Orchestrator {
    config: StreamerConfig,
    services: Arc<Services>,
    download: TaskPool,
    materialize: TaskPool,
    routing: RoutingTable,
    assets: BTreeMap<AssetId, AssetState>,
    actions: ActionSink,
    failures: Vec<AssetFailure>,
    shutdown: ShutdownHandle,
}

impl Orchestrator {
    /// Validate `config`, open the artifact store and start both worker pools.
    pub fn new(config: StreamerConfig, collaborators: Collaborators) -> Result<(Self, ActionReceiver)> {
        config.validate()?;
        let store = ArtifactStore::open(&config.cache_dir)?;
        let services = Arc::new(Services::new(collaborators, store, config.stream_params()));

        let download = TaskPool::new("download", config.download_workers, Arc::clone(&services))?;
        let materialize = TaskPool::new("materialize", config.materialize_workers, Arc::clone(&services))?;
        let (actions, receiver) = ActionSink::channel();

        let orchestrator = Self {
            config,
            services,
            download,
            materialize,
            routing: RoutingTable::default(),
            assets: BTreeMap::new(),
            actions,
            failures: Vec::new(),
            shutdown: ShutdownHandle::default(),
        };
        Ok((orchestrator, receiver))
    }

    /// Submit `assets` and run the loop on a dedicated thread.
    pub fn stream(
        config: StreamerConfig,
        collaborators: Collaborators,
        assets: Vec<AssetDescriptor>,
        vantage: Vec3,
    ) -> Result<(StreamHandle, ActionReceiver)> {
        let (mut orchestrator, receiver) = Self::new(config, collaborators)?;
        orchestrator.submit(assets, vantage)?;
        Ok((orchestrator.spawn()?, receiver))
    }

    pub fn with_routing(mut self, routing: RoutingTable) -> Self {
        self.routing = routing;
        self
    }

    pub fn config(&self) -> &StreamerConfig {
        &self.config
    }

    pub fn artifact_store(&self) -> &ArtifactStore {
        &self.services.store
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    pub fn asset_state(&self, id: AssetId) -> Option<&AssetState> {
        self.assets.get(&id)
    }

    pub fn assets(&self) -> impl Iterator<Item = &AssetState> {
        self.assets.values()
    }

    pub fn failures(&self) -> &[AssetFailure] {
        &self.failures
    }

    /// Both pools drained
    pub fn is_idle(&self) -> bool {
        self.download.is_empty() && self.materialize.is_empty()
    }

    /// Compute priorities for `assets` as seen from `vantage` and seed their downloads.
    ///
    /// Returns how many assets were scheduled. Assets already materialized are
    /// announced immediately; assets whose manifest lacks the requested
    /// variant are failed without scheduling. If downloads have no route,
    /// every asset is still processed and the first routing error is returned.
    pub fn submit(&mut self, assets: impl IntoIterator<Item = AssetDescriptor>, vantage: Vec3) -> Result<usize> {
        let weights = self.config.weights;
        let mut submitted = 0;
        let mut scheduled = 0;
        let mut unroutable = None;

        for asset in assets {
            let id = asset.id;
            if self.assets.contains_key(&id) {
                log::warn!("{id} already submitted; ignoring");
                continue;
            }
            submitted += 1;

            let solid_angle = solid_angle(vantage, asset.position, weights.radius(asset.scale));
            let priority = weights.model_download(solid_angle, asset.download_size);
            let asset = Arc::new(asset);
            let mut state = AssetState::new(Arc::clone(&asset), solid_angle, priority);

            if let Err(error) = asset.variant_manifest() {
                log::warn!("{id} ({}) rejected: {error}", asset.name());
                let error = error.to_string();
                state.record_failure(error.clone());
                self.assets.insert(id, state);
                self.fail(id, None, error);
                continue;
            }

            if asset.already_materialized {
                if let Some(artifact) = self.services.store.lookup(&asset.artifact_key()) {
                    log::debug!("{id} already materialized at {}", artifact.path().display());
                    state.restore(artifact.clone());
                    self.assets.insert(id, state);
                    self.actions.post(Action::AssetReady { asset: id, artifact });
                    continue;
                }
                log::warn!("{id} marked materialized but no artifact found; downloading");
            }

            log::trace!("{id}: solid angle {solid_angle:.3e}, priority {:.3e}", priority.value());
            self.assets.insert(id, state);
            if self.route_or_fail(Task::mesh_download(asset, solid_angle, priority), &mut unroutable) {
                scheduled += 1;
            }
        }

        log::info!("Submitted {submitted} assets, {scheduled} scheduled for download");
        match unroutable {
            Some(error) => Err(error),
            None => Ok(scheduled),
        }
    }

    /// One coordinating cycle over both pools.
    ///
    /// A dependent with no route fails its asset. The whole batch is still
    /// processed; the first such error is returned afterwards.
    pub fn poll(&mut self) -> Result<PollReport> {
        let mut report = PollReport::default();
        let mut unroutable = None;
        let mut completions = self.download.poll();
        completions.extend(self.materialize.poll());

        for completion in completions {
            match completion {
                Completion::Succeeded(mut task) => {
                    report.succeeded += 1;
                    let asset = task.asset().id;
                    let dependents = task.take_dependents();
                    log::debug!("{} {:?} for {asset} done, {} dependents", task.id(), task.tag(), dependents.len());

                    self.post_result(task);
                    for dependent in dependents {
                        if self.route_or_fail(dependent, &mut unroutable) {
                            report.routed += 1;
                        }
                    }
                    self.settle(asset);
                }
                Completion::Failed { task, error } => {
                    report.failed += 1;
                    let asset = task.asset().id;
                    log::warn!("{} {:?} for {asset} failed: {error}", task.id(), task.tag());
                    let error = error.to_string();
                    if let Some(state) = self.assets.get_mut(&asset) {
                        state.record_failure(error.clone());
                    }
                    self.fail(asset, Some(task.tag()), error);
                    self.settle(asset);
                }
            }
        }
        match unroutable {
            Some(error) => Err(error),
            None => Ok(report),
        }
    }

    /// Poll until both pools drain or shutdown is requested, then post
    /// [`Action::AllWorkDone`] (only when drained).
    pub fn run(&mut self) -> Result<RunReport> {
        let started = Instant::now();
        let mut last_status = Instant::now();

        loop {
            if self.shutdown.is_requested() {
                let report = self.report(true);
                log::info!("Shutdown requested; {} tasks left outstanding", report.outstanding);
                return Ok(report);
            }

            self.poll()?;
            if self.is_idle() {
                break;
            }

            if last_status.elapsed() >= self.config.status_interval() {
                self.log_status();
                last_status = Instant::now();
            }
            std::thread::sleep(self.config.poll_interval());
        }

        self.actions.post(Action::AllWorkDone);
        let report = self.report(false);
        log::info!(
            "All work done in {:.2?}: {} assets, {} failures",
            started.elapsed(),
            self.assets.len(),
            report.failures.len()
        );
        Ok(report)
    }

    /// Move the loop onto its own thread
    pub fn spawn(self) -> Result<StreamHandle> {
        let shutdown = self.shutdown.clone();
        let join = std::thread::Builder::new()
            .name("meshstream-orchestrator".into())
            .spawn(move || {
                let mut orchestrator = self;
                orchestrator.run()
            })?;
        Ok(StreamHandle { shutdown, join })
    }

    fn route(&mut self, task: Task) -> Result<()> {
        let class = self
            .routing
            .route(task.tag())
            .inspect_err(|e| log::error!("{} for {}: {e}", task.id(), task.asset().id))?;

        if let Some(state) = self.assets.get_mut(&task.asset().id) {
            state.task_queued();
        }
        match class {
            PoolClass::Download => self.download.add_task(task),
            PoolClass::Materialize => self.materialize.add_task(task),
        }
        Ok(())
    }

    /// Route `task`, or fail its asset when no pool takes its tag.
    ///
    /// The first routing error is kept in `unroutable`.
    fn route_or_fail(&mut self, task: Task, unroutable: &mut Option<Error>) -> bool {
        let asset = task.asset().id;
        let tag = task.tag();
        match self.route(task) {
            Ok(()) => true,
            Err(error) => {
                let message = error.to_string();
                if let Some(state) = self.assets.get_mut(&asset) {
                    state.record_failure(message.clone());
                }
                self.fail(asset, Some(tag), message);
                if unroutable.is_none() {
                    *unroutable = Some(error);
                }
                false
            }
        }
    }

    /// Update asset state and post the consumer-facing result of a successful task
    fn post_result(&mut self, task: Task) {
        let asset = task.asset().id;
        let Some(state) = self.assets.get_mut(&asset) else {
            log::warn!("{} finished for unknown {asset}", task.id());
            return;
        };

        match task.into_kind() {
            TaskKind::MeshDownload(_) => {}
            TaskKind::Materialize(materialize) => {
                let Some(artifact) = materialize.artifact().cloned() else {
                    return;
                };
                if state.set_artifact(artifact.clone()) {
                    log::info!("{asset} ({}) ready", state.descriptor.name());
                    self.actions.post(Action::AssetReady { asset, artifact });
                } else {
                    log::warn!("{asset} already has an artifact; ignoring {}", artifact.path().display());
                }
            }
            TaskKind::TextureDownload(mut texture) => {
                state.record_texture();
                let mip_offset = texture.level().offset;
                let data = texture.take_data().unwrap_or_default();
                self.actions.post(Action::TextureUpdated { asset, mip_offset, data });
            }
            TaskKind::ProgressiveChunk(mut chunk) => {
                let (read, total) = chunk.progress();
                state.record_refinements(read, total);
                let refinements = chunk.take_records();
                if !refinements.is_empty() {
                    self.actions.post(Action::RefinementsAvailable { asset, refinements });
                }
            }
        }
    }

    fn settle(&mut self, asset: AssetId) {
        if let Some(state) = self.assets.get_mut(&asset) {
            state.task_settled();
            if state.outstanding() == 0 && state.phase() == AssetPhase::Complete {
                log::debug!("{asset} complete ({} refinements, {} texture updates)", state.refinements_read(), state.textures_applied());
            }
        }
    }

    fn fail(&mut self, asset: AssetId, task: Option<TaskTag>, error: String) {
        self.failures.push(AssetFailure {
            asset,
            task,
            error: error.clone(),
        });
        self.actions.post(Action::AssetFailed { asset, task, error });
    }

    fn report(&self, shutdown: bool) -> RunReport {
        let outstanding = self.download.queued_len()
            + self.download.running_len()
            + self.materialize.queued_len()
            + self.materialize.running_len();
        RunReport {
            failures: self.failures.clone(),
            shutdown,
            outstanding,
        }
    }

    fn log_status(&self) {
        let ready = self.assets.values().filter(|s| s.is_renderable()).count();
        log::info!(
            "download {}/{} running, {} queued | materialize {}/{} running, {} queued | {ready}/{} assets ready",
            self.download.running_len(),
            self.download.worker_count(),
            self.download.queued_len(),
            self.materialize.running_len(),
            self.materialize.worker_count(),
            self.materialize.queued_len(),
            self.assets.len(),
        );
    }
}
