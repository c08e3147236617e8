//! Dependency graph execution.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, mpsc};

use indexmap::IndexSet;
use petgraph::visit::Walker;
use rayon::Scope;
use tracing::{debug, info, warn};

use crate::dep::{DepGraph, DepId, DepNode};
use crate::progress::{Progress, ProgressConfig, ProgressStatus};
use crate::world::{LOCAL_WORLD, World};

#[derive(Debug)]
pub struct ExecConfig {
    /// The maximum amount of actions that can execute in parallel.
    pub parallelism: usize,
}

impl Default for ExecConfig {
    fn default() -> Self {
        Self { parallelism: 1 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildStatusKind {
    /// The build hasn't been checked yet
    Fresh,
    /// The build has been started
    Started,
    /// The build is up-to-date and does not need running
    UpToDate,
    /// Building has failed
    Failed,
    /// Building has succeeded
    Succeeded,
    /// Cannot run because a dependency has failed
    Skipped,
}

impl BuildStatusKind {
    fn is_finished(self) -> bool {
        matches!(
            self,
            BuildStatusKind::UpToDate | BuildStatusKind::Failed | BuildStatusKind::Succeeded | BuildStatusKind::Skipped
        )
    }

    fn is_successful(self) -> bool {
        matches!(self, BuildStatusKind::UpToDate | BuildStatusKind::Succeeded)
    }
}

#[derive(Debug, Clone)]
struct BuildStatus {
    kind: BuildStatusKind,
    /// The number of input nodes of this build that has yet to
    /// [finish successfully](BuildStatusKind::is_successful).
    pending_inputs: usize,
}

/// Some internal shared state that is passed to each build task.
struct SharedState<'a> {
    #[allow(unused)] // might be used later
    cfg: &'a ExecConfig,
    graph: &'a DepGraph,
    world: &'a dyn World,
    pool: rayon::ThreadPool,
    progress: &'a dyn Progress,
}

/// The executor that runs a dependency graph.
///
/// # The state machine
///
/// The executor tracks the state of each node that needs to be executed.
/// The following rules are used to initialize the state machine, assuming
/// edges point **from the consumer to the dependency**.
///
/// - Each node reachable from the nodes wanted by the user is tracked.
/// - A node is initially in fresh state.
/// - The number of pending inputs of each node is initialized to the out
///   degree (i.e. the number of input nodes) of the node.
///
/// The following rules drive the states forward:
///
/// - Any fresh node with 0 pending input nodes can be immediately scheduled
///   to execute (might wait until the thread pool has capacity).
/// - Any newly successfully finished node (success or up-to-date) reduces
///   the pending input count of all its consumer nodes by 1.
/// - Any newly failed node (failed or skipped) causes all its transitive
///   consumer nodes to be marked as skipped.
///
/// The state machine makes progress until no more nodes can be started, at
/// which point all nodes must be finished (success, up-to-date, failed, or
/// skipped), since except for the starting nodes, all nodes only start
/// after their dependencies finish.
pub struct Executor<'a> {
    state: Arc<SharedState<'a>>,

    /// Nodes that can be immediately started
    pending: IndexSet<DepId>,
    /// The current status of each tracked node
    builds: HashMap<DepId, BuildStatus>,

    running: usize,
    finished: usize,
    failed: usize,

    build_started: bool,
}

impl<'a> Executor<'a> {
    /// Create a new executor. Most use cases should use this.
    pub fn new(cfg: &'a ExecConfig, graph: &'a DepGraph, progress: &'a dyn Progress) -> Self {
        Self::with_world_and_progress(cfg, graph, &LOCAL_WORLD, progress)
    }

    /// Create a new executor with a custom [`World`] implementation.
    pub fn with_world(cfg: &'a ExecConfig, graph: &'a DepGraph, world: &'a dyn World, progress: &'a dyn Progress) -> Self {
        Self::with_world_and_progress(cfg, graph, world, progress)
    }

    /// Create a new executor with a custom [`World`] and [`Progress`] implementation.
    pub fn with_world_and_progress(cfg: &'a ExecConfig, graph: &'a DepGraph, world: &'a dyn World, progress: &'a dyn Progress) -> Self {
        let pool = rayon::ThreadPoolBuilder::new().num_threads(cfg.parallelism).build().unwrap();

        let state = SharedState { cfg, graph, world, pool, progress };
        Self {
            state: Arc::new(state),
            pending: Default::default(),
            builds: Default::default(),
            running: 0,
            finished: 0,
            failed: 0,
            build_started: false,
        }
    }

    /// Add a list of nodes to be executed. Returns the number of nodes
    /// affected. Must be called before [`Self::run`].
    #[tracing::instrument(skip_all)]
    pub fn want(&mut self, build: impl IntoIterator<Item = DepId>) -> usize {
        if self.build_started {
            panic!("Cannot call want() after run() has been called");
        }

        let dfs_stack: Vec<DepId> = build.into_iter().collect();
        self.want_internal(dfs_stack)
    }

    fn want_internal(&mut self, start_stack: Vec<DepId>) -> usize {
        let mut affected_nodes = 0;
        let mut dfs_stack = start_stack;

        while let Some(build) = dfs_stack.pop() {
            if self.builds.contains_key(&build) {
                continue;
            }

            affected_nodes += 1;

            let mut children_count: usize = 0;
            for node in self.state.graph.dependencies(build) {
                children_count += 1;
                dfs_stack.push(node);
            }
            if children_count == 0 {
                self.pending.insert(build);
            }

            let original = self.builds.insert(build, BuildStatus { kind: BuildStatusKind::Fresh, pending_inputs: children_count });
            if let Some(original) = original {
                match original.kind {
                    BuildStatusKind::Fresh | BuildStatusKind::Started => {}
                    BuildStatusKind::UpToDate | BuildStatusKind::Succeeded => {
                        self.finished -= 1;
                    }
                    BuildStatusKind::Failed | BuildStatusKind::Skipped => {
                        self.finished -= 1;
                        self.failed -= 1;
                    }
                }
            }
        }

        affected_nodes
    }

    /// Perform the build.
    #[tracing::instrument(skip_all)]
    pub fn run(&mut self) -> Result<(), std::io::Error> {
        self.build_started = true;

        self.state.progress.prepare(&ProgressConfig { max_threads: Some(self.state.cfg.parallelism) });

        let state = self.state.clone();
        let (tx, mut rx) = mpsc::channel::<BuildNodeResult>();
        state.pool.in_place_scope(|pool| self.run_inner(pool, tx, &mut rx))?;
        // Gracefully retain the receiver until all senders are dropped, so that
        // threads in the pool can finish sending messages.
        drop(rx);

        self.state.progress.finish();

        Ok(())
    }

    fn run_inner<'scope>(&mut self, pool: &Scope<'scope>, tx: mpsc::Sender<BuildNodeResult>, rx: &mut mpsc::Receiver<BuildNodeResult>) -> Result<(), std::io::Error>
    where
        'a: 'scope,
    {
        loop {
            debug!(
                running = self.running,
                pending = self.pending.len(),
                finished = self.finished,
                total = self.builds.len(),
                failed = self.failed,
                "Run loop iteration"
            );

            while let Some(val) = self.pending.pop() {
                self.start_build(pool, tx.clone(), val);
            }

            if self.finished == self.builds.len() || self.failed > 0 {
                info!("All builds finished");
                break;
            }

            if self.running == 0 {
                panic!("No builds are in progress, but not all builds are finished. This is a bug.");
            }

            let msg = rx.recv().expect("We have a tx in hand, so rx should not close");
            debug!(?msg, "Build finished");

            self.build_finished(msg)?;
        }

        Ok(())
    }

    fn build_finished(&mut self, msg: BuildNodeResult) -> Result<(), std::io::Error> {
        let id = msg.id;
        let stat = match msg.result {
            Ok(res) => res,
            Err(e) => {
                warn!("Our build executor has encountered a problem: {e}");
                return Err(e);
            }
        };
        if !stat.is_finished() {
            panic!("Build {:?} returned non-finished status {:?}. This is a bug.", msg.id, stat);
        }

        self.running -= 1;
        self.finished += 1;

        let build = self.builds.get_mut(&msg.id).expect("Build should exist");

        if build.kind.is_finished() {
            panic!(
                "Build {:?} has already finished with status {:?}, cannot finish again with {:?}. This is a bug.",
                msg.id, build.kind, stat
            );
        }
        build.kind = stat;

        match stat {
            BuildStatusKind::Fresh => panic!("Build cannot be fresh after running"),
            BuildStatusKind::Started => panic!("Build cannot be started after running"),
            BuildStatusKind::Succeeded | BuildStatusKind::UpToDate => {
                for node in self.state.graph.dependents(id) {
                    let Some(dep) = self.builds.get_mut(&node) else {
                        continue;
                    };

                    if dep.kind.is_finished() {
                        if dep.kind.is_successful() {
                            panic!(
                                "Build {:?} has already finished with status {:?}, cannot finish again with {:?}. This is a bug.",
                                node, dep.kind, stat
                            );
                        }
                        continue;
                    }
                    dep.pending_inputs -= 1;

                    if dep.pending_inputs == 0 {
                        self.pending.insert(node);
                    }
                }
            }
            BuildStatusKind::Failed | BuildStatusKind::Skipped => {
                self.failed += 1;
                // Mark skipped for all transitive dependents.
                let dfs = petgraph::visit::Dfs::new(self.state.graph.graph(), id.index() as u32);
                for node in dfs.iter(self.state.graph.graph()).skip(1) {
                    let node = DepId::from_raw(node);
                    let Some(dep) = self.builds.get_mut(&node) else {
                        continue;
                    };
                    if dep.kind.is_finished() {
                        continue;
                    }
                    dep.kind = BuildStatusKind::Skipped;
                    self.finished += 1;
                    self.failed += 1;
                }
            }
        }

        let status = self.status();
        self.state.progress.build_finished(self.state.graph, id, stat.is_successful(), &status);

        Ok(())
    }

    fn status(&self) -> ProgressStatus {
        ProgressStatus { total: self.builds.len(), started: self.running + self.finished, done: self.finished, failed: self.failed }
    }

    fn start_build<'scope>(&mut self, pool: &Scope<'scope>, tx: mpsc::Sender<BuildNodeResult>, node: DepId)
    where
        'a: 'scope,
    {
        info!(?node, "Starting build");

        let status = self.status();
        self.state.progress.build_started(self.state.graph, node, &status);

        let state = self.state.clone();
        self.builds.get_mut(&node).expect("Build should exist").kind = BuildStatusKind::Started;
        self.running += 1;

        pool.spawn(move |_p| run_build(state, node, tx));
    }
}

#[derive(Debug)]
struct BuildNodeResult {
    id: DepId,
    /// The result of the build. Only `Err` if an error on our side fails it.
    result: std::io::Result<BuildStatusKind>,
}

#[derive(Debug)]
enum NodeInputKind {
    UpToDate,
    Outdated,
    Missing(DepId),
    CannotRead(std::path::PathBuf, std::io::Error),
}

/// Determine if the node is up-to-date by comparing the target file's
/// mtime against every prerequisite's target mtime — plain GNU make
/// semantics, no cached build database: a phony target or one with no
/// recipe is always considered outdated so its (possibly empty) recipe
/// still runs and its result still propagates to dependents.
#[tracing::instrument(skip_all)]
fn stat_node(world: &dyn World, graph: &DepGraph, node: &DepNode) -> NodeInputKind {
    if node.is_phony || node.recipe.is_empty() {
        return NodeInputKind::Outdated;
    }

    let target_path = Path::new(node.target.as_str());
    if !world.exists(target_path) {
        debug!("Outdated: target {:?} does not exist", target_path);
        return NodeInputKind::Outdated;
    }
    let target_mtime = match world.mtime(target_path) {
        Ok(t) => t,
        Err(e) => return NodeInputKind::CannotRead(target_path.to_owned(), e),
    };

    for &dep_id in node.prerequisites.iter().chain(node.order_only.iter()) {
        let dep = graph.get(dep_id);
        if dep.is_phony {
            debug!("Outdated: prerequisite {} is phony", dep.target);
            return NodeInputKind::Outdated;
        }
        let dep_path = Path::new(dep.target.as_str());
        if !world.exists(dep_path) {
            debug!("Missing: prerequisite {:?} does not exist", dep_path);
            return NodeInputKind::Missing(dep_id);
        }
        let dep_mtime = match world.mtime(dep_path) {
            Ok(t) => t,
            Err(e) => return NodeInputKind::CannotRead(dep_path.to_owned(), e),
        };
        if dep_mtime > target_mtime {
            debug!("Outdated: prerequisite {:?} newer than target {:?}", dep_path, target_path);
            return NodeInputKind::Outdated;
        }
    }

    debug!("Up-to-date: target {:?}", target_path);
    NodeInputKind::UpToDate
}

/// Runs the build node.
fn run_build(state: Arc<SharedState<'_>>, id: DepId, report: mpsc::Sender<BuildNodeResult>) {
    let graph = state.graph;
    let build = graph.get(id);

    let span = tracing::info_span!("run_build", ?id, target = %build.target);
    let _guard = span.enter();

    let node_stat = stat_node(state.world, graph, build);

    let result_kind = match node_stat {
        NodeInputKind::UpToDate => Ok(BuildStatusKind::UpToDate),
        NodeInputKind::CannotRead(path_buf, error) => Err(std::io::Error::other(format!("Cannot read input file {path_buf:?}: {error}"))),
        NodeInputKind::Missing(dep_id) => {
            info!("Missing prerequisite {} for build {id:?}", graph.get(dep_id).target);
            Ok(BuildStatusKind::Failed)
        }
        NodeInputKind::Outdated => {
            if build.recipe.is_empty() {
                Ok(BuildStatusKind::Succeeded)
            } else {
                match state.world.run_recipe(&build.recipe) {
                    Ok(true) => Ok(BuildStatusKind::Succeeded),
                    Ok(false) => Ok(BuildStatusKind::Failed),
                    Err(e) => Err(e),
                }
            }
        }
    };

    report.send(BuildNodeResult { id, result: result_kind }).expect("Failed to send build result");
}

