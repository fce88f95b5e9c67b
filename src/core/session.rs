//! Session tree: arena of sessions linked by identifiers.
//!
//! Every session owns one use case and two resource pools. The functional
//! pool holds tokens for the whole functional run; the distributable pool
//! is what child sessions draw their own grants from. Both are carved out
//! of the parent's distributable pool when the session initializes and
//! returned to it on reset. The root session (id 0) owns the catalog-wide
//! distributable pool and has no use case.
//!
//! `run` drives the use case synchronously through the stages allowed by
//! its run depth, checking the stop flag and the time constraints; runtime
//! failures are reported in the returned [`RunOutcome`], never as `Err`.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::config::UseCaseConfig;
use crate::core::cardinality::{CardinalityRequest, ResourceCardinality};
use crate::core::catalog::{ResourceCatalog, ResourceSetFlag};
use crate::core::error::SchedulerError;
use crate::core::reservation::TimePeriod;
use crate::core::resource_pool::{CardinalityProfile, ResourcePool, SharedResourcePool};
use crate::core::running::{
    RunControl, RunOutcome, RunStage, RunStageCompletion, RunTermination, WorkLoopStatus,
};
use crate::core::time_constraints::TimeConstraints;
use crate::core::use_case::{RunContext, UseCase, UseCaseProperties, UseCaseRegistry};
use crate::util::clock::{elapsed_between, Clock};

/// Session identifier.
pub type SessionId = i32;

/// Root session identifier.
pub const ROOT_SESSION_ID: SessionId = 0;
/// Identifiers up to this value are reserved for system sessions.
pub const MAX_SYSTEM_SESSION_ID: SessionId = 999;

/// Default slack when checking stage durations.
pub const DEFAULT_CONSTRAINT_TOLERANCE: Duration = Duration::from_secs(1);

/// One node of the tree.
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    name: String,
    parent: Option<SessionId>,
    children: BTreeMap<String, SessionId>,
    use_case: Option<UseCase>,
    use_case_config: UseCaseProperties,
    run_control: Option<Arc<RunControl>>,
    role: Option<String>,
    when: Option<TimePeriod>,
    special_functional: CardinalityRequest,
    special_distributable: CardinalityRequest,
    functional: ResourcePool,
    distributable: SharedResourcePool,
    initialized: bool,
    running: bool,
    last_outcome: Option<RunOutcome>,
}

impl Session {
    fn new(id: SessionId, name: impl Into<String>, parent: Option<SessionId>) -> Self {
        Self {
            id,
            name: name.into(),
            parent,
            children: BTreeMap::new(),
            use_case: None,
            use_case_config: UseCaseProperties::new(),
            run_control: None,
            role: None,
            when: None,
            special_functional: CardinalityRequest::new(),
            special_distributable: CardinalityRequest::new(),
            functional: ResourcePool::new(),
            distributable: ResourcePool::new().into_shared(),
            initialized: false,
            running: false,
            last_outcome: None,
        }
    }

    /// Identifier.
    #[must_use]
    pub const fn id(&self) -> SessionId {
        self.id
    }

    /// Name, unique among siblings.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Parent session, `None` for the root.
    #[must_use]
    pub const fn parent(&self) -> Option<SessionId> {
        self.parent
    }

    /// Whether this is the root session.
    #[must_use]
    pub const fn is_root(&self) -> bool {
        self.id == ROOT_SESSION_ID
    }

    /// Child sessions by name.
    #[must_use]
    pub const fn children(&self) -> &BTreeMap<String, SessionId> {
        &self.children
    }

    /// Attached use case (absent while it runs).
    #[must_use]
    pub const fn use_case(&self) -> Option<&UseCase> {
        self.use_case.as_ref()
    }

    /// Run control of the attached use case.
    #[must_use]
    pub fn run_control(&self) -> Option<Arc<RunControl>> {
        self.run_control.clone()
    }

    /// Role name.
    #[must_use]
    pub fn role(&self) -> Option<&str> {
        self.role.as_deref()
    }

    /// Scheduled period.
    #[must_use]
    pub const fn when(&self) -> Option<TimePeriod> {
        self.when
    }

    /// Functional pool.
    #[must_use]
    pub const fn functional(&self) -> &ResourcePool {
        &self.functional
    }

    /// Distributable pool handle.
    #[must_use]
    pub fn distributable(&self) -> SharedResourcePool {
        Arc::clone(&self.distributable)
    }

    /// Whether the session is initialized.
    #[must_use]
    pub const fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Whether a run is in progress.
    #[must_use]
    pub const fn is_running(&self) -> bool {
        self.running
    }

    /// Outcome of the last run.
    #[must_use]
    pub const fn last_outcome(&self) -> Option<&RunOutcome> {
        self.last_outcome.as_ref()
    }

    fn ensure_unlocked(&self) -> Result<(), SchedulerError> {
        if self.initialized {
            return Err(SchedulerError::AlreadyInitialized(format!("session {}", self.id)));
        }
        Ok(())
    }

    /// Attach the use case and its configuration.
    ///
    /// # Errors
    ///
    /// Session already initialized.
    pub fn set_use_case(
        &mut self,
        use_case: UseCase,
        config: UseCaseProperties,
    ) -> Result<(), SchedulerError> {
        self.ensure_unlocked()?;
        self.run_control = Some(use_case.run_control());
        self.use_case = Some(use_case);
        self.use_case_config = config;
        Ok(())
    }

    /// Set the role whose resource sets size the pools.
    ///
    /// # Errors
    ///
    /// Session already initialized.
    pub fn set_role(&mut self, role: Option<String>) -> Result<(), SchedulerError> {
        self.ensure_unlocked()?;
        self.role = role;
        Ok(())
    }

    /// Set the scheduled period.
    ///
    /// # Errors
    ///
    /// Session already initialized.
    pub fn set_when(&mut self, when: TimePeriod) -> Result<(), SchedulerError> {
        self.ensure_unlocked()?;
        self.when = Some(when);
        Ok(())
    }

    /// Set the functional overrides (or the full request when no role is set).
    ///
    /// # Errors
    ///
    /// Session already initialized.
    pub fn set_special_functional(&mut self, request: CardinalityRequest) -> Result<(), SchedulerError> {
        self.ensure_unlocked()?;
        self.special_functional = request;
        Ok(())
    }

    /// Set the distributable overrides (or the full request when no role is set).
    ///
    /// # Errors
    ///
    /// Session already initialized.
    pub fn set_special_distributable(
        &mut self,
        request: CardinalityRequest,
    ) -> Result<(), SchedulerError> {
        self.ensure_unlocked()?;
        self.special_distributable = request;
        Ok(())
    }
}

/// Arena of sessions rooted at [`ROOT_SESSION_ID`].
pub struct SessionTree {
    sessions: BTreeMap<SessionId, Session>,
    catalog: Arc<dyn ResourceCatalog>,
    registry: Arc<UseCaseRegistry>,
    clock: Arc<dyn Clock>,
    next_id: Arc<AtomicI32>,
    tolerance: Duration,
}

impl SessionTree {
    /// Tree with an initialized root owning the catalog-wide distributable pool.
    ///
    /// # Errors
    ///
    /// Root pool construction failure.
    pub fn new(
        catalog: Arc<dyn ResourceCatalog>,
        registry: Arc<UseCaseRegistry>,
        clock: Arc<dyn Clock>,
        profile: CardinalityProfile,
    ) -> Result<Self, SchedulerError> {
        let mut root = Session::new(ROOT_SESSION_ID, "root", None);
        root.distributable
            .lock()
            .init_root(catalog.as_ref(), &CardinalityRequest::new(), profile)?;
        root.functional.initialize();
        root.initialized = true;
        Ok(Self {
            sessions: BTreeMap::from([(ROOT_SESSION_ID, root)]),
            catalog,
            registry,
            clock,
            next_id: Arc::new(AtomicI32::new(MAX_SYSTEM_SESSION_ID + 1)),
            tolerance: DEFAULT_CONSTRAINT_TOLERANCE,
        })
    }

    /// Set the slack used when checking time constraints.
    #[must_use]
    pub const fn with_tolerance(mut self, tolerance: Duration) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Resource catalog.
    #[must_use]
    pub fn catalog(&self) -> &dyn ResourceCatalog {
        self.catalog.as_ref()
    }

    /// Use-case registry.
    #[must_use]
    pub fn registry(&self) -> &UseCaseRegistry {
        &self.registry
    }

    /// Time source.
    #[must_use]
    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.clock)
    }

    /// Session by id.
    #[must_use]
    pub fn session(&self, id: SessionId) -> Option<&Session> {
        self.sessions.get(&id)
    }

    /// Mutable session by id.
    pub fn session_mut(&mut self, id: SessionId) -> Option<&mut Session> {
        self.sessions.get_mut(&id)
    }

    /// Root session.
    #[must_use]
    pub fn root(&self) -> Option<&Session> {
        self.sessions.get(&ROOT_SESSION_ID)
    }

    /// Number of sessions, root included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether the tree holds no session.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Child of `parent` named `name`.
    #[must_use]
    pub fn child_id(&self, parent: SessionId, name: &str) -> Option<SessionId> {
        self.sessions
            .get(&parent)
            .and_then(|s| s.children.get(name).copied())
    }

    /// Run control of a session's use case, for stop requests from another thread.
    #[must_use]
    pub fn run_control(&self, id: SessionId) -> Option<Arc<RunControl>> {
        self.sessions.get(&id).and_then(Session::run_control)
    }

    /// Run controls of a session and all its descendants.
    #[must_use]
    pub fn subtree_run_controls(&self, id: SessionId) -> Vec<Arc<RunControl>> {
        self.subtree_ids(id)
            .into_iter()
            .filter_map(|sid| self.run_control(sid))
            .collect()
    }

    /// Ask a session and its descendants to stop at the next check.
    ///
    /// # Errors
    ///
    /// Unknown session.
    pub fn request_stop(&self, id: SessionId) -> Result<(), SchedulerError> {
        self.get(id)?;
        for control in self.subtree_run_controls(id) {
            control.run_stop_request();
        }
        tracing::info!(session_id = id, "stop requested");
        Ok(())
    }

    fn get(&self, id: SessionId) -> Result<&Session, SchedulerError> {
        self.sessions
            .get(&id)
            .ok_or(SchedulerError::InvalidSession(id))
    }

    fn get_mut(&mut self, id: SessionId) -> Result<&mut Session, SchedulerError> {
        self.sessions
            .get_mut(&id)
            .ok_or(SchedulerError::InvalidSession(id))
    }

    /// Create an empty, uninitialized child of `parent`.
    ///
    /// # Errors
    ///
    /// Unknown parent or duplicate child name.
    pub fn create_child(&mut self, parent: SessionId, name: &str) -> Result<SessionId, SchedulerError> {
        let parent_session = self.get(parent)?;
        if parent_session.children.contains_key(name) {
            return Err(SchedulerError::DuplicateSession {
                parent,
                name: name.to_string(),
            });
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.sessions
            .insert(id, Session::new(id, name, Some(parent)));
        self.get_mut(parent)?.children.insert(name.to_string(), id);
        tracing::debug!(session_id = id, parent_id = parent, name, "session created");
        Ok(id)
    }

    /// Create a child of `parent` bound to the use case described by `config`.
    ///
    /// The config's `functional`/`distributable` lists become the session's
    /// special requests. The tree is unchanged on failure.
    ///
    /// # Errors
    ///
    /// Use-case creation, cardinality resolution, or child creation failure.
    pub fn create_use_case_session(
        &mut self,
        parent: SessionId,
        config: &UseCaseConfig,
    ) -> Result<SessionId, SchedulerError> {
        let (use_case, properties) = self.registry.create(config)?;
        let mut functional = CardinalityRequest::new();
        ResourceCardinality::new(&mut functional)
            .configure(&config.functional, Some(self.catalog.as_ref()))?;
        let mut distributable = CardinalityRequest::new();
        ResourceCardinality::new(&mut distributable)
            .configure(&config.distributable, Some(self.catalog.as_ref()))?;
        let id = self.create_child(parent, &config.name)?;
        let session = self.get_mut(id)?;
        session.set_use_case(use_case, properties)?;
        session.special_functional = functional;
        session.special_distributable = distributable;
        Ok(id)
    }

    /// Move an uninitialized session under another parent.
    ///
    /// # Errors
    ///
    /// Unknown sessions, initialized child, root child, a cycle, or a name clash.
    pub fn set_parent(&mut self, id: SessionId, parent: SessionId) -> Result<(), SchedulerError> {
        if id == ROOT_SESSION_ID || self.subtree_ids(id).contains(&parent) {
            return Err(SchedulerError::InvalidSession(id));
        }
        let session = self.get(id)?;
        session.ensure_unlocked()?;
        let name = session.name.clone();
        let old_parent = session.parent;
        if self.get(parent)?.children.contains_key(&name) {
            return Err(SchedulerError::DuplicateSession { parent, name });
        }
        if let Some(old) = old_parent.and_then(|p| self.sessions.get_mut(&p)) {
            old.children.remove(&name);
        }
        self.get_mut(parent)?.children.insert(name, id);
        self.get_mut(id)?.parent = Some(parent);
        Ok(())
    }

    fn build_requests(
        &self,
        session: &Session,
    ) -> Result<(CardinalityRequest, CardinalityRequest), SchedulerError> {
        let Some(role_name) = &session.role else {
            return Ok((
                session.special_functional.clone(),
                session.special_distributable.clone(),
            ));
        };
        let role = self
            .catalog
            .role(role_name)
            .ok_or_else(|| SchedulerError::UnknownRole(role_name.clone()))?;
        let mut functional = CardinalityRequest::new();
        ResourceCardinality::new(&mut functional).build_from_role(
            self.catalog.as_ref(),
            role,
            ResourceSetFlag::Functional,
            &session.special_functional,
        )?;
        let mut distributable = CardinalityRequest::new();
        ResourceCardinality::new(&mut distributable).build_from_role(
            self.catalog.as_ref(),
            role,
            ResourceSetFlag::Distributable,
            &session.special_distributable,
        )?;
        Ok((functional, distributable))
    }

    fn grant(
        &self,
        parent_pool: &SharedResourcePool,
        functional_request: &CardinalityRequest,
        distributable_request: &CardinalityRequest,
    ) -> Result<(ResourcePool, ResourcePool), SchedulerError> {
        let mut parent = parent_pool.lock();
        let mut functional = ResourcePool::new();
        ResourcePool::load_daughter_from_parent(
            &mut parent,
            &mut functional,
            self.catalog.as_ref(),
            functional_request,
        )?;
        let mut distributable = ResourcePool::new();
        if let Err(err) = ResourcePool::load_daughter_from_parent(
            &mut parent,
            &mut distributable,
            self.catalog.as_ref(),
            distributable_request,
        ) {
            ResourcePool::restore_parent_from_daughter(&mut parent, &mut functional)?;
            return Err(err);
        }
        Ok((functional, distributable))
    }

    /// Initialize a session: grant its pools from the parent's distributable
    /// pool, initialize its use case, then create and initialize daughter
    /// sessions for composite use cases.
    ///
    /// All or nothing: on failure every grant is returned and the session
    /// stays uninitialized.
    ///
    /// # Errors
    ///
    /// Unknown or already initialized session, missing use case, unknown
    /// role, admission failure (naming the resource), or use-case failure.
    pub fn initialize(&mut self, id: SessionId) -> Result<(), SchedulerError> {
        let session = self.get(id)?;
        session.ensure_unlocked()?;
        if session.use_case.is_none() {
            return Err(SchedulerError::NoUseCase(id));
        }
        let parent_id = session.parent.ok_or(SchedulerError::InvalidSession(id))?;
        let parent_pool = self.get(parent_id)?.distributable();
        let (functional_request, distributable_request) = self.build_requests(session)?;
        let (functional, distributable) =
            self.grant(&parent_pool, &functional_request, &distributable_request)?;

        let session = self.get_mut(id)?;
        let config = session.use_case_config.clone();
        let init = match session.use_case.as_mut() {
            Some(use_case) => {
                use_case.set_mother_session(id);
                use_case.initialize(&config)
            }
            None => Err(SchedulerError::NoUseCase(id)),
        };
        if let Err(err) = init {
            let mut parent = parent_pool.lock();
            let mut functional = functional;
            let mut distributable = distributable;
            ResourcePool::restore_parent_from_daughter(&mut parent, &mut functional)?;
            ResourcePool::restore_parent_from_daughter(&mut parent, &mut distributable)?;
            return Err(err);
        }
        session.functional = functional;
        *session.distributable.lock() = distributable;
        session.initialized = true;
        tracing::info!(
            session_id = id,
            parent_id,
            functional = ?functional_request,
            distributable = ?distributable_request,
            "session initialized"
        );

        let composition = session
            .use_case
            .as_ref()
            .and_then(UseCase::composition)
            .cloned();
        if let Some(composition) = composition {
            for daughter in &composition.daughters {
                let created = self
                    .create_use_case_session(id, daughter)
                    .and_then(|child| self.initialize(child));
                if let Err(err) = created {
                    tracing::warn!(session_id = id, daughter = %daughter.name, error = %err, "daughter initialization failed");
                    self.reset(id)?;
                    return Err(err);
                }
            }
        }
        Ok(())
    }

    /// Tear a session down: reset and remove its descendants, reset its use
    /// case, and give its tokens back to the parent.
    ///
    /// # Errors
    ///
    /// Unknown session, root session, not initialized, or running.
    pub fn reset(&mut self, id: SessionId) -> Result<(), SchedulerError> {
        if id == ROOT_SESSION_ID {
            return Err(SchedulerError::InvalidSession(id));
        }
        let session = self.get(id)?;
        if !session.initialized {
            return Err(SchedulerError::NotInitialized(format!("session {id}")));
        }
        if session.running {
            return Err(SchedulerError::AlreadyRunning(id));
        }
        let children: Vec<SessionId> = session.children.values().copied().collect();
        let parent_pool = session
            .parent
            .and_then(|p| self.sessions.get(&p))
            .map(Session::distributable);
        for child in children {
            if self.sessions.get(&child).is_some_and(|c| c.initialized) {
                self.reset(child)?;
            }
            self.remove_subtree(child);
        }
        let session = self.get_mut(id)?;
        if let Some(use_case) = session.use_case.as_mut() {
            if use_case.is_initialized() {
                use_case.reset()?;
            }
        }
        let mut distributable = std::mem::take(&mut *session.distributable.lock());
        let mut functional = std::mem::take(&mut session.functional);
        if let Some(pool) = parent_pool {
            let mut parent = pool.lock();
            if functional.is_initialized() {
                ResourcePool::restore_parent_from_daughter(&mut parent, &mut functional)?;
            }
            if distributable.is_initialized() {
                ResourcePool::restore_parent_from_daughter(&mut parent, &mut distributable)?;
            }
        }
        session.initialized = false;
        tracing::info!(session_id = id, "session reset");
        Ok(())
    }

    /// Destroy an uninitialized session and its descendants.
    ///
    /// # Errors
    ///
    /// Unknown or root session, or session still initialized.
    pub fn remove(&mut self, id: SessionId) -> Result<(), SchedulerError> {
        if id == ROOT_SESSION_ID {
            return Err(SchedulerError::InvalidSession(id));
        }
        self.get(id)?.ensure_unlocked()?;
        self.remove_subtree(id);
        Ok(())
    }

    fn subtree_ids(&self, id: SessionId) -> Vec<SessionId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if let Some(session) = self.sessions.get(&current) {
                out.push(current);
                stack.extend(session.children.values().copied());
            }
        }
        out
    }

    fn remove_subtree(&mut self, id: SessionId) {
        let parent = self.sessions.get(&id).and_then(|s| s.parent);
        let name = self.sessions.get(&id).map(|s| s.name.clone());
        for sid in self.subtree_ids(id) {
            self.sessions.remove(&sid);
        }
        if let (Some(parent), Some(name)) = (parent, name) {
            if let Some(p) = self.sessions.get_mut(&parent) {
                p.children.remove(&name);
            }
        }
    }

    /// Move the subtree rooted at `id` into its own tree, sharing catalog,
    /// registry, clock and id counter. The parent keeps its child entry.
    ///
    /// # Errors
    ///
    /// Unknown session.
    pub fn detach(&mut self, id: SessionId) -> Result<Self, SchedulerError> {
        self.get(id)?;
        let sessions = self
            .subtree_ids(id)
            .into_iter()
            .filter_map(|sid| self.sessions.remove(&sid).map(|s| (sid, s)))
            .collect();
        Ok(Self {
            sessions,
            catalog: Arc::clone(&self.catalog),
            registry: Arc::clone(&self.registry),
            clock: Arc::clone(&self.clock),
            next_id: Arc::clone(&self.next_id),
            tolerance: self.tolerance,
        })
    }

    /// Merge a previously detached subtree back.
    pub fn attach(&mut self, subtree: Self) {
        self.sessions.extend(subtree.sessions);
    }

    /// Drive a session's use case through one run.
    ///
    /// # Errors
    ///
    /// Lifecycle misuse only: unknown session, not initialized, already
    /// running, or no use case. Stage failures are reported in the outcome.
    pub fn run(&mut self, id: SessionId) -> Result<RunOutcome, SchedulerError> {
        let session = self.get_mut(id)?;
        if !session.initialized {
            return Err(SchedulerError::NotInitialized(format!("session {id}")));
        }
        if session.running {
            return Err(SchedulerError::AlreadyRunning(id));
        }
        let mut use_case = session.use_case.take().ok_or(SchedulerError::NoUseCase(id))?;
        session.running = true;
        tracing::info!(session_id = id, use_case = %use_case.name(), "session run started");

        let outcome = self.drive(id, &mut use_case);
        use_case.run_control().clear_run_stop_request();

        if let Some(session) = self.sessions.get_mut(&id) {
            session.use_case = Some(use_case);
            session.running = false;
            session.last_outcome = Some(outcome.clone());
        }
        match &outcome.message {
            None => tracing::info!(session_id = id, "session run completed"),
            Some(message) => tracing::warn!(session_id = id, error = %message, "session run failed"),
        }
        Ok(outcome)
    }

    /// Run several sessions concurrently, one scoped thread each.
    ///
    /// Each session's subtree is detached for the duration of its run; the
    /// sessions keep drawing nothing from shared pools while running.
    ///
    /// # Errors
    ///
    /// Lifecycle misuse of any of the sessions (checked before anything
    /// runs), or a thread failure.
    pub fn run_parallel(&mut self, ids: &[SessionId]) -> Result<Vec<RunOutcome>, SchedulerError> {
        for &id in ids {
            let session = self.get(id)?;
            if !session.initialized {
                return Err(SchedulerError::NotInitialized(format!("session {id}")));
            }
            if session.running {
                return Err(SchedulerError::AlreadyRunning(id));
            }
        }
        let mut subtrees = Vec::with_capacity(ids.len());
        for &id in ids {
            subtrees.push((id, self.detach(id)?));
        }
        let results: Vec<Result<RunOutcome, SchedulerError>> = thread::scope(|scope| {
            let handles: Vec<_> = subtrees
                .iter_mut()
                .map(|(id, tree)| {
                    let id = *id;
                    thread::Builder::new()
                        .name(format!("session-{id}"))
                        .spawn_scoped(scope, move || tree.run(id))
                })
                .collect();
            handles
                .into_iter()
                .map(|handle| match handle {
                    Ok(handle) => handle.join().unwrap_or_else(|_| {
                        Err(SchedulerError::Backend("session thread panicked".into()))
                    }),
                    Err(err) => Err(SchedulerError::Backend(format!(
                        "failed to spawn session thread: {err}"
                    ))),
                })
                .collect()
        });
        for (_, subtree) in subtrees {
            self.attach(subtree);
        }
        results.into_iter().collect()
    }

    fn drive(&mut self, id: SessionId, use_case: &mut UseCase) -> RunOutcome {
        let run = use_case.run_control();
        let clock = Arc::clone(&self.clock);
        run.begin_run();
        use_case.report_mut().clear();

        let constraints = match use_case.time_constraints() {
            Ok(constraints) => constraints.clone(),
            Err(err) => {
                return RunOutcome {
                    termination: RunTermination::Error,
                    message: Some(err.to_string()),
                    report: use_case.report().clone(),
                };
            }
        };
        let depth = run.depth();
        let mut errors = Vec::new();
        let mut step = |tree: &mut Self, stage: RunStage, errors: &mut Vec<SchedulerError>| {
            tree.execute_stage(id, use_case, &run, clock.as_ref(), &constraints, stage)
                .map_err(|err| errors.push(err))
                .is_ok()
        };

        if depth.runs_system() {
            let prepared = step(self, RunStage::SystemPreparing, &mut errors);
            if prepared && depth.runs_functional() && !run.check_run_stop_requested() {
                let up = step(self, RunStage::FunctionalUpRunning, &mut errors);
                if up && depth.runs_work() && !run.check_run_stop_requested() {
                    step(self, RunStage::FunctionalWorkRunning, &mut errors);
                }
                step(self, RunStage::FunctionalDownRunning, &mut errors);
            }
            step(self, RunStage::SystemTerminating, &mut errors);
        }

        RunOutcome {
            termination: if errors.is_empty() {
                RunTermination::Normal
            } else {
                RunTermination::Error
            },
            message: errors.first().map(ToString::to_string),
            report: use_case.report().clone(),
        }
    }

    fn execute_stage(
        &mut self,
        id: SessionId,
        use_case: &mut UseCase,
        run: &RunControl,
        clock: &dyn Clock,
        constraints: &TimeConstraints,
        stage: RunStage,
    ) -> Result<(), SchedulerError> {
        run.set_run_stage(stage);
        let start = clock.now();
        use_case.report_mut().start_stage(stage, start);
        tracing::debug!(session_id = id, %stage, "stage started");

        let tolerance = self.tolerance;
        let result = {
            let mut ctx = RunContext {
                session: id,
                run,
                clock,
                tree: self,
            };
            match stage {
                RunStage::SystemPreparing => use_case.run_prepare(&mut ctx),
                RunStage::FunctionalUpRunning => use_case.up(&mut ctx),
                RunStage::FunctionalWorkRunning => work_loop(use_case, &mut ctx),
                RunStage::FunctionalDownRunning => use_case.down(&mut ctx),
                _ => use_case.run_terminate(&mut ctx),
            }
        };
        let stop = clock.now();
        let result = result.and_then(|()| {
            if !constraints.has_constraint(stage) {
                return Ok(());
            }
            let window = constraints.get_constraint(stage)?;
            window
                .check(
                    elapsed_between(start, stop),
                    tolerance,
                    !run.check_run_stop_requested(),
                )
                .map_err(|detail| SchedulerError::TimeConstraintViolated { stage, detail })
        });

        let completion = match &result {
            Ok(()) => RunStageCompletion::normal(stage, stop),
            Err(err) => RunStageCompletion::error(stage, stop, err.class(), err.to_string()),
        };
        let loops = if stage == RunStage::FunctionalWorkRunning {
            run.work_loop_counter()
        } else {
            0
        };
        use_case.report_mut().finish_stage(completion, loops);
        if let Some(done) = stage.done_stage() {
            run.set_run_stage(done);
        }
        match &result {
            Ok(()) => tracing::debug!(session_id = id, %stage, "stage done"),
            Err(err) => tracing::warn!(session_id = id, %stage, error = %err, "stage failed"),
        }
        result
    }
}

fn work_loop(use_case: &mut UseCase, ctx: &mut RunContext<'_>) -> Result<(), SchedulerError> {
    loop {
        if ctx.run.check_run_stop_requested() {
            tracing::info!(session_id = ctx.session, loops = ctx.run.work_loop_counter(), "stop requested");
            return Ok(());
        }
        let status = use_case.work(ctx)?;
        ctx.run.increment_work_loop_counter();
        if status == WorkLoopStatus::Stop {
            return Ok(());
        }
    }
}

impl std::fmt::Debug for SessionTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionTree")
            .field("sessions", &self.sessions.keys().collect::<Vec<_>>())
            .field("tolerance", &self.tolerance)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::catalog::TokenCapacity;
    use crate::core::running::RunDepth;
    use crate::infra::InMemoryCatalog;
    use crate::util::clock::ManualClock;
    use chrono::{TimeZone, Utc};

    fn tree() -> SessionTree {
        let catalog = InMemoryCatalog::new()
            .add_resource(1, "valve", TokenCapacity::Limited(1))
            .and_then(|c| c.add_resource(2, "hv", TokenCapacity::Limited(3)))
            .and_then(|c| c.add_resource(3, "monitor", TokenCapacity::Unlimited))
            .and_then(|c| c.add_role(1, "operator", [1, 3], [2]))
            .unwrap();
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap());
        SessionTree::new(
            Arc::new(catalog),
            Arc::new(UseCaseRegistry::with_defaults()),
            Arc::new(clock),
            CardinalityProfile::All,
        )
        .unwrap()
    }

    fn lock(name: &str) -> UseCaseConfig {
        UseCaseConfig::new(name, "lock").with_property("duration", "2s")
    }

    #[test]
    fn test_root_owns_catalog_pool() {
        let tree = tree();
        let root = tree.root().unwrap();
        assert!(root.is_root());
        assert!(root.is_initialized());
        assert!(root.use_case().is_none());
        let pool = root.distributable();
        let pool = pool.lock();
        assert_eq!(pool.remaining_limited_tokens(1), Some(1));
        assert_eq!(pool.remaining_limited_tokens(2), Some(3));
        assert!(pool.is_unlimited(3));
    }

    #[test]
    fn test_duplicate_child_name() {
        let mut tree = tree();
        tree.create_child(ROOT_SESSION_ID, "a").unwrap();
        assert_eq!(
            tree.create_child(ROOT_SESSION_ID, "a").unwrap_err(),
            SchedulerError::DuplicateSession {
                parent: ROOT_SESSION_ID,
                name: "a".into()
            }
        );
        assert_eq!(
            tree.create_child(77, "b").unwrap_err(),
            SchedulerError::InvalidSession(77)
        );
    }

    #[test]
    fn test_lifecycle_misuse() {
        let mut tree = tree();
        let empty = tree.create_child(ROOT_SESSION_ID, "empty").unwrap();
        assert_eq!(tree.initialize(empty).unwrap_err(), SchedulerError::NoUseCase(empty));

        let id = tree.create_use_case_session(ROOT_SESSION_ID, &lock("hold")).unwrap();
        assert!(matches!(tree.run(id), Err(SchedulerError::NotInitialized(_))));
        let first = tree.reset(id).unwrap_err();
        let second = tree.reset(id).unwrap_err();
        assert_eq!(first, second);
        assert!(!tree.session(id).unwrap().is_initialized());

        tree.initialize(id).unwrap();
        assert!(matches!(tree.initialize(id), Err(SchedulerError::AlreadyInitialized(_))));
        assert!(tree.remove(id).is_err());
        assert!(tree.session_mut(id).unwrap().set_role(None).is_err());
        assert_eq!(
            tree.reset(ROOT_SESSION_ID).unwrap_err(),
            SchedulerError::InvalidSession(ROOT_SESSION_ID)
        );
        tree.reset(id).unwrap();
        tree.remove(id).unwrap();
        assert!(tree.child_id(ROOT_SESSION_ID, "hold").is_none());
    }

    #[test]
    fn test_depth_limits_stages() {
        let mut tree = tree();
        let none = tree
            .create_use_case_session(ROOT_SESSION_ID, &lock("none").with_run_depth(RunDepth::None))
            .unwrap();
        let system = tree
            .create_use_case_session(ROOT_SESSION_ID, &lock("system").with_run_depth(RunDepth::System))
            .unwrap();
        tree.initialize(none).unwrap();
        tree.initialize(system).unwrap();

        let outcome = tree.run(none).unwrap();
        assert!(outcome.is_normal());
        assert!(outcome.report.stages().is_empty());

        let outcome = tree.run(system).unwrap();
        assert!(outcome.is_normal());
        assert_eq!(
            outcome.report.stages(),
            vec![RunStage::SystemPreparing, RunStage::SystemTerminating]
        );
        assert_eq!(
            tree.run_control(system).unwrap().run_stage(),
            RunStage::SystemTerminated
        );
    }

    #[test]
    fn test_set_parent_rejects_cycles() {
        let mut tree = tree();
        let a = tree.create_child(ROOT_SESSION_ID, "a").unwrap();
        let b = tree.create_child(a, "b").unwrap();
        assert!(tree.set_parent(a, b).is_err());
        let c = tree.create_child(ROOT_SESSION_ID, "c").unwrap();
        tree.set_parent(c, a).unwrap();
        assert_eq!(tree.child_id(a, "c"), Some(c));
        assert_eq!(tree.session(c).unwrap().parent(), Some(a));
        assert!(tree.child_id(ROOT_SESSION_ID, "c").is_none());
    }
}
