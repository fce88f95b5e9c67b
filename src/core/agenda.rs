//! The agenda: a calendar of reservations turned into sessions over time.
//!
//! The reservation book is one mutex-guarded map shared between the owning
//! service (adding, removing, querying) and a single background scheduler
//! thread. The scheduler thread owns the session tree: it activates due
//! reservations one after the other, runs each session to completion,
//! resets it, and records the outcome. A stop request (cancellation token
//! or stop file) is honoured between two activations; a running session
//! only sees it through its run-control stop flag.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use chrono::{DateTime, Utc};
use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;

use crate::config::AgendaConfig;
use crate::core::audit::{build_audit_event, AuditAction, AuditSink};
use crate::core::cancel::CancellationToken;
use crate::core::catalog::ResourceCatalog;
use crate::core::error::SchedulerError;
use crate::core::reservation::{Reservation, ReservationStatus, TimePeriod};
use crate::core::running::{RunControl, RunOutcome, RunReport, RunTermination};
use crate::core::session::{SessionId, SessionTree, ROOT_SESSION_ID};
use crate::core::use_case::UseCaseRegistry;
use crate::infra::store::ReservationStore;
use crate::util::clock::{sub_duration, Clock};

/// Notification published to subscribers.
#[derive(Debug, Clone, PartialEq)]
pub enum AgendaEvent {
    /// Reservation added to the book.
    Added(i32),
    /// Reservation removed from the book.
    Removed(i32),
    /// Reservation session created and about to run.
    Activated {
        /// Reservation id.
        reservation_id: i32,
        /// Session running it.
        session_id: SessionId,
    },
    /// Reservation session finished.
    Finished {
        /// Reservation id.
        reservation_id: i32,
        /// Final status (completed or failed).
        status: ReservationStatus,
        /// Run outcome.
        outcome: RunOutcome,
    },
    /// Reservation period ended before activation.
    Missed(i32),
    /// Past reservations dropped on store.
    Purged(Vec<i32>),
    /// Scheduler thread exited.
    Stopped,
}

#[derive(Debug, Default)]
struct ReservationBook {
    reservations: BTreeMap<i32, Reservation>,
    statuses: BTreeMap<i32, ReservationStatus>,
    outcomes: BTreeMap<i32, RunOutcome>,
    last_id: i32,
    changed: bool,
}

impl ReservationBook {
    fn insert(&mut self, mut reservation: Reservation) -> Result<i32, SchedulerError> {
        reservation.validate()?;
        let id = match reservation.id {
            Some(id) => id,
            None => self
                .last_id
                .checked_add(1)
                .ok_or_else(|| SchedulerError::InvalidConfig("reservation ids exhausted".into()))?,
        };
        if self.reservations.contains_key(&id) {
            return Err(SchedulerError::DuplicateReservation(id));
        }
        reservation.id = Some(id);
        self.reservations.insert(id, reservation);
        self.statuses.insert(id, ReservationStatus::Pending);
        self.last_id = self.last_id.max(id);
        self.changed = true;
        Ok(id)
    }

    fn remove(&mut self, id: i32) -> Option<Reservation> {
        let removed = self.reservations.remove(&id)?;
        self.statuses.remove(&id);
        self.outcomes.remove(&id);
        self.changed = true;
        Some(removed)
    }

    fn status(&self, id: i32) -> ReservationStatus {
        self.statuses.get(&id).copied().unwrap_or_default()
    }

    fn select(&self, mut keep: impl FnMut(&Reservation) -> bool) -> Vec<i32> {
        let mut matched: Vec<&Reservation> =
            self.reservations.values().filter(|r| keep(r)).collect();
        matched.sort_by(|a, b| a.cmp_period(b));
        matched.into_iter().filter_map(|r| r.id).collect()
    }
}

struct AgendaShared {
    book: Mutex<ReservationBook>,
    config: Mutex<AgendaConfig>,
    clock: Arc<dyn Clock>,
    catalog: Arc<dyn ResourceCatalog>,
    registry: Arc<UseCaseRegistry>,
    store: Mutex<Option<Box<dyn ReservationStore>>>,
    audit: Mutex<Option<Box<dyn AuditSink>>>,
    subscribers: Mutex<Vec<Sender<AgendaEvent>>>,
    token: Mutex<CancellationToken>,
    active: Mutex<Option<(i32, Vec<Arc<RunControl>>)>>,
}

impl AgendaShared {
    fn emit(&self, event: &AgendaEvent) {
        self.subscribers
            .lock()
            .retain(|tx| tx.send(event.clone()).is_ok());
    }

    fn audit(
        &self,
        action: AuditAction,
        reservation_id: Option<i32>,
        session_id: Option<SessionId>,
        payload: Option<String>,
    ) {
        if let Some(sink) = self.audit.lock().as_mut() {
            sink.record(build_audit_event(action, reservation_id, session_id, payload));
        }
    }

    fn token(&self) -> CancellationToken {
        self.token.lock().clone()
    }

    fn check_stop_file(&self) -> bool {
        self.config
            .lock()
            .stop_file
            .as_ref()
            .is_some_and(|path| path.exists())
    }

    fn must_be_stopped(&self) -> bool {
        let token = self.token();
        if token.is_cancelled() {
            return true;
        }
        if self.check_stop_file() {
            tracing::info!("stop file found, stopping agenda");
            token.cancel();
            return true;
        }
        false
    }

    fn set_status(&self, id: i32, status: ReservationStatus) {
        let mut book = self.book.lock();
        if book.reservations.contains_key(&id) {
            book.statuses.insert(id, status);
            book.changed = true;
        }
    }

    fn load(&self) -> Result<usize, SchedulerError> {
        let loaded = match self.store.lock().as_mut() {
            Some(store) => store.load()?,
            None => return Ok(0),
        };
        let mut count = 0;
        {
            let mut book = self.book.lock();
            for reservation in loaded {
                match book.insert(reservation) {
                    Ok(_) => count += 1,
                    Err(err) => tracing::warn!(error = %err, "skipping stored reservation"),
                }
            }
            book.changed = false;
        }
        tracing::info!(count, "reservations loaded");
        self.audit(AuditAction::Load, None, None, Some(format!("count={count}")));
        Ok(count)
    }

    fn purge(&self, book: &mut ReservationBook, now: DateTime<Utc>) -> Vec<i32> {
        let (keep, retention) = {
            let config = self.config.lock();
            (config.purge_store, config.retention)
        };
        if keep == 0 {
            return Vec::new();
        }
        let horizon = retention.map_or(now, |r| sub_duration(now, r));
        let mut past: Vec<&Reservation> = book
            .reservations
            .values()
            .filter(|r| r.period.is_past(now))
            .collect();
        if past.len() <= keep {
            return Vec::new();
        }
        past.sort_by(|a, b| b.period.end.cmp(&a.period.end));
        let doomed: Vec<i32> = past
            .into_iter()
            .skip(keep)
            .filter(|r| r.period.end < horizon)
            .filter_map(|r| r.id)
            .collect();
        for id in &doomed {
            book.remove(*id);
        }
        doomed
    }

    fn store(&self) -> Result<usize, SchedulerError> {
        let now = self.clock.now();
        let (snapshot, purged) = {
            let mut book = self.book.lock();
            let purged = self.purge(&mut book, now);
            let snapshot: Vec<Reservation> = book.reservations.values().cloned().collect();
            book.changed = false;
            (snapshot, purged)
        };
        if !purged.is_empty() {
            tracing::info!(purged = ?purged, "past reservations purged");
            self.audit(AuditAction::Purge, None, None, Some(format!("{purged:?}")));
            self.emit(&AgendaEvent::Purged(purged));
        }
        if let Some(store) = self.store.lock().as_mut() {
            store.store(&snapshot)?;
            self.audit(
                AuditAction::Store,
                None,
                None,
                Some(format!("count={}", snapshot.len())),
            );
        }
        Ok(snapshot.len())
    }

    fn mark_missed(&self, now: DateTime<Utc>) {
        let missed: Vec<i32> = {
            let mut book = self.book.lock();
            let ids = book.select(|r| r.period.is_past(now));
            let missed: Vec<i32> = ids
                .into_iter()
                .filter(|id| book.status(*id) == ReservationStatus::Pending)
                .collect();
            for id in &missed {
                book.statuses.insert(*id, ReservationStatus::Missed);
            }
            if !missed.is_empty() {
                book.changed = true;
            }
            missed
        };
        for id in missed {
            tracing::warn!(reservation_id = id, "reservation missed");
            self.audit(AuditAction::Miss, Some(id), None, None);
            self.emit(&AgendaEvent::Missed(id));
        }
    }

    fn due(&self, now: DateTime<Utc>) -> Vec<i32> {
        let book = self.book.lock();
        book.select(|r| r.period.contains(now))
            .into_iter()
            .filter(|id| book.status(*id) == ReservationStatus::Pending)
            .collect()
    }

    fn tick(&self, tree: &mut SessionTree) {
        let now = self.clock.now();
        self.mark_missed(now);
        for id in self.due(now) {
            if self.must_be_stopped() {
                break;
            }
            let reservation = self.book.lock().reservations.get(&id).cloned();
            if let Some(reservation) = reservation {
                self.activate(tree, id, &reservation);
            }
        }
        if self.book.lock().changed {
            if let Err(err) = self.store() {
                tracing::error!(error = %err, "failed to store reservations");
            }
        }
    }

    fn activate(&self, tree: &mut SessionTree, id: i32, reservation: &Reservation) {
        self.set_status(id, ReservationStatus::Active);
        let outcome = match self.execute(tree, id, reservation) {
            Ok(outcome) => outcome,
            Err(err) => {
                tracing::error!(reservation_id = id, error = %err, "reservation could not start");
                RunOutcome {
                    termination: RunTermination::Error,
                    message: Some(err.to_string()),
                    report: RunReport::default(),
                }
            }
        };
        let status = if outcome.is_normal() {
            ReservationStatus::Completed
        } else {
            ReservationStatus::Failed
        };
        {
            let mut book = self.book.lock();
            if book.reservations.contains_key(&id) {
                book.statuses.insert(id, status);
                book.outcomes.insert(id, outcome.clone());
                book.changed = true;
            }
        }
        let (action, payload) = if outcome.is_normal() {
            (AuditAction::Complete, None)
        } else {
            (AuditAction::Fail, outcome.message.clone())
        };
        self.audit(action, Some(id), None, payload);
        self.emit(&AgendaEvent::Finished {
            reservation_id: id,
            status,
            outcome,
        });
    }

    fn execute(
        &self,
        tree: &mut SessionTree,
        id: i32,
        reservation: &Reservation,
    ) -> Result<RunOutcome, SchedulerError> {
        let session_id = tree.create_use_case_session(ROOT_SESSION_ID, &reservation.use_case)?;
        let prepared = prepare_session(tree, session_id, reservation).and_then(|()| tree.initialize(session_id));
        if let Err(err) = prepared {
            discard_session(tree, session_id);
            return Err(err);
        }
        let controls = tree.subtree_run_controls(session_id);
        *self.active.lock() = Some((id, controls.clone()));
        if self.token().is_cancelled() {
            tracing::info!(reservation_id = id, "agenda stopping, session stop requested");
            for control in &controls {
                control.run_stop_request();
            }
        }
        tracing::info!(reservation_id = id, session_id, period = %reservation.period, "reservation activated");
        self.audit(AuditAction::Activate, Some(id), Some(session_id), None);
        self.emit(&AgendaEvent::Activated {
            reservation_id: id,
            session_id,
        });

        let outcome = tree.run(session_id);
        *self.active.lock() = None;

        discard_session(tree, session_id);
        outcome
    }
}

fn prepare_session(
    tree: &mut SessionTree,
    session_id: SessionId,
    reservation: &Reservation,
) -> Result<(), SchedulerError> {
    let session = tree
        .session_mut(session_id)
        .ok_or(SchedulerError::InvalidSession(session_id))?;
    session.set_role(reservation.role.clone())?;
    session.set_when(reservation.period)?;
    if !reservation.special_functional.is_empty() {
        session.set_special_functional(reservation.special_functional.clone())?;
    }
    if !reservation.special_distributable.is_empty() {
        session.set_special_distributable(reservation.special_distributable.clone())?;
    }
    Ok(())
}

fn discard_session(tree: &mut SessionTree, session_id: SessionId) {
    if tree.session(session_id).is_some_and(|s| s.is_initialized()) {
        if let Err(err) = tree.reset(session_id) {
            tracing::error!(session_id, error = %err, "session reset failed");
        }
    }
    if let Err(err) = tree.remove(session_id) {
        tracing::error!(session_id, error = %err, "session removal failed");
    }
}

/// Reservation calendar with a background scheduler thread.
pub struct Agenda {
    shared: Arc<AgendaShared>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl Agenda {
    /// Agenda over `catalog` and `registry`, reading time from `clock`.
    ///
    /// # Errors
    ///
    /// Invalid configuration.
    pub fn new(
        config: AgendaConfig,
        catalog: Arc<dyn ResourceCatalog>,
        registry: Arc<UseCaseRegistry>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, SchedulerError> {
        config.validate().map_err(SchedulerError::InvalidConfig)?;
        Ok(Self {
            shared: Arc::new(AgendaShared {
                book: Mutex::new(ReservationBook::default()),
                config: Mutex::new(config),
                clock,
                catalog,
                registry,
                store: Mutex::new(None),
                audit: Mutex::new(None),
                subscribers: Mutex::new(Vec::new()),
                token: Mutex::new(CancellationToken::new()),
                active: Mutex::new(None),
            }),
            thread: Mutex::new(None),
        })
    }

    /// Persist reservations through `store`.
    pub fn set_store(&self, store: Box<dyn ReservationStore>) {
        *self.shared.store.lock() = Some(store);
    }

    /// Record agenda activity into `sink`.
    pub fn set_audit_sink(&self, sink: Box<dyn AuditSink>) {
        *self.shared.audit.lock() = Some(sink);
    }

    /// Use an externally owned cancellation token; takes effect at the next `start`.
    pub fn set_cancellation_token(&self, token: CancellationToken) {
        *self.shared.token.lock() = token;
    }

    /// Current configuration.
    #[must_use]
    pub fn config(&self) -> AgendaConfig {
        self.shared.config.lock().clone()
    }

    /// Keep at most `count` past reservations when storing (0 keeps all).
    pub fn set_purge_store(&self, count: usize) {
        self.shared.config.lock().purge_store = count;
    }

    /// Sentinel file whose presence stops the scheduler.
    pub fn set_stop_file(&self, path: Option<PathBuf>) {
        self.shared.config.lock().stop_file = path;
    }

    /// Whether the stop file exists.
    #[must_use]
    pub fn check_stop_file(&self) -> bool {
        self.shared.check_stop_file()
    }

    /// Whether the scheduler has been asked to stop, by token or stop file.
    #[must_use]
    pub fn must_be_stopped(&self) -> bool {
        self.shared.must_be_stopped()
    }

    /// Add a reservation; an absent id is assigned as last id + 1.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::DuplicateReservation`] or an invalid reservation;
    /// the book is unchanged on failure.
    pub fn add_reservation(&self, reservation: Reservation) -> Result<i32, SchedulerError> {
        let id = self.shared.book.lock().insert(reservation)?;
        tracing::info!(reservation_id = id, "reservation added");
        self.shared.audit(AuditAction::Add, Some(id), None, None);
        self.shared.emit(&AgendaEvent::Added(id));
        Ok(id)
    }

    /// Remove a reservation.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::UnknownReservation`].
    pub fn remove_reservation(&self, id: i32) -> Result<Reservation, SchedulerError> {
        let removed = self
            .shared
            .book
            .lock()
            .remove(id)
            .ok_or(SchedulerError::UnknownReservation(id))?;
        tracing::info!(reservation_id = id, "reservation removed");
        self.shared.audit(AuditAction::Remove, Some(id), None, None);
        self.shared.emit(&AgendaEvent::Removed(id));
        Ok(removed)
    }

    /// Whether `id` is in the book.
    #[must_use]
    pub fn has_reservation(&self, id: i32) -> bool {
        self.shared.book.lock().reservations.contains_key(&id)
    }

    /// Copy of a reservation.
    #[must_use]
    pub fn reservation(&self, id: i32) -> Option<Reservation> {
        self.shared.book.lock().reservations.get(&id).cloned()
    }

    /// Number of reservations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.shared.book.lock().reservations.len()
    }

    /// Whether the book is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.shared.book.lock().reservations.is_empty()
    }

    /// Id the next automatically numbered reservation will get.
    #[must_use]
    pub fn next_reservation_id(&self) -> i32 {
        self.shared.book.lock().last_id.saturating_add(1)
    }

    /// Highest id handed out so far.
    #[must_use]
    pub fn last_reservation_id(&self) -> i32 {
        self.shared.book.lock().last_id
    }

    /// Status of a reservation.
    #[must_use]
    pub fn status(&self, id: i32) -> Option<ReservationStatus> {
        let book = self.shared.book.lock();
        book.reservations.contains_key(&id).then(|| book.status(id))
    }

    /// Outcome of a finished reservation.
    #[must_use]
    pub fn outcome(&self, id: i32) -> Option<RunOutcome> {
        self.shared.book.lock().outcomes.get(&id).cloned()
    }

    /// Every reservation id, chronologically.
    #[must_use]
    pub fn compute_all_sessions(&self) -> Vec<i32> {
        self.shared.book.lock().select(|_| true)
    }

    /// Reservations whose period contains now.
    #[must_use]
    pub fn compute_current_sessions(&self) -> Vec<i32> {
        self.compute_simultaneous_sessions(self.shared.clock.now())
    }

    /// Reservations starting after now.
    #[must_use]
    pub fn compute_future_sessions(&self) -> Vec<i32> {
        let now = self.shared.clock.now();
        self.shared.book.lock().select(|r| r.period.is_future(now))
    }

    /// Reservations whose period has ended.
    #[must_use]
    pub fn compute_past_sessions(&self) -> Vec<i32> {
        let now = self.shared.clock.now();
        self.shared.book.lock().select(|r| r.period.is_past(now))
    }

    /// Reservations whose period contains `t`.
    #[must_use]
    pub fn compute_simultaneous_sessions(&self, t: DateTime<Utc>) -> Vec<i32> {
        self.shared.book.lock().select(|r| r.period.contains(t))
    }

    /// Reservations overlapping `period`.
    #[must_use]
    pub fn compute_intersection_sessions(&self, period: &TimePeriod) -> Vec<i32> {
        self.shared.book.lock().select(|r| r.period.intersects(period))
    }

    /// Earliest future reservation.
    #[must_use]
    pub fn next_session(&self) -> Option<Reservation> {
        let now = self.shared.clock.now();
        let book = self.shared.book.lock();
        book.reservations
            .values()
            .filter(|r| r.period.is_future(now))
            .min_by(|a, b| a.cmp_period(b))
            .cloned()
    }

    /// Receive agenda events.
    #[must_use]
    pub fn subscribe(&self) -> Receiver<AgendaEvent> {
        let (tx, rx) = unbounded();
        self.shared.subscribers.lock().push(tx);
        rx
    }

    /// Load reservations from the store into the book.
    ///
    /// Records that clash with the book are skipped with a warning.
    ///
    /// # Errors
    ///
    /// Store failure.
    pub fn load_reservations(&self) -> Result<usize, SchedulerError> {
        self.shared.load()
    }

    /// Purge past reservations beyond the configured threshold, then store
    /// the book. Returns the number of reservations stored.
    ///
    /// # Errors
    ///
    /// Store failure.
    pub fn store_reservations(&self) -> Result<usize, SchedulerError> {
        self.shared.store()
    }

    /// Run one scheduler iteration on the calling thread.
    ///
    /// Meant for hosts that drive the agenda themselves instead of calling
    /// [`start`](Self::start).
    ///
    /// # Errors
    ///
    /// Agenda already started.
    pub fn run_once(&self, tree: &mut SessionTree) -> Result<(), SchedulerError> {
        if self.is_started() {
            return Err(SchedulerError::AlreadyInitialized("agenda scheduler".into()));
        }
        self.shared.tick(tree);
        Ok(())
    }

    /// Session tree configured like the one the scheduler thread uses.
    ///
    /// # Errors
    ///
    /// Root pool construction failure.
    pub fn build_session_tree(&self) -> Result<SessionTree, SchedulerError> {
        let (profile, tolerance) = {
            let config = self.shared.config.lock();
            (config.root_profile, config.constraint_tolerance)
        };
        Ok(SessionTree::new(
            Arc::clone(&self.shared.catalog),
            Arc::clone(&self.shared.registry),
            Arc::clone(&self.shared.clock),
            profile,
        )?
        .with_tolerance(tolerance))
    }

    /// Whether the scheduler thread is alive.
    #[must_use]
    pub fn is_started(&self) -> bool {
        self.thread
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Load the store and spawn the scheduler thread.
    ///
    /// A token cancelled by a previous run is replaced by a fresh one.
    ///
    /// # Errors
    ///
    /// Already started, store failure, root pool failure, or thread spawn failure.
    pub fn start(&self) -> Result<(), SchedulerError> {
        let mut thread_slot = self.thread.lock();
        if thread_slot.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return Err(SchedulerError::AlreadyInitialized("agenda scheduler".into()));
        }
        if let Some(finished) = thread_slot.take() {
            let _ = finished.join();
        }
        {
            let mut token = self.shared.token.lock();
            if token.is_cancelled() {
                *token = CancellationToken::new();
            }
        }
        let mut tree = self.build_session_tree()?;
        self.shared.load()?;
        let poll_interval = self.shared.config.lock().poll_interval;
        let shared = Arc::clone(&self.shared);
        let handle = thread::Builder::new()
            .name("agenda-scheduler".into())
            .spawn(move || scheduler_loop(&shared, &mut tree, poll_interval))
            .map_err(|e| SchedulerError::Backend(format!("failed to spawn scheduler: {e}")))?;
        *thread_slot = Some(handle);
        tracing::info!(?poll_interval, "agenda started");
        Ok(())
    }

    /// Ask the running session of reservation `id` to stop.
    ///
    /// Returns whether that reservation was running.
    #[must_use = "false means the reservation was not running"]
    pub fn request_session_stop(&self, id: i32) -> bool {
        let active = self.shared.active.lock();
        match active.as_ref() {
            Some((running, controls)) if *running == id => {
                for control in controls {
                    control.run_stop_request();
                }
                tracing::info!(reservation_id = id, "session stop requested");
                true
            }
            _ => false,
        }
    }

    /// Signal the scheduler to stop, interrupt the running session, and join.
    ///
    /// # Errors
    ///
    /// The scheduler thread panicked.
    pub fn stop(&self) -> Result<(), SchedulerError> {
        self.shared.token().cancel();
        if let Some((_, controls)) = self.shared.active.lock().as_ref() {
            for control in controls {
                control.run_stop_request();
            }
        }
        let handle = self.thread.lock().take();
        if let Some(handle) = handle {
            handle
                .join()
                .map_err(|_| SchedulerError::Backend("agenda scheduler panicked".into()))?;
            tracing::info!("agenda stopped");
        }
        Ok(())
    }
}

fn scheduler_loop(shared: &AgendaShared, tree: &mut SessionTree, poll_interval: Duration) {
    let token = shared.token();
    loop {
        if shared.must_be_stopped() {
            break;
        }
        shared.tick(tree);
        if token.wait_timeout(poll_interval) {
            break;
        }
    }
    if let Err(err) = shared.store() {
        tracing::error!(error = %err, "failed to store reservations at shutdown");
    }
    shared.emit(&AgendaEvent::Stopped);
}

impl Drop for Agenda {
    fn drop(&mut self) {
        if let Err(err) = self.stop() {
            tracing::error!(error = %err, "agenda shutdown failed");
        }
    }
}

impl std::fmt::Debug for Agenda {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agenda")
            .field("reservations", &self.len())
            .field("started", &self.is_started())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::UseCaseConfig;
    use crate::core::catalog::{ResourceInfo, RoleDefinition};
    use crate::util::clock::ManualClock;
    use chrono::{TimeDelta, TimeZone};

    struct Empty;

    impl ResourceCatalog for Empty {
        fn resource(&self, _id: i32) -> Option<&ResourceInfo> {
            None
        }
        fn resource_by_name(&self, _name: &str) -> Option<&ResourceInfo> {
            None
        }
        fn resource_ids(&self) -> Vec<i32> {
            Vec::new()
        }
        fn role(&self, _name: &str) -> Option<&RoleDefinition> {
            None
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap()
    }

    fn agenda(clock: Arc<ManualClock>) -> Agenda {
        Agenda::new(
            AgendaConfig::default(),
            Arc::new(Empty),
            Arc::new(UseCaseRegistry::with_defaults()),
            clock,
        )
        .unwrap()
    }

    fn reservation(from: i64, to: i64) -> Reservation {
        Reservation::new(
            TimePeriod::new(t0() + TimeDelta::seconds(from), t0() + TimeDelta::seconds(to)).unwrap(),
            UseCaseConfig::new("hold", "lock").with_property("duration", "1s"),
        )
    }

    #[test]
    fn test_ids_are_monotonic() {
        let agenda = agenda(Arc::new(ManualClock::new(t0())));
        assert_eq!(agenda.next_reservation_id(), 1);
        assert_eq!(agenda.add_reservation(reservation(0, 10)).unwrap(), 1);
        assert_eq!(agenda.add_reservation(reservation(0, 10).with_id(10)).unwrap(), 10);
        assert_eq!(agenda.add_reservation(reservation(0, 10)).unwrap(), 11);
        assert_eq!(agenda.add_reservation(reservation(0, 10).with_id(5)).unwrap(), 5);
        assert_eq!(agenda.last_reservation_id(), 11);
        assert_eq!(agenda.next_reservation_id(), 12);
    }

    #[test]
    fn test_remove_and_status() {
        let agenda = agenda(Arc::new(ManualClock::new(t0())));
        let id = agenda.add_reservation(reservation(0, 10)).unwrap();
        assert_eq!(agenda.status(id), Some(ReservationStatus::Pending));
        assert!(agenda.remove_reservation(id).is_ok());
        assert!(!agenda.has_reservation(id));
        assert_eq!(agenda.status(id), None);
        assert_eq!(
            agenda.remove_reservation(id).unwrap_err(),
            SchedulerError::UnknownReservation(id)
        );
    }

    #[test]
    fn test_next_session_and_intersection() {
        let clock = Arc::new(ManualClock::new(t0()));
        let agenda = agenda(Arc::clone(&clock));
        agenda.add_reservation(reservation(100, 200).with_id(1)).unwrap();
        agenda.add_reservation(reservation(50, 60).with_id(2)).unwrap();
        agenda.add_reservation(reservation(-20, -10).with_id(3)).unwrap();
        assert_eq!(agenda.next_session().and_then(|r| r.id), Some(2));
        assert_eq!(agenda.compute_all_sessions(), vec![3, 2, 1]);
        let window = TimePeriod::new(t0() + TimeDelta::seconds(55), t0() + TimeDelta::seconds(150)).unwrap();
        assert_eq!(agenda.compute_intersection_sessions(&window), vec![2, 1]);
    }

    #[test]
    fn test_purge_keeps_newest_past() {
        let clock = Arc::new(ManualClock::new(t0()));
        let agenda = agenda(Arc::clone(&clock));
        for (id, end) in [(1, -300), (2, -200), (3, -100)] {
            agenda
                .add_reservation(reservation(end - 10, end).with_id(id))
                .unwrap();
        }
        agenda.add_reservation(reservation(100, 200).with_id(4)).unwrap();
        agenda.set_purge_store(1);
        let events = agenda.subscribe();
        assert_eq!(agenda.store_reservations().unwrap(), 2);
        assert_eq!(agenda.compute_all_sessions(), vec![3, 4]);
        assert_eq!(events.try_recv().unwrap(), AgendaEvent::Purged(vec![2, 1]));
    }

    #[test]
    fn test_purge_spares_reservations_within_retention() {
        let config = AgendaConfig {
            purge_store: 1,
            retention: Some(Duration::from_secs(250)),
            ..AgendaConfig::default()
        };
        let agenda = Agenda::new(
            config,
            Arc::new(Empty),
            Arc::new(UseCaseRegistry::with_defaults()),
            Arc::new(ManualClock::new(t0())),
        )
        .unwrap();
        for (id, end) in [(1, -300), (2, -200), (3, -100)] {
            agenda
                .add_reservation(reservation(end - 10, end).with_id(id))
                .unwrap();
        }
        let events = agenda.subscribe();
        assert_eq!(agenda.store_reservations().unwrap(), 2);
        assert!(agenda.has_reservation(2));
        assert!(!agenda.has_reservation(1));
        assert_eq!(agenda.compute_all_sessions(), vec![2, 3]);
        assert_eq!(events.try_recv().unwrap(), AgendaEvent::Purged(vec![1]));
    }
}
