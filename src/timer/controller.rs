use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use chrono::{DateTime, Utc};
use tokio::{
    sync::{broadcast, Mutex},
    task::JoinHandle,
    time::{self, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::{
    blocking::{blocking_minutes, AppBlocker, BlockSelection},
    db::Database,
    error::{BlockingError, SessionError, SessionResult, ValidationError, VerificationErrorKind},
    models::{CompletedSession, HistoryStats},
    progress::{combine_evidence, compute_delta, SessionProgressState},
    reward::{RewardPolicy, RewardPolicyKind},
    settings::Settings,
    verification::{ProgressVerifier, VerificationRequest, VerificationResponse},
};

use super::{
    ActiveTimerState, BreakCountdown, Clock, SessionEvent, SessionMachine, SessionPhase,
    SessionSnapshot, SystemClock,
};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info, log_warn};

const EVENT_CAPACITY: usize = 64;

#[derive(Debug, Clone)]
pub struct ControllerConfig {
    pub pause_main_timer_during_break: bool,
    pub block_selection: BlockSelection,
    pub reward_policy: RewardPolicyKind,
    /// `None` disables the background ticker; `tick()` is then driven by hand.
    pub tick_interval: Option<Duration>,
    pub heartbeat_every_ticks: u32,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            pause_main_timer_during_break: false,
            block_selection: BlockSelection::default(),
            reward_policy: RewardPolicyKind::Tiered,
            tick_interval: Some(Duration::from_secs(1)),
            heartbeat_every_ticks: 10,
        }
    }
}

impl ControllerConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        let debug_mode = std::env::var("FOCUSGATE_DEBUG")
            .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        Self {
            pause_main_timer_during_break: settings.pause_main_timer_during_break,
            block_selection: settings.block_selection.clone(),
            reward_policy: settings.reward_policy,
            tick_interval: Some(Duration::from_secs(1)),
            heartbeat_every_ticks: if debug_mode { 1 } else { 10 },
        }
    }
}

#[derive(Debug, Clone)]
pub enum ResumeOutcome {
    NothingToResume,
    /// The timer ran out while the process was away and has been logged.
    CompletedWhileSuspended(CompletedSession),
    Resumed(SessionSnapshot),
    /// A timer survived but its goal did not; `start_session` reuses the timer.
    NeedsGoal(SessionSnapshot),
    AlreadyActive(SessionSnapshot),
}

#[derive(Debug, Clone)]
pub struct VerificationOutcome {
    pub response: VerificationResponse,
    pub break_seconds: u32,
    pub snapshot: SessionSnapshot,
}

impl VerificationOutcome {
    pub fn break_granted(&self) -> bool {
        self.break_seconds > 0
    }
}

/// Holds the single verification slot; released on drop, including when
/// the caller abandons the future.
struct InFlightGuard(Arc<AtomicBool>);

impl InFlightGuard {
    fn acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(Arc::clone(flag)))
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

struct Ticker {
    handle: JoinHandle<()>,
    cancel: CancellationToken,
}

fn invalid(action: &'static str, phase: SessionPhase) -> SessionError {
    SessionError::InvalidTransition {
        action,
        phase: phase.as_str(),
    }
}

/// Drives one focus session at a time through
/// goal entry, focusing, evidence review and breaks.
#[derive(Clone)]
pub struct SessionController {
    machine: Arc<Mutex<SessionMachine>>,
    db: Database,
    verifier: Arc<dyn ProgressVerifier>,
    blocker: Arc<dyn AppBlocker>,
    reward: Arc<dyn RewardPolicy>,
    clock: Arc<dyn Clock>,
    events: broadcast::Sender<SessionEvent>,
    verification_in_flight: Arc<AtomicBool>,
    ticker: Arc<Mutex<Option<Ticker>>>,
    config: Arc<ControllerConfig>,
}

impl SessionController {
    pub fn new(
        db: Database,
        verifier: Arc<dyn ProgressVerifier>,
        blocker: Arc<dyn AppBlocker>,
        config: ControllerConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            machine: Arc::new(Mutex::new(SessionMachine::new())),
            db,
            verifier,
            blocker,
            reward: Arc::from(config.reward_policy.into_policy()),
            clock: Arc::new(SystemClock),
            events,
            verification_in_flight: Arc::new(AtomicBool::new(false)),
            ticker: Arc::new(Mutex::new(None)),
            config: Arc::new(config),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_reward_policy(mut self, policy: Arc<dyn RewardPolicy>) -> Self {
        self.reward = policy;
        self
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        let machine = self.machine.lock().await;
        machine.snapshot(self.clock.now())
    }

    pub fn verification_in_flight(&self) -> bool {
        self.verification_in_flight.load(Ordering::Acquire)
    }

    pub async fn history(&self, limit: Option<usize>) -> SessionResult<Vec<CompletedSession>> {
        Ok(self.db.list_history(limit).await?)
    }

    pub async fn history_stats(&self) -> SessionResult<HistoryStats> {
        Ok(self.db.history_stats().await?)
    }

    /// The completion notice of the last finished session, shown once.
    pub async fn take_pending_completion(&self) -> SessionResult<Option<CompletedSession>> {
        Ok(self.db.take_pending_completion().await?)
    }

    /// Restores persisted state after a restart. Safe to call repeatedly.
    pub async fn resume(&self) -> SessionResult<ResumeOutcome> {
        let mut machine = self.machine.lock().await;
        let now = self.clock.now();

        if !machine.phase.can_prepare() {
            return Ok(ResumeOutcome::AlreadyActive(machine.snapshot(now)));
        }

        if let Some(record) = self.db.finalize_expired_timer(now).await? {
            log_info!(
                "Session {} finished while suspended ({}s, {} breaks)",
                record.id,
                record.duration_seconds,
                record.breaks_taken
            );
            // Blocking outlives the process; lift it here.
            self.blocker.stop_blocking().await;
            machine.finish(SessionPhase::Completed);
            self.emit(SessionEvent::SessionFinished {
                session: record.clone(),
            });
            self.emit_state(&machine, now);
            return Ok(ResumeOutcome::CompletedWhileSuspended(record));
        }

        let timer = self.db.load_active_timer().await?;
        let progress = self.db.load_progress().await?;

        match (timer, progress) {
            (Some(timer), Some(progress)) => {
                let remaining = timer.time_remaining(now);
                machine.finish(SessionPhase::Focusing);
                machine.session_id = Some(Uuid::new_v4().to_string());
                machine.timer = Some(timer);
                machine.progress = Some(progress);

                if let Err(err) = self.engage_blocking(remaining).await {
                    self.report_blocking_failure(&err);
                }

                let snapshot = machine.snapshot(now);
                log_info!("Resumed session with {}s remaining", snapshot.remaining_seconds);
                self.emit_state(&machine, now);
                drop(machine);

                self.spawn_ticker().await;
                Ok(ResumeOutcome::Resumed(snapshot))
            }
            (Some(timer), None) => {
                machine.finish(SessionPhase::AwaitingGoal);
                machine.timer = Some(timer);
                self.emit_state(&machine, now);
                Ok(ResumeOutcome::NeedsGoal(machine.snapshot(now)))
            }
            (None, Some(_)) => {
                log_warn!("Discarding session progress without an active timer");
                self.db.clear_progress().await?;
                Ok(ResumeOutcome::NothingToResume)
            }
            (None, None) => Ok(ResumeOutcome::NothingToResume),
        }
    }

    /// Idle (or finished) to awaiting a goal.
    pub async fn prepare_session(&self) -> SessionResult<SessionSnapshot> {
        let mut machine = self.machine.lock().await;
        let now = self.clock.now();

        match machine.phase {
            SessionPhase::AwaitingGoal => {}
            phase if phase.can_prepare() => {
                machine.finish(SessionPhase::AwaitingGoal);
                self.emit_state(&machine, now);
            }
            phase => return Err(invalid("prepare a session", phase)),
        }

        Ok(machine.snapshot(now))
    }

    /// Accepts the goal and starts the focus countdown.
    ///
    /// A timer restored without its goal is reused and `duration_seconds`
    /// is ignored. Nothing changes if validation or blocking fails.
    pub async fn start_session(
        &self,
        goal: &str,
        duration_seconds: u64,
    ) -> SessionResult<SessionSnapshot> {
        let mut machine = self.machine.lock().await;
        let now = self.clock.now();

        if machine.phase != SessionPhase::AwaitingGoal {
            return Err(invalid("start focusing", machine.phase));
        }

        let goal = goal.trim();
        if goal.is_empty() {
            return Err(ValidationError::EmptyGoal.into());
        }

        let timer = match machine.timer.clone() {
            Some(restored) => restored,
            None => ActiveTimerState::start(now, duration_seconds)?,
        };
        let progress = SessionProgressState::new(goal);

        if let Err(err) = self.engage_blocking(timer.time_remaining(now)).await {
            log_warn!("Could not start blocking: {err}");
            return Err(err.into());
        }

        if let Err(err) = self.db.save_session_start(&timer, &progress).await {
            self.blocker.stop_blocking().await;
            return Err(err.into());
        }

        machine.phase = SessionPhase::Focusing;
        machine.session_id = Some(Uuid::new_v4().to_string());
        machine.timer = Some(timer);
        machine.progress = Some(progress);
        machine.break_countdown = None;
        machine.paused_at = None;
        machine.ticks = 0;

        let snapshot = machine.snapshot(now);
        log_info!(
            "Focus session started: {}s toward \"{}\"",
            snapshot.remaining_seconds,
            goal
        );
        self.emit_state(&machine, now);
        drop(machine);

        self.spawn_ticker().await;
        Ok(snapshot)
    }

    /// Focusing to evidence review.
    pub async fn request_break(&self) -> SessionResult<SessionSnapshot> {
        let mut machine = self.machine.lock().await;
        let now = self.clock.now();

        if machine.phase != SessionPhase::Focusing {
            return Err(invalid("request a break", machine.phase));
        }

        if self.config.pause_main_timer_during_break {
            machine.paused_at = Some(now);
        }
        machine.phase = SessionPhase::EvidenceReview;
        self.emit_state(&machine, now);
        Ok(machine.snapshot(now))
    }

    /// Leaves evidence review without submitting anything.
    pub async fn cancel_review(&self) -> SessionResult<SessionSnapshot> {
        if self.verification_in_flight() {
            return Err(SessionError::VerificationInFlight);
        }

        let mut machine = self.machine.lock().await;
        let now = self.clock.now();

        if machine.phase != SessionPhase::EvidenceReview {
            return Err(invalid("return to the session", machine.phase));
        }

        self.return_to_focus(&mut machine, now).await?;
        self.emit_state(&machine, now);
        Ok(machine.snapshot(now))
    }

    /// Sends the new evidence to the judge and applies the decision.
    ///
    /// At most one call runs at a time. The session lock is not held while
    /// waiting on the judge, so the ticker keeps running.
    pub async fn submit_evidence(
        &self,
        note: &str,
        image_text: &str,
    ) -> SessionResult<VerificationOutcome> {
        let _guard = InFlightGuard::acquire(&self.verification_in_flight)
            .ok_or(SessionError::VerificationInFlight)?;

        let (session_id, request, submitted) = {
            let machine = self.machine.lock().await;
            if machine.phase != SessionPhase::EvidenceReview {
                return Err(invalid("submit evidence", machine.phase));
            }
            let progress = machine
                .progress
                .as_ref()
                .ok_or_else(|| invalid("submit evidence", machine.phase))?;

            let submitted = combine_evidence(note, image_text);
            if submitted.is_empty() {
                return Err(ValidationError::EmptyEvidence.into());
            }

            let delta = compute_delta(progress, &submitted);
            let request = VerificationRequest::from_state(progress, note, delta);
            (machine.session_id.clone(), request, submitted)
        };

        let result = self.verifier.verify(&request).await;

        let mut machine = self.machine.lock().await;
        let now = self.clock.now();

        if machine.session_id != session_id || machine.phase != SessionPhase::EvidenceReview {
            log_warn!("Discarding verification result; session moved on");
            return Err(invalid("apply a verification result", machine.phase));
        }

        let response = match result {
            Ok(response) => response,
            Err(err) => {
                match err.kind() {
                    VerificationErrorKind::Protocol => {
                        log_error!("Verification protocol error: {err}")
                    }
                    _ => log_warn!("Verification failed: {err}"),
                }
                self.return_to_focus(&mut machine, now).await?;
                self.emit(SessionEvent::VerificationFailed {
                    kind: err.kind(),
                    message: err.to_string(),
                });
                self.emit_state(&machine, now);
                return Err(err.into());
            }
        };

        let mut progress = machine
            .progress
            .clone()
            .ok_or_else(|| invalid("apply a verification result", machine.phase))?;
        progress.record_verification(response.updated_summary.clone(), submitted);
        self.db.save_progress(&progress).await?;
        machine.progress = Some(progress);

        let break_seconds = self
            .reward
            .reward_seconds(response.score, response.allow_break);

        if break_seconds > 0 {
            if let Some(mut timer) = machine.timer.clone() {
                timer.record_break();
                self.db.save_active_timer(&timer).await?;
                machine.timer = Some(timer);
            }
            self.blocker.stop_blocking().await;
            machine.break_countdown = Some(BreakCountdown::new(now, break_seconds));
            machine.phase = SessionPhase::OnBreak;
            log_info!("Break granted: {}s (score {:.2})", break_seconds, response.score);
            self.emit(SessionEvent::BreakStarted {
                seconds: break_seconds,
            });
        } else {
            log_info!(
                "No break granted (score {:.2}, allow_break={})",
                response.score,
                response.allow_break
            );
            self.return_to_focus(&mut machine, now).await?;
        }

        self.emit(SessionEvent::VerificationCompleted {
            score: response.score,
            allow_break: response.allow_break,
            reason: response.reason.clone(),
            break_seconds,
        });
        self.emit_state(&machine, now);

        Ok(VerificationOutcome {
            response,
            break_seconds,
            snapshot: machine.snapshot(now),
        })
    }

    /// Ends the break before its countdown does.
    pub async fn end_break(&self) -> SessionResult<SessionSnapshot> {
        let mut machine = self.machine.lock().await;
        let now = self.clock.now();

        if machine.phase != SessionPhase::OnBreak {
            return Err(invalid("end the break", machine.phase));
        }

        self.finish_break(&mut machine, now, true).await?;
        Ok(machine.snapshot(now))
    }

    /// Gives up on the session. Logged as incomplete.
    pub async fn end_session(&self) -> SessionResult<CompletedSession> {
        let mut machine = self.machine.lock().await;
        let now = self.clock.now();

        let ending_allowed = machine.phase.is_running()
            || (machine.phase == SessionPhase::AwaitingGoal && machine.timer.is_some());
        if !ending_allowed {
            return Err(invalid("end the session", machine.phase));
        }

        let timer = machine
            .timer
            .clone()
            .ok_or_else(|| invalid("end the session", machine.phase))?;
        let elapsed = timer.elapsed_seconds(machine.main_reference(now));
        let record = CompletedSession::new(now, elapsed, false, timer.breaks_taken());

        self.db.finalize_session(&record).await?;
        self.blocker.stop_blocking().await;
        machine.finish(SessionPhase::Abandoned);

        log_info!("Session ended early after {}s", elapsed);
        self.emit(SessionEvent::SessionFinished {
            session: record.clone(),
        });
        self.emit_state(&machine, now);
        drop(machine);

        self.cancel_ticker().await;
        Ok(record)
    }

    /// One step of the countdowns. The background ticker calls this every
    /// `tick_interval`.
    pub async fn tick(&self) -> SessionResult<SessionSnapshot> {
        let mut machine = self.machine.lock().await;
        let now = self.clock.now();
        machine.ticks = machine.ticks.wrapping_add(1);

        match machine.phase {
            SessionPhase::Focusing => {
                if machine.main_remaining_ms(now) <= 0 {
                    self.complete_naturally(&mut machine, now).await?;
                }
            }
            SessionPhase::OnBreak => {
                let break_over = machine
                    .break_countdown
                    .map(|countdown| countdown.remaining_ms(now) <= 0)
                    .unwrap_or(true);

                if machine.main_remaining_ms(now) <= 0 {
                    self.complete_naturally(&mut machine, now).await?;
                } else if break_over {
                    log_info!("Break time ended");
                    self.finish_break(&mut machine, now, false).await?;
                }
            }
            _ => {}
        }

        let heartbeat_every = self.config.heartbeat_every_ticks.max(1);
        if machine.phase.is_running() && machine.ticks % heartbeat_every == 0 {
            let snapshot = machine.snapshot(now);
            self.emit(SessionEvent::Heartbeat {
                remaining_seconds: snapshot.remaining_seconds,
                break_remaining_seconds: snapshot.break_remaining_seconds,
            });
        }

        Ok(machine.snapshot(now))
    }

    /// Stops the background ticker. Persisted state is left for `resume`.
    pub async fn shutdown(&self) {
        self.cancel_ticker().await;
    }

    async fn complete_naturally(
        &self,
        machine: &mut SessionMachine,
        now: DateTime<Utc>,
    ) -> SessionResult<()> {
        let Some(timer) = machine.timer.clone() else {
            machine.finish(SessionPhase::Completed);
            return Ok(());
        };

        let record = CompletedSession::new(
            now,
            timer.total_duration_seconds(),
            true,
            timer.breaks_taken(),
        );
        self.db.finalize_session(&record).await?;
        self.blocker.stop_blocking().await;
        machine.finish(SessionPhase::Completed);

        log_info!(
            "Focus session completed ({}s, {} breaks)",
            record.duration_seconds,
            record.breaks_taken
        );
        self.emit(SessionEvent::SessionFinished { session: record });
        self.emit_state(machine, now);
        Ok(())
    }

    async fn finish_break(
        &self,
        machine: &mut SessionMachine,
        now: DateTime<Utc>,
        early: bool,
    ) -> SessionResult<()> {
        self.return_to_focus(machine, now).await?;

        let remaining = machine
            .timer
            .as_ref()
            .map(|timer| timer.time_remaining(now))
            .unwrap_or(0);
        if let Err(err) = self.engage_blocking(remaining).await {
            self.report_blocking_failure(&err);
        }

        self.emit(SessionEvent::BreakEnded { early });
        self.emit_state(machine, now);
        Ok(())
    }

    /// Back to focusing, pushing the end time back by any pause.
    async fn return_to_focus(
        &self,
        machine: &mut SessionMachine,
        now: DateTime<Utc>,
    ) -> SessionResult<()> {
        machine.phase = SessionPhase::Focusing;
        machine.break_countdown = None;
        if machine.release_pause(now) {
            if let Some(timer) = machine.timer.as_ref() {
                self.db.save_active_timer(timer).await?;
            }
        }
        Ok(())
    }

    async fn engage_blocking(&self, remaining_seconds: u64) -> Result<(), BlockingError> {
        self.blocker
            .start_blocking(
                &self.config.block_selection,
                blocking_minutes(remaining_seconds),
            )
            .await
    }

    fn report_blocking_failure(&self, err: &BlockingError) {
        log_error!("Failed to re-enable app blocking: {err}");
        self.emit(SessionEvent::BlockingFailed {
            authorization: err.is_authorization(),
            message: err.to_string(),
        });
    }

    async fn spawn_ticker(&self) {
        let Some(tick_interval) = self.config.tick_interval else {
            return;
        };

        let mut ticker_guard = self.ticker.lock().await;
        if let Some(existing) = ticker_guard.take() {
            existing.cancel.cancel();
            existing.handle.abort();
        }

        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let controller = self.clone();

        let handle = tokio::spawn(async move {
            let mut interval = time::interval(tick_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            interval.tick().await;

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        match controller.tick().await {
                            Ok(snapshot) if !snapshot.phase.is_running() => break,
                            Ok(_) => {}
                            Err(err) => log_error!("session tick failed: {err}"),
                        }
                    }
                    _ = token.cancelled() => break,
                }
            }
        });

        *ticker_guard = Some(Ticker { handle, cancel });
    }

    async fn cancel_ticker(&self) {
        if let Some(ticker) = self.ticker.lock().await.take() {
            ticker.cancel.cancel();
            ticker.handle.abort();
        }
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn emit_state(&self, machine: &SessionMachine, now: DateTime<Utc>) {
        self.emit(SessionEvent::StateChanged {
            snapshot: machine.snapshot(now),
        });
    }
}
