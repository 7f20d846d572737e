use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::cmp;

use crate::{error::ValidationError, progress::SessionProgressState};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum SessionPhase {
    #[default]
    Idle,
    AwaitingGoal,
    Focusing,
    EvidenceReview,
    OnBreak,
    Completed,
    Abandoned,
}

impl SessionPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionPhase::Idle => "idle",
            SessionPhase::AwaitingGoal => "awaiting a goal",
            SessionPhase::Focusing => "focusing",
            SessionPhase::EvidenceReview => "reviewing evidence",
            SessionPhase::OnBreak => "on a break",
            SessionPhase::Completed => "completed",
            SessionPhase::Abandoned => "abandoned",
        }
    }

    /// A session exists and owns a running timer.
    pub fn is_running(&self) -> bool {
        matches!(
            self,
            SessionPhase::Focusing | SessionPhase::EvidenceReview | SessionPhase::OnBreak
        )
    }

    /// No session in progress; a new one may be prepared.
    pub fn can_prepare(&self) -> bool {
        matches!(
            self,
            SessionPhase::Idle | SessionPhase::Completed | SessionPhase::Abandoned
        )
    }
}

/// Persisted countdown of a focus session. Remaining time is always
/// `end_time - now`, never an in-memory counter, so it survives suspension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveTimerState {
    end_time: DateTime<Utc>,
    total_duration_seconds: u64,
    breaks_taken: u32,
}

impl ActiveTimerState {
    pub fn start(now: DateTime<Utc>, total_duration_seconds: u64) -> Result<Self, ValidationError> {
        if total_duration_seconds == 0 {
            return Err(ValidationError::NonPositiveDuration);
        }
        let offset = i64::try_from(total_duration_seconds)
            .ok()
            .and_then(Duration::try_seconds)
            .ok_or(ValidationError::DurationTooLong)?;
        let end_time = now
            .checked_add_signed(offset)
            .ok_or(ValidationError::DurationTooLong)?;

        Ok(Self {
            end_time,
            total_duration_seconds,
            breaks_taken: 0,
        })
    }

    pub fn end_time(&self) -> DateTime<Utc> {
        self.end_time
    }

    pub fn total_duration_seconds(&self) -> u64 {
        self.total_duration_seconds
    }

    pub fn breaks_taken(&self) -> u32 {
        self.breaks_taken
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.end_time
    }

    pub fn remaining_ms(&self, now: DateTime<Utc>) -> i64 {
        cmp::max((self.end_time - now).num_milliseconds(), 0)
    }

    /// Whole seconds left, truncated.
    pub fn time_remaining(&self, now: DateTime<Utc>) -> u64 {
        (self.remaining_ms(now) / 1000) as u64
    }

    /// Seconds of the session already spent, capped at the total.
    pub fn elapsed_seconds(&self, now: DateTime<Utc>) -> u64 {
        self.total_duration_seconds
            .saturating_sub(self.time_remaining(now))
    }

    pub fn record_break(&mut self) {
        self.breaks_taken = self.breaks_taken.saturating_add(1);
    }

    /// Pushes the end back, used when the main countdown was paused.
    pub fn extend_by(&mut self, paused: Duration) {
        if paused > Duration::zero() {
            self.end_time += paused;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakCountdown {
    pub ends_at: DateTime<Utc>,
    pub granted_seconds: u32,
}

impl BreakCountdown {
    pub fn new(now: DateTime<Utc>, granted_seconds: u32) -> Self {
        Self {
            ends_at: now + Duration::seconds(i64::from(granted_seconds)),
            granted_seconds,
        }
    }

    pub fn remaining_ms(&self, now: DateTime<Utc>) -> i64 {
        cmp::max((self.ends_at - now).num_milliseconds(), 0)
    }
}

/// What observers get to see. Never mutated by them.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub phase: SessionPhase,
    pub session_goal: Option<String>,
    pub state_summary: Option<String>,
    pub break_number: u32,
    pub breaks_taken: u32,
    pub total_duration_seconds: u64,
    pub remaining_seconds: u64,
    pub break_remaining_seconds: Option<u64>,
    pub main_timer_paused: bool,
}

/// In-memory session state owned by the controller.
#[derive(Debug, Default)]
pub struct SessionMachine {
    pub phase: SessionPhase,
    pub session_id: Option<String>,
    pub progress: Option<SessionProgressState>,
    pub timer: Option<ActiveTimerState>,
    pub break_countdown: Option<BreakCountdown>,
    /// Set while the main countdown is paused for review or a break.
    pub paused_at: Option<DateTime<Utc>>,
    pub ticks: u32,
}

impl SessionMachine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Time against which the main countdown is measured.
    pub fn main_reference(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        self.paused_at.unwrap_or(now)
    }

    pub fn main_remaining_ms(&self, now: DateTime<Utc>) -> i64 {
        self.timer
            .as_ref()
            .map(|timer| timer.remaining_ms(self.main_reference(now)))
            .unwrap_or(0)
    }

    /// Applies any pause to the end time. Returns true when the timer moved.
    pub fn release_pause(&mut self, now: DateTime<Utc>) -> bool {
        let Some(paused_at) = self.paused_at.take() else {
            return false;
        };
        match self.timer.as_mut() {
            Some(timer) => {
                timer.extend_by(now - paused_at);
                true
            }
            None => false,
        }
    }

    /// Drops every trace of the session and lands in `phase`.
    pub fn finish(&mut self, phase: SessionPhase) {
        *self = Self {
            phase,
            ..Self::default()
        };
    }

    pub fn snapshot(&self, now: DateTime<Utc>) -> SessionSnapshot {
        let reference = self.main_reference(now);
        SessionSnapshot {
            phase: self.phase,
            session_goal: self
                .progress
                .as_ref()
                .map(|progress| progress.session_goal().to_string()),
            state_summary: self
                .progress
                .as_ref()
                .map(|progress| progress.state_summary().to_string()),
            break_number: self
                .progress
                .as_ref()
                .map(|progress| progress.break_number())
                .unwrap_or(0),
            breaks_taken: self
                .timer
                .as_ref()
                .map(|timer| timer.breaks_taken())
                .unwrap_or(0),
            total_duration_seconds: self
                .timer
                .as_ref()
                .map(|timer| timer.total_duration_seconds())
                .unwrap_or(0),
            remaining_seconds: self
                .timer
                .as_ref()
                .map(|timer| timer.time_remaining(reference))
                .unwrap_or(0),
            break_remaining_seconds: self
                .break_countdown
                .as_ref()
                .map(|countdown| (countdown.remaining_ms(now) / 1000) as u64),
            main_timer_paused: self.paused_at.is_some(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(seconds: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000 + seconds, 0).unwrap()
    }

    #[test]
    fn zero_duration_is_rejected() {
        assert_eq!(
            ActiveTimerState::start(at(0), 0),
            Err(ValidationError::NonPositiveDuration)
        );
    }

    #[test]
    fn absurd_duration_is_rejected_not_panicking() {
        assert_eq!(
            ActiveTimerState::start(at(0), 200_000_000_000_000 * 60),
            Err(ValidationError::DurationTooLong)
        );
        assert_eq!(
            ActiveTimerState::start(at(0), u64::MAX),
            Err(ValidationError::DurationTooLong)
        );
        // Fits a TimeDelta but not a calendar date.
        assert_eq!(
            ActiveTimerState::start(at(0), 9_000_000_000_000_000 / 1000),
            Err(ValidationError::DurationTooLong)
        );
    }

    #[test]
    fn remaining_is_derived_from_end_time() {
        let timer = ActiveTimerState::start(at(0), 1500).unwrap();
        assert_eq!(timer.time_remaining(at(0)), 1500);
        assert_eq!(timer.time_remaining(at(100)), 1400);
        assert_eq!(timer.elapsed_seconds(at(100)), 100);
        assert_eq!(timer.time_remaining(at(5000)), 0);
        assert_eq!(timer.elapsed_seconds(at(5000)), 1500);
        assert!(!timer.is_expired(at(1499)));
        assert!(timer.is_expired(at(1500)));
    }

    #[test]
    fn remaining_strictly_decreases_in_real_time() {
        let timer = ActiveTimerState::start(Utc::now(), 600).unwrap();
        let first = timer.remaining_ms(Utc::now());
        std::thread::sleep(std::time::Duration::from_millis(5));
        let second = timer.remaining_ms(Utc::now());
        std::thread::sleep(std::time::Duration::from_millis(5));
        let third = timer.remaining_ms(Utc::now());
        assert!(first > second && second > third);
    }

    #[test]
    fn persisted_round_trip_keeps_totals() {
        let mut timer = ActiveTimerState::start(Utc::now(), 1500).unwrap();
        timer.record_break();
        let json = serde_json::to_string(&timer).unwrap();
        assert!(json.contains("totalDurationSeconds"));

        let restored: ActiveTimerState = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.total_duration_seconds(), 1500);
        assert_eq!(restored.breaks_taken(), 1);
        assert_eq!(restored.end_time(), timer.end_time());
    }

    #[test]
    fn pause_is_released_into_end_time() {
        let mut machine = SessionMachine::new();
        machine.timer = Some(ActiveTimerState::start(at(0), 600).unwrap());
        machine.paused_at = Some(at(100));

        // Frozen while paused.
        assert_eq!(machine.snapshot(at(400)).remaining_seconds, 500);

        assert!(machine.release_pause(at(400)));
        assert_eq!(machine.timer.as_ref().unwrap().end_time(), at(900));
        assert_eq!(machine.snapshot(at(400)).remaining_seconds, 500);
        assert!(!machine.release_pause(at(500)));
    }

    #[test]
    fn finish_clears_session() {
        let mut machine = SessionMachine::new();
        machine.phase = SessionPhase::Focusing;
        machine.progress = Some(SessionProgressState::new("goal"));
        machine.timer = Some(ActiveTimerState::start(at(0), 60).unwrap());
        machine.finish(SessionPhase::Abandoned);

        assert_eq!(machine.phase, SessionPhase::Abandoned);
        assert!(machine.progress.is_none());
        assert!(machine.timer.is_none());
    }
}
