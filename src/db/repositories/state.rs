//! The three session records and the one-shot terminus write.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};

use crate::{
    db::Database,
    models::CompletedSession,
    progress::SessionProgressState,
    timer::ActiveTimerState,
};

use super::{
    history::insert_session,
    kv::{decode, delete_value, read_value, write_value},
};

pub const ACTIVE_TIMER_KEY: &str = "focusgate.active_timer";
pub const SESSION_PROGRESS_KEY: &str = "focusgate.session_progress";
pub const PENDING_COMPLETION_KEY: &str = "focusgate.pending_completion";

fn finalize_in(conn: &mut rusqlite::Connection, record: &CompletedSession) -> Result<()> {
    let tx = conn.transaction()?;
    insert_session(&tx, record)?;
    delete_value(&tx, ACTIVE_TIMER_KEY)?;
    delete_value(&tx, SESSION_PROGRESS_KEY)?;
    let notice = serde_json::to_string(record).context("failed to serialize pending completion")?;
    write_value(&tx, PENDING_COMPLETION_KEY, &notice)?;
    tx.commit().context("failed to commit session terminus")?;
    Ok(())
}

impl Database {
    pub async fn load_active_timer(&self) -> Result<Option<ActiveTimerState>> {
        self.get_json(ACTIVE_TIMER_KEY).await
    }

    pub async fn save_active_timer(&self, timer: &ActiveTimerState) -> Result<()> {
        self.put_json(ACTIVE_TIMER_KEY, timer).await
    }

    pub async fn load_progress(&self) -> Result<Option<SessionProgressState>> {
        self.get_json(SESSION_PROGRESS_KEY).await
    }

    pub async fn save_progress(&self, progress: &SessionProgressState) -> Result<()> {
        self.put_json(SESSION_PROGRESS_KEY, progress).await
    }

    pub async fn clear_progress(&self) -> Result<()> {
        self.delete_key(SESSION_PROGRESS_KEY).await
    }

    /// Writes both records of a freshly started session together.
    pub async fn save_session_start(
        &self,
        timer: &ActiveTimerState,
        progress: &SessionProgressState,
    ) -> Result<()> {
        let timer = serde_json::to_string(timer).context("failed to serialize active timer")?;
        let progress =
            serde_json::to_string(progress).context("failed to serialize session progress")?;
        self.execute(move |conn| {
            let tx = conn.transaction()?;
            write_value(&tx, ACTIVE_TIMER_KEY, &timer)?;
            write_value(&tx, SESSION_PROGRESS_KEY, &progress)?;
            tx.commit().context("failed to commit session start")?;
            Ok(())
        })
        .await
    }

    /// Appends the history record, clears timer and progress and leaves a
    /// pending completion notice, all in one transaction.
    pub async fn finalize_session(&self, record: &CompletedSession) -> Result<()> {
        let record = record.clone();
        self.execute(move |conn| finalize_in(conn, &record)).await
    }

    /// Finalises a timer that ran out while the process was away.
    ///
    /// Reads and clears inside the same transaction, so a second call finds
    /// nothing to do.
    pub async fn finalize_expired_timer(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Option<CompletedSession>> {
        self.execute(move |conn| {
            let raw = read_value(conn, ACTIVE_TIMER_KEY)?;
            let Some(timer) = decode::<ActiveTimerState>(ACTIVE_TIMER_KEY, raw) else {
                return Ok(None);
            };
            if !timer.is_expired(now) {
                return Ok(None);
            }

            let record = CompletedSession::new(
                timer.end_time(),
                timer.total_duration_seconds(),
                true,
                timer.breaks_taken(),
            );
            finalize_in(conn, &record)?;
            Ok(Some(record))
        })
        .await
    }

    pub async fn pending_completion(&self) -> Result<Option<CompletedSession>> {
        self.get_json(PENDING_COMPLETION_KEY).await
    }

    /// Returns the pending completion notice once, then forgets it.
    pub async fn take_pending_completion(&self) -> Result<Option<CompletedSession>> {
        self.execute(|conn| {
            let tx = conn.transaction()?;
            let raw = read_value(&tx, PENDING_COMPLETION_KEY)?;
            delete_value(&tx, PENDING_COMPLETION_KEY)?;
            tx.commit()?;
            Ok(decode(PENDING_COMPLETION_KEY, raw))
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[tokio::test]
    async fn session_start_writes_both_records() {
        let db = Database::in_memory().unwrap();
        let timer = ActiveTimerState::start(Utc::now(), 1500).unwrap();
        let progress = SessionProgressState::new("Finish report");

        db.save_session_start(&timer, &progress).await.unwrap();

        assert_eq!(db.load_active_timer().await.unwrap(), Some(timer));
        assert_eq!(db.load_progress().await.unwrap(), Some(progress));
    }

    #[tokio::test]
    async fn finalize_clears_state_and_leaves_notice() {
        let db = Database::in_memory().unwrap();
        let timer = ActiveTimerState::start(Utc::now(), 1500).unwrap();
        db.save_session_start(&timer, &SessionProgressState::new("goal"))
            .await
            .unwrap();

        let record = CompletedSession::new(Utc::now(), 300, false, 0);
        db.finalize_session(&record).await.unwrap();

        assert!(db.load_active_timer().await.unwrap().is_none());
        assert!(db.load_progress().await.unwrap().is_none());
        assert_eq!(db.list_history(None).await.unwrap(), vec![record.clone()]);
        assert_eq!(db.take_pending_completion().await.unwrap(), Some(record));
        assert_eq!(db.take_pending_completion().await.unwrap(), None);
    }

    #[tokio::test]
    async fn expired_timer_is_finalized_exactly_once() {
        let db = Database::in_memory().unwrap();
        let started = Utc::now() - Duration::hours(2);
        let mut timer = ActiveTimerState::start(started, 1500).unwrap();
        timer.record_break();
        db.save_session_start(&timer, &SessionProgressState::new("goal"))
            .await
            .unwrap();

        let now = Utc::now();
        let record = db.finalize_expired_timer(now).await.unwrap().unwrap();
        assert!(record.completed);
        assert_eq!(record.duration_seconds, 1500);
        assert_eq!(record.breaks_taken, 1);

        assert!(db.finalize_expired_timer(now).await.unwrap().is_none());
        assert_eq!(db.list_history(None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn running_timer_is_left_alone() {
        let db = Database::in_memory().unwrap();
        let timer = ActiveTimerState::start(Utc::now(), 1500).unwrap();
        db.save_active_timer(&timer).await.unwrap();

        assert!(db.finalize_expired_timer(Utc::now()).await.unwrap().is_none());
        assert_eq!(db.load_active_timer().await.unwrap(), Some(timer));
    }

    #[tokio::test]
    async fn clearing_progress_keeps_timer() {
        let db = Database::in_memory().unwrap();
        let timer = ActiveTimerState::start(Utc::now(), 60).unwrap();
        db.save_session_start(&timer, &SessionProgressState::new("goal"))
            .await
            .unwrap();

        db.clear_progress().await.unwrap();
        assert!(db.load_progress().await.unwrap().is_none());
        assert_eq!(db.load_active_timer().await.unwrap(), Some(timer));
    }
}
