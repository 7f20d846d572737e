use anyhow::{Context, Result};
use rusqlite::{params, Connection, Row};

use crate::{
    db::{
        helpers::{parse_datetime, to_i64, to_u32, to_u64},
        Database,
    },
    models::{CompletedSession, HistoryStats},
};

fn row_to_session(row: &Row) -> Result<CompletedSession> {
    let date: String = row.get("date")?;
    let duration_secs: i64 = row.get("duration_secs")?;
    let completed: i64 = row.get("completed")?;
    let breaks_taken: i64 = row.get("breaks_taken")?;

    Ok(CompletedSession {
        id: row.get("id")?,
        date: parse_datetime(&date, "date")?,
        duration_seconds: to_u64(duration_secs, "duration_secs")?,
        completed: completed != 0,
        breaks_taken: to_u32(breaks_taken, "breaks_taken")?,
    })
}

pub(crate) fn insert_session(conn: &Connection, session: &CompletedSession) -> Result<()> {
    conn.execute(
        "INSERT INTO session_history (id, date, duration_secs, completed, breaks_taken)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            session.id,
            session.date.to_rfc3339(),
            to_i64(session.duration_seconds)?,
            session.completed as i64,
            session.breaks_taken as i64,
        ],
    )
    .with_context(|| "failed to insert completed session")?;
    Ok(())
}

impl Database {
    pub async fn append_session(&self, session: &CompletedSession) -> Result<()> {
        let record = session.clone();
        self.execute(move |conn| insert_session(conn, &record)).await
    }

    /// Most recent first.
    pub async fn list_history(&self, limit: Option<usize>) -> Result<Vec<CompletedSession>> {
        let limit = limit.map(|value| value as i64).unwrap_or(-1);
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, date, duration_secs, completed, breaks_taken
                 FROM session_history
                 ORDER BY seq DESC
                 LIMIT ?1",
            )?;

            let mut rows = stmt.query(params![limit])?;
            let mut sessions = Vec::new();
            while let Some(row) = rows.next()? {
                sessions.push(row_to_session(row)?);
            }
            Ok(sessions)
        })
        .await
    }

    pub async fn history_stats(&self) -> Result<HistoryStats> {
        self.execute(|conn| {
            let (total, completed): (i64, i64) = conn.query_row(
                "SELECT COUNT(*), COALESCE(SUM(completed), 0) FROM session_history",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?;
            Ok(HistoryStats {
                total_sessions: to_u64(total, "total_sessions")?,
                completed_sessions: to_u64(completed, "completed_sessions")?,
            })
        })
        .await
    }
}
