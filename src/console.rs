//! Line-oriented command surface for the headless binary.

use anyhow::Result;
use thiserror::Error;
use tokio::{
    io::{self, AsyncBufReadExt, BufReader},
    sync::broadcast::error::RecvError,
};

use crate::{
    models::CompletedSession,
    reward::format_break_duration,
    timer::{SessionController, SessionEvent, SessionSnapshot},
};

const HELP: &str = "commands: status | start <minutes> <goal...> | break | submit <note...> | back | end-break | end | history | quit";
const HISTORY_LIMIT: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Status,
    Start { minutes: u64, goal: String },
    Break,
    Submit { note: String },
    Back,
    EndBreak,
    End,
    History,
    Help,
    Quit,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("unknown command `{0}`")]
    Unknown(String),
    #[error("usage: {0}")]
    Usage(&'static str),
    #[error("`{0}` is not a whole number of minutes")]
    InvalidMinutes(String),
}

/// Parses one input line. Blank lines yield `Ok(None)`.
pub fn parse_command(line: &str) -> Result<Option<Command>, ParseError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };

    let command = match word.to_ascii_lowercase().as_str() {
        "status" => Command::Status,
        "start" => {
            let (minutes, goal) = rest
                .split_once(char::is_whitespace)
                .ok_or(ParseError::Usage("start <minutes> <goal...>"))?;
            let minutes = minutes
                .parse::<u64>()
                .map_err(|_| ParseError::InvalidMinutes(minutes.to_string()))?;
            Command::Start {
                minutes,
                goal: goal.trim().to_string(),
            }
        }
        "break" => Command::Break,
        "submit" => Command::Submit {
            note: rest.to_string(),
        },
        "back" => Command::Back,
        "end-break" => Command::EndBreak,
        "end" => Command::End,
        "history" => Command::History,
        "help" | "?" => Command::Help,
        "quit" | "exit" => Command::Quit,
        other => return Err(ParseError::Unknown(other.to_string())),
    };

    Ok(Some(command))
}

pub fn describe(snapshot: &SessionSnapshot) -> String {
    let mut line = format!(
        "{} | {} left",
        snapshot.phase.as_str(),
        clock_label(snapshot.remaining_seconds)
    );
    if let Some(goal) = &snapshot.session_goal {
        line.push_str(&format!(" | goal: {goal}"));
    }
    if let Some(break_left) = snapshot.break_remaining_seconds {
        line.push_str(&format!(" | break: {} left", clock_label(break_left)));
    }
    if snapshot.main_timer_paused {
        line.push_str(" | paused");
    }
    line
}

fn clock_label(seconds: u64) -> String {
    format!("{}:{:02}", seconds / 60, seconds % 60)
}

/// One-line notice for a finished session.
pub fn completion_message(session: &CompletedSession) -> String {
    if session.completed {
        format!(
            "Session complete: {} focused, {} breaks",
            session.duration_label(),
            session.breaks_taken
        )
    } else {
        format!(
            "Session ended early after {}, {} breaks",
            session.duration_label(),
            session.breaks_taken
        )
    }
}

/// Prints the pending completion notice, if any, and clears it.
async fn show_pending_completion(controller: &SessionController) {
    match controller.take_pending_completion().await {
        Ok(Some(session)) => println!("{}", completion_message(&session)),
        Ok(None) => {}
        Err(err) => log::warn!("Could not read completion notice: {err}"),
    }
}

/// Reads commands from stdin until `quit` or end of input.
///
/// Sessions that finish on their own are announced as they happen, so the
/// notice is not repeated on the next launch.
pub async fn run_console(controller: SessionController) -> Result<()> {
    let mut lines = BufReader::new(io::stdin()).lines();
    let mut events = controller.subscribe();
    println!("{HELP}");

    loop {
        let line = tokio::select! {
            line = lines.next_line() => match line? {
                Some(line) => line,
                None => break,
            },
            event = events.recv() => {
                match event {
                    Ok(SessionEvent::SessionFinished { .. }) | Err(RecvError::Lagged(_)) => {
                        show_pending_completion(&controller).await
                    }
                    Ok(_) => {}
                    Err(RecvError::Closed) => break,
                }
                continue;
            }
        };

        let command = match parse_command(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(err) => {
                println!("{err}");
                continue;
            }
        };

        if command == Command::Quit {
            break;
        }

        match execute(&controller, command).await {
            Ok(output) => println!("{output}"),
            Err(err) => println!("error: {err:#}"),
        }
    }

    Ok(())
}

async fn execute(controller: &SessionController, command: Command) -> Result<String> {
    let output = match command {
        Command::Status => describe(&controller.snapshot().await),
        Command::Start { minutes, goal } => {
            controller.prepare_session().await?;
            let seconds = minutes.saturating_mul(60);
            describe(&controller.start_session(&goal, seconds).await?)
        }
        Command::Break => {
            controller.request_break().await?;
            "describe what you got done: submit <note...>  (or `back`)".to_string()
        }
        Command::Submit { note } => {
            let outcome = controller.submit_evidence(&note, "").await?;
            let verdict = if outcome.break_granted() {
                format!(
                    "break granted: {}",
                    format_break_duration(outcome.break_seconds)
                )
            } else {
                "no break this time, keep going".to_string()
            };
            format!(
                "score {:.2} | {} | {}",
                outcome.response.score, verdict, outcome.response.reason
            )
        }
        Command::Back => describe(&controller.cancel_review().await?),
        Command::EndBreak => describe(&controller.end_break().await?),
        Command::End => {
            let record = controller.end_session().await?;
            // Already on screen; don't announce it again later.
            controller.take_pending_completion().await?;
            completion_message(&record)
        }
        Command::History => {
            let stats = controller.history_stats().await?;
            let mut output = format!(
                "{} sessions, {}% completed",
                stats.total_sessions,
                stats.success_rate()
            );
            for session in controller.history(Some(HISTORY_LIMIT)).await? {
                output.push_str(&format!(
                    "\n{}  {:>7}  {}  {} breaks",
                    session.date.format("%Y-%m-%d %H:%M"),
                    session.duration_label(),
                    if session.completed { "completed" } else { "ended early" },
                    session.breaks_taken
                ));
            }
            output
        }
        Command::Help => HELP.to_string(),
        Command::Quit => String::new(),
    };
    Ok(output)
}
