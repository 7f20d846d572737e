pub mod session;

pub use session::{CompletedSession, HistoryStats};
