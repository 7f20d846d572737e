pub mod clock;
pub mod controller;
pub mod events;
pub mod state;

pub use clock::{Clock, ManualClock, SystemClock};
pub use controller::{ControllerConfig, ResumeOutcome, SessionController, VerificationOutcome};
pub use events::SessionEvent;
pub use state::{ActiveTimerState, BreakCountdown, SessionMachine, SessionPhase, SessionSnapshot};
