pub mod delta;
pub mod state;

pub use delta::{combine_evidence, compute_delta};
pub use state::SessionProgressState;
