pub mod client;
pub mod models;

pub use client::{HttpVerifier, ProgressVerifier};
pub use models::{VerificationRequest, VerificationResponse};
