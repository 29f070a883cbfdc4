//! authflow — sign-up/verification core and session-gated navigation root.

pub mod config;
pub mod error;
pub mod identity;
pub mod inflight;
pub mod onboarding;
pub mod router;
pub mod session;
pub mod social;
