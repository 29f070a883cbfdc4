//! Session-gated navigation root.
//!
//! A pure function of the session-presence signal: no auth logic lives
//! here. The router decides which navigation subtree is reachable and
//! flags the imperative redirect when a session becomes active mid-flow.

use serde::Serialize;
use tokio::sync::watch;

use crate::session::SessionSignal;

/// Which navigation subtree is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteState {
    /// Session status unknown; render only a neutral progress indicator.
    Loading,
    /// Only the onboarding subtree is reachable.
    Unauthenticated,
    /// The main application subtree; onboarding is unreachable.
    Authenticated,
}

impl RouteState {
    /// Derive the route from the session-presence signal.
    pub fn from_signal(signal: SessionSignal) -> Self {
        if !signal.is_loaded {
            Self::Loading
        } else if signal.is_active {
            Self::Authenticated
        } else {
            Self::Unauthenticated
        }
    }

    /// Whether the onboarding subtree is reachable in this state.
    pub fn onboarding_reachable(&self) -> bool {
        matches!(self, Self::Unauthenticated)
    }
}

impl std::fmt::Display for RouteState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Loading => "loading",
            Self::Unauthenticated => "unauthenticated",
            Self::Authenticated => "authenticated",
        };
        write!(f, "{s}")
    }
}

/// A route transition observed by the navigation host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteChange {
    pub state: RouteState,
    /// True when the host must imperatively navigate to the main
    /// application root, because the user may be mid-onboarding when the
    /// session becomes active and the subtree swap alone is not enough.
    pub redirect_to_root: bool,
}

/// Observes the session-presence signal and yields route changes.
pub struct Router {
    rx: watch::Receiver<SessionSignal>,
    last: RouteState,
}

impl Router {
    pub fn new(rx: watch::Receiver<SessionSignal>) -> Self {
        let last = RouteState::from_signal(*rx.borrow());
        Self { rx, last }
    }

    /// The route for the signal as of now.
    pub fn current(&self) -> RouteState {
        RouteState::from_signal(*self.rx.borrow())
    }

    /// Wait for the next route change. Returns `None` once the gate is
    /// gone. Signal updates that do not change the route are absorbed.
    pub async fn next_change(&mut self) -> Option<RouteChange> {
        loop {
            self.rx.changed().await.ok()?;
            let state = RouteState::from_signal(*self.rx.borrow());
            if state == self.last {
                continue;
            }
            let redirect_to_root =
                state == RouteState::Authenticated && self.last != RouteState::Authenticated;
            self.last = state;
            if redirect_to_root {
                tracing::info!(route = %state, "Redirecting to main application root");
            }
            return Some(RouteChange {
                state,
                redirect_to_root,
            });
        }
    }
}
