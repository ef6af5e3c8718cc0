//! Session freshness tracking for conversation switches.

use std::fmt;

/// Freshness marker captured by async work at issue time. A completion whose
/// token no longer matches the live one belongs to an abandoned switch and
/// must be dropped unapplied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SessionToken(u64);

impl fmt::Display for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Mints tokens and answers the staleness question for every async
/// continuation in one place.
#[derive(Debug, Default)]
pub struct SessionGuard {
    current: SessionToken,
}

impl SessionGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Invalidates all outstanding work and returns the fresh token.
    pub fn mint(&mut self) -> SessionToken {
        self.current = SessionToken(self.current.0.wrapping_add(1));
        self.current
    }

    pub fn current(&self) -> SessionToken {
        self.current
    }

    pub fn is_stale(&self, token: SessionToken) -> bool {
        token != self.current
    }
}
