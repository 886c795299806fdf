//! Generation stamps for discarding stale asynchronous responses.
//!
//! Every request is stamped with the generation active when it was issued.
//! Anything that invalidates outstanding work (new filters, a new keystroke,
//! teardown) advances the counter; a response is applied only if its stamp
//! is still current.

/// Opaque, monotonically increasing stamp.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Generation(u64);

impl Generation {
    pub fn value(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for Generation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "g{}", self.0)
    }
}

#[derive(Debug, Default)]
pub struct GenerationCounter {
    current: Generation,
}

impl GenerationCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Generation {
        self.current
    }

    /// Invalidate every stamp issued so far and return the new one.
    pub fn advance(&mut self) -> Generation {
        self.current = Generation(self.current.0 + 1);
        self.current
    }

    pub fn is_current(&self, stamp: Generation) -> bool {
        stamp == self.current
    }
}
