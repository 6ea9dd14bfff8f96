//! Navigation seam shared by the store and the route guards.

/// Options for a navigation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NavigateOptions {
    /// Replace the current history entry instead of pushing a new one.
    pub replace: bool,
}

impl NavigateOptions {
    /// Options for a history-replacing navigation.
    #[must_use]
    pub fn replace() -> Self {
        Self { replace: true }
    }
}

/// Router abstraction.
pub trait Navigator: Send + Sync {
    /// Navigates to `path`.
    fn navigate(&self, path: &str, options: NavigateOptions);
}
