//! Output equality used when reconciling recomputed items.

use std::fmt;
use std::sync::Arc;

/// Decides whether a recomputed item equals its previous version.
///
/// Equal items are tagged [`Cached`](crate::DiffState::Cached) and the
/// previous value is kept, so downstream nodes skip their work. The default
/// comparer uses `PartialEq`; [`with_comparer`](crate::PipelineBuilder::with_comparer)
/// installs a custom one.
pub struct Comparer<T>(Arc<dyn Fn(&T, &T) -> bool + Send + Sync>);

impl<T> Comparer<T> {
    /// Wraps an equality function.
    pub fn new(eq: impl Fn(&T, &T) -> bool + Send + Sync + 'static) -> Self {
        Self(Arc::new(eq))
    }

    /// Returns `true` if `previous` and `current` count as equal.
    pub fn equals(&self, previous: &T, current: &T) -> bool {
        (self.0)(previous, current)
    }
}

impl<T: PartialEq + 'static> Default for Comparer<T> {
    fn default() -> Self {
        Self::new(|a: &T, b: &T| a == b)
    }
}

impl<T> Clone for Comparer<T> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<T> fmt::Debug for Comparer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Comparer")
    }
}
