//! View scopes for discarding late responses
//!
//! A view (modal, dashboard tab, CLI command) owns a [`ViewScope`]. Each
//! request it starts takes a [`ScopeTicket`]; when the response arrives the
//! ticket decides whether the result may still be applied. Unmounting or
//! re-scoping the view makes every outstanding ticket stale.

use crate::error::EngineError;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// Lifetime token of a view
#[derive(Debug, Clone)]
pub struct ViewScope {
    generation: Arc<AtomicU64>,
    mounted: Arc<AtomicBool>,
}

impl ViewScope {
    /// New mounted scope
    #[must_use]
    pub fn new() -> Self {
        Self {
            generation: Arc::new(AtomicU64::new(0)),
            mounted: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Ticket for a request started now
    #[must_use]
    pub fn ticket(&self) -> ScopeTicket {
        ScopeTicket {
            generation: self.generation.load(Ordering::Acquire),
            scope: self.clone(),
        }
    }

    /// Invalidate outstanding tickets (the view now shows something else)
    pub fn reset(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
    }

    /// Tear the view down; every ticket becomes stale
    pub fn unmount(&self) {
        self.mounted.store(false, Ordering::Release);
        self.reset();
    }

    /// Whether the view is still mounted
    #[inline]
    #[must_use]
    pub fn is_mounted(&self) -> bool {
        self.mounted.load(Ordering::Acquire)
    }
}

impl Default for ViewScope {
    fn default() -> Self {
        Self::new()
    }
}

/// Permission to apply one response
#[derive(Debug, Clone)]
pub struct ScopeTicket {
    generation: u64,
    scope: ViewScope,
}

impl ScopeTicket {
    /// Whether the issuing view is mounted and has not been re-scoped
    #[must_use]
    pub fn is_current(&self) -> bool {
        self.scope.is_mounted() && self.scope.generation.load(Ordering::Acquire) == self.generation
    }

    /// Pass `value` through if still current
    ///
    /// # Errors
    /// `EngineError::Stale` when the view was torn down or re-scoped
    pub fn accept<T>(&self, value: T) -> Result<T, EngineError> {
        if self.is_current() {
            Ok(value)
        } else {
            tracing::debug!(generation = self.generation, "discarding late response");
            Err(EngineError::Stale)
        }
    }
}
