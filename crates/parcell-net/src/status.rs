use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use parcell_core::traits::StatusSurface;
use parcell_core::types::{Load, StatusDisplay};

use crate::lock;

struct Counters {
    local: Load,
    external: Load,
    shown: StatusDisplay,
}

/// Folds local in-flight requests and a sibling manager's reported load into
/// one status display.
///
/// A local error is sticky: after [`StatusAggregator::mark_error`] the busy
/// and settle calls stop having any effect. Every [`mark_busy`] must be
/// paired with exactly one [`mark_settled`] or [`mark_error`].
///
/// [`mark_busy`]: StatusAggregator::mark_busy
/// [`mark_settled`]: StatusAggregator::mark_settled
/// [`mark_error`]: StatusAggregator::mark_error
pub struct StatusAggregator {
    counters: Mutex<Counters>,
    surface: Arc<dyn StatusSurface>,
}

impl StatusAggregator {
    /// The surface is assumed to start out showing [`StatusDisplay::Idle`].
    pub fn new(surface: Arc<dyn StatusSurface>) -> Self {
        Self {
            counters: Mutex::new(Counters {
                local: Load::Idle,
                external: Load::Idle,
                shown: StatusDisplay::Idle,
            }),
            surface,
        }
    }

    /// Record the load of a sibling manager. Negative values mean it failed.
    pub fn report_external(&self, n: i64) {
        let mut counters = lock(&self.counters);
        counters.external = Load::from_count(n);
        self.refresh(&mut counters);
    }

    /// Last reported external load as a count, `-1` for error.
    pub fn external(&self) -> i64 {
        lock(&self.counters).external.as_count()
    }

    pub fn mark_busy(&self) {
        let mut counters = lock(&self.counters);
        counters.local = match counters.local {
            Load::Error => return,
            Load::Idle => Load::Busy(1),
            Load::Busy(n) => Load::Busy(n.saturating_add(1)),
        };
        self.refresh(&mut counters);
    }

    pub fn mark_settled(&self) {
        let mut counters = lock(&self.counters);
        counters.local = match counters.local {
            Load::Error => return,
            Load::Busy(1) => Load::Idle,
            Load::Busy(n) => Load::Busy(n - 1),
            Load::Idle => {
                // Dropping below zero lands on the error sentinel.
                warn!("Request settled with nothing in flight");
                Load::Error
            }
        };
        self.refresh(&mut counters);
    }

    pub fn mark_error(&self) {
        let mut counters = lock(&self.counters);
        counters.local = Load::Error;
        self.refresh(&mut counters);
    }

    /// What the surface currently shows.
    pub fn display(&self) -> StatusDisplay {
        lock(&self.counters).shown
    }

    // Renders while the lock is held so the surface sees transitions in order.
    fn refresh(&self, counters: &mut Counters) {
        let next = counters.local.merge(counters.external);
        if next == counters.shown {
            return;
        }
        debug!(from = %counters.shown, to = %next, "Status changed");
        counters.shown = next;
        self.surface.render(&next);
    }
}
