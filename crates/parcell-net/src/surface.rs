use std::sync::Arc;

use tracing::info;

use parcell_core::traits::StatusSurface;
use parcell_core::types::StatusDisplay;

/// Logs every status transition.
pub struct LogSurface;

impl StatusSurface for LogSurface {
    fn render(&self, shown: &StatusDisplay) {
        info!(status = %shown, "Request status");
    }
}

/// Renders to several surfaces in order.
#[derive(Default)]
pub struct FanoutSurface {
    surfaces: Vec<Arc<dyn StatusSurface>>,
}

impl FanoutSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, surface: Arc<dyn StatusSurface>) -> Self {
        self.surfaces.push(surface);
        self
    }

    pub fn len(&self) -> usize {
        self.surfaces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.surfaces.is_empty()
    }
}

impl StatusSurface for FanoutSurface {
    fn render(&self, shown: &StatusDisplay) {
        for surface in &self.surfaces {
            surface.render(shown);
        }
    }
}
