//! Events published by the render control.

use serde::{Deserialize, Serialize};

use crate::metrics::RenderStats;
use crate::target::RendererId;

/// Events sent from the render thread.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RenderEvent {
    /// Render thread owns a context and is ticking.
    LoopStarted,

    /// A renderer finished setup.
    RendererReady { id: RendererId },

    /// A renderer failed setup and will be retried.
    SetupFailed {
        id: RendererId,

        /// Error message.
        message: String,
    },

    /// A renderer released its GPU resources.
    RendererReleased { id: RendererId },

    /// The GPU context could not be created; the loop exited.
    ContextFailed {
        /// Error message.
        message: String,
    },

    /// The render thread exited.
    LoopStopped {
        /// Final counters.
        stats: RenderStats,
    },
}
