//! Lifecycle of a registered render target.

use serde::{Deserialize, Serialize};

/// Where a render target is in its GPU lifecycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RenderState {
    /// Registered; `setup` has not succeeded yet.
    #[default]
    Idle,

    /// Set up and drawn every tick.
    Ready,

    /// Removal requested; `release` runs on the next tick.
    Releasing,

    /// Released and about to leave the table.
    Dead,
}

impl RenderState {
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }

    pub fn is_releasing(&self) -> bool {
        matches!(self, Self::Releasing)
    }

    pub fn is_dead(&self) -> bool {
        matches!(self, Self::Dead)
    }

    /// Whether the target may hold GPU resources.
    pub fn holds_gpu(&self) -> bool {
        matches!(self, Self::Ready | Self::Releasing)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Ready => "ready",
            Self::Releasing => "releasing",
            Self::Dead => "dead",
        }
    }
}
