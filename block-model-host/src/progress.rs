use bevy::prelude::*;
use block_model_core::scheduler::Progress;

#[derive(Debug, Clone, Default, PartialEq)]
pub enum GenerationState {
    #[default]
    Idle,
    Generating {
        token: u64,
        progress: Progress,
    },
    Ready {
        block_count: usize,
        from_cache: bool,
    },
    Failed(String),
}

/// Latest generation progress, for loading indicators.
#[derive(Resource, Debug, Default)]
pub struct GenerationStatus {
    pub state: GenerationState,
    /// Frames spent stepping the current job.
    pub frames: u32,
}

impl GenerationStatus {
    pub fn percent(&self) -> u8 {
        match &self.state {
            GenerationState::Generating { progress, .. } => progress.percent,
            GenerationState::Ready { .. } => 100,
            GenerationState::Idle | GenerationState::Failed(_) => 0,
        }
    }

    pub fn is_busy(&self) -> bool {
        matches!(self.state, GenerationState::Generating { .. })
    }
}
