use bevy::prelude::*;
use block_model_core::error::Notice;
use block_model_core::gallery::ViewerSnapshot;
use block_model_core::params::GridParameters;
use uuid::Uuid;

/// Request a new model. Supersedes any generation still running.
#[derive(Event, Debug, Clone)]
pub struct GenerateModel {
    pub params: GridParameters,
}

/// Regenerate a saved gallery model with its stored seed.
#[derive(Event, Debug, Clone)]
pub struct ReplayGalleryModel {
    pub id: Uuid,
}

#[derive(Event, Debug, Clone, PartialEq)]
pub struct ModelReady {
    pub token: u64,
    pub block_count: usize,
    pub from_cache: bool,
}

/// Emitted after a replayed model is ready, carrying the viewer state saved
/// with it.
#[derive(Event, Debug, Clone)]
pub struct RestoreViewerState(pub ViewerSnapshot);

#[derive(Event, Debug, Clone)]
pub struct PipelineNotice(pub Notice);

#[derive(Event, Debug, Clone)]
pub struct ViewModeChanged(pub String);

#[derive(Event, Debug, Clone)]
pub struct ToolEnabled(pub String);
