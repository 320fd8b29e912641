//! Bevy host for the block-model pipeline: drives one generation step per
//! frame and exposes progress as a resource.
pub mod events;
pub mod plugin;
pub mod progress;

pub use events::{
    GenerateModel, ModelReady, PipelineNotice, ReplayGalleryModel, RestoreViewerState,
    ToolEnabled, ViewModeChanged,
};
pub use plugin::{ActiveGeneration, BlockModelPlugin, BlockModelSession};
pub use progress::{GenerationState, GenerationStatus};
