//! Block-model generation, caching, persistence and export pipeline.
//!
//! Hosts open a [`session::Session`] over a [`storage::KeyValueStore`] and
//! drive generations one scheduler step at a time.
pub mod block;
pub mod cache;
pub mod clock;
pub mod config;
pub mod error;
pub mod export;
pub mod gallery;
pub mod grid;
pub mod params;
pub mod pattern;
pub mod scheduler;
pub mod session;
pub mod stats;
pub mod storage;

pub use block::{Block, CellIndex, Material};
pub use config::PipelineConfig;
pub use error::{ExportError, GenerationError, Notice, StorageError, ValidationError};
pub use params::{CellCounts, GridParameters, PatternId, Vec3};
pub use session::{GenerationJob, Session, SessionBuilder};
pub use storage::{FileStore, KeyValueStore, MemoryStore};
