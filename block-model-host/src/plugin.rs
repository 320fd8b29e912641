use crate::events::{
    GenerateModel, ModelReady, PipelineNotice, ReplayGalleryModel, RestoreViewerState,
    ToolEnabled, ViewModeChanged,
};
use crate::progress::{GenerationState, GenerationStatus};
use bevy::prelude::*;
use block_model_core::gallery::ViewerSnapshot;
use block_model_core::session::{GenerationJob, Session};

/// The pipeline session. Inserted by the host app; the plugin's systems stay
/// idle until it exists.
#[derive(Resource)]
pub struct BlockModelSession(pub Session);

/// Job being stepped, plus viewer state to restore when it lands.
#[derive(Resource, Default)]
pub struct ActiveGeneration {
    job: Option<GenerationJob>,
    restore: Option<ViewerSnapshot>,
}

impl ActiveGeneration {
    pub fn is_running(&self) -> bool {
        self.job.is_some()
    }

    fn start(&mut self, job: GenerationJob, restore: Option<ViewerSnapshot>) {
        if let Some(previous) = self.job.replace(job) {
            log::info!("Generation {} superseded before completion", previous.token());
        }
        self.restore = restore;
    }
}

pub struct BlockModelPlugin;

impl Plugin for BlockModelPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<GenerationStatus>()
            .init_resource::<ActiveGeneration>()
            .add_event::<GenerateModel>()
            .add_event::<ReplayGalleryModel>()
            .add_event::<ModelReady>()
            .add_event::<RestoreViewerState>()
            .add_event::<PipelineNotice>()
            .add_event::<ViewModeChanged>()
            .add_event::<ToolEnabled>()
            .add_systems(
                Update,
                (
                    record_usage_events,
                    start_generation_requests,
                    step_active_generation,
                )
                    .chain()
                    .run_if(resource_exists::<BlockModelSession>),
            );
    }
}

fn record_usage_events(
    mut view_modes: EventReader<ViewModeChanged>,
    mut tools: EventReader<ToolEnabled>,
    mut session: ResMut<BlockModelSession>,
    mut notices: EventWriter<PipelineNotice>,
) {
    for ViewModeChanged(mode) in view_modes.read() {
        if let Some(notice) = session.0.record_view_mode(mode) {
            notices.write(PipelineNotice(notice));
        }
    }
    for ToolEnabled(tool) in tools.read() {
        if let Some(notice) = session.0.record_tool_use(tool) {
            notices.write(PipelineNotice(notice));
        }
    }
}

/// Turns requests into jobs. When several arrive in one frame the last one
/// wins.
fn start_generation_requests(
    mut requests: EventReader<GenerateModel>,
    mut replays: EventReader<ReplayGalleryModel>,
    mut session: ResMut<BlockModelSession>,
    mut active: ResMut<ActiveGeneration>,
    mut status: ResMut<GenerationStatus>,
) {
    for request in requests.read() {
        let job = session.0.begin_generation(request.params);
        begin(&mut status, &job);
        active.start(job, None);
    }

    for replay in replays.read() {
        match session.0.replay_from_gallery(replay.id) {
            Ok(started) => {
                let restore = started.viewer_state().cloned();
                begin(&mut status, &started.job);
                active.start(started.job, restore);
            }
            Err(e) => {
                log::warn!("Replay failed: {}", e);
                status.state = GenerationState::Failed(e.to_string());
            }
        }
    }
}

fn begin(status: &mut GenerationStatus, job: &GenerationJob) {
    status.frames = 0;
    status.state = GenerationState::Generating {
        token: job.token(),
        progress: job.progress(),
    };
}

/// Advances the active job by exactly one scheduler step, then commits it once
/// complete.
fn step_active_generation(
    mut session: ResMut<BlockModelSession>,
    mut active: ResMut<ActiveGeneration>,
    mut status: ResMut<GenerationStatus>,
    mut ready: EventWriter<ModelReady>,
    mut restore: EventWriter<RestoreViewerState>,
    mut notices: EventWriter<PipelineNotice>,
) {
    let Some(job) = active.job.as_mut() else {
        return;
    };

    let step = job.step();
    status.frames += 1;
    status.state = GenerationState::Generating {
        token: job.token(),
        progress: step.progress(),
    };
    if !step.is_complete() {
        return;
    }

    let Some(job) = active.job.take() else {
        return;
    };
    let token = job.token();
    let viewer_state = active.restore.take();

    match session.0.complete_generation(job) {
        Ok(outcome) => {
            log::info!(
                "Model ready after {} frames: {} blocks",
                status.frames,
                outcome.block_count
            );
            status.state = GenerationState::Ready {
                block_count: outcome.block_count,
                from_cache: outcome.from_cache,
            };
            ready.write(ModelReady {
                token,
                block_count: outcome.block_count,
                from_cache: outcome.from_cache,
            });
            for notice in outcome.notices {
                notices.write(PipelineNotice(notice));
            }
            if let Some(state) = viewer_state {
                restore.write(RestoreViewerState(state));
            }
        }
        Err(e) => {
            log::warn!("Generation {} failed: {}", token, e);
            status.state = GenerationState::Failed(e.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bevy::ecs::event::Events;
    use block_model_core::clock::ManualClock;
    use block_model_core::config::PipelineConfig;
    use block_model_core::params::{CellCounts, GridParameters, PatternId, Vec3};
    use block_model_core::{MemoryStore, SessionBuilder};
    use std::sync::Arc;

    fn params(pattern: &str) -> GridParameters {
        GridParameters::new(
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(2.0, 2.0, 2.0),
            CellCounts::new(8, 8, 8),
            PatternId::parse(pattern),
        )
        .unwrap()
    }

    fn app() -> App {
        let mut config = PipelineConfig::default();
        config.scheduler.chunk_size = 100;
        config.scheduler.sync_threshold = 0;
        config.cache.min_cells = 1;
        let session = SessionBuilder::new(MemoryStore::new())
            .config(config)
            .clock(Arc::new(ManualClock::new(1_700_000_000_000)))
            .open();

        let mut app = App::new();
        app.add_plugins(BlockModelPlugin)
            .insert_resource(BlockModelSession(session));
        app
    }

    fn count<E: Event>(app: &App) -> usize {
        let events = app.world().resource::<Events<E>>();
        events.get_cursor().read(events).count()
    }

    #[test_log::test]
    fn steps_once_per_frame() {
        let mut app = app();
        app.world_mut().send_event(GenerateModel {
            params: params("uniform"),
        });

        let mut percents = Vec::new();
        for _ in 0..5 {
            app.update();
            let status = app.world().resource::<GenerationStatus>();
            assert!(status.is_busy());
            percents.push(status.percent());
        }
        assert_eq!(percents, vec![19, 39, 58, 78, 97]);

        app.update();
        let status = app.world().resource::<GenerationStatus>();
        assert_eq!(
            status.state,
            GenerationState::Ready {
                block_count: 512,
                from_cache: false
            }
        );
        assert_eq!(status.frames, 6);
        assert_eq!(count::<ModelReady>(&app), 1);
        assert!(!app.world().resource::<ActiveGeneration>().is_running());
    }

    #[test]
    fn newer_request_replaces_running_job() {
        let mut app = app();
        app.world_mut().send_event(GenerateModel {
            params: params("uniform"),
        });
        app.update();
        app.world_mut().send_event(GenerateModel {
            params: params("layered"),
        });
        for _ in 0..6 {
            app.update();
        }

        let session = &app.world().resource::<BlockModelSession>().0;
        assert_eq!(session.stats().total_models, 1);
        assert_eq!(
            session.current().unwrap().params.pattern().as_str(),
            "layered"
        );
    }

    #[test]
    fn cache_hit_lands_in_one_frame() {
        let mut app = app();
        app.world_mut().send_event(GenerateModel {
            params: params("uniform"),
        });
        for _ in 0..6 {
            app.update();
        }
        app.world_mut().send_event(GenerateModel {
            params: params("uniform"),
        });
        app.update();
        assert_eq!(
            app.world().resource::<GenerationStatus>().state,
            GenerationState::Ready {
                block_count: 512,
                from_cache: true
            }
        );
    }

    #[test]
    fn replay_restores_viewer_state() {
        let mut app = app();
        app.world_mut().send_event(GenerateModel {
            params: params("breccia_pipe"),
        });
        for _ in 0..6 {
            app.update();
        }
        let id = {
            let mut session = app.world_mut().resource_mut::<BlockModelSession>();
            let viewer = serde_json::json!({"camera": {"distance": 120.0}});
            session.0.save_to_gallery("pipe", Some(viewer)).unwrap().model.id
        };

        app.world_mut().send_event(ReplayGalleryModel { id });
        for _ in 0..6 {
            app.update();
        }
        assert_eq!(count::<RestoreViewerState>(&app), 1);
    }

    #[test]
    fn unknown_replay_reports_failure() {
        let mut app = app();
        app.world_mut().send_event(ReplayGalleryModel {
            id: uuid::Uuid::new_v4(),
        });
        app.update();
        assert!(matches!(
            app.world().resource::<GenerationStatus>().state,
            GenerationState::Failed(_)
        ));
    }

    #[test]
    fn usage_events_reach_statistics() {
        let mut app = app();
        app.world_mut()
            .send_event(ViewModeChanged("wireframe".to_string()));
        app.world_mut().send_event(ToolEnabled("slice".to_string()));
        app.update();

        let stats = app.world().resource::<BlockModelSession>().0.stats();
        assert!(stats.view_modes.contains("wireframe"));
        assert!(stats.tools_used.contains("slice"));
    }

    #[test]
    fn idle_without_session() {
        let mut app = App::new();
        app.add_plugins(BlockModelPlugin);
        app.world_mut().send_event(GenerateModel {
            params: params("uniform"),
        });
        app.update();
        assert_eq!(
            app.world().resource::<GenerationStatus>().state,
            GenerationState::Idle
        );
    }
}
