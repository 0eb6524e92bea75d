//! Subprocess-based execution of the heimdex-media-pipelines Python CLI
//! (doctor, speech, faces, scenes) with structured result parsing and
//! artifact validation.

pub mod doctor;
pub mod runner;
pub mod types;

pub use doctor::CachedDoctor;
pub use runner::{
    validate_output, validate_scene_output, PipelineError, PipelineExecutor, RunnerConfig,
    ScenesRequest, SubprocessRunner,
};
pub use types::{Capabilities, DoctorReport, PipelineOutput, RunResult, SceneBoundary, SceneOutput};
