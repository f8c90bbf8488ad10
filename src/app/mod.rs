pub mod dispatch;
pub mod pipeline;
pub mod scratch;
pub mod watch;

pub use pipeline::{
    Pipeline, PipelineSettings, RemediationRequest, RunSummary, build_router,
};
pub use scratch::{ScratchDir, bare_name};
pub use watch::watch;
