/// Job assembly per engine
pub mod jobs;
/// Multi-worker task scheduling with status events
pub mod scheduler;
/// Session orchestration from spectra to merged hits
pub mod session;
/// Stage model for external process pipelines
pub mod stage;
