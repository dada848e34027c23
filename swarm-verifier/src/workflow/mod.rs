//! Verification workflow: per-prediction orchestration plus the worker pool
//! that drives it

pub mod orchestrator;
pub mod scheduler;

pub use orchestrator::{Orchestrator, PassOutcome, PipelineSettings};
pub use scheduler::{backoff_delay, Scheduler, SchedulerConfig, StopPredicate, WorkerStats};
