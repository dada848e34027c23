//! Reasoning stages
//!
//! Each stage turns pipeline state into one [`ReasoningRequest`], sends it
//! through the shared [`ReasoningService`] and parses the content into a typed
//! result. Stages never touch the store; the orchestrator persists their output.

pub mod filter;
pub mod maturity;
pub mod timeframe;
pub mod verdict;

pub use filter::{FilterValidation, FilterValidator};
pub use maturity::{check_maturity, Maturity};
pub use timeframe::{Precision, TimeframeExtraction, TimeframeExtractor, TimeframeStatus};
pub use verdict::{VerdictGenerator, VerdictResult};

use std::sync::Arc;

use serde::Serialize;

use crate::reasoning::ReasoningService;

/// Model and system prompt for one stage
#[derive(Debug, Clone, PartialEq)]
pub struct StageConfig {
    pub model: String,
    pub system_prompt: String,
}

impl StageConfig {
    pub fn new(model: impl Into<String>, system_prompt: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            system_prompt: system_prompt.into(),
        }
    }
}

/// All three stages, sharing one reasoning service
#[derive(Clone)]
pub struct ReasoningStages {
    pub timeframe: TimeframeExtractor,
    pub filter: FilterValidator,
    pub verdict: VerdictGenerator,
}

impl ReasoningStages {
    pub fn new(
        service: Arc<dyn ReasoningService>,
        timeframe: StageConfig,
        filter: StageConfig,
        verdict: StageConfig,
    ) -> Self {
        Self {
            timeframe: TimeframeExtractor::new(Arc::clone(&service), timeframe),
            filter: FilterValidator::new(Arc::clone(&service), filter),
            verdict: VerdictGenerator::new(service, verdict),
        }
    }
}

/// Parsed timeframe bounds as sent to the filter and verdict stages
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeframeBounds {
    pub start_utc: Option<String>,
    pub end_utc: Option<String>,
    pub precision: Precision,
}

impl From<&TimeframeExtraction> for TimeframeBounds {
    fn from(extraction: &TimeframeExtraction) -> Self {
        Self {
            start_utc: extraction.start_utc.as_ref().map(swarm_common::time::to_iso),
            end_utc: extraction.end_utc.as_ref().map(swarm_common::time::to_iso),
            precision: extraction.precision,
        }
    }
}
