//! Verifier configuration
//!
//! `swarm-verifier.toml` plus environment plus CLI, resolved through
//! [`swarm_common::config`]: CLI > environment > TOML > compiled default.
//!
//! ```toml
//! database_url = "postgres://swarm@localhost/swarm"
//! concurrency = 3
//!
//! [openrouter]
//! api_key = "sk-or-..."
//! request_timeout_secs = 180
//!
//! [prompts]
//! timeframe = "/etc/swarm/prompts/timeframe.md"
//! filter_validation = "/etc/swarm/prompts/filter_validation.md"
//! verdict = "/etc/swarm/prompts/verdict.md"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use swarm_common::config::{resolve_optional, resolve_setting, LoggingConfig};
use swarm_common::{Error, Result};

use crate::reasoning::openrouter::DEFAULT_BASE_URL;
use crate::services::duplicate_detector::{DedupThresholds, DEFAULT_DUPLICATE_THRESHOLD};
use crate::stages::maturity::DEFAULT_MATURITY_BUFFER_HOURS;
use crate::stages::StageConfig;
use crate::workflow::orchestrator::{PipelineSettings, DEFAULT_GRACE_PERIOD_SECS};
use crate::workflow::scheduler::{
    SchedulerConfig, DEFAULT_BACKOFF_BASE_SECS, DEFAULT_BACKOFF_MAX_SECS, DEFAULT_CONCURRENCY,
    DEFAULT_IDLE_SECS,
};

pub const CONFIG_FILE_NAME: &str = "swarm-verifier.toml";
pub const CONFIG_ENV_VAR: &str = "SWARM_VERIFIER_CONFIG";

pub const DATABASE_URL_ENV: &str = "DATABASE_URL";
pub const CONCURRENCY_ENV: &str = "SWARM_VERIFIER_CONCURRENCY";
pub const API_KEY_ENV: &str = "OPENROUTER_API_KEY";
pub const BASE_URL_ENV: &str = "OPENROUTER_BASE_URL";

pub const DEFAULT_TIMEFRAME_MODEL: &str = "google/gemini-2.5-flash";
pub const DEFAULT_FILTER_MODEL: &str = "google/gemini-2.5-flash";
pub const DEFAULT_VERDICT_MODEL: &str = "x-ai/grok-4-fast";
pub const DEFAULT_TEMPERATURE: f64 = 0.1;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 180;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenRouterToml {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub temperature: Option<f64>,
    pub request_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelsToml {
    pub timeframe: Option<String>,
    pub filter_validation: Option<String>,
    pub verdict: Option<String>,
}

/// System prompt files; prompt content lives outside this repository
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptsToml {
    pub timeframe: Option<PathBuf>,
    pub filter_validation: Option<PathBuf>,
    pub verdict: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DedupToml {
    pub target_threshold: Option<f64>,
    pub timeframe_threshold: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerToml {
    pub idle_secs: Option<u64>,
    pub backoff_base_secs: Option<u64>,
    pub backoff_max_secs: Option<u64>,
    pub grace_period_secs: Option<u64>,
    pub maturity_buffer_hours: Option<i64>,
}

/// On-disk shape of `swarm-verifier.toml`; every field optional
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerifierToml {
    pub database_url: Option<String>,
    pub concurrency: Option<usize>,
    pub openrouter: OpenRouterToml,
    pub models: ModelsToml,
    pub prompts: PromptsToml,
    pub dedup: DedupToml,
    pub scheduler: SchedulerToml,
    pub logging: LoggingConfig,
}

/// Values given on the command line
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CliOverrides {
    pub database_url: Option<String>,
    pub concurrency: Option<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StageModels {
    pub timeframe: String,
    pub filter_validation: String,
    pub verdict: String,
}

/// Fully resolved settings
#[derive(Debug, Clone, PartialEq)]
pub struct VerifierConfig {
    pub database_url: String,
    pub openrouter_api_key: Option<String>,
    pub openrouter_base_url: String,
    pub temperature: f64,
    pub request_timeout: Duration,
    pub models: StageModels,
    pub prompts: PromptsToml,
    pub scheduler: SchedulerConfig,
    pub pipeline: PipelineSettings,
    pub log_level: String,
}

impl VerifierConfig {
    pub fn resolve(toml: VerifierToml, cli: CliOverrides) -> Result<Self> {
        let database_url = resolve_optional(cli.database_url, DATABASE_URL_ENV, toml.database_url)?
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| {
                Error::Config(format!(
                    "Database URL not configured (--database-url, {} or database_url in {})",
                    DATABASE_URL_ENV, CONFIG_FILE_NAME
                ))
            })?;

        let concurrency = resolve_setting(
            cli.concurrency,
            CONCURRENCY_ENV,
            toml.concurrency,
            DEFAULT_CONCURRENCY,
        )?;
        if concurrency == 0 {
            return Err(Error::Config("concurrency must be at least 1".to_string()));
        }

        let openrouter_api_key = resolve_optional(None, API_KEY_ENV, toml.openrouter.api_key)?
            .filter(|key| !key.trim().is_empty());
        let openrouter_base_url = resolve_setting(
            None,
            BASE_URL_ENV,
            toml.openrouter.base_url,
            DEFAULT_BASE_URL.to_string(),
        )?;

        let thresholds = DedupThresholds {
            target: toml.dedup.target_threshold.unwrap_or(DEFAULT_DUPLICATE_THRESHOLD),
            timeframe: toml
                .dedup
                .timeframe_threshold
                .unwrap_or(DEFAULT_DUPLICATE_THRESHOLD),
        };
        for (name, value) in [("target", thresholds.target), ("timeframe", thresholds.timeframe)] {
            if !(0.0..=1.0).contains(&value) {
                return Err(Error::Config(format!(
                    "dedup.{}_threshold must be within 0.0..=1.0, got {}",
                    name, value
                )));
            }
        }

        let sched = &toml.scheduler;
        let scheduler = SchedulerConfig {
            concurrency,
            idle_interval: Duration::from_secs(sched.idle_secs.unwrap_or(DEFAULT_IDLE_SECS)),
            backoff_base: Duration::from_secs(
                sched.backoff_base_secs.unwrap_or(DEFAULT_BACKOFF_BASE_SECS),
            ),
            backoff_max: Duration::from_secs(
                sched.backoff_max_secs.unwrap_or(DEFAULT_BACKOFF_MAX_SECS),
            ),
        };

        let grace_secs = sched.grace_period_secs.unwrap_or(DEFAULT_GRACE_PERIOD_SECS);
        let grace_period = i64::try_from(grace_secs)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .ok_or_else(|| {
                Error::Config(format!(
                    "scheduler.grace_period_secs out of range: {}",
                    grace_secs
                ))
            })?;

        let buffer_hours = sched
            .maturity_buffer_hours
            .unwrap_or(DEFAULT_MATURITY_BUFFER_HOURS);
        let maturity_buffer = Some(buffer_hours)
            .filter(|hours| *hours >= 0)
            .and_then(chrono::Duration::try_hours)
            .ok_or_else(|| {
                Error::Config(format!(
                    "scheduler.maturity_buffer_hours out of range: {}",
                    buffer_hours
                ))
            })?;

        let pipeline = PipelineSettings {
            grace_period,
            maturity_buffer,
            thresholds,
        };

        Ok(Self {
            database_url,
            openrouter_api_key,
            openrouter_base_url,
            temperature: toml.openrouter.temperature.unwrap_or(DEFAULT_TEMPERATURE),
            request_timeout: Duration::from_secs(
                toml.openrouter
                    .request_timeout_secs
                    .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
            ),
            models: StageModels {
                timeframe: toml
                    .models
                    .timeframe
                    .unwrap_or_else(|| DEFAULT_TIMEFRAME_MODEL.to_string()),
                filter_validation: toml
                    .models
                    .filter_validation
                    .unwrap_or_else(|| DEFAULT_FILTER_MODEL.to_string()),
                verdict: toml
                    .models
                    .verdict
                    .unwrap_or_else(|| DEFAULT_VERDICT_MODEL.to_string()),
            },
            prompts: toml.prompts,
            scheduler,
            pipeline,
            log_level: toml.logging.level,
        })
    }

    /// API key, required before any worker starts
    pub fn require_api_key(&self) -> Result<&str> {
        self.openrouter_api_key.as_deref().ok_or_else(|| {
            Error::Config(format!(
                "OpenRouter API key not configured ({} or openrouter.api_key)",
                API_KEY_ENV
            ))
        })
    }

    /// Read the three system prompts and pair them with their models
    pub fn stage_configs(&self) -> Result<(StageConfig, StageConfig, StageConfig)> {
        let timeframe = read_prompt("timeframe", self.prompts.timeframe.as_deref())?;
        let filter = read_prompt("filter_validation", self.prompts.filter_validation.as_deref())?;
        let verdict = read_prompt("verdict", self.prompts.verdict.as_deref())?;

        Ok((
            StageConfig::new(&self.models.timeframe, timeframe),
            StageConfig::new(&self.models.filter_validation, filter),
            StageConfig::new(&self.models.verdict, verdict),
        ))
    }
}

fn read_prompt(name: &str, path: Option<&Path>) -> Result<String> {
    let path = path.ok_or_else(|| {
        Error::Config(format!("prompts.{} not configured in {}", name, CONFIG_FILE_NAME))
    })?;
    let prompt = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Read {} prompt {} failed: {}", name, path.display(), e))
    })?;
    if prompt.trim().is_empty() {
        return Err(Error::Config(format!("{} prompt {} is empty", name, path.display())));
    }
    Ok(prompt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;
    use tempfile::TempDir;

    fn clear_env() {
        for var in [DATABASE_URL_ENV, CONCURRENCY_ENV, API_KEY_ENV, BASE_URL_ENV] {
            env::remove_var(var);
        }
    }

    fn minimal_toml() -> VerifierToml {
        VerifierToml {
            database_url: Some("postgres://localhost/swarm".to_string()),
            ..Default::default()
        }
    }

    #[test]
    #[serial]
    fn test_defaults_applied() {
        clear_env();
        let config = VerifierConfig::resolve(minimal_toml(), CliOverrides::default()).unwrap();

        assert_eq!(config.scheduler, SchedulerConfig::default());
        assert_eq!(config.pipeline, PipelineSettings::default());
        assert_eq!(config.openrouter_base_url, DEFAULT_BASE_URL);
        assert_eq!(config.request_timeout, Duration::from_secs(180));
        assert_eq!(config.models.verdict, DEFAULT_VERDICT_MODEL);
        assert_eq!(config.log_level, "info");
        assert!(config.openrouter_api_key.is_none());
        assert!(config.require_api_key().is_err());
    }

    #[test]
    #[serial]
    fn test_missing_database_url_is_config_error() {
        clear_env();
        let err = VerifierConfig::resolve(VerifierToml::default(), CliOverrides::default())
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    #[serial]
    fn test_cli_beats_env_beats_toml() {
        clear_env();
        let mut toml = minimal_toml();
        toml.concurrency = Some(2);

        env::set_var(CONCURRENCY_ENV, "5");
        env::set_var(DATABASE_URL_ENV, "postgres://env/swarm");
        let from_env = VerifierConfig::resolve(toml.clone(), CliOverrides::default()).unwrap();
        assert_eq!(from_env.scheduler.concurrency, 5);
        assert_eq!(from_env.database_url, "postgres://env/swarm");

        let from_cli = VerifierConfig::resolve(
            toml.clone(),
            CliOverrides {
                database_url: Some("postgres://cli/swarm".to_string()),
                concurrency: Some(7),
            },
        )
        .unwrap();
        assert_eq!(from_cli.scheduler.concurrency, 7);
        assert_eq!(from_cli.database_url, "postgres://cli/swarm");

        clear_env();
        let from_toml = VerifierConfig::resolve(toml, CliOverrides::default()).unwrap();
        assert_eq!(from_toml.scheduler.concurrency, 2);
    }

    #[test]
    #[serial]
    fn test_zero_concurrency_rejected() {
        clear_env();
        let result = VerifierConfig::resolve(
            minimal_toml(),
            CliOverrides {
                concurrency: Some(0),
                ..Default::default()
            },
        );
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    #[serial]
    fn test_threshold_out_of_range_rejected() {
        clear_env();
        let mut toml = minimal_toml();
        toml.dedup.target_threshold = Some(1.5);
        assert!(VerifierConfig::resolve(toml, CliOverrides::default()).is_err());
    }

    #[test]
    #[serial]
    fn test_out_of_range_durations_rejected() {
        clear_env();

        let mut toml = minimal_toml();
        toml.scheduler.grace_period_secs = Some(u64::MAX);
        let result = VerifierConfig::resolve(toml, CliOverrides::default());
        assert!(matches!(result, Err(Error::Config(_))));

        let mut toml = minimal_toml();
        toml.scheduler.maturity_buffer_hours = Some(i64::MAX);
        let result = VerifierConfig::resolve(toml, CliOverrides::default());
        assert!(matches!(result, Err(Error::Config(_))));

        let mut toml = minimal_toml();
        toml.scheduler.maturity_buffer_hours = Some(-1);
        let result = VerifierConfig::resolve(toml, CliOverrides::default());
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    #[serial]
    fn test_parse_full_toml() {
        clear_env();
        let toml: VerifierToml = toml::from_str(
            r#"
            database_url = "postgres://file/swarm"
            concurrency = 4

            [openrouter]
            api_key = "sk-test"
            request_timeout_secs = 30

            [models]
            verdict = "custom/model"

            [dedup]
            target_threshold = 0.9

            [scheduler]
            idle_secs = 5
            grace_period_secs = 60
            maturity_buffer_hours = 48

            [logging]
            level = "debug"
            "#,
        )
        .unwrap();

        let config = VerifierConfig::resolve(toml, CliOverrides::default()).unwrap();
        assert_eq!(config.scheduler.concurrency, 4);
        assert_eq!(config.scheduler.idle_interval, Duration::from_secs(5));
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert_eq!(config.require_api_key().unwrap(), "sk-test");
        assert_eq!(config.models.verdict, "custom/model");
        assert_eq!(config.models.timeframe, DEFAULT_TIMEFRAME_MODEL);
        assert_eq!(config.pipeline.thresholds.target, 0.9);
        assert_eq!(
            config.pipeline.thresholds.timeframe,
            DEFAULT_DUPLICATE_THRESHOLD
        );
        assert_eq!(config.pipeline.grace_period, chrono::Duration::seconds(60));
        assert_eq!(config.pipeline.maturity_buffer, chrono::Duration::hours(48));
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    #[serial]
    fn test_stage_configs_read_prompt_files() {
        clear_env();
        let dir = TempDir::new().unwrap();
        let mut toml = minimal_toml();
        for (name, slot) in [
            ("timeframe.md", &mut toml.prompts.timeframe),
            ("filter.md", &mut toml.prompts.filter_validation),
            ("verdict.md", &mut toml.prompts.verdict),
        ] {
            let path = dir.path().join(name);
            std::fs::write(&path, format!("prompt from {}", name)).unwrap();
            *slot = Some(path);
        }

        let config = VerifierConfig::resolve(toml, CliOverrides::default()).unwrap();
        let (timeframe, filter, verdict) = config.stage_configs().unwrap();
        assert_eq!(timeframe.system_prompt, "prompt from timeframe.md");
        assert_eq!(filter.system_prompt, "prompt from filter.md");
        assert_eq!(filter.model, DEFAULT_FILTER_MODEL);
        assert_eq!(verdict.model, DEFAULT_VERDICT_MODEL);
    }

    #[test]
    #[serial]
    fn test_missing_prompt_is_config_error() {
        clear_env();
        let dir = TempDir::new().unwrap();
        let mut toml = minimal_toml();
        toml.prompts.timeframe = Some(dir.path().join("absent.md"));

        let config = VerifierConfig::resolve(toml, CliOverrides::default()).unwrap();
        assert!(matches!(config.stage_configs(), Err(Error::Config(_))));
    }
}
