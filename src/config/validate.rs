// src/config/validate.rs

use globset::Glob;

use crate::config::model::Config;
use crate::errors::{Result, TaskdagError};

/// Check a merged configuration before a session is built.
///
/// Anything wrong here maps to the `ConfigurationFailed` exit code.
pub fn validate(cfg: &Config) -> Result<()> {
    validate_workers(cfg)?;
    validate_patterns(cfg)?;
    validate_limits(cfg)?;
    Ok(())
}

fn validate_workers(cfg: &Config) -> Result<()> {
    if cfg.workers == 0 {
        return Err(TaskdagError::Configuration(
            "workers must be >= 1 (got 0)".to_string(),
        ));
    }
    Ok(())
}

fn validate_patterns(cfg: &Config) -> Result<()> {
    for (label, pattern) in [
        ("task_file_pattern", &cfg.task_file_pattern),
        ("task_function_pattern", &cfg.task_function_pattern),
    ] {
        Glob::new(pattern).map_err(|e| {
            TaskdagError::Configuration(format!("invalid {label} '{pattern}': {e}"))
        })?;
    }

    for glob in &cfg.ignore_globs {
        Glob::new(glob).map_err(|e| {
            TaskdagError::Configuration(format!("invalid ignore glob '{glob}': {e}"))
        })?;
    }
    Ok(())
}

fn validate_limits(cfg: &Config) -> Result<()> {
    if cfg.max_failures == Some(0) {
        return Err(TaskdagError::Configuration(
            "max_failures must be >= 1 when set".to_string(),
        ));
    }
    if cfg.small_file_threshold == 0 {
        return Err(TaskdagError::Configuration(
            "small_file_threshold must be >= 1 byte".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(validate(&Config::default()).is_ok());
    }

    #[test]
    fn zero_workers_is_rejected() {
        let cfg = Config {
            workers: 0,
            ..Config::default()
        };
        assert!(matches!(
            validate(&cfg),
            Err(TaskdagError::Configuration(_))
        ));
    }

    #[test]
    fn broken_glob_is_rejected() {
        let cfg = Config {
            ignore_globs: vec!["[".to_string()],
            ..Config::default()
        };
        assert!(validate(&cfg).is_err());
    }

    #[test]
    fn zero_max_failures_is_rejected() {
        let cfg = Config {
            max_failures: Some(0),
            ..Config::default()
        };
        assert!(validate(&cfg).is_err());
    }
}
