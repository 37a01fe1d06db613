//! Agent configuration from environment variables.
//!
//! | Variable                       | Default            |
//! |--------------------------------|--------------------|
//! | `STAGING_DIR`                  | `printed_jobs`     |
//! | `LOG_DIR`                      | `logs`             |
//! | `MAX_CONCURRENT_JOBS`          | 4                  |
//! | `JOB_TIMEOUT_SECS`             | 1800               |
//! | `RENDER_DPI`                   | 300                |
//! | `SOFFICE_PATH`                 | `soffice`          |
//! | `MAX_ENGINE_SESSIONS`          | 2                  |
//! | `SUMATRA_PATH`                 | standard locations |
//! | `FIRESTORE_PROJECT_ID`         | required           |
//! | `FIRESTORE_ACCESS_TOKEN`       | required           |
//! | `FIRESTORE_POLL_INTERVAL_SECS` | 2                  |
//! | `JOBS_COLLECTION`              | `print_jobs`       |
//! | `DRIVE_ACCESS_TOKEN`           | required           |
//! | `DRIVE_API_BASE`               | Google Drive v3    |

use std::path::PathBuf;
use std::str::FromStr;

use crate::convert::EngineConfig;
use crate::pipeline::WorkerPoolConfig;
use crate::printing::PrinterConfig;
use crate::queue::FirestoreConfig;
use crate::retriever::DriveConfig;
use crate::{Error, Result};

/// Everything the agent needs to start.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub staging_dir: PathBuf,
    pub log_dir: PathBuf,
    pub render_dpi: u32,
    pub workers: WorkerPoolConfig,
    pub engine: EngineConfig,
    pub printer: PrinterConfig,
    pub firestore: FirestoreConfig,
    pub drive: DriveConfig,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            staging_dir: PathBuf::from("printed_jobs"),
            log_dir: PathBuf::from("logs"),
            render_dpi: 300,
            workers: WorkerPoolConfig::default(),
            engine: EngineConfig::default(),
            printer: PrinterConfig::default(),
            firestore: FirestoreConfig::default(),
            drive: DriveConfig::default(),
        }
    }
}

impl AgentConfig {
    /// Load from the process environment, falling back to defaults.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let mut config = Self::default();

        if let Some(dir) = get("STAGING_DIR") {
            config.staging_dir = PathBuf::from(dir);
        }
        if let Some(dir) = get("LOG_DIR") {
            config.log_dir = PathBuf::from(dir);
        }
        if let Some(dpi) = parse(&get, "RENDER_DPI")? {
            config.render_dpi = dpi;
        }

        if let Some(max) = parse(&get, "MAX_CONCURRENT_JOBS")? {
            config.workers.max_workers = max;
        }
        if let Some(secs) = parse(&get, "JOB_TIMEOUT_SECS")? {
            config.workers.job_timeout_secs = secs;
        }

        if let Some(path) = get("SOFFICE_PATH") {
            config.engine.soffice_path = path;
        }
        if let Some(max) = parse(&get, "MAX_ENGINE_SESSIONS")? {
            config.engine.max_sessions = max;
        }

        config.printer.sumatra_path = get("SUMATRA_PATH").map(PathBuf::from);

        if let Some(project) = get("FIRESTORE_PROJECT_ID") {
            config.firestore.project_id = project;
        }
        if let Some(token) = get("FIRESTORE_ACCESS_TOKEN") {
            config.firestore.access_token = token;
        }
        if let Some(secs) = parse(&get, "FIRESTORE_POLL_INTERVAL_SECS")? {
            config.firestore.poll_interval_secs = secs;
        }
        if let Some(collection) = get("JOBS_COLLECTION") {
            config.firestore.collection = collection;
        }

        if let Some(token) = get("DRIVE_ACCESS_TOKEN") {
            config.drive.access_token = token;
        }
        if let Some(base) = get("DRIVE_API_BASE") {
            config.drive.api_base = base;
        }

        Ok(config)
    }

    /// Check the settings needed to talk to the remote services.
    pub fn validate(&self) -> Result<()> {
        let required = [
            ("FIRESTORE_PROJECT_ID", &self.firestore.project_id),
            ("FIRESTORE_ACCESS_TOKEN", &self.firestore.access_token),
            ("DRIVE_ACCESS_TOKEN", &self.drive.access_token),
        ];
        if let Some((key, _)) = required.iter().find(|(_, value)| value.is_empty()) {
            return Err(Error::config(format!("{} is not set", key)));
        }
        if self.render_dpi == 0 {
            return Err(Error::config("RENDER_DPI must be greater than zero"));
        }
        if self.workers.job_timeout_secs == 0 {
            return Err(Error::config("JOB_TIMEOUT_SECS must be greater than zero"));
        }
        Ok(())
    }
}

fn parse<T: FromStr>(get: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    get(key)
        .map(|raw| {
            raw.parse::<T>()
                .map_err(|e| Error::config(format!("{} has invalid value '{}': {}", key, raw, e)))
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(pairs: &[(&str, &str)]) -> Result<AgentConfig> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AgentConfig::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[]).unwrap();
        assert_eq!(config.staging_dir, PathBuf::from("printed_jobs"));
        assert_eq!(config.render_dpi, 300);
        assert_eq!(config.workers.max_workers, 4);
        assert_eq!(config.workers.job_timeout_secs, 1800);
        assert_eq!(config.engine.max_sessions, 2);
        assert_eq!(config.firestore.collection, "print_jobs");
        assert_eq!(config.firestore.poll_interval_secs, 2);
        assert!(config.printer.sumatra_path.is_none());
    }

    #[test]
    fn test_overrides() {
        let config = load(&[
            ("STAGING_DIR", "/tmp/stage"),
            ("MAX_CONCURRENT_JOBS", "8"),
            ("JOB_TIMEOUT_SECS", "60"),
            ("SUMATRA_PATH", "C:\\Tools\\SumatraPDF.exe"),
            ("JOBS_COLLECTION", "jobs_test"),
            ("DRIVE_API_BASE", "http://localhost:9000/drive/v3"),
            ("RENDER_DPI", "  "),
        ])
        .unwrap();

        assert_eq!(config.staging_dir, PathBuf::from("/tmp/stage"));
        assert_eq!(config.workers.max_workers, 8);
        assert_eq!(config.workers.job_timeout_secs, 60);
        assert_eq!(
            config.printer.sumatra_path,
            Some(PathBuf::from("C:\\Tools\\SumatraPDF.exe"))
        );
        assert_eq!(config.firestore.collection, "jobs_test");
        assert_eq!(config.drive.api_base, "http://localhost:9000/drive/v3");
        assert_eq!(config.render_dpi, 300, "blank values fall back to defaults");
    }

    #[test]
    fn test_bad_number_names_the_key() {
        let err = load(&[("MAX_CONCURRENT_JOBS", "many")]).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
        assert!(err.to_string().contains("MAX_CONCURRENT_JOBS"));
    }

    #[test]
    fn test_validate_requires_credentials() {
        let err = load(&[("FIRESTORE_PROJECT_ID", "demo")])
            .unwrap()
            .validate()
            .unwrap_err();
        assert!(err.to_string().contains("FIRESTORE_ACCESS_TOKEN"));

        load(&[
            ("FIRESTORE_PROJECT_ID", "demo"),
            ("FIRESTORE_ACCESS_TOKEN", "t1"),
            ("DRIVE_ACCESS_TOKEN", "t2"),
        ])
        .unwrap()
        .validate()
        .unwrap();
    }
}
