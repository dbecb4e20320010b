//! Pipeline configuration and declarative document loading
//!
//! Signal maps, rule sets and harness cases are all declared in YAML or JSON
//! documents. This module picks the parser from the file extension and wraps
//! every failure as a configuration error. It also holds the runtime settings
//! of the pipeline coordinator.

use crate::types::{Error, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Supported declarative document formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Yaml,
    Json,
}

impl DocumentFormat {
    /// Pick the format from a file extension
    pub fn from_path(path: &Path) -> Result<Self> {
        let extension = path
            .extension()
            .and_then(|s| s.to_str())
            .map(|s| s.to_lowercase());

        match extension.as_deref() {
            Some("yaml") | Some("yml") => Ok(DocumentFormat::Yaml),
            Some("json") => Ok(DocumentFormat::Json),
            _ => Err(Error::UnsupportedFormat(format!(
                "{:?} (expected .yaml, .yml or .json)",
                path
            ))),
        }
    }

    /// Parse a document held in memory
    pub fn parse<T: DeserializeOwned>(self, content: &str) -> Result<T> {
        match self {
            DocumentFormat::Yaml => serde_yaml::from_str(content)
                .map_err(|e| Error::Configuration(format!("Malformed YAML: {}", e))),
            DocumentFormat::Json => serde_json::from_str(content)
                .map_err(|e| Error::Configuration(format!("Malformed JSON: {}", e))),
        }
    }
}

/// Read and parse a declarative document from disk
pub fn load_document<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let format = DocumentFormat::from_path(path)?;
    log::debug!("Reading {:?} document: {:?}", format, path);

    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Configuration(format!("Failed to read {:?}: {}", path, e))
    })?;

    format.parse(&content).map_err(|e| match e {
        Error::Configuration(msg) => Error::Configuration(format!("{:?}: {}", path, msg)),
        other => other,
    })
}

/// Runtime settings for the pipeline coordinator
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PipelineConfig {
    /// How long one dequeue waits before re-checking cancellation
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Capacity of the bounded frame queue
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Upper bound on how long `stop()` waits for the worker to exit
    #[serde(default = "default_stop_timeout")]
    pub stop_timeout_ms: u64,

    /// Signals whose changes also go to the priority channel of the state store
    #[serde(default = "default_priority_signals")]
    pub priority_signals: Vec<String>,
}

fn default_poll_interval() -> u64 {
    50
}

fn default_queue_capacity() -> usize {
    1024
}

fn default_stop_timeout() -> u64 {
    1000
}

fn default_priority_signals() -> Vec<String> {
    vec!["Vehicle_Power_Mode".to_string()]
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval(),
            queue_capacity: default_queue_capacity(),
            stop_timeout_ms: default_stop_timeout(),
            priority_signals: default_priority_signals(),
        }
    }
}

impl PipelineConfig {
    /// Create a pipeline configuration with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method: set the dequeue poll interval
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval_ms = interval.as_millis() as u64;
        self
    }

    /// Builder method: set the frame queue capacity
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Builder method: set the stop timeout
    pub fn with_stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Builder method: replace the priority signal list
    pub fn with_priority_signals<I, S>(mut self, signals: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.priority_signals = signals.into_iter().map(Into::into).collect();
        self
    }

    pub fn poll_interval(&self) -> Duration {
        // A zero interval would turn the worker into a busy loop
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Deserialize)]
    struct Doc {
        items: Vec<u32>,
    }

    #[test]
    fn test_pipeline_config_builder() {
        let config = PipelineConfig::new()
            .with_poll_interval(Duration::from_millis(20))
            .with_queue_capacity(16)
            .with_stop_timeout(Duration::from_millis(500))
            .with_priority_signals(["Power_Mode"]);

        assert_eq!(config.poll_interval(), Duration::from_millis(20));
        assert_eq!(config.queue_capacity, 16);
        assert_eq!(config.stop_timeout(), Duration::from_millis(500));
        assert_eq!(config.priority_signals, vec!["Power_Mode".to_string()]);
    }

    #[test]
    fn test_pipeline_config_defaults_from_partial_document() {
        let config: PipelineConfig = DocumentFormat::Json
            .parse(r#"{"queue_capacity": 8}"#)
            .unwrap();
        assert_eq!(config.queue_capacity, 8);
        assert_eq!(config.poll_interval_ms, 50);
        assert_eq!(config.priority_signals, vec!["Vehicle_Power_Mode".to_string()]);
    }

    #[test]
    fn test_zero_poll_interval_is_clamped() {
        let config = PipelineConfig::new().with_poll_interval(Duration::ZERO);
        assert_eq!(config.poll_interval(), Duration::from_millis(1));
    }

    #[test]
    fn test_format_from_extension() {
        assert_eq!(
            DocumentFormat::from_path(Path::new("a.yaml")).unwrap(),
            DocumentFormat::Yaml
        );
        assert_eq!(
            DocumentFormat::from_path(Path::new("a.YML")).unwrap(),
            DocumentFormat::Yaml
        );
        assert_eq!(
            DocumentFormat::from_path(Path::new("a.json")).unwrap(),
            DocumentFormat::Json
        );
        assert!(matches!(
            DocumentFormat::from_path(Path::new("a.dbc")),
            Err(Error::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_malformed_document_is_configuration_error() {
        let result: Result<Doc> = DocumentFormat::Yaml.parse("items: [1, 2");
        assert!(matches!(result, Err(Error::Configuration(_))));

        let result: Result<Doc> = DocumentFormat::Json.parse(r#"{"other": 1}"#);
        assert!(matches!(result, Err(Error::Configuration(_))));
    }

    #[test]
    fn test_load_document_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.yml");
        std::fs::write(&path, "items: [1, 2, 3]\n").unwrap();

        let doc: Doc = load_document(&path).unwrap();
        assert_eq!(doc.items, vec![1, 2, 3]);
    }

    #[test]
    fn test_missing_file_is_configuration_error() {
        let result: Result<Doc> = load_document(Path::new("/nonexistent/doc.yaml"));
        let err = result.unwrap_err();
        assert!(err.is_configuration());
    }
}
