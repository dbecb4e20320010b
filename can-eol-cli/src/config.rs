//! Bench configuration loading

use anyhow::{Context, Result};
use can_eol_core::PipelineConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Bench configuration (loaded from bench.toml)
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct BenchConfig {
    #[serde(default)]
    pub input: InputConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct InputConfig {
    /// Signal map document (YAML or JSON)
    pub signals: Option<PathBuf>,
    /// Validation rule document (YAML or JSON)
    pub rules: Option<PathBuf>,
    /// Recorded candump trace
    pub trace: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct OutputConfig {
    /// Where to write the JSON test summary
    pub json: Option<PathBuf>,
}

impl BenchConfig {
    /// Resolve relative input/output paths against the config file's directory
    pub fn resolve_paths(&mut self, base: &Path) {
        for path in [
            &mut self.input.signals,
            &mut self.input.rules,
            &mut self.input.trace,
            &mut self.output.json,
        ]
        .into_iter()
        .flatten()
        {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        }
    }
}

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<BenchConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let mut config: BenchConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    if let Some(base) = path.parent() {
        config.resolve_paths(base);
    }

    Ok(config)
}
