use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::backend::BackendKind;
use crate::sandbox::validate_file_name;

pub(crate) const CONFIG_FILE: &str = "codebox.toml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub sandbox: SandboxConfig,
    #[serde(default)]
    pub artifacts: ArtifactConfig,
    #[serde(default)]
    pub trusted: TrustedConfig,
}

/// Backend selection, fixed for the lifetime of the process.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// "isolated" (Docker) or "trusted-process" (direct host execution)
    #[serde(default)]
    pub backend: BackendKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SandboxConfig {
    /// Docker image with the Python interpreter
    #[serde(default = "default_image")]
    pub image: String,

    /// Directory inside the container for the script and its output files
    #[serde(default = "default_working_dir")]
    pub working_dir: String,

    /// File name the code is written to
    #[serde(default = "default_script_name")]
    pub script_name: String,

    /// Interpreter command, split like a shell would
    #[serde(default = "default_interpreter")]
    pub interpreter: String,

    /// Command that keeps the container alive until it is removed
    #[serde(default = "default_placeholder_command")]
    pub placeholder_command: String,

    /// Maximum run time of one script
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Resource limits
    #[serde(default)]
    pub resources: ResourceConfig,

    /// Network configuration
    #[serde(default)]
    pub network: NetworkConfig,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            image: default_image(),
            working_dir: default_working_dir(),
            script_name: default_script_name(),
            interpreter: default_interpreter(),
            placeholder_command: default_placeholder_command(),
            timeout_secs: default_timeout_secs(),
            resources: ResourceConfig::default(),
            network: NetworkConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceConfig {
    /// Memory limit (e.g., "2g", "512m")
    #[serde(default = "default_memory")]
    pub memory: String,

    /// CPU limit (e.g., "1", "0.5")
    #[serde(default = "default_cpus")]
    pub cpus: String,
}

impl Default for ResourceConfig {
    fn default() -> Self {
        Self {
            memory: default_memory(),
            cpus: default_cpus(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NetworkPolicy {
    AllowAll,
    #[default]
    Deny,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkConfig {
    #[serde(default)]
    pub policy: NetworkPolicy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactConfig {
    /// File extensions treated as artifacts
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,

    /// Host directory extracted artifacts are written to
    #[serde(default = "default_output_dir")]
    pub output_dir: String,
}

impl Default for ArtifactConfig {
    fn default() -> Self {
        Self {
            extensions: default_extensions(),
            output_dir: default_output_dir(),
        }
    }
}

/// Settings for running code directly on the host. No isolation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrustedConfig {
    /// Command the script path is appended to
    #[serde(default = "default_trusted_command")]
    pub command: String,

    /// Parent directory for per-run scratch directories (system temp if unset)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scratch_dir: Option<String>,
}

impl Default for TrustedConfig {
    fn default() -> Self {
        Self {
            command: default_trusted_command(),
            scratch_dir: None,
        }
    }
}

// Default value functions
fn default_image() -> String {
    "python:3.11".to_string()
}

fn default_working_dir() -> String {
    "/tmp".to_string()
}

fn default_script_name() -> String {
    "script.py".to_string()
}

fn default_interpreter() -> String {
    "python".to_string()
}

fn default_placeholder_command() -> String {
    "sleep infinity".to_string()
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_memory() -> String {
    "2g".to_string()
}

fn default_cpus() -> String {
    "1".to_string()
}

fn default_extensions() -> Vec<String> {
    vec!["png".to_string()]
}

fn default_output_dir() -> String {
    ".".to_string()
}

fn default_trusted_command() -> String {
    "uv run --no-project python".to_string()
}

impl Config {
    /// Load configuration from `codebox.toml` in `project_dir`, using defaults if not found
    pub fn load(project_dir: &Path) -> Result<Self> {
        let config_path = project_dir.join(CONFIG_FILE);

        if !config_path.exists() {
            return Ok(Self::default());
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from an explicit file, which must exist
    pub fn load_from(config_path: &Path) -> Result<Self> {
        let content = fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;

        config
            .validate()
            .with_context(|| format!("Invalid config file: {}", config_path.display()))?;

        Ok(config)
    }

    /// Load from `--config` if given, otherwise from the current directory
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        match explicit {
            Some(path) => Self::load_from(path),
            None => {
                let cwd = std::env::current_dir().context("Failed to get current directory")?;
                Self::load(&cwd)
            }
        }
    }

    /// Checks values serde cannot check on its own
    pub fn validate(&self) -> Result<()> {
        let sandbox = &self.sandbox;

        if sandbox.timeout_secs == 0 {
            anyhow::bail!("sandbox.timeout_secs must be greater than zero");
        }
        validate_file_name(&sandbox.script_name).context("sandbox.script_name")?;
        if !sandbox.working_dir.starts_with('/') {
            anyhow::bail!(
                "sandbox.working_dir must be an absolute container path, got {:?}",
                sandbox.working_dir
            );
        }

        split_command(&sandbox.interpreter).context("sandbox.interpreter")?;
        split_command(&sandbox.placeholder_command).context("sandbox.placeholder_command")?;
        split_command(&self.trusted.command).context("trusted.command")?;
        parse_memory_limit(&sandbox.resources.memory).context("sandbox.resources.memory")?;
        parse_cpus(&sandbox.resources.cpus).context("sandbox.resources.cpus")?;

        Ok(())
    }
}

/// Split a command string into program and arguments
pub(crate) fn split_command(command: &str) -> Result<Vec<String>> {
    let parts = shell_words::split(command)
        .with_context(|| format!("Invalid command: {command:?}"))?;
    if parts.is_empty() {
        anyhow::bail!("Command must not be empty");
    }
    Ok(parts)
}

/// Parse memory limit string (e.g., "8g", "512m") to bytes
pub(crate) fn parse_memory_limit(limit: &str) -> Result<i64> {
    let limit = limit.trim().to_lowercase();

    let (num, unit) = if let Some(num) = limit.strip_suffix('g') {
        (num, 1024 * 1024 * 1024)
    } else if let Some(num) = limit.strip_suffix('m') {
        (num, 1024 * 1024)
    } else {
        (limit.as_str(), 1)
    };

    let value: i64 = num.parse().context("Invalid memory limit")?;
    if value <= 0 {
        anyhow::bail!("Memory limit must be positive");
    }
    value
        .checked_mul(unit)
        .context("Memory limit too large")
}

/// Parse a CPU count (e.g., "1", "0.5") into Docker nano-CPUs
pub(crate) fn parse_cpus(cpus: &str) -> Result<i64> {
    let cpus: f64 = cpus.trim().parse().context("Invalid CPU limit")?;
    if !(cpus.is_finite() && cpus > 0.0) {
        anyhow::bail!("CPU limit must be positive");
    }
    // Bounded by the check above and any realistic core count.
    #[allow(clippy::cast_possible_truncation)]
    Ok((cpus * 1_000_000_000.0) as i64)
}

/// Expand ~ to home directory
pub(crate) fn expand_path(path: &str) -> Result<PathBuf> {
    if let Some(rest) = path.strip_prefix("~/") {
        let home = dirs::home_dir().context("Could not determine home directory")?;
        Ok(home.join(rest))
    } else {
        Ok(PathBuf::from(path))
    }
}

/// Expand ~ and resolve relative paths against the current directory
pub(crate) fn resolve_host_dir(path: &str) -> Result<PathBuf> {
    let expanded = expand_path(path)?;
    if expanded.is_absolute() {
        return Ok(expanded);
    }
    let cwd = std::env::current_dir().context("Failed to get current directory")?;
    let joined = cwd.join(expanded);
    // Strip "." components so paths read cleanly in tool output.
    Ok(joined.components().collect())
}
