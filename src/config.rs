use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub archive: ArchiveConfig,
    #[serde(default)]
    pub db: DbConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub fuzzy: FuzzyConfig,
    #[serde(default)]
    pub workspace: WorkspaceConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ArchiveConfig {
    #[serde(default = "default_archive_path")]
    pub path: PathBuf,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            path: default_archive_path(),
            batch_size: default_batch_size(),
        }
    }
}

fn default_archive_path() -> PathBuf {
    PathBuf::from("./archive")
}
fn default_batch_size() -> usize {
    50
}

/// Storage location. Without a `path` the index lives in memory.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct DbConfig {
    #[serde(default)]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_limit")]
    pub default_limit: i64,
    #[serde(default = "default_max_limit")]
    pub max_limit: i64,
    #[serde(default = "default_snapshot_message_cap")]
    pub snapshot_message_cap: i64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            default_limit: default_limit(),
            max_limit: default_max_limit(),
            snapshot_message_cap: default_snapshot_message_cap(),
        }
    }
}

fn default_limit() -> i64 {
    10
}
fn default_max_limit() -> i64 {
    100
}
fn default_snapshot_message_cap() -> i64 {
    10_000
}

/// Match thresholds for the fuzzy snapshot (0 = exact only, 1 = anything).
#[derive(Debug, Deserialize, Clone)]
pub struct FuzzyConfig {
    #[serde(default = "default_conversation_threshold")]
    pub conversation_threshold: f64,
    #[serde(default = "default_message_threshold")]
    pub message_threshold: f64,
    #[serde(default = "default_command_threshold")]
    pub command_threshold: f64,
}

impl Default for FuzzyConfig {
    fn default() -> Self {
        Self {
            conversation_threshold: default_conversation_threshold(),
            message_threshold: default_message_threshold(),
            command_threshold: default_command_threshold(),
        }
    }
}

fn default_conversation_threshold() -> f64 {
    0.4
}
fn default_message_threshold() -> f64 {
    0.6
}
fn default_command_threshold() -> f64 {
    0.3
}

#[derive(Debug, Deserialize, Clone)]
pub struct WorkspaceConfig {
    #[serde(default)]
    pub projects_root: Option<PathBuf>,
    #[serde(default = "default_file_types")]
    pub file_types: Vec<String>,
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: u64,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            projects_root: None,
            file_types: default_file_types(),
            max_file_bytes: default_max_file_bytes(),
        }
    }
}

fn default_file_types() -> Vec<String> {
    ["rs", "ts", "tsx", "js", "py", "go", "md", "json", "toml", "yaml"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}
fn default_max_file_bytes() -> u64 {
    1024 * 1024
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            tool_timeout_secs: default_tool_timeout_secs(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7331".to_string()
}
fn default_tool_timeout_secs() -> u64 {
    120
}

impl Config {
    /// Configuration with every section at its default. Used when no
    /// config file exists.
    pub fn minimal() -> Self {
        Self {
            archive: ArchiveConfig::default(),
            db: DbConfig::default(),
            retrieval: RetrievalConfig::default(),
            fuzzy: FuzzyConfig::default(),
            workspace: WorkspaceConfig::default(),
            server: ServerConfig::default(),
        }
    }

    /// Clamps a caller-supplied limit into `[1, max_limit]`, falling back to
    /// the default limit.
    pub fn effective_limit(&self, requested: Option<i64>) -> i64 {
        requested
            .unwrap_or(self.retrieval.default_limit)
            .clamp(1, self.retrieval.max_limit)
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

/// Loads `path` when it exists, otherwise returns [`Config::minimal`].
pub fn load_or_default(path: &Path) -> Result<Config> {
    if path.exists() {
        load_config(path)
    } else {
        Ok(Config::minimal())
    }
}

fn validate(config: &Config) -> Result<()> {
    if config.archive.batch_size == 0 {
        anyhow::bail!("archive.batch_size must be > 0");
    }

    if config.retrieval.default_limit < 1 {
        anyhow::bail!("retrieval.default_limit must be >= 1");
    }
    if config.retrieval.max_limit < config.retrieval.default_limit {
        anyhow::bail!("retrieval.max_limit must be >= retrieval.default_limit");
    }
    if config.retrieval.snapshot_message_cap < 1 {
        anyhow::bail!("retrieval.snapshot_message_cap must be >= 1");
    }

    for (name, value) in [
        ("fuzzy.conversation_threshold", config.fuzzy.conversation_threshold),
        ("fuzzy.message_threshold", config.fuzzy.message_threshold),
        ("fuzzy.command_threshold", config.fuzzy.command_threshold),
    ] {
        if !(0.0..=1.0).contains(&value) {
            anyhow::bail!("{} must be in [0.0, 1.0]", name);
        }
    }

    if config.workspace.file_types.is_empty() {
        anyhow::bail!("workspace.file_types must not be empty");
    }

    Ok(())
}
