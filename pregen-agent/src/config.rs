//! Configuration management for the pre-generation agent.
//!
//! Loads configuration from TOML file with environment variable overrides
//! (`PREGEN__SECTION__KEY`, e.g. `PREGEN__PREGEN__COUNTDOWN_TIME=10`).

use crate::storage::SLOT_INFO_FILE;
use crate::utils::{PregenError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub pregen: PregenConfig,
    #[serde(default)]
    pub keywords: KeywordsConfig,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Program used to launch the managed server
    #[serde(default = "default_command")]
    pub command: String,

    /// Arguments passed to the server program
    #[serde(default = "default_args")]
    pub args: Vec<String>,

    /// Server working directory, also the root of the live world files
    #[serde(default = "default_server_path")]
    pub path: PathBuf,

    /// Console command that stops the server
    #[serde(default = "default_stop_command")]
    pub stop_command: String,

    /// Console command used to announce messages, `{message}` is substituted
    #[serde(default = "default_broadcast_format")]
    pub broadcast_format: String,

    /// Seconds to wait for a clean exit on agent shutdown before signalling
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,

    /// Start the server as soon as the agent starts
    #[serde(default = "default_true")]
    pub autostart: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Archive root holding one directory per slot
    #[serde(default = "default_backup_path")]
    pub backup_path: PathBuf,

    /// Name of the safety-copy folder created under the server path during a load
    #[serde(default = "default_temp_folder")]
    pub restore_temp_folder: String,

    /// World folders archived and restored, relative to the server path
    #[serde(default = "default_world_names")]
    pub world_names: Vec<String>,

    /// File name patterns skipped while archiving (`*suffix`, `prefix*` or exact)
    #[serde(default = "default_ignored_files")]
    pub ignored_files: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PregenConfig {
    /// Seconds counted down before the server is stopped
    #[serde(default = "default_countdown")]
    pub countdown_time: u32,

    /// Command that makes the server regenerate its world and stop,
    /// empty to use the plain stop command
    #[serde(default = "default_regen_command")]
    pub regen_command: String,

    /// Dimensions that must report generation finished before a round completes
    #[serde(default = "default_wait_dimensions")]
    pub wait_dimensions: Vec<String>,

    /// Upper bound on slots in the archive, used ones included
    #[serde(default = "default_max_slots")]
    pub max_slots: usize,

    /// Slots generated by `gen` when no count is given
    #[serde(default = "default_slots")]
    pub default_slots: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeywordsConfig {
    /// Server log templates announcing a finished dimension, tried in order
    #[serde(default = "default_generation_finished")]
    pub generation_finished: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Echo the managed server's console output through the agent log
    #[serde(default = "default_true")]
    pub server_output: bool,
}

// Default values
fn default_command() -> String {
    "java".to_string()
}

fn default_args() -> Vec<String> {
    ["-Xms1G", "-Xmx2G", "-jar", "server.jar", "nogui"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_server_path() -> PathBuf {
    PathBuf::from("./server")
}

fn default_stop_command() -> String {
    "stop".to_string()
}

fn default_broadcast_format() -> String {
    "say {message}".to_string()
}

fn default_shutdown_timeout() -> u64 {
    30
}

fn default_true() -> bool {
    true
}

fn default_backup_path() -> PathBuf {
    PathBuf::from("./pre-generated")
}

fn default_temp_folder() -> String {
    "temp".to_string()
}

fn default_world_names() -> Vec<String> {
    vec!["world".to_string()]
}

fn default_ignored_files() -> Vec<String> {
    vec!["session.lock".to_string()]
}

fn default_countdown() -> u32 {
    5
}

fn default_regen_command() -> String {
    "uhc regen".to_string()
}

fn default_wait_dimensions() -> Vec<String> {
    vec!["overworld".to_string(), "the_nether".to_string()]
}

fn default_max_slots() -> usize {
    10
}

fn default_slots() -> u32 {
    4
}

fn default_generation_finished() -> Vec<String> {
    vec!["Pre-generating of {dimension} finished, took {time}min".to_string()]
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            command: default_command(),
            args: default_args(),
            path: default_server_path(),
            stop_command: default_stop_command(),
            broadcast_format: default_broadcast_format(),
            shutdown_timeout_secs: default_shutdown_timeout(),
            autostart: default_true(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backup_path: default_backup_path(),
            restore_temp_folder: default_temp_folder(),
            world_names: default_world_names(),
            ignored_files: default_ignored_files(),
        }
    }
}

impl Default for PregenConfig {
    fn default() -> Self {
        Self {
            countdown_time: default_countdown(),
            regen_command: default_regen_command(),
            wait_dimensions: default_wait_dimensions(),
            max_slots: default_max_slots(),
            default_slots: default_slots(),
        }
    }
}

impl PregenConfig {
    /// The custom stop command, if one is configured
    pub fn regen_command(&self) -> Option<&str> {
        Some(self.regen_command.trim()).filter(|c| !c.is_empty())
    }
}

impl Default for KeywordsConfig {
    fn default() -> Self {
        Self {
            generation_finished: default_generation_finished(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            server_output: true,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig::default(),
            storage: StorageConfig::default(),
            pregen: PregenConfig::default(),
            keywords: KeywordsConfig::default(),
            log: LogConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file, then apply `PREGEN__*` environment overrides
    pub fn load(path: &Path) -> Result<Self> {
        let config: Config = config::Config::builder()
            .add_source(config::File::from(path).format(config::FileFormat::Toml))
            .add_source(
                config::Environment::with_prefix("PREGEN")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("storage.world_names")
                    .with_list_parse_key("storage.ignored_files")
                    .with_list_parse_key("pregen.wait_dimensions"),
            )
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| PregenError::Config(format!("{}: {}", path.display(), e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Render this configuration as a TOML document
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| PregenError::Config(e.to_string()))
    }

    /// Reject configurations the sessions cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.storage.world_names.is_empty() {
            return Err(PregenError::Config("storage.world_names must not be empty".into()));
        }
        if self.pregen.wait_dimensions.is_empty() {
            return Err(PregenError::Config("pregen.wait_dimensions must not be empty".into()));
        }
        if self.pregen.default_slots == 0 {
            return Err(PregenError::Config("pregen.default_slots must be at least 1".into()));
        }

        let temp = &self.storage.restore_temp_folder;
        if temp.is_empty() || temp == SLOT_INFO_FILE || self.storage.world_names.contains(temp) {
            return Err(PregenError::Config(format!(
                "storage.restore_temp_folder \"{}\" clashes with a world name or the slot info file",
                temp
            )));
        }
        if self.storage.world_names.iter().any(|w| w == SLOT_INFO_FILE) {
            return Err(PregenError::Config(format!(
                "\"{}\" is reserved and cannot be a world name",
                SLOT_INFO_FILE
            )));
        }

        if let Some(template) = self
            .keywords
            .generation_finished
            .iter()
            .find(|t| !t.contains("{dimension}"))
        {
            return Err(PregenError::Config(format!(
                "generation_finished template \"{}\" has no {{dimension}} field",
                template
            )));
        }

        Ok(())
    }

    /// Path of the restore safety-copy folder
    pub fn restore_temp_path(&self) -> PathBuf {
        self.server.path.join(&self.storage.restore_temp_folder)
    }
}
