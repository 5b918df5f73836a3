// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Configuration file types and parsing for logfan.
//!
//! JSON5 configuration format supporting:
//! - Output directory layout (timestamped run directories or a fixed one)
//! - Console and per-file log sinks with independent levels
//! - Comments and trailing commas
//!
//! Loading never fails: a missing, malformed or invalid file falls back to
//! the defaults and leaves a [`ConfigNotice`] explaining why. Notices are
//! replayed through a logger once one is registered.

use crate::logging::{
    Compression, ConsoleConfig, FileSinkConfig, ListenerConfig, Logger, PolicyError, Retention,
    Rotation, Severity, Template, TemplateError, DEFAULT_HISTORY_CAPACITY,
};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Plain-file log format used by the default sinks
pub const DEFAULT_FILE_FORMAT: &str =
    "{time:YYYY-MM-DD HH:mm:ss.SSS} | {level: <8} | {name}:{function}:{line} - {message}";

/// Timestamp naming auto-generated run directories
pub const RUN_DIR_FORMAT: &str = "%Y_%m_%d_%H_%M_%S";

/// Startup configuration (JSON5 file format)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Config {
    /// Where run output (including logs) goes
    #[serde(default)]
    pub output: OutputConfig,

    /// Log levels and sinks
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OutputConfig {
    /// Create a timestamped subdirectory of `root_dir` per run
    #[serde(default = "default_true")]
    pub auto_generate: bool,

    #[serde(default = "default_root_dir")]
    pub root_dir: PathBuf,

    /// Used instead of `root_dir` when `auto_generate` is off
    #[serde(default)]
    pub manual_dir: Option<PathBuf>,

    #[serde(default)]
    pub subdirs: Subdirs,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            auto_generate: true,
            root_dir: default_root_dir(),
            manual_dir: None,
            subdirs: Subdirs::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Subdirs {
    #[serde(default = "default_logs_subdir")]
    pub logs: String,
}

impl Default for Subdirs {
    fn default() -> Self {
        Self {
            logs: default_logs_subdir(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// Global level; sinks without their own level use it
    #[serde(default = "default_level")]
    pub level: Severity,

    /// Records kept for history replay
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,

    #[serde(default)]
    pub console: ConsoleSection,

    #[serde(default = "default_files")]
    pub files: Vec<FileSection>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            history_capacity: default_history_capacity(),
            console: ConsoleSection::default(),
            files: default_files(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConsoleSection {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_true")]
    pub colorize: bool,

    /// `null` means the global level
    #[serde(default)]
    pub level: Option<Severity>,

    /// `null` means the process/thread-qualified default
    #[serde(default)]
    pub format: Option<String>,
}

impl Default for ConsoleSection {
    fn default() -> Self {
        Self {
            enabled: true,
            colorize: true,
            level: None,
            format: None,
        }
    }
}

/// One log file as stored in the config file
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FileSection {
    pub name: String,

    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Relative to the logs directory unless absolute
    #[serde(default = "default_filename")]
    pub filename: String,

    /// `null` means the global level
    #[serde(default)]
    pub level: Option<Severity>,

    /// e.g. "10 MB", "1 day", "00:00"
    #[serde(default)]
    pub rotation: Option<String>,

    /// e.g. "7 days", "20"
    #[serde(default)]
    pub retention: Option<String>,

    /// "zstd", "zip", "gz" or null
    #[serde(default)]
    pub compression: Option<String>,

    #[serde(default)]
    pub format: Option<String>,
}

impl FileSection {
    fn new(name: &str, level: Severity) -> Self {
        Self {
            name: name.to_string(),
            enabled: true,
            filename: format!("{}.log", name),
            level: Some(level),
            rotation: None,
            retention: None,
            compression: None,
            format: Some(DEFAULT_FILE_FORMAT.to_string()),
        }
    }

    /// Resolve into a sink config, parsing every policy string
    pub fn to_sink_config(
        &self,
        logs_dir: &Path,
        global_level: Severity,
    ) -> Result<FileSinkConfig, ConfigError> {
        if self.filename.trim().is_empty() {
            return Err(ConfigError::EmptyFilename {
                file: self.name.clone(),
            });
        }
        let policy_err = |source| ConfigError::InvalidPolicy {
            file: self.name.clone(),
            source,
        };
        let rotation = self
            .rotation
            .as_deref()
            .map(str::parse::<Rotation>)
            .transpose()
            .map_err(policy_err)?;
        let retention = self
            .retention
            .as_deref()
            .map(str::parse::<Retention>)
            .transpose()
            .map_err(policy_err)?;
        let compression = self
            .compression
            .as_deref()
            .map(str::parse::<Compression>)
            .transpose()
            .map_err(policy_err)?;
        if let Some(format) = &self.format {
            Template::parse(format).map_err(|source| ConfigError::InvalidFormat {
                sink: self.name.clone(),
                source,
            })?;
        }

        Ok(FileSinkConfig {
            name: self.name.clone(),
            enabled: self.enabled,
            path: logs_dir.join(&self.filename),
            level: self.level.unwrap_or(global_level),
            rotation,
            retention,
            compression,
            format: self.format.clone(),
        })
    }
}

fn default_true() -> bool {
    true
}

fn default_root_dir() -> PathBuf {
    PathBuf::from("./resources/output")
}

fn default_logs_subdir() -> String {
    "logs".to_string()
}

fn default_level() -> Severity {
    Severity::Info
}

fn default_history_capacity() -> usize {
    DEFAULT_HISTORY_CAPACITY
}

fn default_filename() -> String {
    "app.log".to_string()
}

/// all.log (everything, rotated and compressed), info.log, error.log
fn default_files() -> Vec<FileSection> {
    let all = FileSection {
        rotation: Some("10 MB".to_string()),
        retention: Some("7 days".to_string()),
        compression: Some("zstd".to_string()),
        ..FileSection::new("all", Severity::Trace)
    };
    let info = FileSection::new("info", Severity::Info);
    let error = FileSection {
        retention: Some("30 days".to_string()),
        format: Some(format!("{}\n{{exception}}", DEFAULT_FILE_FORMAT)),
        ..FileSection::new("error", Severity::Error)
    };
    vec![all, info, error]
}

impl Config {
    /// Load configuration from a JSON5 file
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(path.to_path_buf(), e.to_string()))?;
        Self::parse(&content)
    }

    /// Parse configuration from a JSON5 string
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        json5::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(format) = &self.logging.console.format {
            Template::parse(format).map_err(|source| ConfigError::InvalidFormat {
                sink: "console".to_string(),
                source,
            })?;
        }

        let mut seen_filenames: HashMap<&str, &str> = HashMap::new();
        for file in &self.logging.files {
            file.to_sink_config(Path::new(""), self.logging.level)?;
            if !file.enabled {
                continue;
            }
            if let Some(previous) = seen_filenames.insert(file.filename.as_str(), file.name.as_str()) {
                return Err(ConfigError::DuplicateFilename {
                    filename: file.filename.clone(),
                    files: (previous.to_string(), file.name.clone()),
                });
            }
        }
        Ok(())
    }
}

/// Resolved output directories of one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPaths {
    pub root: PathBuf,
    pub logs: PathBuf,
}

/// Something worth logging that happened while loading the config, before
/// any logger was available
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigNotice {
    pub level: Severity,
    pub message: String,
}

impl ConfigNotice {
    fn info(message: impl Into<String>) -> Self {
        Self {
            level: Severity::Info,
            message: message.into(),
        }
    }

    fn warning(message: impl Into<String>) -> Self {
        Self {
            level: Severity::Warning,
            message: message.into(),
        }
    }
}

/// Loaded configuration plus its raw document for dotted-path edits
#[derive(Debug, Clone)]
pub struct ConfigService {
    config: Config,
    raw: Value,
    path: Option<PathBuf>,
    notices: Vec<ConfigNotice>,
}

impl ConfigService {
    /// Load from `path`, falling back to defaults
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let mut notices = Vec::new();

        let config = if !path.exists() {
            notices.push(ConfigNotice::info(format!(
                "Config file {} not found, using defaults",
                path.display()
            )));
            Config::default()
        } else {
            let loaded = Config::load_from_file(path).and_then(|config| {
                config.validate()?;
                Ok(config)
            });
            match loaded {
                Ok(config) => {
                    notices.push(ConfigNotice::info(format!(
                        "Loaded config file {}",
                        path.display()
                    )));
                    config
                }
                Err(e) => {
                    notices.push(ConfigNotice::warning(format!(
                        "Ignoring config file {}: {}; using defaults",
                        path.display(),
                        e
                    )));
                    Config::default()
                }
            }
        };

        let mut service = Self::from_config(config);
        service.path = Some(path.to_path_buf());
        service.notices = notices;
        service
    }

    /// Wrap an in-memory configuration
    pub fn from_config(config: Config) -> Self {
        let raw = serde_json::to_value(&config).unwrap_or(Value::Null);
        Self {
            config,
            raw,
            path: None,
            notices: Vec::new(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn level(&self) -> Severity {
        self.config.logging.level
    }

    pub fn history_capacity(&self) -> usize {
        self.config.logging.history_capacity
    }

    pub fn notices(&self) -> &[ConfigNotice] {
        &self.notices
    }

    /// Log and forget the collected notices
    pub fn replay_notices(&mut self, logger: &Logger) {
        for notice in self.notices.drain(..) {
            logger.log(notice.level, notice.message);
        }
    }

    /// Resolve and create the output directories for a run starting now
    pub fn output_paths(&self) -> Result<OutputPaths, ConfigError> {
        self.output_paths_at(Local::now())
    }

    pub fn output_paths_at(&self, now: DateTime<Local>) -> Result<OutputPaths, ConfigError> {
        let output = &self.config.output;
        let root = if output.auto_generate {
            output
                .root_dir
                .join(now.format(RUN_DIR_FORMAT).to_string())
        } else {
            output
                .manual_dir
                .clone()
                .unwrap_or_else(|| output.root_dir.clone())
        };
        let paths = OutputPaths {
            logs: root.join(&output.subdirs.logs),
            root,
        };
        for dir in [&paths.root, &paths.logs] {
            std::fs::create_dir_all(dir)
                .map_err(|e| ConfigError::IoError(dir.clone(), e.to_string()))?;
        }
        Ok(paths)
    }

    /// Every configured log file, resolved under `logs_dir`.
    ///
    /// Disabled files are included with `enabled == false`; sink
    /// initialization skips them.
    pub fn file_sinks(&self, logs_dir: &Path) -> Result<Vec<FileSinkConfig>, ConfigError> {
        self.config
            .logging
            .files
            .iter()
            .map(|file| file.to_sink_config(logs_dir, self.config.logging.level))
            .collect()
    }

    pub fn console(&self) -> ConsoleConfig {
        let section = &self.config.logging.console;
        ConsoleConfig {
            enabled: section.enabled,
            level: section.level.unwrap_or(self.config.logging.level),
            colorize: section.colorize,
            format: section.format.clone(),
            ..ConsoleConfig::default()
        }
    }

    /// Everything [`FanIn::start`](crate::logging::FanIn::start) needs
    pub fn listener_config(&self, logs_dir: &Path) -> Result<ListenerConfig, ConfigError> {
        Ok(ListenerConfig {
            files: self.file_sinks(logs_dir)?,
            console: self.console(),
            history_capacity: Some(self.config.logging.history_capacity),
        })
    }

    /// Look up a dotted key such as `logging.files.0.level`
    pub fn get(&self, key_path: &str) -> Option<&Value> {
        key_path.split('.').try_fold(&self.raw, |node, key| match node {
            Value::Object(map) => map.get(key),
            Value::Array(items) => key.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        })
    }

    /// Set a dotted key, creating intermediate objects.
    ///
    /// The edited document must still be a valid config; otherwise nothing
    /// changes and the error is returned.
    pub fn set(&mut self, key_path: &str, value: Value) -> Result<(), ConfigError> {
        let mut candidate = self.raw.clone();
        let keys: Vec<&str> = key_path.split('.').collect();
        let Some((last, parents)) = keys.split_last() else {
            return Err(ConfigError::InvalidKeyPath(key_path.to_string()));
        };

        let mut node = &mut candidate;
        for key in parents {
            node = match node {
                Value::Object(map) => map
                    .entry(key.to_string())
                    .or_insert_with(|| Value::Object(Default::default())),
                Value::Array(items) => key
                    .parse::<usize>()
                    .ok()
                    .and_then(|i| items.get_mut(i))
                    .ok_or_else(|| ConfigError::InvalidKeyPath(key_path.to_string()))?,
                _ => return Err(ConfigError::InvalidKeyPath(key_path.to_string())),
            };
        }
        match node {
            Value::Object(map) => {
                map.insert(last.to_string(), value);
            }
            Value::Array(items) => {
                let slot = last
                    .parse::<usize>()
                    .ok()
                    .and_then(|i| items.get_mut(i))
                    .ok_or_else(|| ConfigError::InvalidKeyPath(key_path.to_string()))?;
                *slot = value;
            }
            _ => return Err(ConfigError::InvalidKeyPath(key_path.to_string())),
        }

        let config: Config = serde_json::from_value(candidate.clone())
            .map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        self.config = config;
        self.raw = candidate;
        Ok(())
    }

    /// Pretty JSON of the current document
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(&self.raw).unwrap_or_else(|_| "{}".to_string())
    }

    /// Write the document to `path` (or where it was loaded from)
    pub fn save(&mut self, path: Option<&Path>) -> Result<PathBuf, ConfigError> {
        let target = path
            .map(Path::to_path_buf)
            .or_else(|| self.path.clone())
            .ok_or(ConfigError::NoSavePath)?;
        if let Some(parent) = target.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| ConfigError::IoError(parent.to_path_buf(), e.to_string()))?;
            }
        }
        std::fs::write(&target, self.to_json())
            .map_err(|e| ConfigError::IoError(target.clone(), e.to_string()))?;
        self.path = Some(target.clone());
        Ok(target)
    }
}

/// Configuration errors
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    IoError(PathBuf, String),
    ParseError(String),
    InvalidPolicy {
        file: String,
        source: PolicyError,
    },
    InvalidFormat {
        sink: String,
        source: TemplateError,
    },
    EmptyFilename {
        file: String,
    },
    DuplicateFilename {
        filename: String,
        files: (String, String),
    },
    InvalidKeyPath(String),
    NoSavePath,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(path, msg) => {
                write!(f, "config I/O failed for '{}': {}", path.display(), msg)
            }
            ConfigError::ParseError(msg) => write!(f, "failed to parse config: {}", msg),
            ConfigError::InvalidPolicy { file, source } => {
                write!(f, "log file '{}': {}", file, source)
            }
            ConfigError::InvalidFormat { sink, source } => {
                write!(f, "log sink '{}': {}", sink, source)
            }
            ConfigError::EmptyFilename { file } => {
                write!(f, "log file '{}' has an empty filename", file)
            }
            ConfigError::DuplicateFilename { filename, files } => write!(
                f,
                "log files '{}' and '{}' both write to '{}'",
                files.0, files.1, filename
            ),
            ConfigError::InvalidKeyPath(key) => write!(f, "invalid config key path '{}'", key),
            ConfigError::NoSavePath => write!(f, "no path to save the config to"),
        }
    }
}

impl std::error::Error for ConfigError {}
