//! # Configuration
//!
//! YAML configuration for a trace session and the store that keeps it
//! current while the tracer runs.
//!
//! The tracer thread never touches the file: it asks the [`ConfigStore`] for
//! a [`snapshot`](ConfigStore::snapshot), an `Arc<TracerConfig>` that stays
//! valid for as long as it is held. A [`ConfigWatcher`] thread polls the
//! file's modification time and swaps a freshly parsed configuration in under
//! a write lock. A reload that fails to parse leaves the previous
//! configuration in place.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use strider_utils::config::ConfigStore;
//!
//! let store = Arc::new(ConfigStore::open("config.yaml")?);
//! let _watcher = store.spawn_watcher(Duration::from_secs(1))?;
//! let config = store.snapshot();
//! println!("stepping at most {} times", config.max_steps);
//! # Ok::<(), strider_utils::config::ConfigError>(())
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::thread::JoinHandle;
use std::time::{Duration, SystemTime};
use std::{fs, io};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Default poll interval for [`ConfigStore::spawn_watcher`].
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// How finely the tracer steps and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepGranularity
{
    /// One stop per machine instruction.
    #[default]
    Instruction,
    /// One stop per source statement.
    Source,
}

/// Action forced by a [`StepActionRule`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfiguredAction
{
    /// Step into the next instruction or statement.
    StepIn,
    /// Step over calls.
    StepOver,
    /// Finish the current frame.
    StepOut,
    /// Let the target run until the next breakpoint.
    Continue,
}

/// Override of the computed step decision for a line range of one source file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepActionRule
{
    /// Half-open line range `[start, end)`.
    pub lines: [u32; 2],
    /// Action to take for stops inside the range.
    pub action: ConfiguredAction,
}

impl StepActionRule
{
    /// Whether `line` falls inside the rule's range.
    #[must_use]
    pub fn covers(&self, line: u32) -> bool
    {
        self.lines[0] <= line && line < self.lines[1]
    }
}

/// Everything a trace session reads from `config.yaml`.
///
/// Every key is optional; missing keys take the values from
/// [`TracerConfig::default`] and unknown keys are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TracerConfig
{
    /// Step decisions per session before the target is left to run freely (0 = unlimited).
    pub max_steps: u64,
    /// Re-disassemble functions at every stop instead of caching instructions.
    pub enable_jit: bool,
    /// Log the executable, architecture, and entry symbol at start-up.
    pub log_target_info: bool,
    /// Log every loaded module and its sections after the entry handshake.
    pub log_module_info: bool,
    /// Log breakpoint creation and hits.
    pub log_breakpoint_details: bool,
    /// Glob patterns of modules that are run through at full speed.
    pub skip_modules: Vec<String>,
    /// Show the interactive module picker at the entry handshake, then exit.
    pub dump_modules_for_skip: bool,
    /// Instruction-level or source-level stepping.
    pub log_mode: StepGranularity,
    /// Directories searched for relative source paths from the line tables.
    pub source_search_paths: Vec<PathBuf>,
    /// Glob patterns of source files whose statements are stepped over.
    pub skip_source_files: Vec<String>,
    /// Per-file step decision overrides, keyed by resolved source path.
    pub step_action: BTreeMap<String, StepActionRule>,
    /// Library functions whose calls are logged with decoded arguments.
    pub libc_functions: Vec<String>,
    /// Extra environment variables for the launched program.
    pub environment: BTreeMap<String, String>,
    /// Upper bound on live return-address breakpoints.
    pub return_breakpoint_capacity: usize,
}

impl Default for TracerConfig
{
    fn default() -> Self
    {
        Self {
            max_steps: 100,
            enable_jit: false,
            log_target_info: true,
            log_module_info: true,
            log_breakpoint_details: true,
            skip_modules: Vec::new(),
            dump_modules_for_skip: false,
            log_mode: StepGranularity::Instruction,
            source_search_paths: Vec::new(),
            skip_source_files: Vec::new(),
            step_action: BTreeMap::new(),
            libc_functions: Vec::new(),
            environment: BTreeMap::new(),
            return_breakpoint_capacity: 4096,
        }
    }
}

impl TracerConfig
{
    /// Parse a configuration document. An empty document yields the defaults.
    ///
    /// ## Errors
    ///
    /// Returns [`ConfigError::Parse`] if the text is not valid YAML for this schema.
    pub fn from_yaml(path: &Path, text: &str) -> Result<Self, ConfigError>
    {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Whether the step budget is exhausted after `steps` decisions.
    #[must_use]
    pub fn step_budget_exhausted(&self, steps: u64) -> bool
    {
        self.max_steps != 0 && steps >= self.max_steps
    }
}

/// Settings from the command line that win over the file on every reload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConfigOverrides
{
    /// Forces `dump_modules_for_skip` on when set.
    pub dump_modules_for_skip: bool,
}

impl ConfigOverrides
{
    fn apply(self, mut config: TracerConfig) -> TracerConfig
    {
        if self.dump_modules_for_skip {
            config.dump_modules_for_skip = true;
        }
        config
    }
}

/// Thread-safe holder of the current configuration.
#[derive(Debug)]
pub struct ConfigStore
{
    path: PathBuf,
    overrides: ConfigOverrides,
    current: RwLock<Arc<TracerConfig>>,
    last_modified: Mutex<Option<SystemTime>>,
}

impl ConfigStore
{
    /// Load the configuration at `path`.
    ///
    /// A missing file is not an error: the store starts from the defaults and
    /// picks the file up once it appears.
    ///
    /// ## Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed. At
    /// start-up there is no earlier configuration to fall back to.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, ConfigError>
    {
        Self::open_with_overrides(path, ConfigOverrides::default())
    }

    /// Like [`open`](Self::open), applying `overrides` on top of the file.
    ///
    /// ## Errors
    ///
    /// See [`open`](Self::open).
    pub fn open_with_overrides(path: impl Into<PathBuf>, overrides: ConfigOverrides) -> Result<Self, ConfigError>
    {
        let path = path.into();
        let (config, modified) = match read_config(&path)? {
            Some((config, modified)) => {
                info!("Loaded configuration from {}", path.display());
                (config, modified)
            }
            None => {
                info!("No configuration at {}, using defaults", path.display());
                (TracerConfig::default(), None)
            }
        };

        Ok(Self {
            path,
            overrides,
            current: RwLock::new(Arc::new(overrides.apply(config))),
            last_modified: Mutex::new(modified),
        })
    }

    /// Path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path
    {
        &self.path
    }

    /// The configuration in effect right now.
    #[must_use]
    pub fn snapshot(&self) -> Arc<TracerConfig>
    {
        Arc::clone(&self.current.read().unwrap_or_else(PoisonError::into_inner))
    }

    fn install(&self, config: TracerConfig)
    {
        let config = Arc::new(self.overrides.apply(config));
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = config;
    }

    /// Re-read the file unconditionally.
    ///
    /// Returns `true` if a new configuration was installed.
    ///
    /// ## Errors
    ///
    /// Returns the read or parse error. The previous configuration stays in
    /// effect in that case.
    pub fn reload(&self) -> Result<bool, ConfigError>
    {
        match read_config(&self.path) {
            Ok(Some((config, modified))) => {
                *self.last_modified.lock().unwrap_or_else(PoisonError::into_inner) = modified;
                let changed = *self.snapshot() != self.overrides.apply(config.clone());
                self.install(config);
                Ok(changed)
            }
            Ok(None) => Ok(false),
            Err(err) => {
                warn!("Keeping previous configuration: {err}");
                Err(err)
            }
        }
    }

    /// Re-read the file only if its modification time moved.
    ///
    /// ## Errors
    ///
    /// See [`reload`](Self::reload).
    pub fn reload_if_modified(&self) -> Result<bool, ConfigError>
    {
        let modified = match fs::metadata(&self.path) {
            Ok(metadata) => metadata.modified().ok(),
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(false),
            Err(err) => return Err(ConfigError::Io {
                path: self.path.clone(),
                source: err,
            }),
        };

        {
            let mut last = self.last_modified.lock().unwrap_or_else(PoisonError::into_inner);
            if modified.is_some() && *last == modified {
                return Ok(false);
            }
            // Record the attempt so a broken file is not re-parsed every poll.
            *last = modified;
        }

        debug!("Configuration file {} changed, reloading", self.path.display());
        self.reload()
    }

    /// Merge `modules` into the file's `skip_modules` list.
    ///
    /// The result is the sorted set union of what is on disk and `modules`.
    /// Other keys in the file are preserved. Returns the merged list.
    ///
    /// ## Errors
    ///
    /// Returns an error if the existing file cannot be parsed or the new file
    /// cannot be written.
    pub fn save_skip_modules(&self, modules: &[String]) -> Result<Vec<String>, ConfigError>
    {
        let mut document = match fs::read_to_string(&self.path) {
            Ok(text) if !text.trim().is_empty() => {
                serde_yaml::from_str::<serde_yaml::Value>(&text).map_err(|source| ConfigError::Parse {
                    path: self.path.clone(),
                    source,
                })?
            }
            Ok(_) => serde_yaml::Value::Mapping(serde_yaml::Mapping::new()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => serde_yaml::Value::Mapping(serde_yaml::Mapping::new()),
            Err(source) => {
                return Err(ConfigError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        let mapping = document
            .as_mapping_mut()
            .ok_or_else(|| ConfigError::NotAMapping(self.path.clone()))?;

        let key = serde_yaml::Value::String("skip_modules".to_string());
        let mut merged: BTreeSet<String> = mapping
            .get(&key)
            .and_then(serde_yaml::Value::as_sequence)
            .map(|existing| existing.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
            .unwrap_or_default();
        merged.extend(modules.iter().cloned());
        let merged: Vec<String> = merged.into_iter().collect();

        mapping.insert(
            key,
            serde_yaml::Value::Sequence(merged.iter().cloned().map(serde_yaml::Value::String).collect()),
        );

        let text = serde_yaml::to_string(&document).map_err(|source| ConfigError::Parse {
            path: self.path.clone(),
            source,
        })?;
        fs::write(&self.path, text).map_err(|source| ConfigError::Io {
            path: self.path.clone(),
            source,
        })?;
        info!("Saved {} skip module patterns to {}", merged.len(), self.path.display());

        let mut config = (*self.snapshot()).clone();
        config.skip_modules.clone_from(&merged);
        self.install(config);
        Ok(merged)
    }

    /// Start polling the file for changes every `interval`.
    ///
    /// The thread stops when the returned [`ConfigWatcher`] is dropped.
    ///
    /// ## Errors
    ///
    /// Returns an error if the thread cannot be spawned.
    pub fn spawn_watcher(self: &Arc<Self>, interval: Duration) -> Result<ConfigWatcher, ConfigError>
    {
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let store = Arc::clone(self);
        let handle = std::thread::Builder::new()
            .name("config-watcher".to_string())
            .spawn(move || loop {
                match stop_rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => {
                        if let Ok(true) = store.reload_if_modified() {
                            info!("Configuration reloaded from {}", store.path.display());
                        }
                    }
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            })
            .map_err(|source| ConfigError::Io {
                path: self.path.clone(),
                source,
            })?;

        Ok(ConfigWatcher {
            stop: Some(stop_tx),
            handle: Some(handle),
        })
    }
}

/// Handle to the polling thread started by [`ConfigStore::spawn_watcher`].
#[derive(Debug)]
pub struct ConfigWatcher
{
    stop: Option<mpsc::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Drop for ConfigWatcher
{
    fn drop(&mut self)
    {
        drop(self.stop.take());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn read_config(path: &Path) -> Result<Option<(TracerConfig, Option<SystemTime>)>, ConfigError>
{
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    let modified = fs::metadata(path).and_then(|m| m.modified()).ok();
    TracerConfig::from_yaml(path, &text).map(|config| Some((config, modified)))
}

/// Configuration loading error
#[derive(Debug, thiserror::Error)]
pub enum ConfigError
{
    /// The file exists but could not be read or written
    #[error("Configuration file {}: {source}", path.display())]
    Io
    {
        /// File being accessed
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: io::Error,
    },

    /// The file is not valid YAML for the configuration schema
    #[error("Invalid configuration in {}: {source}", path.display())]
    Parse
    {
        /// File being parsed
        path: PathBuf,
        /// Underlying YAML error
        #[source]
        source: serde_yaml::Error,
    },

    /// The top level of the file is not a key/value mapping
    #[error("Configuration file {} must contain a YAML mapping", .0.display())]
    NotAMapping(PathBuf),
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_defaults_match_documented_values()
    {
        let config = TracerConfig::default();
        assert_eq!(config.max_steps, 100);
        assert!(!config.enable_jit);
        assert!(config.log_target_info);
        assert!(config.log_module_info);
        assert!(config.log_breakpoint_details);
        assert!(config.skip_modules.is_empty());
        assert!(!config.dump_modules_for_skip);
        assert_eq!(config.log_mode, StepGranularity::Instruction);
    }

    #[test]
    fn test_partial_document_keeps_defaults()
    {
        let text = "max_steps: 5\nskip_modules:\n  - 'libsystem_*'\nlog_mode: source\nunknown_key: 1\n";
        let config = TracerConfig::from_yaml(Path::new("c.yaml"), text).unwrap();
        assert_eq!(config.max_steps, 5);
        assert_eq!(config.skip_modules, vec!["libsystem_*".to_string()]);
        assert_eq!(config.log_mode, StepGranularity::Source);
        assert!(config.log_module_info);
    }

    #[test]
    fn test_empty_document_is_default()
    {
        let config = TracerConfig::from_yaml(Path::new("c.yaml"), "  \n").unwrap();
        assert_eq!(config, TracerConfig::default());
    }

    #[test]
    fn test_step_action_rule_parsing_and_range()
    {
        let text = "step_action:\n  /src/main.c:\n    lines: [10, 20]\n    action: step_over\n";
        let config = TracerConfig::from_yaml(Path::new("c.yaml"), text).unwrap();
        let rule = &config.step_action["/src/main.c"];
        assert_eq!(rule.action, ConfiguredAction::StepOver);
        assert!(rule.covers(10));
        assert!(rule.covers(19));
        assert!(!rule.covers(20));
        assert!(!rule.covers(9));
    }

    #[test]
    fn test_step_budget()
    {
        let mut config = TracerConfig::default();
        assert!(!config.step_budget_exhausted(99));
        assert!(config.step_budget_exhausted(100));
        config.max_steps = 0;
        assert!(!config.step_budget_exhausted(u64::MAX));
    }

    #[test]
    fn test_overrides_force_dump()
    {
        let overrides = ConfigOverrides {
            dump_modules_for_skip: true,
        };
        assert!(overrides.apply(TracerConfig::default()).dump_modules_for_skip);
        assert!(!ConfigOverrides::default().apply(TracerConfig::default()).dump_modules_for_skip);
    }

    #[test]
    fn test_invalid_yaml_reports_parse_error()
    {
        let result = TracerConfig::from_yaml(Path::new("c.yaml"), "max_steps: [not a number");
        assert!(matches!(result, Err(ConfigError::Parse { .. })));
    }
}
