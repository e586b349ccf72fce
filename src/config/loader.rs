//! Configuration File Loading
//!
//! Finds, parses, validates and saves session configuration files in TOML
//! or JSON.

use super::ShellConfig;
use crate::error::{Error, Result};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable naming an explicit configuration file
pub const CONFIG_ENV_VAR: &str = "SHELLMUX_CONFIG";

/// Configuration file loader
pub struct ConfigLoader {
    /// Search paths, without extension
    search_paths: Vec<PathBuf>,
    /// Formats tried for each search path, in order
    supported_formats: Vec<ConfigFormat>,
    /// Path the configuration was loaded from, if any
    current_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// TOML format
    Toml,
    /// JSON format
    Json,
}

impl ConfigFormat {
    /// Format implied by a file extension; anything but `.json` is TOML
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => ConfigFormat::Json,
            _ => ConfigFormat::Toml,
        }
    }

    fn extension(self) -> &'static str {
        match self {
            ConfigFormat::Toml => "toml",
            ConfigFormat::Json => "json",
        }
    }

    fn name(self) -> &'static str {
        match self {
            ConfigFormat::Toml => "TOML",
            ConfigFormat::Json => "JSON",
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoadOptions {
    /// Fall back to the default configuration when no file exists
    pub create_default: bool,
    /// Validate the configuration after loading
    pub validate: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            create_default: true,
            validate: true,
        }
    }
}

impl ConfigLoader {
    /// Create a loader over the default search paths
    pub fn new() -> Self {
        Self {
            search_paths: Self::get_search_paths(),
            supported_formats: vec![ConfigFormat::Toml, ConfigFormat::Json],
            current_path: None,
        }
    }

    /// Load configuration with default options
    pub fn load() -> Result<ShellConfig> {
        Self::load_with_options(LoadOptions::default())
    }

    /// Load configuration with custom options
    pub fn load_with_options(options: LoadOptions) -> Result<ShellConfig> {
        Self::new().load_config(&options)
    }

    /// Search this loader's paths and load the first readable file
    pub fn load_config(&mut self, options: &LoadOptions) -> Result<ShellConfig> {
        if let Ok(explicit) = env::var(CONFIG_ENV_VAR) {
            if !explicit.is_empty() {
                let path = PathBuf::from(explicit);
                let config = self.load_from_path(&path)?;
                return self.finish_load(config, options);
            }
        }

        if let Some((path, config)) = self.find_and_load_config() {
            debug!("Loaded configuration from {}", path.display());
            self.current_path = Some(path);
            return self.finish_load(config, options);
        }

        if options.create_default {
            self.finish_load(ShellConfig::default(), options)
        } else {
            Err(Error::ConfigNotFound)
        }
    }

    /// Load a specific file, picking the format from its extension
    pub fn load_from_path(&mut self, path: &Path) -> Result<ShellConfig> {
        let config = self
            .load_config_file(path, ConfigFormat::from_path(path))
            .map_err(|e| match e {
                Error::Io(io) => Error::ConfigLoadFailed {
                    path: path.to_path_buf(),
                    reason: io.to_string(),
                },
                other => other,
            })?;
        self.current_path = Some(path.to_path_buf());
        Ok(config)
    }

    /// Save configuration to the current path or the default location
    pub fn save(&self, config: &ShellConfig) -> Result<PathBuf> {
        let path = self
            .current_path
            .clone()
            .unwrap_or_else(Self::get_default_config_path);
        self.save_to_path(config, &path)?;
        Ok(path)
    }

    /// Save configuration to a specific path
    pub fn save_to_path(&self, config: &ShellConfig, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::ConfigSaveFailed {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
        }

        let format = ConfigFormat::from_path(path);
        let content = match format {
            ConfigFormat::Json => serde_json::to_string_pretty(config).map_err(|e| {
                Error::ConfigSerializationFailed {
                    format: format.name().to_string(),
                    reason: e.to_string(),
                }
            })?,
            ConfigFormat::Toml => {
                toml::to_string_pretty(config).map_err(|e| Error::ConfigSerializationFailed {
                    format: format.name().to_string(),
                    reason: e.to_string(),
                })?
            }
        };

        fs::write(path, content).map_err(|e| Error::ConfigSaveFailed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Find and load configuration from search paths
    fn find_and_load_config(&self) -> Option<(PathBuf, ShellConfig)> {
        for path in &self.search_paths {
            for format in &self.supported_formats {
                let config_path = path.with_extension(format.extension());
                if !config_path.exists() {
                    continue;
                }

                match self.load_config_file(&config_path, *format) {
                    Ok(config) => return Some((config_path, config)),
                    Err(e) => {
                        warn!("Failed to load config from {}: {}", config_path.display(), e);
                    }
                }
            }
        }

        None
    }

    /// Load a specific configuration file
    fn load_config_file(&self, path: &Path, format: ConfigFormat) -> Result<ShellConfig> {
        let content = fs::read_to_string(path)?;

        match format {
            ConfigFormat::Toml => toml::from_str(&content).map_err(|e| Error::ConfigParseFailed {
                format: format.name().to_string(),
                reason: e.to_string(),
            }),
            ConfigFormat::Json => {
                serde_json::from_str(&content).map_err(|e| Error::ConfigParseFailed {
                    format: format.name().to_string(),
                    reason: e.to_string(),
                })
            }
        }
    }

    fn finish_load(&self, config: ShellConfig, options: &LoadOptions) -> Result<ShellConfig> {
        if options.validate {
            Self::validate_config(&config)?;
        }
        Ok(config)
    }

    /// Default search paths, most specific first
    fn get_search_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();

        if let Ok(xdg_config) = env::var("XDG_CONFIG_HOME") {
            paths.push(PathBuf::from(xdg_config).join("shellmux").join("config"));
        }

        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("shellmux").join("config"));
        }

        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".config").join("shellmux").join("config"));
            paths.push(home.join(".shellmux").join("config"));
        }

        if let Ok(cwd) = env::current_dir() {
            paths.push(cwd.join("shellmux"));
        }

        paths.dedup();
        paths
    }

    /// Get the default configuration path
    fn get_default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("shellmux")
            .join("config.toml")
    }

    /// Validate configuration
    pub fn validate_config(config: &ShellConfig) -> Result<()> {
        if let Some(program) = config.shell.program() {
            if program.trim().is_empty() {
                return Err(Error::ConfigValidationFailed {
                    field: "shell".to_string(),
                    reason: "Shell program cannot be empty".to_string(),
                });
            }
        }

        if config.pty.term.trim().is_empty() {
            return Err(Error::ConfigValidationFailed {
                field: "pty.term".to_string(),
                reason: "Terminal type cannot be empty".to_string(),
            });
        }

        if config.pty.cols == 0 || config.pty.rows == 0 {
            return Err(Error::ConfigValidationFailed {
                field: "pty.cols/pty.rows".to_string(),
                reason: "Terminal dimensions must be greater than 0".to_string(),
            });
        }

        if config.pty.cols > u32::from(u16::MAX) || config.pty.rows > u32::from(u16::MAX) {
            return Err(Error::ConfigValidationFailed {
                field: "pty.cols/pty.rows".to_string(),
                reason: format!("Terminal dimensions cannot exceed {}", u16::MAX),
            });
        }

        if !is_shell_identifier(&config.prompt.variable) {
            return Err(Error::ConfigValidationFailed {
                field: "prompt.variable".to_string(),
                reason: format!("'{}' is not a shell variable name", config.prompt.variable),
            });
        }

        Ok(())
    }

    /// Get the current configuration file path
    pub fn current_path(&self) -> Option<&Path> {
        self.current_path.as_deref()
    }

    /// List all search paths
    pub fn search_paths(&self) -> &[PathBuf] {
        &self.search_paths
    }

    /// Add a custom search path
    pub fn add_search_path(&mut self, path: PathBuf) {
        self.search_paths.push(path);
    }

    /// Clear all search paths and add a single path
    pub fn set_search_path(&mut self, path: PathBuf) {
        self.search_paths = vec![path];
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn is_shell_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    }
}
