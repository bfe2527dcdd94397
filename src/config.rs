use clap::{Parser, ValueEnum};
use serde::Deserialize;
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;

#[derive(Parser, Debug)]
#[command(name = "wordsync")]
#[command(about = "Turns dictionary-style Readwise highlights into Anki cards", long_about = None)]
pub struct Cli {
    #[arg(short = 'c', long = "config")]
    pub config_path: Option<PathBuf>,

    /// Overrides the checkpoint file from the config.
    #[arg(long = "checkpoint")]
    pub checkpoint_path: Option<PathBuf>,

    /// Fetch and parse highlights without touching Anki or the checkpoint.
    #[arg(long)]
    pub dry_run: bool,

    #[arg(long, value_enum, default_value_t = LogFormat::Json)]
    pub log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Json,
    Pretty,
}

pub fn default_config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".wordsync")
}

pub fn default_config_path() -> PathBuf {
    default_config_dir().join("config.yaml")
}

/// Which part of a highlight is parsed for definitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchField {
    #[default]
    Note,
    Text,
}

impl MatchField {
    fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "note" => Some(MatchField::Note),
            "text" => Some(MatchField::Text),
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Readwise {
    #[serde(default)]
    pub token: String,
    #[serde(default = "default_readwise_url")]
    pub base_url: String,
    #[serde(default)]
    pub match_on: MatchField,
}

fn default_readwise_url() -> String {
    "https://readwise.io/api/v2".to_string()
}

/// Field names of a note type: the word goes in `primary`, the rendered definition in
/// `secondary`.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct TemplateFields {
    pub primary: String,
    pub secondary: String,
}

impl Default for TemplateFields {
    fn default() -> Self {
        Self {
            primary: "Front".to_string(),
            secondary: "Back".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Anki {
    #[serde(default = "default_connect_url")]
    pub connect_url: String,
    #[serde(default)]
    pub deck: String,
    #[serde(default)]
    pub model: String,
    #[serde(default = "default_app_path")]
    pub app_path: Option<PathBuf>,
    #[serde(default = "default_launch_wait")]
    pub launch_wait_seconds: u64,
    #[serde(default = "default_true")]
    pub duplicate_check: bool,
    #[serde(default)]
    pub templates: HashMap<String, TemplateFields>,
}

fn default_connect_url() -> String {
    "http://127.0.0.1:8765".to_string()
}

fn default_app_path() -> Option<PathBuf> {
    if cfg!(target_os = "macos") {
        Some(PathBuf::from("/Applications/Anki.app"))
    } else {
        None
    }
}

fn default_launch_wait() -> u64 {
    15
}

fn default_true() -> bool {
    true
}

impl Anki {
    pub fn template_fields(&self) -> TemplateFields {
        self.templates.get(&self.model).cloned().unwrap_or_default()
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct App {
    #[serde(default = "default_checkpoint_file")]
    pub checkpoint_file: PathBuf,
}

impl Default for App {
    fn default() -> Self {
        Self {
            checkpoint_file: default_checkpoint_file(),
        }
    }
}

fn default_checkpoint_file() -> PathBuf {
    PathBuf::from(".last_run")
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub readwise: Readwise,
    pub anki: Anki,
    #[serde(default)]
    pub app: App,
}

impl Config {
    pub fn new(path: &Path) -> Result<Self, ConfigError> {
        let cfg = Config::load_config(path)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Builds the config from environment variables, for runs without a config file.
    pub fn from_env() -> Result<Self, ConfigError> {
        Config::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let match_on = match get("READWISE_MATCH_FIELD") {
            Some(v) => MatchField::parse(&v).ok_or(ConfigError::Invalid {
                key: "READWISE_MATCH_FIELD",
                value: v,
            })?,
            None => MatchField::default(),
        };

        let launch_wait_seconds = match get("ANKI_LAUNCH_WAIT_SECONDS") {
            Some(v) => v.trim().parse().map_err(|_| ConfigError::Invalid {
                key: "ANKI_LAUNCH_WAIT_SECONDS",
                value: v,
            })?,
            None => default_launch_wait(),
        };

        let duplicate_check = match get("ANKI_DUPLICATE_CHECK") {
            Some(v) => parse_bool(&v).ok_or(ConfigError::Invalid {
                key: "ANKI_DUPLICATE_CHECK",
                value: v,
            })?,
            None => true,
        };

        let cfg = Config {
            readwise: Readwise {
                token: get("READWISE_API_TOKEN").unwrap_or_default(),
                base_url: get("READWISE_BASE_URL").unwrap_or_else(default_readwise_url),
                match_on,
            },
            anki: Anki {
                connect_url: get("ANKI_CONNECT_URL").unwrap_or_else(default_connect_url),
                deck: get("ANKI_DECK_NAME").unwrap_or_default(),
                model: get("ANKI_MODEL_NAME").unwrap_or_default(),
                app_path: get("ANKI_APP_PATH").map(PathBuf::from).or_else(default_app_path),
                launch_wait_seconds,
                duplicate_check,
                templates: HashMap::new(),
            },
            app: App {
                checkpoint_file: get("LAST_RUN_FILE")
                    .map(PathBuf::from)
                    .unwrap_or_else(default_checkpoint_file),
            },
        };

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.readwise.token.trim().is_empty() {
            return Err(ConfigError::Missing("READWISE_API_TOKEN"));
        }
        if self.anki.deck.trim().is_empty() {
            return Err(ConfigError::Missing("ANKI_DECK_NAME"));
        }
        if self.anki.model.trim().is_empty() {
            return Err(ConfigError::Missing("ANKI_MODEL_NAME"));
        }
        Ok(())
    }

    fn load_config(path: &Path) -> Result<Config, ConfigError> {
        let yaml_str = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let yaml_with_env = Config::substitute_env_vars(&yaml_str);
        let config: Config = serde_yaml::from_str(&yaml_with_env)?;
        Ok(config)
    }

    fn substitute_env_vars(yaml_str: &str) -> String {
        let mut result = yaml_str.to_string();
        let mut offset = 0;

        while let Some(start) = result[offset..].find("${") {
            let actual_start = offset + start;
            if let Some(end) = result[actual_start..].find("}") {
                let var_name = &result[actual_start + 2..actual_start + end];

                // ${VAR:-default}
                let env_value = if let Some(default_start) = var_name.find(":-") {
                    let actual_var = &var_name[..default_start];
                    let default_val = &var_name[default_start + 2..];
                    env::var(actual_var).unwrap_or_else(|_| default_val.to_string())
                } else {
                    env::var(var_name).unwrap_or_else(|_| {
                        tracing::warn!(var = var_name, "environment variable not found");
                        String::new()
                    })
                };

                result.replace_range(actual_start..actual_start + end + 1, &env_value);
                offset = actual_start + env_value.len();
            } else {
                break;
            }
        }

        result
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
