use std::path::{Path, PathBuf};

use eyre::Result;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::acquire::DEFAULT_MIN_CHARS;
use crate::select::DEFAULT_LANGUAGES;
use crate::source::DEFAULT_SOURCES;

const DEFAULT_PROMPT_FILE: &str = "memory.txt";
const DEFAULT_TRANSCRIPT_FILE: &str = "transcript.txt";

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Chat model, used when `MODEL` is not set
    pub model: Option<String>,
    /// Chat API root, used when `OPENAI_BASE_URL` is not set
    pub base_url: Option<String>,
    /// Caption languages in order of preference
    pub languages: Option<Vec<String>>,
    /// Caption sources in the order they are tried
    pub sources: Option<Vec<String>>,
    pub min_chars: Option<usize>,
    pub prompt_file: Option<PathBuf>,
    pub transcript_file: Option<PathBuf>,
}

impl Config {
    /// Load config from ~/.config/ytresume/config.toml if it exists
    pub fn load() -> Result<Self> {
        Self::load_from(&config_path())
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            debug!("Loading config from {}", path.display());
            let content = std::fs::read_to_string(path)?;
            let config: Config = toml::from_str(&content)?;
            Ok(config)
        } else {
            debug!("No config file found at {}", path.display());
            Ok(Config::default())
        }
    }

    pub fn languages(&self) -> Vec<String> {
        match &self.languages {
            Some(langs) if !langs.is_empty() => langs.clone(),
            _ => DEFAULT_LANGUAGES.iter().map(|l| l.to_string()).collect(),
        }
    }

    pub fn sources(&self) -> Vec<String> {
        match &self.sources {
            Some(sources) if !sources.is_empty() => sources.clone(),
            _ => DEFAULT_SOURCES.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn min_chars(&self) -> usize {
        self.min_chars.unwrap_or(DEFAULT_MIN_CHARS)
    }

    pub fn prompt_file(&self) -> PathBuf {
        self.prompt_file
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_PROMPT_FILE))
    }

    pub fn transcript_file(&self) -> PathBuf {
        self.transcript_file
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_TRANSCRIPT_FILE))
    }
}

pub fn config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from(".config"))
        .join("ytresume")
        .join("config.toml")
}
