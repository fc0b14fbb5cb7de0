//! Server configuration: a YAML file with environment overrides.
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DEFAULT_PORT: u16 = 8081;
pub const DEFAULT_DB_PATH: &str = "sqlite:data/cardworks.db";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub server: Server,
    pub llm: Llm,
    pub scraper: Scraper,
    pub export: Export,
    pub tuner: Tuner,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Server {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    /// Generated HTML files and exported images land here.
    pub output_dir: String,
    /// Absolute base used for share links and QR codes.
    pub public_url: String,
}

impl Default for Server {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: DEFAULT_PORT,
            database_url: DEFAULT_DB_PATH.into(),
            output_dir: "output".into(),
            public_url: format!("http://localhost:{}", DEFAULT_PORT),
        }
    }
}

/// OpenAI-compatible chat-completions endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Llm {
    pub endpoint: String,
    pub api_key: String,
    pub model: String,
    pub temperature: f32,
    pub timeout_secs: u64,
}

impl Default for Llm {
    fn default() -> Self {
        Self {
            endpoint: "https://ark.cn-beijing.volces.com/api/v3/".into(),
            api_key: String::new(),
            model: "deepseek-v3-250324".into(),
            temperature: 0.7,
            timeout_secs: 120,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Scraper {
    pub endpoint: String,
    pub api_key: String,
}

impl Default for Scraper {
    fn default() -> Self {
        Self {
            endpoint: "https://r.jina.ai/".into(),
            api_key: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Export {
    /// HTML-to-image binary, invoked with wkhtmltoimage-compatible flags.
    pub renderer: String,
    pub default_width: u32,
}

impl Default for Export {
    fn default() -> Self {
        Self {
            renderer: "wkhtmltoimage".into(),
            default_width: 800,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Tuner {
    pub delay_ms: u64,
}

impl Default for Tuner {
    fn default() -> Self {
        Self { delay_ms: 1500 }
    }
}

impl Config {
    pub fn ensure_dirs(&self) -> Result<(), std::io::Error> {
        fs::create_dir_all(self.exports_dir())?;
        if let Some(dir) = self.database_file().as_deref().and_then(Path::parent) {
            if !dir.as_os_str().is_empty() {
                fs::create_dir_all(dir)?;
            }
        }
        Ok(())
    }

    /// On-disk path behind a `sqlite:` URL, if any.
    pub fn database_file(&self) -> Option<PathBuf> {
        let rest = self.server.database_url.strip_prefix("sqlite:")?;
        let path = rest.trim_start_matches("//").split('?').next()?;
        (!path.is_empty() && path != ":memory:").then(|| PathBuf::from(path))
    }

    pub fn output_dir(&self) -> PathBuf {
        PathBuf::from(&self.server.output_dir)
    }

    pub fn exports_dir(&self) -> PathBuf {
        self.output_dir().join("exports")
    }

    pub fn llm_enabled(&self) -> bool {
        !self.llm.api_key.trim().is_empty()
    }

    /// Apply `PORT`, `DATABASE_URL`, `ARK_API_KEY` and `JINA_API_KEY`.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = lookup("PORT").and_then(|p| p.parse().ok()) {
            self.server.port = port;
        }
        if let Some(url) = lookup("DATABASE_URL") {
            self.server.database_url = url;
        }
        if let Some(key) = lookup("ARK_API_KEY").or_else(|| lookup("DEEPSEEK_API_KEY")) {
            self.llm.api_key = key;
        }
        if let Some(key) = lookup("JINA_API_KEY") {
            self.scraper.api_key = key;
        }
    }
}

/// Load configuration from a YAML file and validate it.
/// A missing file yields the defaults; environment overrides apply either way.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let mut cfg = if path.exists() {
        let content = fs::read_to_string(path)?;
        serde_yaml::from_str(&content)?
    } else {
        Config::default()
    };
    cfg.apply_env();
    validate(&cfg)?;
    Ok(cfg)
}

fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.server.database_url.trim().is_empty() {
        return Err(ConfigError::Invalid("server.database_url must be non-empty"));
    }
    if cfg.server.output_dir.trim().is_empty() {
        return Err(ConfigError::Invalid("server.output_dir must be non-empty"));
    }
    if cfg.server.port == 0 {
        return Err(ConfigError::Invalid("server.port must be > 0"));
    }
    if !(0.0..=2.0).contains(&cfg.llm.temperature) {
        return Err(ConfigError::Invalid("llm.temperature must be within 0.0..=2.0"));
    }
    if cfg.llm.endpoint.trim().is_empty() {
        return Err(ConfigError::Invalid("llm.endpoint must be non-empty"));
    }
    if cfg.scraper.endpoint.trim().is_empty() {
        return Err(ConfigError::Invalid("scraper.endpoint must be non-empty"));
    }
    if cfg.export.renderer.trim().is_empty() {
        return Err(ConfigError::Invalid("export.renderer must be non-empty"));
    }
    Ok(())
}

pub fn example() -> &'static str {
    r#"server:
  host: "0.0.0.0"
  port: 8081
  database_url: "sqlite:data/cardworks.db"
  output_dir: "output"
  public_url: "http://localhost:8081"

llm:
  endpoint: "https://ark.cn-beijing.volces.com/api/v3/"
  api_key: ""
  model: "deepseek-v3-250324"
  temperature: 0.7
  timeout_secs: 120

scraper:
  endpoint: "https://r.jina.ai/"
  api_key: ""

export:
  renderer: "wkhtmltoimage"
  default_width: 800

tuner:
  delay_ms: 1500
"#
}
