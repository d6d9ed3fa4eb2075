use anyhow::Context;
use std::collections::HashMap;
use tracing_core::{LevelFilter, Metadata};
use std::path::{Path, PathBuf};

#[derive(Clone,Debug,serde::Serialize,serde::Deserialize)]
#[serde(rename_all="lowercase")]
pub enum BuiltinLogTarget
{
    Stdout,
    Stderr,
}

#[derive(Clone,Debug,serde::Serialize,serde::Deserialize)]
#[serde(untagged)]
pub enum LogTarget
{
    File { filename: PathBuf },
    Builtin(BuiltinLogTarget),
}

#[derive(Clone,Copy,Debug,PartialEq,Eq,serde::Serialize,serde::Deserialize)]
#[serde(rename_all ="lowercase")]
pub enum LogLevel
{
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    Off,
}

/// One log destination, with the events it wants
#[derive(Clone,Debug,serde::Deserialize)]
pub struct LogEntry
{
    pub target: LogTarget,
    /// Module path prefixes to include; empty means all
    #[serde(default)]
    pub modules: Vec<String>,
    pub level: Option<LogLevel>,
    /// Colour output; never applied to file targets
    #[serde(default)]
    pub ansi: bool,
}

impl LogEntry
{
    pub fn level_filter(&self) -> LevelFilter
    {
        self.level.map(Into::into).unwrap_or(LevelFilter::TRACE)
    }

    /// Whether an event or span with this metadata belongs in this target
    pub fn accepts(&self, metadata: &Metadata<'_>) -> bool
    {
        if *metadata.level() > self.level_filter()
        {
            return false;
        }
        match metadata.module_path()
        {
            Some(module) if !self.modules.is_empty() => self.modules.iter().any(|m| module.starts_with(m.as_str())),
            _ => true,
        }
    }
}

#[derive(Clone,Debug,serde::Deserialize)]
#[serde(rename_all="kebab-case")]
pub struct LoggingConfig
{
    pub dir: PathBuf,
    pub default_level: Option<LogLevel>,
    #[serde(default)]
    pub module_levels: HashMap<String, LogLevel>,
    pub targets: Vec<LogEntry>,
}

/// Configuration for the access server
#[derive(Clone,Debug,serde::Deserialize)]
#[serde(rename_all="kebab-case")]
pub struct ServerConfig
{
    /// Rule file, loaded at startup and on every rehash
    pub rules_file: PathBuf,
    pub log: LoggingConfig,
}

impl ServerConfig
{
    /// Load configuration from a file. Relative paths within it are taken
    /// relative to the file's directory.
    pub fn load_file<P: AsRef<Path>>(filename: P) -> Result<Self, anyhow::Error>
    {
        let filename = filename.as_ref();
        let text = std::fs::read_to_string(filename)
            .with_context(|| format!("Failed to read {}", filename.display()))?;
        let mut config: Self = json5::from_str(&text)
            .with_context(|| format!("Failed to parse {}", filename.display()))?;

        if let Some(base) = filename.parent()
        {
            config.rules_file = base.join(&config.rules_file);
            config.log.dir = base.join(&config.log.dir);
        }
        Ok(config)
    }
}

impl From<LogLevel> for LevelFilter
{
    fn from(arg: LogLevel) -> LevelFilter
    {
        match arg
        {
            LogLevel::Trace => LevelFilter::TRACE,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Info  => LevelFilter::INFO,
            LogLevel::Warn  => LevelFilter::WARN,
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Off   => LevelFilter::OFF,
        }
    }
}
