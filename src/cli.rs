use std::path::PathBuf;
use std::sync::LazyLock;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use regex::Regex;

use crate::autosave::DEFAULT_DEBOUNCE_MS;
use crate::client::DEFAULT_TIMEOUT_MS;
use crate::metadata::{PKG_DESCRIPTION, PKG_NAME, PKG_VERSION};
use crate::notify::DEFAULT_NOTIFICATION_MS;
use crate::session::SessionConfig;
use crate::storage::{CACHE_KEY, FileCache};

pub const DEFAULT_API_URL: &str = "http://localhost:8000";

static HTTP_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^https?://[^\s/?#]+").expect("url pattern is valid"));

#[derive(Parser, Debug, Clone)]
#[command(name = PKG_NAME)]
#[command(version = PKG_VERSION)]
#[command(about = PKG_DESCRIPTION, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub settings: Settings,

    #[command(subcommand)]
    pub command: Option<Command>,
}

impl Cli {
    pub fn command(&self) -> Command {
        self.command.clone().unwrap_or(Command::Shell)
    }
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Interactive quest log editor with auto-save (default)
    Shell,
    /// List quest logs
    List,
    /// Print one quest log
    Show { id: String },
    /// Write a quest log to a .quest file
    Export {
        id: String,
        /// Output path (defaults to `<log name>.quest` in the current directory)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Add a quest log from a .quest file
    Import { path: PathBuf },
    /// List server-side quest log templates
    Templates,
    /// Copy a template into a new quest log
    UseTemplate { id: String },
    /// Delete a quest log
    Delete {
        id: String,
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
    /// Print version information
    Version,
}

#[derive(Args, Debug, Clone)]
pub struct Settings {
    /// Base URL of the quest log server
    #[arg(long, global = true, env = "QUEST_LOG_API_URL", default_value = DEFAULT_API_URL)]
    pub api_url: String,

    /// Local backup file (defaults to the user data directory)
    #[arg(long, global = true, env = "QUEST_LOG_CACHE_FILE")]
    pub cache_file: Option<PathBuf>,

    /// Quiet period before an auto-save fires
    #[arg(
        long,
        global = true,
        env = "QUEST_LOG_DEBOUNCE_MS",
        default_value_t = DEFAULT_DEBOUNCE_MS
    )]
    pub debounce_ms: u64,

    /// How long notifications stay visible
    #[arg(
        long,
        global = true,
        env = "QUEST_LOG_NOTIFICATION_MS",
        default_value_t = DEFAULT_NOTIFICATION_MS
    )]
    pub notification_ms: u64,

    /// Give up on a server request after this long
    #[arg(
        long,
        global = true,
        env = "QUEST_LOG_TIMEOUT_MS",
        default_value_t = DEFAULT_TIMEOUT_MS
    )]
    pub timeout_ms: u64,

    /// Skip the server and work from the local backup only
    #[arg(long, global = true, env = "QUEST_LOG_OFFLINE", default_value_t = false)]
    pub offline: bool,
}

impl Settings {
    pub fn default_settings() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            cache_file: None,
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            notification_ms: DEFAULT_NOTIFICATION_MS,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            offline: false,
        }
    }

    /// Validate CLI/environment-derived settings.
    pub fn validate(&self) -> Result<(), String> {
        if !HTTP_URL.is_match(self.api_url.trim()) {
            return Err(format!(
                "Invalid QUEST_LOG_API_URL '{}': expected an http(s) URL",
                self.api_url
            ));
        }
        if self.debounce_ms == 0 {
            return Err("QUEST_LOG_DEBOUNCE_MS must be greater than zero".to_string());
        }
        if self.notification_ms == 0 {
            return Err("QUEST_LOG_NOTIFICATION_MS must be greater than zero".to_string());
        }
        if self.timeout_ms == 0 {
            return Err("QUEST_LOG_TIMEOUT_MS must be greater than zero".to_string());
        }
        if self
            .cache_file
            .as_ref()
            .is_some_and(|p| p.as_os_str().is_empty())
        {
            return Err("QUEST_LOG_CACHE_FILE cannot be empty".to_string());
        }
        Ok(())
    }

    pub fn cache_path(&self) -> PathBuf {
        self.cache_file
            .clone()
            .or_else(FileCache::default_path)
            .unwrap_or_else(|| PathBuf::from(format!("{CACHE_KEY}.json")))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            debounce: Duration::from_millis(self.debounce_ms),
            notification_ttl: Duration::from_millis(self.notification_ms),
        }
    }
}
