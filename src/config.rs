use crate::epub::{DEFAULT_TIMEOUT, LoadOptions};
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Package captured web articles into EPUB files.
#[derive(Parser, Debug, Clone)]
#[command(name = "web2epub")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to config file.
    #[arg(short, long, env = "WEB2EPUB_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Subcommand to run.
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Build an EPUB from a content descriptor (JSON).
    Build {
        /// Descriptor file.
        descriptor: PathBuf,

        /// Output file (defaults to the book name in the output directory).
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Drop resources that fail to load instead of aborting.
        #[arg(long, conflicts_with = "strict")]
        allow_errors: bool,

        /// Abort on the first resource that fails to load.
        #[arg(long)]
        strict: bool,

        /// Time budget for loading all resources, in milliseconds.
        #[arg(long)]
        timeout_ms: Option<u64>,

        /// Package without fetching remote resources.
        #[arg(long)]
        skip_resources: bool,
    },

    /// Create a default config file.
    Init {
        /// Force overwrite existing config.
        #[arg(short, long)]
        force: bool,
    },
}

/// Main configuration from TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Resource loading configuration.
    #[serde(default)]
    pub loader: LoaderConfig,

    /// Output configuration.
    #[serde(default)]
    pub output: OutputConfig,
}

/// Resource loading configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoaderConfig {
    /// Drop resources that fail to load.
    #[serde(default = "default_allow_errors")]
    pub allow_errors: bool,

    /// Budget for the whole batch in milliseconds (0 = default).
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Budget for a single request in milliseconds.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// User agent sent with resource requests.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            allow_errors: default_allow_errors(),
            timeout_ms: default_timeout_ms(),
            request_timeout_ms: default_request_timeout_ms(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_allow_errors() -> bool {
    true
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT.as_millis() as u64
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

fn default_user_agent() -> String {
    format!("web2epub/{}", env!("CARGO_PKG_VERSION"))
}

impl LoaderConfig {
    /// Loader options, with CLI overrides applied.
    pub fn load_options(&self, allow_errors: Option<bool>, timeout_ms: Option<u64>) -> LoadOptions {
        LoadOptions {
            allow_errors: allow_errors.unwrap_or(self.allow_errors),
            timeout: Duration::from_millis(timeout_ms.unwrap_or(self.timeout_ms)),
        }
    }

    /// Per-request timeout.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Output configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Directory finished books are written to.
    #[serde(default = "default_output_dir")]
    pub directory: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: default_output_dir(),
        }
    }
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(".")
}

impl Config {
    /// Load configuration from file.
    pub fn load(path: &Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            crate::error::AppError::Config(format!("Failed to read config file: {}", e))
        })?;

        Self::parse(&content)
    }

    /// Parse configuration from TOML text.
    pub fn parse(content: &str) -> crate::error::Result<Self> {
        toml::from_str(content).map_err(|e| {
            crate::error::AppError::Config(format!("Failed to parse config file: {}", e))
        })
    }

    /// Find config file in default locations.
    pub fn find_config_file() -> Option<PathBuf> {
        let candidates = [
            PathBuf::from("web2epub.toml"),
            PathBuf::from("config.toml"),
            dirs::config_dir()
                .map(|p| p.join("web2epub").join("config.toml"))
                .unwrap_or_default(),
        ];

        candidates
            .into_iter()
            .find(|p| !p.as_os_str().is_empty() && p.exists())
    }

    /// Generate default config file content.
    pub fn generate_default() -> String {
        r#"# web2epub configuration

[loader]
# Drop images that cannot be fetched instead of failing the whole book
allow_errors = true
# Time budget for fetching all images, in milliseconds (0 = 120000)
timeout_ms = 120000
# Time budget for a single request, in milliseconds
request_timeout_ms = 30000
# user_agent = "web2epub"

[output]
directory = "."
"#
        .to_string()
    }
}
