use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::transport::LocalCommand;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DebuggerFlavor {
    #[default]
    Gdb,
    Lldb,
}

impl DebuggerFlavor {
    pub fn default_program(self) -> &'static str {
        match self {
            Self::Gdb => "gdb",
            Self::Lldb => "lldb-mi",
        }
    }

    pub fn default_args(self) -> Vec<String> {
        match self {
            Self::Gdb => vec!["-q".to_owned(), "--interpreter=mi2".to_owned()],
            Self::Lldb => Vec::new(),
        }
    }
}

/// A command run during session bring-up, after symbols are loaded.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetupCommand {
    pub text: String,
    #[serde(default)]
    pub ignore_failures: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DebuggerConfig {
    pub flavor: DebuggerFlavor,
    /// Debugger binary; defaults per flavor.
    pub path: Option<PathBuf>,
    /// Replaces the flavor's default arguments when set.
    pub args: Option<Vec<String>>,
    /// Appended after `args`.
    pub extra_args: Vec<String>,
    /// Merged over the inherited environment.
    pub env: BTreeMap<String, String>,
    pub frame_filters: bool,
    pub setup_commands: Vec<SetupCommand>,
    /// Source path prefix rewrites, build path to local path.
    pub source_file_map: BTreeMap<String, String>,
}

impl Default for DebuggerConfig {
    fn default() -> Self {
        Self {
            flavor: DebuggerFlavor::default(),
            path: None,
            args: None,
            extra_args: Vec::new(),
            env: BTreeMap::new(),
            frame_filters: true,
            setup_commands: Vec::new(),
            source_file_map: BTreeMap::new(),
        }
    }
}

impl DebuggerConfig {
    pub fn program(&self) -> PathBuf {
        self.path
            .clone()
            .unwrap_or_else(|| PathBuf::from(self.flavor.default_program()))
    }

    /// Debugger arguments followed by `trailing` (e.g. an executable to debug).
    pub fn argv(&self, trailing: &[String]) -> Vec<String> {
        let mut argv = self
            .args
            .clone()
            .unwrap_or_else(|| self.flavor.default_args());
        argv.extend(self.extra_args.iter().cloned());
        argv.extend(trailing.iter().cloned());
        argv
    }

    pub fn local_command(&self, cwd: Option<&Path>, trailing: &[String]) -> LocalCommand {
        LocalCommand {
            program: self.program(),
            args: self.argv(trailing),
            cwd: cwd.map(Path::to_path_buf),
            env: self.env.clone(),
        }
    }

    /// The debugger invocation as a POSIX shell command line, for remote hosts.
    pub fn shell_command(&self, trailing: &[String]) -> String {
        let program = self.program().to_string_lossy().into_owned();
        std::iter::once(program)
            .chain(self.argv(trailing))
            .map(|word| shell_quote(&word))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

fn shell_quote(word: &str) -> String {
    let plain = !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:@%+,".contains(c));
    if plain {
        word.to_owned()
    } else {
        format!("'{}'", word.replace('\'', r"'\''"))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// A simple level (`info`, `debug`, ...) or an `EnvFilter` directive string.
    #[serde(default = "LoggingConfig::default_level")]
    pub level: String,

    #[serde(default)]
    pub json: bool,
}

impl LoggingConfig {
    fn default_level() -> String {
        "info".to_owned()
    }

    fn normalize_level_directives(input: &str) -> String {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Self::default_level();
        }

        match trimmed.to_ascii_lowercase().as_str() {
            "trace" => "trace".to_owned(),
            "debug" => "debug".to_owned(),
            "info" => "info".to_owned(),
            "warn" | "warning" => "warn".to_owned(),
            "error" => "error".to_owned(),
            _ => trimmed.to_owned(),
        }
    }

    fn config_env_filter(&self) -> tracing_subscriber::EnvFilter {
        let directives = Self::normalize_level_directives(&self.level);
        tracing_subscriber::EnvFilter::try_new(directives).unwrap_or_else(|_| {
            tracing_subscriber::EnvFilter::default()
                .add_directive(tracing_subscriber::filter::LevelFilter::INFO.into())
        })
    }

    /// The configured level with `RUST_LOG` directives appended.
    pub fn env_filter(&self) -> tracing_subscriber::EnvFilter {
        let env_directives = std::env::var("RUST_LOG")
            .ok()
            .map(|value| value.trim().to_owned())
            .filter(|value| !value.is_empty());

        let config_directives = Self::normalize_level_directives(&self.level);

        match env_directives {
            Some(env_directives) => {
                let combined = format!("{config_directives},{env_directives}");
                tracing_subscriber::EnvFilter::try_new(combined)
                    .or_else(|_| tracing_subscriber::EnvFilter::try_new(env_directives))
                    .unwrap_or_else(|_| self.config_env_filter())
            }
            None => self.config_env_filter(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
            json: false,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// How long `stop`/`detach` wait for the debugger to exit before killing it.
    pub quit_grace_period_ms: u64,
}

impl SessionConfig {
    pub fn quit_grace_period(&self) -> Duration {
        Duration::from_millis(self.quit_grace_period_ms)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            quit_grace_period_ms: 1000,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GdbMiConfig {
    pub debugger: DebuggerConfig,
    pub logging: LoggingConfig,
    pub session: SessionConfig,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse toml config: {0}")]
    Toml(String),
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        // The default `Display` quotes the offending source line; keep only the message.
        ConfigError::Toml(err.message().to_owned())
    }
}

impl GdbMiConfig {
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::load_from_str(&text)
    }

    pub fn load_from_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }
}

/// Install a global subscriber writing to stderr. Returns false if one was
/// already installed.
pub fn init_tracing(config: &LoggingConfig) -> bool {
    use tracing_subscriber::layer::SubscriberExt as _;
    use tracing_subscriber::Layer as _;

    let layer: Box<dyn tracing_subscriber::Layer<_> + Send + Sync> = if config.json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_ansi(false)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(false)
            .boxed()
    };

    let subscriber = tracing_subscriber::registry()
        .with(config.env_filter())
        .with(layer);
    tracing::subscriber::set_global_default(subscriber).is_ok()
}
