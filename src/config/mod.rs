//! Configuration management.
//!
//! Configuration is read from a TOML file and then overridden by
//! `MEMORYGRAPH_*` environment variables:
//!
//! | Variable | Field |
//! |----------|-------|
//! | `MEMORYGRAPH_BACKEND` | `backend` (`auto`, `sqlite`, `neo4j`, `falkordb`) |
//! | `MEMORYGRAPH_CONNECT_TIMEOUT_MS` | `connect_timeout_ms` |
//! | `MEMORYGRAPH_SQLITE_PATH` | `sqlite.path` |
//! | `MEMORYGRAPH_NEO4J_URI` / `_USER` / `_PASSWORD` / `_DATABASE` | `neo4j.*` |
//! | `MEMORYGRAPH_FALKORDB_URL` / `_GRAPH` | `falkordb.*` |
//! | `MEMORYGRAPH_PREVENT_CYCLES` | `relationships.prevent_cycles` |
//! | `MEMORYGRAPH_DECAY_INTERVAL_SECS` | `decay.interval_secs` |
//! | `MEMORYGRAPH_LOG_FORMAT` | `logging.format` |

use crate::observability::{LogFormat, LoggingConfig};
use crate::storage::resilience::RetryPolicy;
use crate::{Error, Result};
use secrecy::SecretString;
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Path value selecting an in-memory `SQLite` database.
pub const IN_MEMORY_PATH: &str = ":memory:";

/// Which storage engine to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Probe native backends in priority order, else fall back.
    #[default]
    Auto,
    /// The embedded fallback driver.
    Sqlite,
    /// Neo4j over the HTTP transactional endpoint.
    Neo4j,
    /// `FalkorDB` over the Redis protocol.
    #[serde(alias = "falkor")]
    FalkorDb,
}

impl BackendKind {
    /// Returns the backend kind as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Sqlite => "sqlite",
            Self::Neo4j => "neo4j",
            Self::FalkorDb => "falkordb",
        }
    }

    /// Parses a backend kind from a string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "auto" => Some(Self::Auto),
            "sqlite" | "fallback" => Some(Self::Sqlite),
            "neo4j" => Some(Self::Neo4j),
            "falkordb" | "falkor" => Some(Self::FalkorDb),
            _ => None,
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Fallback driver settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SqliteSettings {
    /// Database file, or `:memory:`.
    pub path: PathBuf,
}

impl Default for SqliteSettings {
    fn default() -> Self {
        Self {
            path: default_data_dir().join("memorygraph.db"),
        }
    }
}

impl SqliteSettings {
    /// Returns true when the database lives in memory.
    #[must_use]
    pub fn is_in_memory(&self) -> bool {
        self.path.as_os_str() == IN_MEMORY_PATH
    }
}

/// Neo4j connection settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Neo4jSettings {
    /// HTTP base URI, e.g. `http://localhost:7474`.
    pub uri: String,
    /// User name.
    pub user: String,
    /// Password.
    #[serde(deserialize_with = "secret_string_serde::deserialize")]
    pub password: SecretString,
    /// Database name.
    pub database: String,
}

impl Default for Neo4jSettings {
    fn default() -> Self {
        Self {
            uri: "http://localhost:7474".to_string(),
            user: "neo4j".to_string(),
            password: SecretString::from(String::new()),
            database: "neo4j".to_string(),
        }
    }
}

/// `FalkorDB` connection settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct FalkorDbSettings {
    /// Redis URL, e.g. `redis://localhost:6379`.
    pub url: String,
    /// Graph key.
    pub graph: String,
}

impl Default for FalkorDbSettings {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379".to_string(),
            graph: "memorygraph".to_string(),
        }
    }
}

/// Relationship engine settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RelationshipSettings {
    /// Reject relationships that would close a directed cycle.
    pub prevent_cycles: bool,
    /// Fraction of the remaining headroom gained per reinforcement.
    pub reinforcement_factor: f64,
}

impl Default for RelationshipSettings {
    fn default() -> Self {
        Self {
            prevent_cycles: true,
            reinforcement_factor: 0.1,
        }
    }
}

/// Decay sweep settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct DecaySettings {
    /// Seconds between scheduled sweeps.
    pub interval_secs: u64,
    /// Relationships processed per batch.
    pub batch_size: usize,
    /// Relationships reinforced within this many days are left alone.
    pub window_days: u32,
    /// Strength below which a relationship is flagged for review.
    pub review_threshold: f64,
}

impl Default for DecaySettings {
    fn default() -> Self {
        Self {
            interval_secs: 3_600,
            batch_size: 500,
            window_days: 7,
            review_threshold: 0.1,
        }
    }
}

impl DecaySettings {
    /// Interval between sweeps.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

/// Main configuration.
#[derive(Debug, Clone)]
pub struct MemoryGraphConfig {
    /// Backend selection.
    pub backend: BackendKind,
    /// Bound on connection establishment and reachability probes.
    pub connect_timeout_ms: u64,
    /// Fallback driver settings.
    pub sqlite: SqliteSettings,
    /// Neo4j settings; probing skips Neo4j when absent.
    pub neo4j: Option<Neo4jSettings>,
    /// `FalkorDB` settings; probing skips `FalkorDB` when absent.
    pub falkordb: Option<FalkorDbSettings>,
    /// Retry policy for native drivers and fallback writes.
    pub retry: RetryPolicy,
    /// Relationship engine settings.
    pub relationships: RelationshipSettings,
    /// Decay settings.
    pub decay: DecaySettings,
    /// Logging settings.
    pub logging: LoggingConfig,
}

impl Default for MemoryGraphConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Auto,
            connect_timeout_ms: 5_000,
            sqlite: SqliteSettings::default(),
            neo4j: None,
            falkordb: None,
            retry: RetryPolicy::default(),
            relationships: RelationshipSettings::default(),
            decay: DecaySettings::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// On-disk configuration file layout.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    /// Backend selection.
    pub backend: Option<BackendKind>,
    /// Connection timeout in milliseconds.
    pub connect_timeout_ms: Option<u64>,
    /// Fallback driver section.
    pub sqlite: Option<SqliteSettings>,
    /// Neo4j section.
    pub neo4j: Option<Neo4jSettings>,
    /// `FalkorDB` section.
    pub falkordb: Option<FalkorDbSettings>,
    /// Retry section.
    pub retry: Option<RetryPolicy>,
    /// Relationship section.
    pub relationships: Option<RelationshipSettings>,
    /// Decay section.
    pub decay: Option<DecaySettings>,
    /// Logging section.
    pub logging: Option<LoggingConfig>,
}

impl MemoryGraphConfig {
    /// Creates a default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Configuration for an in-memory fallback store.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            backend: BackendKind::Sqlite,
            sqlite: SqliteSettings {
                path: PathBuf::from(IN_MEMORY_PATH),
            },
            ..Self::default()
        }
    }

    /// Configuration for a fallback store at `path`.
    #[must_use]
    pub fn sqlite(path: impl Into<PathBuf>) -> Self {
        Self {
            backend: BackendKind::Sqlite,
            sqlite: SqliteSettings { path: path.into() },
            ..Self::default()
        }
    }

    /// Sets the backend kind.
    #[must_use]
    pub const fn with_backend(mut self, backend: BackendKind) -> Self {
        self.backend = backend;
        self
    }

    /// Enables or disables cycle prevention.
    #[must_use]
    pub const fn with_prevent_cycles(mut self, prevent: bool) -> Self {
        self.relationships.prevent_cycles = prevent;
        self
    }

    /// Sets the Neo4j settings.
    #[must_use]
    pub fn with_neo4j(mut self, settings: Neo4jSettings) -> Self {
        self.neo4j = Some(settings);
        self
    }

    /// Sets the `FalkorDB` settings.
    #[must_use]
    pub fn with_falkordb(mut self, settings: FalkorDbSettings) -> Self {
        self.falkordb = Some(settings);
        self
    }

    /// Connection timeout as a duration.
    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Builds a configuration from a parsed file.
    #[must_use]
    pub fn from_config_file(file: ConfigFile) -> Self {
        let defaults = Self::default();
        Self {
            backend: file.backend.unwrap_or(defaults.backend),
            connect_timeout_ms: file.connect_timeout_ms.unwrap_or(defaults.connect_timeout_ms),
            sqlite: file.sqlite.map_or(defaults.sqlite, |mut sqlite| {
                sqlite.path = expand_home(&sqlite.path);
                sqlite
            }),
            neo4j: file.neo4j,
            falkordb: file.falkordb,
            retry: file.retry.unwrap_or(defaults.retry),
            relationships: file.relationships.unwrap_or(defaults.relationships),
            decay: file.decay.unwrap_or(defaults.decay),
            logging: file.logging.unwrap_or(defaults.logging),
        }
    }

    /// Parses configuration from TOML text.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let file: ConfigFile = toml::from_str(contents).map_err(|e| Error::OperationFailed {
            operation: "parse_config_file".to_string(),
            cause: e.to_string(),
        })?;
        Ok(Self::from_config_file(file))
    }

    /// Loads configuration from a file.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| Error::OperationFailed {
            operation: "read_config_file".to_string(),
            cause: e.to_string(),
        })?;
        Self::from_toml_str(&contents)
    }

    /// Loads configuration from the default location, then applies environment overrides.
    ///
    /// Checks `<config dir>/memorygraph/config.toml`; uses defaults when no
    /// file is found or it fails to parse.
    #[must_use]
    pub fn load_default() -> Self {
        let from_file = directories::BaseDirs::new()
            .map(|dirs| dirs.config_dir().join("memorygraph").join("config.toml"))
            .filter(|path| path.exists())
            .and_then(|path| match Self::load_from_file(&path) {
                Ok(config) => Some(config),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Ignoring unreadable config file");
                    None
                },
            });
        from_file.unwrap_or_default().with_env_overrides()
    }

    /// Applies `MEMORYGRAPH_*` environment variable overrides.
    #[must_use]
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    /// Applies overrides using `lookup` in place of the process environment.
    #[must_use]
    pub fn with_overrides_from<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(kind) = lookup("MEMORYGRAPH_BACKEND").and_then(|v| BackendKind::parse(&v)) {
            self.backend = kind;
        }
        if let Some(ms) = lookup("MEMORYGRAPH_CONNECT_TIMEOUT_MS").and_then(|v| v.parse().ok()) {
            self.connect_timeout_ms = ms;
        }
        if let Some(path) = lookup("MEMORYGRAPH_SQLITE_PATH") {
            self.sqlite.path = expand_home(Path::new(&path));
        }

        if let Some(uri) = lookup("MEMORYGRAPH_NEO4J_URI") {
            self.neo4j.get_or_insert_with(Neo4jSettings::default).uri = uri;
        }
        if let Some(neo4j) = self.neo4j.as_mut() {
            if let Some(user) = lookup("MEMORYGRAPH_NEO4J_USER") {
                neo4j.user = user;
            }
            if let Some(password) = lookup("MEMORYGRAPH_NEO4J_PASSWORD") {
                neo4j.password = SecretString::from(password);
            }
            if let Some(database) = lookup("MEMORYGRAPH_NEO4J_DATABASE") {
                neo4j.database = database;
            }
        }

        if let Some(url) = lookup("MEMORYGRAPH_FALKORDB_URL") {
            self.falkordb.get_or_insert_with(FalkorDbSettings::default).url = url;
        }
        if let Some(falkordb) = self.falkordb.as_mut()
            && let Some(graph) = lookup("MEMORYGRAPH_FALKORDB_GRAPH")
        {
            falkordb.graph = graph;
        }

        if let Some(prevent) = lookup("MEMORYGRAPH_PREVENT_CYCLES").and_then(|v| parse_bool(&v)) {
            self.relationships.prevent_cycles = prevent;
        }
        if let Some(secs) = lookup("MEMORYGRAPH_DECAY_INTERVAL_SECS").and_then(|v| v.parse().ok()) {
            self.decay.interval_secs = secs;
        }
        if let Some(format) = lookup("MEMORYGRAPH_LOG_FORMAT").and_then(|v| LogFormat::parse(&v)) {
            self.logging.format = format;
        }
        self
    }
}

/// Default directory for persistent data.
#[must_use]
pub fn default_data_dir() -> PathBuf {
    directories::BaseDirs::new().map_or_else(
        || PathBuf::from(".memorygraph"),
        |dirs| dirs.data_local_dir().join("memorygraph"),
    )
}

fn expand_home(path: &Path) -> PathBuf {
    let Ok(rest) = path.strip_prefix("~") else {
        return path.to_path_buf();
    };
    directories::BaseDirs::new().map_or_else(|| path.to_path_buf(), |dirs| dirs.home_dir().join(rest))
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Serde support for `SecretString` fields.
mod secret_string_serde {
    use secrecy::SecretString;
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<SecretString, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(SecretString::from(s))
    }
}
