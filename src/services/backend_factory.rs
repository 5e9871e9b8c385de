//! Backend selection and driver construction.
//!
//! ```text
//! backend = "sqlite" | "neo4j" | "falkordb"  ──> that driver
//! backend = "auto"
//!   ├── neo4j configured and reachable     ──> Neo4j
//!   ├── falkordb configured and reachable  ──> FalkorDB
//!   └── otherwise                          ──> fallback (SQLite)
//! ```
//!
//! Reachability is a TCP connect bounded by `connect_timeout_ms`. In `auto`
//! mode a native driver that is reachable but cannot be built or connected
//! (missing cargo feature, bad credentials, schema failure) degrades to the fallback driver with a
//! warning; an explicitly configured backend surfaces the error.

use crate::config::{BackendKind, FalkorDbSettings, MemoryGraphConfig, Neo4jSettings};
use crate::storage::{CypherDriver, FallbackDriver, GraphDriver, Neo4jHttpTransport};
use crate::Result;
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;

const NEO4J_DEFAULT_PORT: u16 = 7474;
const REDIS_DEFAULT_PORT: u16 = 6379;

/// Creates graph drivers from configuration.
pub struct BackendFactory;

impl BackendFactory {
    /// Resolves the backend to use, probing native backends in `auto` mode.
    #[must_use]
    pub fn select(config: &MemoryGraphConfig) -> BackendKind {
        if config.backend != BackendKind::Auto {
            return config.backend;
        }
        let timeout = config.connect_timeout();
        if let Some(neo4j) = &config.neo4j {
            if probe(&neo4j.uri, NEO4J_DEFAULT_PORT, timeout) {
                return BackendKind::Neo4j;
            }
            tracing::debug!(uri = %neo4j.uri, "Neo4j not reachable");
        }
        if let Some(falkordb) = &config.falkordb {
            if probe(&falkordb.url, REDIS_DEFAULT_PORT, timeout) {
                return BackendKind::FalkorDb;
            }
            tracing::debug!(url = %falkordb.url, "FalkorDB not reachable");
        }
        BackendKind::Sqlite
    }

    /// Instantiates the driver for `kind` without connecting it.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Validation`] for malformed URIs, or for `FalkorDB`
    /// when the `falkordb` feature is disabled.
    pub fn create(config: &MemoryGraphConfig, kind: BackendKind) -> Result<Arc<dyn GraphDriver>> {
        match kind {
            BackendKind::Auto => Self::create(config, Self::select(config)),
            BackendKind::Sqlite => Ok(fallback_driver(config)),
            BackendKind::Neo4j => {
                let settings = config.neo4j.clone().unwrap_or_default();
                neo4j_driver(config, &settings)
            },
            BackendKind::FalkorDb => {
                let settings = config.falkordb.clone().unwrap_or_default();
                falkordb_driver(config, &settings)
            },
        }
    }

    /// Selects, creates, and connects a driver.
    ///
    /// # Errors
    ///
    /// Returns the driver's connection or schema error. In `auto` mode only
    /// fallback failures surface.
    pub fn connect(config: &MemoryGraphConfig) -> Result<Arc<dyn GraphDriver>> {
        let kind = Self::select(config);
        let connected = Self::create(config, kind).and_then(|driver| {
            driver.connect()?;
            Ok(driver)
        });
        match connected {
            Ok(driver) => {
                log_selection(kind, config.backend);
                Ok(driver)
            },
            Err(err) if config.backend == BackendKind::Auto && kind != BackendKind::Sqlite => {
                tracing::warn!(
                    backend = kind.as_str(),
                    error = %err,
                    "Native backend reachable but unusable, using fallback"
                );
                let fallback = fallback_driver(config);
                fallback.connect()?;
                log_selection(BackendKind::Sqlite, config.backend);
                Ok(fallback)
            },
            Err(err) => Err(err),
        }
    }
}

fn log_selection(kind: BackendKind, requested: BackendKind) {
    tracing::info!(
        backend = kind.as_str(),
        requested = requested.as_str(),
        "Selected graph backend"
    );
    metrics::counter!("graph_backend_selected_total", "backend" => kind.as_str()).increment(1);
}

fn fallback_driver(config: &MemoryGraphConfig) -> Arc<dyn GraphDriver> {
    Arc::new(FallbackDriver::from_settings(&config.sqlite, config.retry.clone()))
}

fn neo4j_driver(config: &MemoryGraphConfig, settings: &Neo4jSettings) -> Result<Arc<dyn GraphDriver>> {
    let transport = Neo4jHttpTransport::new(settings, config.connect_timeout())?;
    Ok(Arc::new(
        CypherDriver::new(transport).with_retry(config.retry.clone()),
    ))
}

#[cfg(feature = "falkordb")]
fn falkordb_driver(
    config: &MemoryGraphConfig,
    settings: &FalkorDbSettings,
) -> Result<Arc<dyn GraphDriver>> {
    let transport = crate::storage::FalkorDbTransport::new(settings, config.connect_timeout())?;
    Ok(Arc::new(
        CypherDriver::new(transport).with_retry(config.retry.clone()),
    ))
}

#[cfg(not(feature = "falkordb"))]
fn falkordb_driver(
    _config: &MemoryGraphConfig,
    _settings: &FalkorDbSettings,
) -> Result<Arc<dyn GraphDriver>> {
    Err(crate::Error::Validation(
        "FalkorDB support requires the `falkordb` feature".to_string(),
    ))
}

/// Returns true if a TCP connection to the URL's host and port succeeds
/// within `timeout`.
fn probe(url: &str, default_port: u16, timeout: Duration) -> bool {
    let Ok(parsed) = reqwest::Url::parse(url) else {
        tracing::warn!(url, "Unparseable backend URL, skipping probe");
        return false;
    };
    let Some(host) = parsed.host_str() else {
        return false;
    };
    let port = parsed.port_or_known_default().unwrap_or(default_port);
    let Ok(addrs) = (host, port).to_socket_addrs() else {
        return false;
    };
    addrs
        .into_iter()
        .any(|addr| TcpStream::connect_timeout(&addr, timeout).is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    fn unreachable_config() -> MemoryGraphConfig {
        MemoryGraphConfig::in_memory()
            .with_backend(BackendKind::Auto)
            .with_neo4j(Neo4jSettings {
                uri: "http://127.0.0.1:1".to_string(),
                ..Neo4jSettings::default()
            })
            .with_falkordb(FalkorDbSettings {
                url: "redis://127.0.0.1:1".to_string(),
                ..FalkorDbSettings::default()
            })
    }

    #[test]
    fn test_probe_detects_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let timeout = Duration::from_millis(500);
        assert!(probe(&format!("http://127.0.0.1:{port}"), 80, timeout));
        assert!(!probe("not a url", 80, timeout));
    }

    #[test]
    fn test_auto_falls_back_when_nothing_reachable() {
        let config = unreachable_config();
        assert_eq!(BackendFactory::select(&config), BackendKind::Sqlite);

        let driver = BackendFactory::connect(&config).unwrap();
        assert_eq!(driver.backend_name(), "sqlite");
        assert!(driver.is_connected());
    }

    #[test]
    fn test_explicit_backend_is_not_probed() {
        let config = unreachable_config().with_backend(BackendKind::Neo4j);
        assert_eq!(BackendFactory::select(&config), BackendKind::Neo4j);
        let driver = BackendFactory::create(&config, BackendKind::Neo4j).unwrap();
        assert_eq!(driver.backend_name(), "neo4j");
        assert!(!driver.is_connected());
    }

    #[cfg(not(feature = "falkordb"))]
    #[test]
    fn test_falkordb_requires_feature() {
        let config = MemoryGraphConfig::in_memory();
        let err = BackendFactory::create(&config, BackendKind::FalkorDb)
            .err()
            .unwrap();
        assert!(err.is_validation());
    }

    #[cfg(not(feature = "falkordb"))]
    #[test]
    fn test_auto_falls_back_when_reachable_falkordb_is_not_compiled_in() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let mut config = unreachable_config().with_falkordb(FalkorDbSettings {
            url: format!("redis://127.0.0.1:{port}"),
            ..FalkorDbSettings::default()
        });
        config.neo4j = None;
        assert_eq!(BackendFactory::select(&config), BackendKind::FalkorDb);

        let driver = BackendFactory::connect(&config).unwrap();
        assert_eq!(driver.backend_name(), "sqlite");
        assert!(driver.is_connected());
    }

    #[cfg(not(feature = "falkordb"))]
    #[test]
    fn test_explicit_falkordb_without_feature_surfaces_error() {
        let config = MemoryGraphConfig::in_memory().with_backend(BackendKind::FalkorDb);
        let err = BackendFactory::connect(&config).err().unwrap();
        assert!(err.is_validation());
    }
}
