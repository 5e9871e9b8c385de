//! Neo4j transport over the HTTP transactional Cypher endpoint.

use super::{CypherDialect, CypherRow, CypherTransport};
use crate::config::Neo4jSettings;
use crate::models::Properties;
use crate::{Error, Result};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{Value, json};
use std::time::Duration;

const BACKEND: &str = "neo4j";

/// Upper bound on one statement round trip.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Runs each statement as a single-request transaction
/// (`POST {uri}/db/{database}/tx/commit`) with basic auth.
pub struct Neo4jHttpTransport {
    client: reqwest::blocking::Client,
    endpoint: String,
    user: String,
    password: SecretString,
}

#[derive(Debug, Deserialize)]
struct TxResponse {
    #[serde(default)]
    results: Vec<TxResult>,
    #[serde(default)]
    errors: Vec<TxError>,
}

#[derive(Debug, Deserialize)]
struct TxResult {
    #[serde(default)]
    data: Vec<TxRow>,
}

#[derive(Debug, Deserialize)]
struct TxRow {
    row: CypherRow,
}

#[derive(Debug, Deserialize)]
struct TxError {
    code: String,
    message: String,
}

impl Neo4jHttpTransport {
    /// Creates a transport from settings.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] for a malformed URI and
    /// [`Error::Connection`] if the HTTP client cannot be built.
    pub fn new(settings: &Neo4jSettings, connect_timeout: Duration) -> Result<Self> {
        let endpoint = format!(
            "{}/db/{}/tx/commit",
            settings.uri.trim_end_matches('/'),
            settings.database
        );
        reqwest::Url::parse(&endpoint)
            .map_err(|e| Error::Validation(format!("invalid Neo4j URI '{}': {e}", settings.uri)))?;

        let client = reqwest::blocking::Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| Error::Connection {
                backend: BACKEND.to_string(),
                cause: e.to_string(),
            })?;

        Ok(Self {
            client,
            endpoint,
            user: settings.user.clone(),
            password: settings.password.clone(),
        })
    }

    /// The transactional endpoint URL.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

fn request_error(err: &reqwest::Error) -> Error {
    if err.is_timeout() {
        Error::Timeout {
            operation: "neo4j_request".to_string(),
            after_ms: u64::try_from(REQUEST_TIMEOUT.as_millis()).unwrap_or(u64::MAX),
        }
    } else if err.is_connect() || err.is_request() {
        Error::Connection {
            backend: BACKEND.to_string(),
            cause: err.to_string(),
        }
    } else {
        Error::OperationFailed {
            operation: "neo4j_request".to_string(),
            cause: err.to_string(),
        }
    }
}

fn statement_error(err: &TxError) -> Error {
    if err.code.ends_with("ConstraintValidationFailed") {
        Error::Duplicate(err.message.clone())
    } else if err.code.starts_with("Neo.TransientError") {
        Error::Connection {
            backend: BACKEND.to_string(),
            cause: format!("{}: {}", err.code, err.message),
        }
    } else {
        Error::OperationFailed {
            operation: "neo4j_cypher".to_string(),
            cause: format!("{}: {}", err.code, err.message),
        }
    }
}

/// Extracts the rows of the first statement, or its first error.
fn rows_from_response(response: TxResponse) -> Result<Vec<CypherRow>> {
    if let Some(err) = response.errors.first() {
        return Err(statement_error(err));
    }
    Ok(response
        .results
        .into_iter()
        .next()
        .map(|result| result.data.into_iter().map(|data| data.row).collect())
        .unwrap_or_default())
}

impl CypherTransport for Neo4jHttpTransport {
    fn dialect(&self) -> CypherDialect {
        CypherDialect::Neo4j
    }

    fn run(&self, statement: &str, params: &Properties) -> Result<Vec<CypherRow>> {
        let body = json!({
            "statements": [{
                "statement": statement,
                "parameters": Value::Object(params.clone()),
                "resultDataContents": ["row"],
            }]
        });

        let response = self
            .client
            .post(&self.endpoint)
            .basic_auth(&self.user, Some(self.password.expose_secret()))
            .json(&body)
            .send()
            .map_err(|e| {
                tracing::debug!(backend = BACKEND, error = %e, "Neo4j request failed");
                request_error(&e)
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            let cause = format!("HTTP {status}: {body}");
            return Err(if status.is_server_error() {
                Error::Connection {
                    backend: BACKEND.to_string(),
                    cause,
                }
            } else {
                Error::OperationFailed {
                    operation: "neo4j_request".to_string(),
                    cause,
                }
            });
        }

        let payload: TxResponse = response.json().map_err(|e| Error::OperationFailed {
            operation: "neo4j_response".to_string(),
            cause: e.to_string(),
        })?;
        rows_from_response(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(body: &str) -> Result<Vec<CypherRow>> {
        rows_from_response(serde_json::from_str(body).unwrap())
    }

    #[test]
    fn test_rows_from_response() {
        let rows = parse(
            r#"{"results":[{"columns":["n.id","c"],"data":[
                {"row":["m1",2],"meta":[null,null]},
                {"row":["m2",3],"meta":[null,null]}
            ]}],"errors":[]}"#,
        )
        .unwrap();
        assert_eq!(rows, vec![vec![json!("m1"), json!(2)], vec![json!("m2"), json!(3)]]);

        assert!(parse(r#"{"results":[],"errors":[]}"#).unwrap().is_empty());
    }

    #[test]
    fn test_statement_errors_are_classified() {
        let duplicate = parse(
            r#"{"results":[],"errors":[{"code":"Neo.ClientError.Schema.ConstraintValidationFailed","message":"Node(1) already exists"}]}"#,
        )
        .unwrap_err();
        assert!(matches!(duplicate, Error::Duplicate(_)));

        let transient = parse(
            r#"{"results":[],"errors":[{"code":"Neo.TransientError.Transaction.DeadlockDetected","message":"deadlock"}]}"#,
        )
        .unwrap_err();
        assert!(transient.is_retryable());

        let syntax = parse(
            r#"{"results":[],"errors":[{"code":"Neo.ClientError.Statement.SyntaxError","message":"bad"}]}"#,
        )
        .unwrap_err();
        assert!(matches!(syntax, Error::OperationFailed { .. }));
    }

    #[test]
    fn test_endpoint_from_settings() {
        let settings = Neo4jSettings {
            uri: "http://localhost:7474/".to_string(),
            ..Neo4jSettings::default()
        };
        let transport = Neo4jHttpTransport::new(&settings, Duration::from_secs(1)).unwrap();
        assert_eq!(transport.endpoint(), "http://localhost:7474/db/neo4j/tx/commit");

        let bad = Neo4jSettings {
            uri: "not a uri".to_string(),
            ..Neo4jSettings::default()
        };
        assert!(Neo4jHttpTransport::new(&bad, Duration::from_secs(1)).is_err());
    }
}
