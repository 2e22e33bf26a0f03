//! HTTP access and the rule that turns a registry response into an
//! existence signal.

use std::time::Duration;

use serde::Deserialize;
use tracing::debug;
use ureq::Agent;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// How a registry signals that a name exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum Signal {
    /// `404` means missing, any `2xx` means the name exists.
    StatusNot404,
    /// Solr search body: `response.numFound > 0` means the name exists.
    MavenNumFound,
}

impl Signal {
    /// Whether classification needs the response body.
    #[must_use]
    pub fn needs_body(self) -> bool {
        matches!(self, Self::MavenNumFound)
    }
}

/// Errors a single probe can produce.
///
/// None of these ever leave a checker: the dispatcher turns each one into
/// an [`Outcome::Failed`](crate::dispatch::Outcome::Failed) carrying the
/// [`Display`](std::fmt::Display) text.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ProbeError {
    /// Connection, DNS, TLS or timeout failure.
    #[error("network error: {source}")]
    Network {
        /// Underlying transport error.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// The registry answered with a status that is neither success nor 404.
    #[error("unexpected HTTP status {status}")]
    UnexpectedStatus {
        /// The status code received.
        status: u16,
    },
    /// The body could not be parsed or lacked the expected field.
    #[error("malformed response: {0}")]
    MalformedResponse(String),
    /// The lookup URL could not be assembled for this name.
    #[error("cannot build request URL: {0}")]
    InvalidUrl(String),
    /// The probe panicked before producing a result.
    #[error("probe panicked: {0}")]
    Panicked(String),
    /// The worker thread for the probe could not be started.
    #[error("could not start probe: {0}")]
    Spawn(#[source] std::io::Error),
}

impl ProbeError {
    /// Wrap any transport-level error as [`ProbeError::Network`].
    pub fn network<E>(err: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::Network { source: err.into() }
    }
}

/// Status and (optionally) body of a registry response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// HTTP status code.
    pub status: u16,
    /// Response body; empty unless it was requested.
    pub body: String,
}

impl Response {
    /// A response with no body.
    #[must_use]
    pub fn status(status: u16) -> Self {
        Self {
            status,
            body: String::new(),
        }
    }

    /// A response carrying a body.
    #[must_use]
    pub fn with_body(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }
}

/// Issues GET requests on behalf of the registry probes.
///
/// Implementations must report every HTTP status as an `Ok` [`Response`];
/// only failures to obtain a response at all are errors.
pub trait Transport: Send + Sync {
    /// Fetch `url`, reading the body only when `read_body` is set.
    ///
    /// # Errors
    ///
    /// Returns [`ProbeError::Network`] when no response could be obtained.
    fn get(&self, url: &str, read_body: bool) -> Result<Response, ProbeError>;
}

/// An HTTP client for registry queries, shared read-only by every probe.
///
/// ```no_run
/// use name_avail::probe::Client;
///
/// let client = Client::new();
/// ```
#[derive(Debug, Clone)]
pub struct Client {
    agent: Agent,
}

impl Client {
    /// Create a client with the default per-request timeout.
    #[must_use]
    pub fn new() -> Self {
        Self::with_timeout(REQUEST_TIMEOUT)
    }

    /// Create a client whose requests give up after `timeout`.
    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Self {
        let config = Agent::config_builder()
            .timeout_global(Some(timeout))
            .http_status_as_error(false)
            .user_agent(concat!(
                env!("CARGO_PKG_NAME"),
                "/",
                env!("CARGO_PKG_VERSION"),
                " (",
                env!("CARGO_PKG_REPOSITORY"),
                ")"
            ))
            .build();
        Self {
            agent: Agent::new_with_config(config),
        }
    }
}

impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for Client {
    fn get(&self, url: &str, read_body: bool) -> Result<Response, ProbeError> {
        let mut response = self.agent.get(url).call().map_err(ProbeError::network)?;
        let status = response.status().as_u16();
        let body = if read_body {
            let bytes = response.body_mut().read_to_vec().map_err(body_error)?;
            String::from_utf8(bytes).map_err(|e| ProbeError::MalformedResponse(e.to_string()))?
        } else {
            String::new()
        };
        debug!(url, status, "registry responded");
        Ok(Response { status, body })
    }
}

// A body that stops arriving is a network failure; one that arrives but
// cannot be taken as-is (too large, bad encoding) is malformed.
fn body_error(err: ureq::Error) -> ProbeError {
    match err {
        ureq::Error::Io(_) | ureq::Error::Timeout(_) => ProbeError::network(err),
        other => ProbeError::MalformedResponse(other.to_string()),
    }
}

#[derive(Deserialize)]
struct SolrSearch {
    response: SolrResult,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SolrResult {
    num_found: u64,
}

/// Decide whether a response says the name exists.
///
/// Total over every status/body pair: 404 is `false`, a 2xx is `true`
/// (for Maven, whatever the body reports), and everything else is an error.
///
/// ```
/// use name_avail::probe::{Response, Signal, classify};
///
/// assert!(!classify(Signal::StatusNot404, &Response::status(404)).unwrap());
/// assert!(classify(Signal::StatusNot404, &Response::status(200)).unwrap());
/// assert!(classify(Signal::StatusNot404, &Response::status(503)).is_err());
/// ```
///
/// # Errors
///
/// [`ProbeError::UnexpectedStatus`] for any status outside the rule, and
/// [`ProbeError::MalformedResponse`] when a Maven body cannot be read.
pub fn classify(signal: Signal, response: &Response) -> Result<bool, ProbeError> {
    let success = (200..300).contains(&response.status);
    match signal {
        Signal::StatusNot404 => match response.status {
            404 => Ok(false),
            _ if success => Ok(true),
            status => Err(ProbeError::UnexpectedStatus { status }),
        },
        Signal::MavenNumFound => {
            if !success {
                return Err(ProbeError::UnexpectedStatus {
                    status: response.status,
                });
            }
            let search: SolrSearch = serde_json::from_str(&response.body)
                .map_err(|e| ProbeError::MalformedResponse(e.to_string()))?;
            Ok(search.response.num_found > 0)
        }
    }
}
