use super::{Outcome, Probe, ProbeFactory};
use crate::{
    error::{Error, Result},
    protocol::WorkerId,
};
use core::time::Duration;
use reqwest::{Client, Url};
use serde_json::{Map, Value};

/// JSON field the candidate is sent in.
pub const DEFAULT_PAYLOAD_FIELD: &str = "code";

/// JSON field of the response holding the match flag.
pub const DEFAULT_MATCH_FIELD: &str = "found";

/// Per-request timeout. A request that times out counts as a failure.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Largest response body read before the response is deemed malformed.
pub const MAX_RESPONSE_BYTES: usize = 64 * 1024;

/// Where and how candidates are sent.
#[derive(Clone, Debug)]
pub struct ProbeConfig {
    pub target: Url,
    pub payload_field: String,
    pub match_field: String,
    pub timeout: Duration,
}

impl ProbeConfig {
    /// Parses `target` and fills in the default field names and timeout.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if `target` is not an `http` or
    /// `https` URL.
    pub fn new(target: &str) -> Result<Self> {
        let target = Url::parse(target)
            .map_err(|e| Error::invalid_config(format!("invalid target {target:?}: {e}")))?;
        if !matches!(target.scheme(), "http" | "https") {
            return Err(Error::invalid_config(format!(
                "target scheme must be http or https, got {:?}",
                target.scheme()
            )));
        }

        Ok(Self {
            target,
            payload_field: DEFAULT_PAYLOAD_FIELD.to_string(),
            match_field: DEFAULT_MATCH_FIELD.to_string(),
            timeout: DEFAULT_TIMEOUT,
        })
    }

    #[must_use]
    pub fn with_payload_field(mut self, field: impl Into<String>) -> Self {
        self.payload_field = field.into();
        self
    }

    #[must_use]
    pub fn with_match_field(mut self, field: impl Into<String>) -> Self {
        self.match_field = field.into();
        self
    }

    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Probes candidates by `POST`ing `{ "<payload_field>": candidate }` as JSON
/// and reading a boolean `<match_field>` from the JSON response.
///
/// One `HttpProbe` is one pooled [`reqwest::Client`]; keep-alive connections
/// are reused across the lanes of the worker that owns it.
pub struct HttpProbe {
    client: Client,
    target: Url,
    payload_field: String,
    match_field: String,
}

impl HttpProbe {
    /// Builds a client keeping up to `lanes` idle connections to the target.
    ///
    /// # Errors
    ///
    /// Returns the underlying [`reqwest::Error`] if the TLS backend or client
    /// cannot be initialised.
    pub fn new(config: &ProbeConfig, lanes: usize) -> reqwest::Result<Self> {
        let client = Client::builder()
            .pool_max_idle_per_host(lanes)
            .timeout(config.timeout)
            .build()?;

        Ok(Self {
            client,
            target: config.target.clone(),
            payload_field: config.payload_field.clone(),
            match_field: config.match_field.clone(),
        })
    }

    fn payload(&self, candidate: &str) -> Value {
        let mut body = Map::with_capacity(1);
        body.insert(
            self.payload_field.clone(),
            Value::String(candidate.to_string()),
        );
        Value::Object(body)
    }
}

impl Probe for HttpProbe {
    async fn probe(&self, candidate: &str) -> Outcome {
        let mut response = match self
            .client
            .post(self.target.clone())
            .json(&self.payload(candidate))
            .send()
            .await
        {
            Ok(response) => response,
            Err(_e) => {
                #[cfg(feature = "tracing")]
                tracing::debug!("Probe for {candidate:?} failed: {_e}");
                return Outcome::Failure;
            }
        };

        if response
            .content_length()
            .is_some_and(|len| len > MAX_RESPONSE_BYTES as u64)
        {
            #[cfg(feature = "tracing")]
            tracing::warn!("Response for {candidate:?} exceeds {MAX_RESPONSE_BYTES} bytes");
            return Outcome::Malformed;
        }

        // The connection can still drop while the body streams in; no
        // complete response was received in that case.
        let mut body = Vec::new();
        loop {
            match response.chunk().await {
                Ok(Some(chunk)) => {
                    if body.len() + chunk.len() > MAX_RESPONSE_BYTES {
                        #[cfg(feature = "tracing")]
                        tracing::warn!(
                            "Response for {candidate:?} exceeds {MAX_RESPONSE_BYTES} bytes"
                        );
                        return Outcome::Malformed;
                    }
                    body.extend_from_slice(&chunk);
                }
                Ok(None) => break,
                Err(_e) => {
                    #[cfg(feature = "tracing")]
                    tracing::debug!("Reading response for {candidate:?} failed: {_e}");
                    return Outcome::Failure;
                }
            }
        }

        let outcome = classify(&body, &self.match_field);
        if outcome == Outcome::Malformed {
            #[cfg(feature = "tracing")]
            tracing::warn!(
                "Response for {candidate:?} has no boolean `{}`: {}",
                self.match_field,
                String::from_utf8_lossy(&body[..body.len().min(256)])
            );
        }
        outcome
    }
}

/// Interprets a received response body.
///
/// The body must be a JSON object whose `match_field` is a boolean; anything
/// else is [`Outcome::Malformed`].
pub(crate) fn classify(body: &[u8], match_field: &str) -> Outcome {
    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(fields)) => match fields.get(match_field) {
            Some(Value::Bool(matched)) => Outcome::Success { matched: *matched },
            _ => Outcome::Malformed,
        },
        _ => Outcome::Malformed,
    }
}

/// [`ProbeFactory`] handing every worker its own [`HttpProbe`].
#[derive(Clone, Debug)]
pub struct HttpProbeFactory {
    config: ProbeConfig,
}

impl HttpProbeFactory {
    pub const fn new(config: ProbeConfig) -> Self {
        Self { config }
    }

    pub const fn config(&self) -> &ProbeConfig {
        &self.config
    }
}

impl ProbeFactory for HttpProbeFactory {
    type Probe = HttpProbe;

    fn build(&self, worker: WorkerId, lanes: usize) -> Result<HttpProbe> {
        HttpProbe::new(&self.config, lanes).map_err(|e| Error::ProbeInit {
            worker,
            reason: e.to_string(),
        })
    }
}
