use crate::config::RemoteConfig;
use regex::Regex;
use std::collections::{BTreeMap, HashMap};
use std::sync::OnceLock;
use std::time::Duration;
use thiserror::Error;

/// One name to look up, with optional source context to disambiguate it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupItem {
    pub name: String,
    pub context: Option<String>,
}

impl LookupItem {
    pub fn new(name: impl Into<String>, context: Option<String>) -> Self {
        Self {
            name: name.into(),
            context,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LookupRequest {
    pub items: Vec<LookupItem>,
}

/// Import name -> suggested package (`None`: the service knows no package).
/// Names absent from the map got no answer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LookupResponse {
    pub packages: HashMap<String, Option<String>>,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    #[error("remote resolution disabled")]
    Disabled,
    #[error("no API key provided")]
    MissingCredentials,
    #[error("invalid API key: {0}")]
    InvalidCredentials(String),
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("service unavailable: {0}")]
    Unavailable(String),
    #[error("request rejected with HTTP {0}; check your API key and permissions")]
    Unauthorized(u16),
    #[error("quota exceeded (HTTP 429)")]
    QuotaExceeded,
    #[error("request failed with HTTP {status}: {message}")]
    Rejected { status: u16, message: String },
    #[error("could not parse response: {0}")]
    MalformedResponse(String),
}

impl RemoteError {
    /// Worth another attempt
    pub fn is_transient(&self) -> bool {
        matches!(self, RemoteError::Timeout(_) | RemoteError::Unavailable(_))
    }

    /// Further requests in this run would fail the same way
    pub fn aborts_remaining(&self) -> bool {
        !matches!(self, RemoteError::MalformedResponse(_))
    }
}

/// External knowledge source mapping import names to package names
pub trait RemoteLookup: Send + Sync {
    fn lookup(&self, request: &LookupRequest) -> Result<LookupResponse, RemoteError>;
}

/// Answer for a single name
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteAnswer {
    Package(String),
    NoPackage,
    Failed(RemoteError),
}

#[derive(Debug, Default)]
pub struct RemoteOutcome {
    pub answers: BTreeMap<String, RemoteAnswer>,
    /// Number of requests sent
    pub requests: usize,
}

impl RemoteOutcome {
    /// Failed names grouped by failure reason
    pub fn failures(&self) -> BTreeMap<String, Vec<String>> {
        let mut grouped: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (name, answer) in &self.answers {
            if let RemoteAnswer::Failed(e) = answer {
                grouped.entry(e.to_string()).or_default().push(name.clone());
            }
        }
        grouped
    }
}

/// PEP 508 distribution name
pub fn is_valid_package_name(name: &str) -> bool {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN
        .get_or_init(|| {
            Regex::new(r"^[A-Za-z0-9]([A-Za-z0-9._-]*[A-Za-z0-9])?$").expect("valid regex")
        })
        .is_match(name)
}

/// Batches names through a [`RemoteLookup`] with bounded retries.
///
/// A malformed batch answer falls back to one request per name. Errors that
/// would repeat (connectivity, auth, quota) fail every remaining name
/// without further requests.
pub struct RemoteResolver {
    lookup: Box<dyn RemoteLookup>,
    max_attempts: u32,
    batch_size: usize,
}

impl RemoteResolver {
    pub fn new(lookup: Box<dyn RemoteLookup>) -> Self {
        let defaults = RemoteConfig::default();
        Self {
            lookup,
            max_attempts: defaults.max_attempts,
            batch_size: defaults.batch_size,
        }
    }

    pub fn with_config(mut self, config: &RemoteConfig) -> Self {
        self.max_attempts = config.max_attempts.max(1);
        self.batch_size = config.batch_size.max(1);
        self
    }

    pub fn resolve(&self, items: &[LookupItem]) -> RemoteOutcome {
        let mut outcome = RemoteOutcome::default();
        let mut aborted: Option<RemoteError> = None;

        for chunk in items.chunks(self.batch_size) {
            if let Some(ref error) = aborted {
                Self::fail_all(chunk, error, &mut outcome);
                continue;
            }

            match self.call(chunk, &mut outcome) {
                Ok(response) => {
                    let missing = Self::record(chunk, &response, &mut outcome);
                    if !missing.is_empty() {
                        tracing::debug!("{} names missing from batch answer", missing.len());
                        self.resolve_individually(&missing, &mut outcome, &mut aborted);
                    }
                }
                Err(error) if error.aborts_remaining() => {
                    Self::fail_all(chunk, &error, &mut outcome);
                    aborted = Some(error);
                }
                Err(error) => {
                    tracing::debug!("batch lookup failed ({}); querying names one at a time", error);
                    self.resolve_individually(chunk, &mut outcome, &mut aborted);
                }
            }
        }

        outcome
    }

    fn resolve_individually(
        &self,
        items: &[LookupItem],
        outcome: &mut RemoteOutcome,
        aborted: &mut Option<RemoteError>,
    ) {
        for item in items {
            if let Some(ref error) = aborted {
                outcome
                    .answers
                    .insert(item.name.clone(), RemoteAnswer::Failed(error.clone()));
                continue;
            }

            let single = std::slice::from_ref(item);
            match self.call(single, outcome) {
                Ok(response) => {
                    for name in Self::record(single, &response, outcome) {
                        outcome.answers.insert(
                            name.name,
                            RemoteAnswer::Failed(RemoteError::MalformedResponse(
                                "no answer for this name".to_string(),
                            )),
                        );
                    }
                }
                Err(error) => {
                    outcome
                        .answers
                        .insert(item.name.clone(), RemoteAnswer::Failed(error.clone()));
                    if error.aborts_remaining() {
                        *aborted = Some(error);
                    }
                }
            }
        }
    }

    /// Send one request, retrying transient failures
    fn call(
        &self,
        items: &[LookupItem],
        outcome: &mut RemoteOutcome,
    ) -> Result<LookupResponse, RemoteError> {
        let request = LookupRequest {
            items: items.to_vec(),
        };
        let mut attempt = 1;
        loop {
            outcome.requests += 1;
            match self.lookup.lookup(&request) {
                Err(error) if error.is_transient() && attempt < self.max_attempts => {
                    tracing::debug!("attempt {} failed ({}); retrying", attempt, error);
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    /// Store answers for the given items; returns those without an answer
    fn record(
        items: &[LookupItem],
        response: &LookupResponse,
        outcome: &mut RemoteOutcome,
    ) -> Vec<LookupItem> {
        let mut missing = Vec::new();
        for item in items {
            let answer = match response.packages.get(&item.name) {
                Some(Some(package)) => {
                    let package = package.trim();
                    if is_valid_package_name(package) {
                        RemoteAnswer::Package(package.to_string())
                    } else {
                        tracing::debug!("ignoring invalid package name {:?} for {}", package, item.name);
                        RemoteAnswer::NoPackage
                    }
                }
                Some(None) => RemoteAnswer::NoPackage,
                None => {
                    missing.push(item.clone());
                    continue;
                }
            };
            outcome.answers.insert(item.name.clone(), answer);
        }
        missing
    }

    fn fail_all(items: &[LookupItem], error: &RemoteError, outcome: &mut RemoteOutcome) {
        for item in items {
            outcome
                .answers
                .insert(item.name.clone(), RemoteAnswer::Failed(error.clone()));
        }
    }
}
