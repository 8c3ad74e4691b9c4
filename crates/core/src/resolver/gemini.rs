//! Gemini `generateContent` backend for [`RemoteLookup`].

use super::remote::{LookupItem, LookupRequest, LookupResponse, RemoteError, RemoteLookup};
use crate::config::RemoteConfig;
use regex::Regex;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::OnceLock;
use std::time::Duration;

pub struct GeminiLookup {
    agent: ureq::Agent,
    url: String,
    api_key: String,
    timeout: Duration,
}

impl std::fmt::Debug for GeminiLookup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiLookup")
            .field("url", &self.url)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl GeminiLookup {
    /// Build a client. Credentials are checked here, before any request.
    pub fn from_config(config: &RemoteConfig) -> Result<Self, RemoteError> {
        if !config.enabled {
            return Err(RemoteError::Disabled);
        }
        let api_key = validate_api_key(config.api_key.as_deref())?;
        let agent = ureq::AgentBuilder::new().timeout(config.timeout).build();
        let url = format!(
            "{}/models/{}:generateContent",
            config.endpoint.trim_end_matches('/'),
            config.model
        );

        Ok(Self {
            agent,
            url,
            api_key,
            timeout: config.timeout,
        })
    }

    fn transport_error(&self, error: ureq::Transport) -> RemoteError {
        let timed_out = std::error::Error::source(&error)
            .and_then(|source| source.downcast_ref::<std::io::Error>())
            .map(|io| {
                matches!(
                    io.kind(),
                    std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock
                )
            })
            .unwrap_or(false);

        if timed_out {
            RemoteError::Timeout(self.timeout)
        } else {
            RemoteError::Unavailable(error.to_string())
        }
    }
}

impl RemoteLookup for GeminiLookup {
    fn lookup(&self, request: &LookupRequest) -> Result<LookupResponse, RemoteError> {
        let payload = serde_json::json!({
            "contents": [{
                "role": "user",
                "parts": [{ "text": build_prompt(&request.items) }],
            }],
            "generationConfig": { "responseMimeType": "application/json" },
        });

        tracing::debug!("querying {} for {} names", self.url, request.items.len());
        let response = self
            .agent
            .post(&self.url)
            .set("x-goog-api-key", &self.api_key)
            .send_json(payload)
            .map_err(|error| match error {
                ureq::Error::Status(status, response) => {
                    status_error(status, response.into_string().unwrap_or_default())
                }
                ureq::Error::Transport(transport) => self.transport_error(transport),
            })?;

        let body: GenerateContentResponse = response
            .into_json()
            .map_err(|e| RemoteError::MalformedResponse(e.to_string()))?;

        let text = body
            .candidates
            .into_iter()
            .filter_map(|c| c.content)
            .flat_map(|c| c.parts)
            .find_map(|p| p.text)
            .ok_or_else(|| {
                RemoteError::MalformedResponse("response format was unexpected".to_string())
            })?;

        parse_mapping(&text)
    }
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
}

fn validate_api_key(key: Option<&str>) -> Result<String, RemoteError> {
    let key = key.map(str::trim).unwrap_or_default();
    if key.is_empty() {
        return Err(RemoteError::MissingCredentials);
    }
    if !key.chars().all(|c| c.is_ascii_graphic()) {
        return Err(RemoteError::InvalidCredentials(
            "key contains whitespace or non-ASCII characters".to_string(),
        ));
    }
    Ok(key.to_string())
}

fn status_error(status: u16, body: String) -> RemoteError {
    match status {
        401 | 403 => RemoteError::Unauthorized(status),
        429 => RemoteError::QuotaExceeded,
        500..=599 => RemoteError::Unavailable(format!("HTTP {}", status)),
        _ => RemoteError::Rejected {
            status,
            message: body.chars().take(200).collect(),
        },
    }
}

pub(crate) fn build_prompt(items: &[LookupItem]) -> String {
    let mut prompt = String::from(
        "You are an expert Python developer. For each Python import name below, \
         provide the official package name used with `pip install`. \
         Respond with a single JSON object whose keys are the import names and whose \
         values are the package names. Use null when no package is known for a name.\n\n\
         Import names:\n",
    );
    for item in items {
        match &item.context {
            Some(context) => prompt.push_str(&format!(
                "- {} (seen as: `{}`)\n",
                item.name,
                context.lines().next().unwrap_or_default().trim()
            )),
            None => prompt.push_str(&format!("- {}\n", item.name)),
        }
    }
    prompt
}

/// Pull the JSON object out of model text: a ```json fence if present,
/// otherwise the outermost braces.
pub(crate) fn extract_json_object(text: &str) -> Option<&str> {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    let fence = FENCE.get_or_init(|| {
        Regex::new(r"(?s)```(?:json)?\s*(\{.*?\})\s*```").expect("valid regex")
    });

    if let Some(captures) = fence.captures(text) {
        return captures.get(1).map(|m| m.as_str());
    }

    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (start < end).then(|| &text[start..=end])
}

pub(crate) fn parse_mapping(text: &str) -> Result<LookupResponse, RemoteError> {
    let json = extract_json_object(text).ok_or_else(|| {
        RemoteError::MalformedResponse("could not find a JSON object in the response".to_string())
    })?;

    let object: serde_json::Map<String, serde_json::Value> = serde_json::from_str(json)
        .map_err(|e| RemoteError::MalformedResponse(e.to_string()))?;

    let packages: HashMap<String, Option<String>> = object
        .into_iter()
        .map(|(name, value)| {
            let package = match value {
                serde_json::Value::String(s) if !s.trim().is_empty() => Some(s),
                _ => None,
            };
            (name, package)
        })
        .collect();

    Ok(LookupResponse { packages })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_key_detected_before_network() {
        let config = RemoteConfig::default();
        assert!(matches!(
            GeminiLookup::from_config(&config),
            Err(RemoteError::MissingCredentials)
        ));

        let config = RemoteConfig::default().with_api_key(Some("   ".to_string()));
        assert!(matches!(
            GeminiLookup::from_config(&config),
            Err(RemoteError::MissingCredentials)
        ));
    }

    #[test]
    fn test_disabled_wins_over_key() {
        let config = RemoteConfig::default()
            .with_api_key(Some("AIzaTestKey".to_string()))
            .with_enabled(false);
        assert!(matches!(
            GeminiLookup::from_config(&config),
            Err(RemoteError::Disabled)
        ));
    }

    #[test]
    fn test_invalid_key() {
        let config = RemoteConfig::default().with_api_key(Some("abc def".to_string()));
        assert!(matches!(
            GeminiLookup::from_config(&config),
            Err(RemoteError::InvalidCredentials(_))
        ));
    }

    #[test]
    fn test_valid_key_builds_url() {
        let config = RemoteConfig::default()
            .with_api_key(Some("AIzaTestKey".to_string()))
            .with_endpoint("http://localhost:9/v1beta/")
            .with_model("gemini-test");
        let lookup = GeminiLookup::from_config(&config).unwrap();
        assert_eq!(
            lookup.url,
            "http://localhost:9/v1beta/models/gemini-test:generateContent"
        );
        assert!(!format!("{:?}", lookup).contains("AIzaTestKey"));
    }

    #[test]
    fn test_extract_json_from_fence() {
        let text = "Here you go:\n```json\n{\"cv2\": \"opencv-python\"}\n```\nDone.";
        assert_eq!(extract_json_object(text), Some("{\"cv2\": \"opencv-python\"}"));
    }

    #[test]
    fn test_extract_json_bare() {
        let text = "Sure! {\"a\": {\"b\": 1}} trailing";
        assert_eq!(extract_json_object(text), Some("{\"a\": {\"b\": 1}}"));
        assert_eq!(extract_json_object("no json here"), None);
        assert_eq!(extract_json_object("} {"), None);
    }

    #[test]
    fn test_parse_mapping() {
        let response =
            parse_mapping("{\"cv2\": \"opencv-python\", \"mystery\": null, \"odd\": 3}").unwrap();

        assert_eq!(
            response.packages.get("cv2"),
            Some(&Some("opencv-python".to_string()))
        );
        assert_eq!(response.packages.get("mystery"), Some(&None));
        assert_eq!(response.packages.get("odd"), Some(&None));
    }

    #[test]
    fn test_parse_mapping_malformed() {
        assert!(matches!(
            parse_mapping("I don't know"),
            Err(RemoteError::MalformedResponse(_))
        ));
        assert!(matches!(
            parse_mapping("[\"cv2\"]"),
            Err(RemoteError::MalformedResponse(_))
        ));
    }

    #[test]
    fn test_status_errors() {
        assert_eq!(status_error(403, String::new()), RemoteError::Unauthorized(403));
        assert_eq!(status_error(429, String::new()), RemoteError::QuotaExceeded);
        assert!(status_error(503, String::new()).is_transient());
        assert!(!status_error(400, "bad".to_string()).is_transient());
    }

    #[test]
    fn test_prompt_includes_context() {
        let prompt = build_prompt(&[
            LookupItem::new("cv2", Some("import cv2".to_string())),
            LookupItem::new("bs4", None),
        ]);
        assert!(prompt.contains("- cv2 (seen as: `import cv2`)"));
        assert!(prompt.contains("- bs4\n"));
    }

    #[test]
    fn test_unreachable_endpoint_is_unavailable() {
        let config = RemoteConfig::default()
            .with_api_key(Some("AIzaTestKey".to_string()))
            .with_endpoint("http://127.0.0.1:9/v1beta")
            .with_timeout(Duration::from_secs(2));
        let lookup = GeminiLookup::from_config(&config).unwrap();

        let result = lookup.lookup(&LookupRequest {
            items: vec![LookupItem::new("foobar123", None)],
        });
        let error = result.unwrap_err();
        assert!(error.is_transient(), "{:?}", error);
    }
}
