use crate::error::{FetchError, FetchErrorKind};
use crate::hass::HomeAssistant;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

const FETCH_TIMEOUT: Duration = Duration::from_secs(5);

/// An endpoint on (or proxied through) the Home Assistant server
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HttpEndpoint {
    pub endpoint: String,
    #[serde(default)]
    pub sign: bool,
}

impl HttpEndpoint {
    pub fn new(endpoint: impl Into<String>) -> Self {
        HttpEndpoint {
            endpoint: endpoint.into(),
            sign: false,
        }
    }

    pub fn signed(endpoint: impl Into<String>) -> Self {
        HttpEndpoint {
            endpoint: endpoint.into(),
            sign: true,
        }
    }
}

#[derive(Deserialize)]
struct SignedPath {
    path: String,
}

/// Ask Home Assistant to sign a path so it can be fetched without a bearer token.
pub async fn sign_path(hass: &dyn HomeAssistant, path: &str) -> Result<String, FetchError> {
    let response = hass
        .send_message(json!({ "type": "auth/sign_path", "path": path }))
        .await
        .map_err(|e| FetchError::new(path, FetchErrorKind::Sign).with_source(e))?;
    let signed: SignedPath = serde_json::from_value(response)
        .map_err(|e| FetchError::new(path, FetchErrorKind::Sign).with_source(e))?;
    Ok(signed.path)
}

/// Sign (optionally), fetch, parse and validate JSON from an endpoint.
#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpFetcher {
    pub fn new() -> Self {
        HttpFetcher {
            client: Client::new(),
        }
    }

    /// Resolve an endpoint to an absolute URL, signing it if requested.
    pub async fn resolve_url(
        &self,
        hass: &dyn HomeAssistant,
        endpoint: &HttpEndpoint,
    ) -> Result<String, FetchError> {
        let path = if endpoint.sign {
            sign_path(hass, &endpoint.endpoint).await?
        } else {
            endpoint.endpoint.clone()
        };

        if url::Url::parse(&path).is_ok() {
            Ok(path)
        } else {
            Ok(hass.hass_url(&path))
        }
    }

    pub async fn fetch_json<T: DeserializeOwned>(
        &self,
        hass: &dyn HomeAssistant,
        endpoint: &HttpEndpoint,
    ) -> Result<T, FetchError> {
        let url = self.resolve_url(hass, endpoint).await?;
        let name = endpoint.endpoint.as_str();
        debug!("[HttpFetcher] GET {}", name);

        let response = self
            .client
            .get(&url)
            .timeout(FETCH_TIMEOUT)
            .send()
            .await
            .map_err(|e| FetchError::new(name, FetchErrorKind::Network).with_source(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::new(name, FetchErrorKind::Status(status.as_u16())));
        }

        let body = response
            .text()
            .await
            .map_err(|e| FetchError::new(name, FetchErrorKind::Network).with_source(e))?;

        parse_and_validate(name, &body)
    }
}

/// Parse a response body as JSON and validate it against `T`.
pub fn parse_and_validate<T: DeserializeOwned>(endpoint: &str, body: &str) -> Result<T, FetchError> {
    let value: Value = serde_json::from_str(body)
        .map_err(|e| FetchError::new(endpoint, FetchErrorKind::Json).with_source(e))?;
    serde_json::from_value(value)
        .map_err(|e| FetchError::new(endpoint, FetchErrorKind::Validation).with_source(e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HassError;
    use crate::testing::MockHomeAssistant;

    #[derive(Debug, Deserialize)]
    struct Streams {
        producers: Vec<Value>,
    }

    #[test]
    fn test_parse_stages() {
        let err = parse_and_validate::<Streams>("/api/streams", "{not json").unwrap_err();
        assert_eq!(err.kind, FetchErrorKind::Json);

        let err = parse_and_validate::<Streams>("/api/streams", r#"{"consumers": []}"#).unwrap_err();
        assert_eq!(err.kind, FetchErrorKind::Validation);

        let ok = parse_and_validate::<Streams>("/api/streams", r#"{"producers": [{}]}"#).unwrap();
        assert_eq!(ok.producers.len(), 1);
    }

    #[tokio::test]
    async fn test_signed_url_resolution() {
        let hass = MockHomeAssistant::new().with_response(
            "auth/sign_path",
            json!({"path": "/api/streams?authSig=abc"}),
        );
        let url = HttpFetcher::new()
            .resolve_url(&hass, &HttpEndpoint::signed("/api/streams"))
            .await
            .unwrap();
        assert_eq!(url, "http://hass.local:8123/api/streams?authSig=abc");
    }

    #[tokio::test]
    async fn test_sign_failure_is_typed() {
        let hass = MockHomeAssistant::new();
        hass.respond_with("auth/sign_path", |_| {
            Err(HassError::Connection("closed".to_string()))
        });

        let err = HttpFetcher::new()
            .fetch_json::<Value>(&hass, &HttpEndpoint::signed("/api/streams"))
            .await
            .unwrap_err();
        assert_eq!(err.kind, FetchErrorKind::Sign);
        assert_eq!(err.endpoint, "/api/streams");
    }
}
