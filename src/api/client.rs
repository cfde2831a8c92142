use futures::StreamExt;
use reqwest::redirect::Policy;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Maximum response body size (2MB). A feed page, catalog, or profile batch
/// is a few KB; anything near this limit is a misbehaving backend.
const MAX_RESPONSE_SIZE: usize = 2 * 1024 * 1024;

/// Per-request timeout for the structured-query service.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

const MAX_RETRIES: u32 = 3;

/// Errors from the remote structured-query service.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Request timed out after {}s", REQUEST_TIMEOUT.as_secs())]
    Timeout,
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    #[error("Response too large (exceeds {0} bytes)")]
    ResponseTooLarge(usize),
    #[error("Invalid JSON in response: {0}")]
    InvalidJson(#[from] serde_json::Error),
    /// The query executed but the backend reported errors.
    #[error("Query error: {0}")]
    Query(String),
    /// The backend cannot resolve the relationship embed the joined query
    /// path asks for. Distinct from a zero-row success.
    #[error("Backend does not support relationship queries")]
    RelationshipUnsupported,
    #[error("Response missing expected field '{0}'")]
    MissingData(&'static str),
    #[error("Invalid service URL")]
    InvalidUrl,
    #[error("Insecure service URL: HTTPS required (except localhost for testing)")]
    InsecureUrl,
}

impl ApiError {
    /// Returns true if this error is transient and the request should be retried.
    fn is_retryable(&self) -> bool {
        match self {
            ApiError::Timeout | ApiError::Network(_) => true,
            ApiError::HttpStatus(status) => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

/// Shape of a structured-query response: a data object, an errors list, or both.
#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    data: Option<serde_json::Value>,
    #[serde(default)]
    errors: Vec<QueryResponseError>,
}

#[derive(Debug, Deserialize)]
struct QueryResponseError {
    message: String,
}

/// Create a custom redirect policy with loop detection and limited hops.
fn create_redirect_policy() -> Policy {
    Policy::custom(|attempt| {
        if attempt.previous().len() >= 3 {
            return attempt.error("Too many redirects (max 3)");
        }

        let url = attempt.url();
        for prev in attempt.previous() {
            if prev.as_str() == url.as_str() {
                return attempt.error("Redirect loop detected");
            }
        }

        tracing::debug!(
            from = %attempt.previous().last().map(|u| u.as_str()).unwrap_or("initial"),
            to = %url,
            hop = attempt.previous().len() + 1,
            "Following redirect"
        );

        attempt.follow()
    })
}

/// Client for the publishing backend's query and REST endpoints.
///
/// Every request carries the project `apikey` header plus a bearer
/// credential: the session access token when one is configured, otherwise the
/// anonymous key (public reads). Cloning is cheap — the inner reqwest client
/// is reference-counted.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: Url,
    anon_key: SecretString,
    access_token: Option<SecretString>,
}

impl ApiClient {
    /// Build a client for the given service base URL.
    ///
    /// HTTPS is required except for localhost/127.0.0.1 (test servers) —
    /// credentials ride on every request and must not cross plaintext HTTP.
    pub fn new(
        base_url: &str,
        anon_key: SecretString,
        access_token: Option<SecretString>,
    ) -> Result<Self, ApiError> {
        let parsed = Url::parse(base_url).map_err(|_| ApiError::InvalidUrl)?;

        if parsed.scheme() != "https" {
            let is_localhost = matches!(parsed.host_str(), Some("localhost") | Some("127.0.0.1"));
            if parsed.scheme() != "http" || !is_localhost {
                tracing::error!(url = %parsed, "Rejecting non-HTTPS service URL");
                return Err(ApiError::InsecureUrl);
            }
            tracing::warn!(url = %parsed, "Using non-HTTPS service URL (localhost only)");
        }

        let http = reqwest::Client::builder()
            .redirect(create_redirect_policy())
            .pool_max_idle_per_host(4)
            .pool_idle_timeout(Duration::from_secs(30))
            .tcp_keepalive(Duration::from_secs(60))
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            http,
            base_url: parsed,
            anon_key,
            access_token,
        })
    }

    /// Attach `apikey` + bearer credential, falling back to the anonymous key
    /// when no session token is configured.
    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let bearer = self
            .access_token
            .as_ref()
            .unwrap_or(&self.anon_key)
            .expose_secret();
        request
            .header("apikey", self.anon_key.expose_secret())
            .header("Authorization", format!("Bearer {}", bearer))
    }

    fn endpoint(&self, path: &str) -> Result<Url, ApiError> {
        self.base_url.join(path).map_err(|_| ApiError::InvalidUrl)
    }

    /// Execute a collection query and deserialize `data.<root>` into `T`.
    ///
    /// Transient failures (timeout, network, 429/5xx) are retried with
    /// exponential backoff (1s, 2s, 4s); 4xx and query errors fail
    /// immediately.
    pub(crate) async fn query<T: serde::de::DeserializeOwned>(
        &self,
        query: &'static str,
        variables: serde_json::Value,
        root: &'static str,
    ) -> Result<T, ApiError> {
        let mut retry_count = 0;

        let body = loop {
            match self.query_once(query, &variables).await {
                Ok(body) => break body,
                Err(e) if e.is_retryable() && retry_count < MAX_RETRIES => {
                    let delay = 1u64 << retry_count; // 1s, 2s, 4s
                    tracing::debug!(
                        error = %e,
                        retry = retry_count + 1,
                        delay_secs = delay,
                        "Retrying query after transient error"
                    );
                    tokio::time::sleep(Duration::from_secs(delay)).await;
                    retry_count += 1;
                }
                Err(e) => return Err(e),
            }
        };

        let response: QueryResponse = serde_json::from_str(&body)?;

        if let Some(error) = response.errors.first() {
            // pg_graphql reports a missing relationship as an unknown field
            // on the node type; surface that as a typed capability error so
            // callers never confuse it with an empty result.
            let lowered = error.message.to_lowercase();
            if lowered.contains("unknown field") || lowered.contains("unknown relation") {
                tracing::warn!(message = %error.message, "Relationship embed rejected by backend");
                return Err(ApiError::RelationshipUnsupported);
            }
            return Err(ApiError::Query(error.message.clone()));
        }

        let data = response.data.ok_or(ApiError::MissingData("data"))?;
        let payload = data
            .get(root)
            .cloned()
            .ok_or(ApiError::MissingData(root))?;

        Ok(serde_json::from_value(payload)?)
    }

    /// One attempt at the query endpoint; returns the raw body text.
    async fn query_once(
        &self,
        query: &'static str,
        variables: &serde_json::Value,
    ) -> Result<String, ApiError> {
        let url = self.endpoint("graphql/v1")?;
        let request = self
            .authorize(self.http.post(url))
            .json(&serde_json::json!({ "query": query, "variables": variables }));

        let response = tokio::time::timeout(REQUEST_TIMEOUT, request.send())
            .await
            .map_err(|_| ApiError::Timeout)?
            .map_err(ApiError::Network)?;

        if !response.status().is_success() {
            return Err(ApiError::HttpStatus(response.status().as_u16()));
        }

        read_limited_text(response, MAX_RESPONSE_SIZE).await
    }

    /// Execute a keyed REST read (PostgREST style) and deserialize the JSON
    /// array response. Same retry policy as [`Self::query`].
    pub(crate) async fn rest_get<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query_pairs: &[(&str, &str)],
    ) -> Result<T, ApiError> {
        let mut retry_count = 0;

        let body = loop {
            match self.rest_get_once(path, query_pairs).await {
                Ok(body) => break body,
                Err(e) if e.is_retryable() && retry_count < MAX_RETRIES => {
                    let delay = 1u64 << retry_count;
                    tracing::debug!(
                        error = %e,
                        path = path,
                        retry = retry_count + 1,
                        delay_secs = delay,
                        "Retrying REST read after transient error"
                    );
                    tokio::time::sleep(Duration::from_secs(delay)).await;
                    retry_count += 1;
                }
                Err(e) => return Err(e),
            }
        };

        Ok(serde_json::from_str(&body)?)
    }

    async fn rest_get_once(
        &self,
        path: &str,
        query_pairs: &[(&str, &str)],
    ) -> Result<String, ApiError> {
        let mut url = self.endpoint(path)?;
        for (key, value) in query_pairs {
            url.query_pairs_mut().append_pair(key, value);
        }

        let request = self.authorize(self.http.get(url));

        let response = tokio::time::timeout(REQUEST_TIMEOUT, request.send())
            .await
            .map_err(|_| ApiError::Timeout)?
            .map_err(ApiError::Network)?;

        if !response.status().is_success() {
            return Err(ApiError::HttpStatus(response.status().as_u16()));
        }

        read_limited_text(response, MAX_RESPONSE_SIZE).await
    }
}

async fn read_limited_text(
    response: reqwest::Response,
    limit: usize,
) -> Result<String, ApiError> {
    // Fast path: check Content-Length header
    if let Some(len) = response.content_length() {
        if len as usize > limit {
            return Err(ApiError::ResponseTooLarge(limit));
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(ApiError::Network)?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(ApiError::ResponseTooLarge(limit));
        }
        bytes.extend_from_slice(&chunk);
    }

    String::from_utf8(bytes).map_err(|_| ApiError::Query("invalid UTF-8 in response".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_client(uri: &str) -> ApiClient {
        ApiClient::new(uri, SecretString::from("anon-key".to_string()), None).unwrap()
    }

    #[tokio::test]
    async fn test_https_required_for_remote_hosts() {
        let result = ApiClient::new(
            "http://example.com",
            SecretString::from("k".to_string()),
            None,
        );
        assert!(matches!(result, Err(ApiError::InsecureUrl)));
    }

    #[tokio::test]
    async fn test_localhost_http_allowed() {
        let result = ApiClient::new(
            "http://127.0.0.1:9999",
            SecretString::from("k".to_string()),
            None,
        );
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_invalid_url_rejected() {
        let result = ApiClient::new("not a url", SecretString::from("k".to_string()), None);
        assert!(matches!(result, Err(ApiError::InvalidUrl)));
    }

    #[tokio::test]
    async fn test_anonymous_bearer_fallback() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/graphql/v1"))
            .and(header("apikey", "anon-key"))
            .and(header("Authorization", "Bearer anon-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": { "categoriesCollection": { "edges": [] } }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let result: crate::api::types::Collection<crate::api::Category> = client
            .query("query {}", serde_json::json!({}), "categoriesCollection")
            .await
            .unwrap();
        assert!(result.into_nodes().is_empty());
    }

    #[tokio::test]
    async fn test_session_token_preferred_over_anon_key() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("apikey", "anon-key"))
            .and(header("Authorization", "Bearer session-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": { "categoriesCollection": { "edges": [] } }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = ApiClient::new(
            &server.uri(),
            SecretString::from("anon-key".to_string()),
            Some(SecretString::from("session-token".to_string())),
        )
        .unwrap();
        let result: Result<crate::api::types::Collection<crate::api::Category>, _> = client
            .query("query {}", serde_json::json!({}), "categoriesCollection")
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_query_error_surfaced() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "errors": [{ "message": "permission denied for table posts" }]
            })))
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let result: Result<crate::api::types::Collection<crate::api::Post>, _> = client
            .query("query {}", serde_json::json!({}), "postsCollection")
            .await;
        match result {
            Err(ApiError::Query(msg)) => assert!(msg.contains("permission denied")),
            other => panic!("Expected Query error, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn test_unknown_field_is_relationship_unsupported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "errors": [{ "message": "Unknown field 'categories' on type 'posts'" }]
            })))
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let result: Result<crate::api::types::Collection<crate::api::Post>, _> = client
            .query("query {}", serde_json::json!({}), "postsCollection")
            .await;
        assert!(matches!(result, Err(ApiError::RelationshipUnsupported)));
    }

    #[tokio::test]
    async fn test_http_4xx_fails_immediately() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1) // No retries for 4xx
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let result: Result<crate::api::types::Collection<crate::api::Post>, _> = client
            .query("query {}", serde_json::json!({}), "postsCollection")
            .await;
        assert!(matches!(result, Err(ApiError::HttpStatus(401))));
    }

    #[tokio::test]
    async fn test_http_5xx_retries_then_fails() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .expect(4) // Initial request + 3 retries
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let result: Result<crate::api::types::Collection<crate::api::Post>, _> = client
            .query("query {}", serde_json::json!({}), "postsCollection")
            .await;
        assert!(matches!(result, Err(ApiError::HttpStatus(503))));
    }

    #[tokio::test]
    async fn test_5xx_then_success() {
        use wiremock::matchers::any;

        let server = MockServer::start().await;
        Mock::given(any())
            .respond_with(ResponseTemplate::new(500))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(any())
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": { "categoriesCollection": { "edges": [] } }
            })))
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let result: Result<crate::api::types::Collection<crate::api::Category>, _> = client
            .query("query {}", serde_json::json!({}), "categoriesCollection")
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_missing_root_field() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": {}
            })))
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let result: Result<crate::api::types::Collection<crate::api::Post>, _> = client
            .query("query {}", serde_json::json!({}), "postsCollection")
            .await;
        assert!(matches!(
            result,
            Err(ApiError::MissingData("postsCollection"))
        ));
    }

    #[tokio::test]
    async fn test_rest_get_deserializes_array() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/profiles"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                { "id": "a1", "full_name": "Jane", "username": null, "avatar_url": null }
            ])))
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let profiles: Vec<crate::api::Profile> = client
            .rest_get("rest/v1/profiles", &[("select", "id,full_name")])
            .await
            .unwrap();
        assert_eq!(profiles.len(), 1);
        assert_eq!(profiles[0].full_name.as_deref(), Some("Jane"));
    }
}
