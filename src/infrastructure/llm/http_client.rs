use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use thiserror::Error;

/// Stream type for HTTP response bodies
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, TransportError>> + Send>>;

/// Failure below the HTTP status level
///
/// Messages never contain the request URL, so query-string credentials do
/// not leak into errors or logs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,

    #[error("{0}")]
    Network(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Timeout
        } else {
            Self::Network(error.without_url().to_string())
        }
    }
}

/// Fully buffered HTTP response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Result of opening a streaming request
///
/// Non-2xx responses are buffered so the caller can map the vendor error.
pub enum StreamingResponse {
    Stream(ByteStream),
    Error(HttpResponse),
}

/// Trait for HTTP client operations (for mocking)
#[async_trait]
pub trait HttpClientTrait: Send + Sync + std::fmt::Debug {
    async fn get(&self, url: &str, headers: Vec<(&str, &str)>)
        -> Result<HttpResponse, TransportError>;

    async fn post_json(
        &self,
        url: &str,
        headers: Vec<(&str, &str)>,
        body: &serde_json::Value,
    ) -> Result<HttpResponse, TransportError>;

    async fn post_json_stream(
        &self,
        url: &str,
        headers: Vec<(&str, &str)>,
        body: &serde_json::Value,
    ) -> Result<StreamingResponse, TransportError>;
}

/// Real HTTP client using reqwest
///
/// Unary calls are bounded by the whole-request timeout. Streaming calls are
/// bounded per read, so a long but live stream is never cut off.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpClient {
    pub fn with_timeout(timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .connect_timeout(timeout)
            .read_timeout(timeout)
            .build()?;

        Ok(Self { client, timeout })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn apply_headers(
        mut request: reqwest::RequestBuilder,
        headers: Vec<(&str, &str)>,
    ) -> reqwest::RequestBuilder {
        for (key, value) in headers {
            request = request.header(key, value);
        }
        request
    }

    async fn buffer(response: reqwest::Response) -> Result<HttpResponse, TransportError> {
        let status = response.status().as_u16();
        let body = response.text().await?;
        Ok(HttpResponse { status, body })
    }
}

#[async_trait]
impl HttpClientTrait for HttpClient {
    async fn get(
        &self,
        url: &str,
        headers: Vec<(&str, &str)>,
    ) -> Result<HttpResponse, TransportError> {
        let request = Self::apply_headers(self.client.get(url), headers);
        let response = request.timeout(self.timeout).send().await?;
        Self::buffer(response).await
    }

    async fn post_json(
        &self,
        url: &str,
        headers: Vec<(&str, &str)>,
        body: &serde_json::Value,
    ) -> Result<HttpResponse, TransportError> {
        let request = Self::apply_headers(self.client.post(url), headers);
        let response = request.json(body).timeout(self.timeout).send().await?;
        Self::buffer(response).await
    }

    async fn post_json_stream(
        &self,
        url: &str,
        headers: Vec<(&str, &str)>,
        body: &serde_json::Value,
    ) -> Result<StreamingResponse, TransportError> {
        let request = Self::apply_headers(self.client.post(url), headers);
        let response = request.json(body).send().await?;

        if !response.status().is_success() {
            return Ok(StreamingResponse::Error(Self::buffer(response).await?));
        }

        let stream = response
            .bytes_stream()
            .map(|result| result.map_err(TransportError::from));

        Ok(StreamingResponse::Stream(Box::pin(stream)))
    }
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use futures::stream;
    use std::collections::HashMap;
    use std::sync::RwLock;

    /// A request seen by the mock
    #[derive(Debug, Clone)]
    pub struct RecordedRequest {
        pub method: &'static str,
        pub url: String,
        pub headers: Vec<(String, String)>,
        pub body: Option<serde_json::Value>,
    }

    impl RecordedRequest {
        pub fn header(&self, name: &str) -> Option<&str> {
            self.headers
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(name))
                .map(|(_, v)| v.as_str())
        }
    }

    #[derive(Debug)]
    pub struct MockHttpClient {
        responses: RwLock<HashMap<String, HttpResponse>>,
        stream_responses: RwLock<HashMap<String, Vec<Result<Bytes, TransportError>>>>,
        errors: RwLock<HashMap<String, TransportError>>,
        requests: RwLock<Vec<RecordedRequest>>,
    }

    impl MockHttpClient {
        pub fn new() -> Self {
            Self {
                responses: RwLock::new(HashMap::new()),
                stream_responses: RwLock::new(HashMap::new()),
                errors: RwLock::new(HashMap::new()),
                requests: RwLock::new(Vec::new()),
            }
        }

        /// Canned 200 response with a JSON body
        pub fn with_response(self, url: impl Into<String>, response: serde_json::Value) -> Self {
            self.with_status(url, 200, response.to_string())
        }

        /// Canned response with an arbitrary status and raw body
        pub fn with_status(self, url: impl Into<String>, status: u16, body: impl Into<String>) -> Self {
            self.responses
                .write()
                .unwrap()
                .insert(url.into(), HttpResponse::new(status, body));
            self
        }

        /// Canned 200 stream delivering `chunks` in order
        pub fn with_stream_response(self, url: impl Into<String>, chunks: Vec<Bytes>) -> Self {
            self.stream_responses
                .write()
                .unwrap()
                .insert(url.into(), chunks.into_iter().map(Ok).collect());
            self
        }

        /// Canned stream that fails with `error` after delivering `chunks`
        pub fn with_broken_stream(
            self,
            url: impl Into<String>,
            chunks: Vec<Bytes>,
            error: TransportError,
        ) -> Self {
            let items = chunks
                .into_iter()
                .map(Ok)
                .chain(std::iter::once(Err(error)))
                .collect();
            self.stream_responses
                .write()
                .unwrap()
                .insert(url.into(), items);
            self
        }

        /// Transport failure before any response
        pub fn with_error(self, url: impl Into<String>, error: TransportError) -> Self {
            self.errors.write().unwrap().insert(url.into(), error);
            self
        }

        pub fn requests(&self) -> Vec<RecordedRequest> {
            self.requests.read().unwrap().clone()
        }

        pub fn last_request(&self) -> Option<RecordedRequest> {
            self.requests.read().unwrap().last().cloned()
        }

        fn record(
            &self,
            method: &'static str,
            url: &str,
            headers: &[(&str, &str)],
            body: Option<&serde_json::Value>,
        ) {
            self.requests.write().unwrap().push(RecordedRequest {
                method,
                url: url.to_string(),
                headers: headers
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
                body: body.cloned(),
            });
        }

        fn canned(&self, url: &str) -> Result<HttpResponse, TransportError> {
            if let Some(error) = self.errors.read().unwrap().get(url) {
                return Err(error.clone());
            }

            Ok(self
                .responses
                .read()
                .unwrap()
                .get(url)
                .cloned()
                .unwrap_or_else(|| HttpResponse::new(404, format!("No mock response for {}", url))))
        }
    }

    impl Default for MockHttpClient {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl HttpClientTrait for MockHttpClient {
        async fn get(
            &self,
            url: &str,
            headers: Vec<(&str, &str)>,
        ) -> Result<HttpResponse, TransportError> {
            self.record("GET", url, &headers, None);
            self.canned(url)
        }

        async fn post_json(
            &self,
            url: &str,
            headers: Vec<(&str, &str)>,
            body: &serde_json::Value,
        ) -> Result<HttpResponse, TransportError> {
            self.record("POST", url, &headers, Some(body));
            self.canned(url)
        }

        async fn post_json_stream(
            &self,
            url: &str,
            headers: Vec<(&str, &str)>,
            body: &serde_json::Value,
        ) -> Result<StreamingResponse, TransportError> {
            self.record("POST", url, &headers, Some(body));

            if let Some(items) = self.stream_responses.read().unwrap().get(url).cloned() {
                return Ok(StreamingResponse::Stream(Box::pin(stream::iter(items))));
            }

            self.canned(url).map(StreamingResponse::Error)
        }
    }
}
