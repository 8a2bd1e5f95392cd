//! Immutable description of one HTTP exchange and the builder that produces it.
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use serde::Serialize;
use url::Url;

use crate::{Error, Result};

/// HTTP method of a [`Request`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
        }
    }
}

/// Payload of a request together with its content type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestBody {
    content_type: String,
    content: Vec<u8>,
}

impl RequestBody {
    /// Content type used for JSON payloads.
    pub const JSON_CONTENT_TYPE: &'static str = "application/json; charset=utf-8";

    pub fn new(content_type: impl Into<String>, content: impl Into<Vec<u8>>) -> RequestBody {
        RequestBody {
            content_type: content_type.into(),
            content: content.into(),
        }
    }

    /// Serialize `payload` to compact JSON text.
    pub fn json<T: Serialize + ?Sized>(payload: &T) -> Result<RequestBody> {
        let text = serde_json::to_string(payload)
            .map_err(|err| Error::Configuration(format!("payload is not serializable: {err}")))?;
        Ok(RequestBody::json_text(text))
    }

    /// Wrap already-serialized JSON text. Used when the same text must be hashed and sent.
    pub(crate) fn json_text(text: String) -> RequestBody {
        RequestBody::new(RequestBody::JSON_CONTENT_TYPE, text)
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn content(&self) -> &[u8] {
        &self.content
    }
}

/// A fully validated HTTP request.
///
/// `Request` is immutable once built. The dispatcher resends the very same value on every retry,
/// so neither headers nor body can change between attempts.
///
/// ```
/// # use ddna::Request;
/// # use std::time::Duration;
/// let request = Request::builder()
///     .get()
///     .url("https://engage.example.com/config")
///     .header("Accept", "application/json")
///     .max_retries(2)
///     .retry_delay(Duration::from_secs(1))
///     .build()
///     .unwrap();
/// assert_eq!(request.header("accept"), Some("application/json"));
/// ```
#[derive(Debug, Clone)]
pub struct Request {
    method: Method,
    url: Url,
    headers: HeaderMap,
    body: Option<RequestBody>,
    connection_timeout: Duration,
    max_retries: u32,
    retry_delay: Duration,
}

impl Request {
    /// Timeout applied to each attempt when none is configured.
    pub const DEFAULT_CONNECTION_TIMEOUT: Duration = Duration::from_secs(15);

    pub fn builder() -> RequestBuilder {
        RequestBuilder::default()
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Value of header `name` (case-insensitive), if present and valid UTF-8.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }

    pub fn body(&self) -> Option<&RequestBody> {
        self.body.as_ref()
    }

    /// Timeout for a single attempt. `Duration::ZERO` disables it.
    pub fn connection_timeout(&self) -> Duration {
        self.connection_timeout
    }

    /// Number of resends after the first attempt.
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn retry_delay(&self) -> Duration {
        self.retry_delay
    }
}

/// Chained builder for [`Request`].
#[derive(Debug, Clone)]
pub struct RequestBuilder {
    method: Option<Method>,
    url: Option<String>,
    headers: Vec<(String, String)>,
    body: Option<RequestBody>,
    connection_timeout: Duration,
    max_retries: u32,
    retry_delay: Duration,
}

impl Default for RequestBuilder {
    fn default() -> RequestBuilder {
        RequestBuilder {
            method: None,
            url: None,
            headers: Vec::new(),
            body: None,
            connection_timeout: Request::DEFAULT_CONNECTION_TIMEOUT,
            max_retries: 0,
            retry_delay: Duration::ZERO,
        }
    }
}

impl RequestBuilder {
    pub fn get(mut self) -> Self {
        self.method = Some(Method::Get);
        self.body = None;
        self
    }

    pub fn post(mut self, body: RequestBody) -> Self {
        self.method = Some(Method::Post);
        self.body = Some(body);
        self
    }

    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Add a header. Names are compared case-insensitively and the last write wins, including
    /// over defaults implied by the body.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    pub fn connection_timeout(mut self, connection_timeout: Duration) -> Self {
        self.connection_timeout = connection_timeout;
        self
    }

    /// Validate and build the request.
    ///
    /// # Errors
    ///
    /// [`Error::Configuration`] if the method or URL is missing, the URL does not parse, or a
    /// header name or value is not valid HTTP.
    pub fn build(self) -> Result<Request> {
        let method = self
            .method
            .ok_or_else(|| Error::Configuration("request method is not set".to_owned()))?;
        let url = self
            .url
            .ok_or_else(|| Error::Configuration("request url is not set".to_owned()))?;
        let url = Url::parse(&url)
            .map_err(|err| Error::Configuration(format!("invalid request url: {err}")))?;

        let mut headers = HeaderMap::new();
        if let Some(body) = &self.body {
            let content_type = HeaderValue::from_str(body.content_type())
                .map_err(|err| Error::Configuration(format!("invalid content type: {err}")))?;
            headers.insert(CONTENT_TYPE, content_type);
        }
        for (name, value) in self.headers {
            let header_name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|err| Error::Configuration(format!("invalid header {name:?}: {err}")))?;
            let header_value = HeaderValue::from_str(&value).map_err(|err| {
                Error::Configuration(format!("invalid value for header {name:?}: {err}"))
            })?;
            headers.insert(header_name, header_value);
        }

        Ok(Request {
            method,
            url,
            headers,
            body: self.body,
            connection_timeout: self.connection_timeout,
            max_retries: self.max_retries,
            retry_delay: self.retry_delay,
        })
    }
}
