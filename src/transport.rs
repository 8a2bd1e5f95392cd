//! The HTTP capability used by the dispatcher to perform one physical attempt.
use crate::{error::TransportError, Method, Request, Response};

/// Performs a single blocking HTTP exchange.
///
/// Implementations must enforce [`Request::connection_timeout`] themselves and must return
/// `Ok` for any response that was received, whatever its status. Retries, status
/// classification, and conversion happen in the dispatcher.
pub trait Transport: Send + Sync {
    fn execute(&self, request: &Request) -> Result<Response, TransportError>;
}

/// [`Transport`] backed by a blocking `reqwest` client.
pub struct HttpTransport {
    // Client holds a connection pool internally, so we're reusing the client between requests.
    client: reqwest::blocking::Client,
}

impl HttpTransport {
    pub fn new() -> HttpTransport {
        HttpTransport::with_client(reqwest::blocking::Client::new())
    }

    /// Use a preconfigured client (proxies, TLS roots, user agent).
    pub fn with_client(client: reqwest::blocking::Client) -> HttpTransport {
        HttpTransport { client }
    }
}

impl Default for HttpTransport {
    fn default() -> HttpTransport {
        HttpTransport::new()
    }
}

impl Transport for HttpTransport {
    fn execute(&self, request: &Request) -> Result<Response, TransportError> {
        let method = match request.method() {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
        };

        let mut builder = self
            .client
            .request(method, request.url().clone())
            .headers(request.headers().clone());
        if !request.connection_timeout().is_zero() {
            builder = builder.timeout(request.connection_timeout());
        }
        if let Some(body) = request.body() {
            builder = builder.body(body.content().to_vec());
        }

        let response = builder.send()?;
        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = response.bytes()?;

        Ok(Response::new(
            status,
            headers,
            (!body.is_empty()).then(|| body.to_vec()),
        ))
    }
}

impl<F> Transport for F
where
    F: Fn(&Request) -> Result<Response, TransportError> + Send + Sync,
{
    fn execute(&self, request: &Request) -> Result<Response, TransportError> {
        self(request)
    }
}
