use std::sync::Arc;

use reqwest::header::HeaderMap;

use crate::Response;

/// Represents a result type for operations in the SDK network layer.
pub type Result<T> = std::result::Result<T, Error>;

/// Enum representing possible errors that can occur while building or dispatching requests.
#[derive(thiserror::Error, Debug, Clone)]
#[non_exhaustive]
pub enum Error {
    /// The request could not be built (missing method or URL, invalid header, unparsable URL).
    ///
    /// Returned synchronously from [`RequestBuilder::build`](crate::RequestBuilder::build) and
    /// never retried.
    #[error("invalid request: {0}")]
    Configuration(String),

    /// One of the configured endpoints is not a valid URL.
    #[error("invalid base url configuration")]
    InvalidBaseUrl(#[source] url::ParseError),

    /// The physical exchange failed before a response was received.
    #[error(transparent)]
    Transport(TransportError),

    /// The server responded with a non-2xx status.
    #[error(transparent)]
    Status(StatusError),

    /// The response body could not be converted to the requested type.
    #[error(transparent)]
    Conversion(ConversionError),

    /// The request was cancelled before it completed.
    #[error("request cancelled")]
    Cancelled,

    /// A dispatcher thread, or the transport or converter while handling a request, panicked.
    /// This should normally never happen.
    #[error("dispatcher thread panicked")]
    WorkerPanicked,
}

impl Error {
    /// Whether resending the same request may produce a different outcome.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Transport(err) => err.is_transient(),
            Error::Status(err) => err.is_server_error(),
            _ => false,
        }
    }

    /// Flag distinguishing cancellation from other failures.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }
}

impl From<TransportError> for Error {
    fn from(value: TransportError) -> Self {
        Error::Transport(value)
    }
}

impl From<StatusError> for Error {
    fn from(value: StatusError) -> Self {
        Error::Status(value)
    }
}

impl From<ConversionError> for Error {
    fn from(value: ConversionError) -> Self {
        Error::Conversion(value)
    }
}

/// Classification of a failed physical attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// Connection or read timed out.
    Timeout,
    /// Could not connect (DNS failure, refused connection).
    Connect,
    /// Any other I/O failure while sending or receiving.
    Io,
    /// The transport rejected the request itself. Resending will not help.
    Request,
}

/// An error produced by a [`Transport`](crate::Transport) during one attempt.
#[derive(thiserror::Error, Debug, Clone)]
#[error("{kind:?} error during request")]
pub struct TransportError {
    kind: TransportErrorKind,
    #[source]
    source: Option<Arc<dyn std::error::Error + Send + Sync>>,
}

impl TransportError {
    /// Create a new error of `kind` without an underlying cause.
    pub fn new(kind: TransportErrorKind) -> TransportError {
        TransportError { kind, source: None }
    }

    /// Create a new error of `kind` caused by `source`.
    pub fn with_source(
        kind: TransportErrorKind,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> TransportError {
        TransportError {
            kind,
            source: Some(Arc::new(source)),
        }
    }

    pub fn kind(&self) -> TransportErrorKind {
        self.kind
    }

    pub fn is_timeout(&self) -> bool {
        self.kind == TransportErrorKind::Timeout
    }

    pub fn is_transient(&self) -> bool {
        self.kind != TransportErrorKind::Request
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(value: reqwest::Error) -> Self {
        let kind = if value.is_timeout() {
            TransportErrorKind::Timeout
        } else if value.is_connect() {
            TransportErrorKind::Connect
        } else if value.is_builder() {
            TransportErrorKind::Request
        } else {
            TransportErrorKind::Io
        };
        // Hashed URLs embed the payload digest, keep them out of error messages.
        TransportError::with_source(kind, value.without_url())
    }
}

impl From<std::io::Error> for TransportError {
    fn from(value: std::io::Error) -> Self {
        let kind = match value.kind() {
            std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock => {
                TransportErrorKind::Timeout
            }
            std::io::ErrorKind::ConnectionRefused | std::io::ErrorKind::NotFound => {
                TransportErrorKind::Connect
            }
            _ => TransportErrorKind::Io,
        };
        TransportError::with_source(kind, value)
    }
}

/// The server answered with a non-2xx status code.
#[derive(thiserror::Error, Debug, Clone)]
#[error("server responded with status {status}")]
pub struct StatusError {
    status: u16,
    headers: HeaderMap,
    body: Option<Arc<[u8]>>,
}

impl StatusError {
    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Body of the failed response, if the server sent one.
    pub fn body(&self) -> Option<&[u8]> {
        self.body.as_deref()
    }

    /// `400 Bad Request`. The body usually explains what the collect/engage service rejected.
    pub fn is_bad_request(&self) -> bool {
        self.status == 400
    }

    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status)
    }

    pub fn is_server_error(&self) -> bool {
        (500..600).contains(&self.status)
    }
}

impl From<Response> for StatusError {
    fn from(response: Response) -> Self {
        StatusError {
            status: response.status,
            headers: response.headers,
            body: response.body.map(Arc::from),
        }
    }
}

/// A response body could not be interpreted by its converter.
#[derive(thiserror::Error, Debug, Clone)]
#[non_exhaustive]
pub enum ConversionError {
    /// Body is not valid UTF-8 JSON.
    #[error("failed to parse response body")]
    Json(#[source] Arc<serde_json::Error>),

    /// Body is valid JSON but not an object.
    #[error("response body is not a JSON object")]
    NotAnObject,

    /// Writing the body to its destination failed.
    #[error("failed to write response body")]
    Io(#[source] Arc<std::io::Error>),
}

impl From<serde_json::Error> for ConversionError {
    fn from(value: serde_json::Error) -> Self {
        ConversionError::Json(Arc::new(value))
    }
}

impl From<std::io::Error> for ConversionError {
    fn from(value: std::io::Error) -> Self {
        ConversionError::Io(Arc::new(value))
    }
}
