//! Network core of the deltaDNA analytics SDK: analytics event upload (collect), remote decisions
//! and configuration (engage), and content downloads.
//!
//! # Overview
//!
//! The SDK revolves around a [`NetworkManager`] that builds well-formed requests for each
//! endpoint and hands them to a [`Dispatcher`]. The dispatcher executes them on a small pool of
//! worker threads, retries transient failures, converts response bodies into typed results, and
//! reports the outcome to a [`RequestListener`]. Every operation returns a
//! [`CancelableRequest`] immediately.
//!
//! ```no_run
//! # use ddna::{Dispatcher, HttpTransport, JsonObject, NetworkConfig, NetworkSettings, Result};
//! let dispatcher = Dispatcher::start(HttpTransport::new()).unwrap();
//! let network = NetworkConfig::new(
//!     "project-id",
//!     "dev",
//!     "https://collect.example.com/collect/api",
//!     "https://engage.example.com",
//! )
//! .hash_secret("secret")
//! .settings(NetworkSettings::new().with_max_retries(3))
//! .to_manager(dispatcher)
//! .unwrap();
//!
//! let mut payload = JsonObject::new();
//! payload.insert("decisionPoint".to_owned(), "gameLoaded".into());
//! let request = network
//!     .engage(
//!         &payload,
//!         |result: Result<JsonObject>| println!("{result:?}"),
//!         false,
//!     )
//!     .unwrap();
//!
//! // Changed our mind.
//! request.cancel();
//! ```
//!
//! # Retries
//!
//! Transport failures, timeouts, and 5xx responses are retried up to
//! [`Request::max_retries`] times after the first attempt, waiting [`Request::retry_delay`]
//! between attempts. Timeouts apply per attempt; there is no deadline across the whole retry
//! sequence. 4xx responses and conversion errors fail immediately.
//!
//! # Consent
//!
//! Collect and engage requests carry `PIPL_CONSENT` / `PIPL_EXPORT` headers when the
//! corresponding [`ConsentState`] flag is [`ConsentStatus::Given`]. A missing header means
//! consent was not established, not that it was denied.
//!
//! # Error Handling
//!
//! Errors are represented by the [`Error`] enum. Apart from request-building errors, all of them
//! reach the caller through [`RequestListener::on_failure`].
//!
//! # Logging
//!
//! The package uses the [`log`](https://docs.rs/log/latest/log/) crate with the `ddna` target.
//! Consider integrating a `log`-compatible logger implementation for better visibility into
//! network operations.

#![warn(rustdoc::missing_crate_level_docs)]

mod cancelable;
mod config;
mod consent;
mod converter;
mod dispatcher;
mod error;
mod executor;
mod hash;
mod listener;
mod network_manager;
mod request;
mod response;
mod settings;
mod transport;

/// A JSON object, the payload of collect and engage requests and the result of JSON responses.
pub type JsonObject = serde_json::Map<String, serde_json::Value>;

pub use cancelable::{CancelableRequest, RequestState};
pub use config::NetworkConfig;
pub use consent::{Consent, ConsentState, ConsentStatus, ConsentStore};
pub use converter::{FileConverter, JsonConverter, ResponseBodyConverter, VoidConverter};
pub use dispatcher::{Dispatcher, DispatcherConfig};
pub use error::{
    ConversionError, Error, Result, StatusError, TransportError, TransportErrorKind,
};
pub use executor::{Callback, CallbackExecutor, DeliveryThread, ImmediateExecutor};
pub use hash::{EndpointHasher, Md5Digest, PayloadDigest};
pub use listener::{NoopListener, RequestListener};
pub use network_manager::{NetworkManager, PIPL_CONSENT_HEADER, PIPL_EXPORT_HEADER};
pub use request::{Method, Request, RequestBody, RequestBuilder};
pub use response::Response;
pub use settings::{NetworkSettings, Settings};
pub use transport::{HttpTransport, Transport};
