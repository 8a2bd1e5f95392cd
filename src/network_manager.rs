//! Builds requests for the collect, engage and content endpoints and dispatches them.
use std::{path::PathBuf, sync::Arc, time::Duration};

use url::Url;

use crate::{
    consent::{ConsentState, ConsentStatus},
    converter::{FileConverter, JsonConverter, VoidConverter},
    hash::EndpointHasher,
    listener::RequestListener,
    request::RequestBuilder,
    settings::Settings,
    CancelableRequest, Dispatcher, Error, JsonObject, NetworkConfig, Request, RequestBody, Result,
};

/// Header sent when the user consented to the use of their data.
pub const PIPL_CONSENT_HEADER: &str = "PIPL_CONSENT";
/// Header sent when the user consented to the export of their data.
pub const PIPL_EXPORT_HEADER: &str = "PIPL_EXPORT";

const BULK_KEY: &str = "eventList";

/// Entry point for SDK network traffic.
///
/// Every operation returns as soon as the request is queued. Outcomes are delivered to the
/// listener; the returned [`CancelableRequest`] can abandon the request. The only synchronous
/// error is [`Error::Configuration`] when a caller-provided URL is not valid.
///
/// # Examples
/// ```no_run
/// # use ddna::{Dispatcher, HttpTransport, JsonObject, NetworkConfig, NoopListener};
/// let dispatcher = Dispatcher::start(HttpTransport::new()).unwrap();
/// let network = NetworkConfig::new(
///     "project-id",
///     "dev",
///     "https://collect.example.com/collect/api",
///     "https://engage.example.com",
/// )
/// .to_manager(dispatcher)
/// .unwrap();
///
/// let mut event = JsonObject::new();
/// event.insert("eventName".to_owned(), "gameStarted".into());
/// network.collect(&event, NoopListener).unwrap();
///
/// network.shutdown().unwrap();
/// ```
pub struct NetworkManager {
    collect_url: String,
    engage_url: String,
    hasher: EndpointHasher,
    settings: Arc<dyn Settings>,
    consent: Arc<dyn ConsentState>,
    dispatcher: Dispatcher,
}

impl NetworkManager {
    /// Create a manager from `config`, taking ownership of `dispatcher`.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidBaseUrl`] if the collect or engage URL is not a valid URL.
    pub fn new(config: NetworkConfig, dispatcher: Dispatcher) -> Result<NetworkManager> {
        let collect_url = format!(
            "{}/{}/environments/{}",
            config.collect_url.trim_end_matches('/'),
            config.project_id,
            config.environment
        );
        let engage_url = config.engage_url.trim_end_matches('/').to_owned();
        Url::parse(&collect_url).map_err(Error::InvalidBaseUrl)?;
        Url::parse(&engage_url).map_err(Error::InvalidBaseUrl)?;

        let hasher = EndpointHasher::new(config.hash_secret);
        if !hasher.is_enabled() {
            log::debug!(target: "ddna", "no hash secret configured, requests will not be hashed");
        }

        Ok(NetworkManager {
            collect_url,
            engage_url,
            hasher,
            settings: config.settings,
            consent: config.consent,
            dispatcher,
        })
    }

    /// Build the request [`NetworkManager::get`] sends.
    pub fn get_request(&self, url: &str) -> Result<Request> {
        Request::builder()
            .get()
            .url(url)
            .max_retries(self.settings.http_request_max_retries())
            .retry_delay(seconds(self.settings.http_request_retry_delay()))
            .build()
    }

    /// GET `url` and parse the response as a JSON object.
    pub fn get(
        &self,
        url: &str,
        listener: impl RequestListener<JsonObject> + 'static,
    ) -> Result<CancelableRequest> {
        let request = self.get_request(url)?;
        Ok(self.dispatcher.enqueue(request, JsonConverter, listener))
    }

    /// Build the request [`NetworkManager::collect`] sends.
    pub fn collect_request(&self, payload: &JsonObject) -> Result<Request> {
        let (body, text) = json_body(payload)?;
        let endpoint = if payload.contains_key(BULK_KEY) {
            self.hasher
                .hashed_endpoint(&format!("{}/bulk", self.collect_url), &text)
        } else {
            self.hasher.hashed_endpoint(&self.collect_url, &text)
        };

        let builder = Request::builder()
            .post(body)
            .url(endpoint)
            .header("Accept", "application/json")
            .max_retries(self.settings.http_request_max_retries())
            .retry_delay(seconds(self.settings.http_request_retry_delay()))
            .connection_timeout(seconds(self.settings.http_request_collect_timeout()));

        self.with_consent_headers(builder).build()
    }

    /// Upload one event, or a batch when `payload` has an `eventList` key.
    pub fn collect(
        &self,
        payload: &JsonObject,
        listener: impl RequestListener<()> + 'static,
    ) -> Result<CancelableRequest> {
        let request = self.collect_request(payload)?;
        Ok(self.dispatcher.enqueue(request, VoidConverter, listener))
    }

    /// Build the request [`NetworkManager::engage`] sends.
    pub fn engage_request(&self, payload: &JsonObject, is_config_request: bool) -> Result<Request> {
        let (body, text) = json_body(payload)?;
        let timeout = if is_config_request {
            self.settings.http_request_config_timeout()
        } else {
            self.settings.http_request_engage_timeout()
        };

        let builder = Request::builder()
            .post(body)
            .url(self.hasher.hashed_endpoint(&self.engage_url, &text))
            .header("Accept", "application/json")
            .connection_timeout(seconds(timeout));

        self.with_consent_headers(builder).build()
    }

    /// Ask the engage service for a decision. Configuration requests use the config timeout.
    pub fn engage(
        &self,
        payload: &JsonObject,
        listener: impl RequestListener<JsonObject> + 'static,
        is_config_request: bool,
    ) -> Result<CancelableRequest> {
        let request = self.engage_request(payload, is_config_request)?;
        Ok(self.dispatcher.enqueue(request, JsonConverter, listener))
    }

    /// Build the request [`NetworkManager::fetch`] sends.
    pub fn fetch_request(&self, url: &str) -> Result<Request> {
        Request::builder()
            .get()
            .url(url)
            .connection_timeout(seconds(self.settings.http_request_engage_timeout()))
            .build()
    }

    /// Download `url` into `destination`, replacing its content. The listener receives the path.
    ///
    /// Concurrent fetches into the same destination race; the last writer wins.
    pub fn fetch(
        &self,
        url: &str,
        destination: impl Into<PathBuf>,
        listener: impl RequestListener<PathBuf> + 'static,
    ) -> Result<CancelableRequest> {
        let request = self.fetch_request(url)?;
        Ok(self
            .dispatcher
            .enqueue(request, FileConverter::new(destination), listener))
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Shut the underlying dispatcher down. See [`Dispatcher::shutdown`].
    pub fn shutdown(self) -> Result<()> {
        self.dispatcher.shutdown()
    }

    fn with_consent_headers(&self, mut builder: RequestBuilder) -> RequestBuilder {
        if self.consent.use_consent() == ConsentStatus::Given {
            builder = builder.header(PIPL_CONSENT_HEADER, "");
        }
        if self.consent.export_consent() == ConsentStatus::Given {
            builder = builder.header(PIPL_EXPORT_HEADER, "");
        }
        builder
    }
}

/// Serialize once so the hashed text and the sent bytes are identical.
fn json_body(payload: &JsonObject) -> Result<(RequestBody, String)> {
    let text = serde_json::to_string(payload)
        .map_err(|err| Error::Configuration(format!("payload is not serializable: {err}")))?;
    Ok((RequestBody::json_text(text.clone()), text))
}

fn seconds(value: u32) -> Duration {
    Duration::from_secs(u64::from(value))
}

#[cfg(test)]
mod tests {
    use std::sync::{mpsc, Arc, Mutex};
    use std::time::Duration;

    use reqwest::header::HeaderMap;
    use serde_json::{json, Value};

    use super::*;
    use crate::{
        consent::{Consent, ConsentStore},
        error::TransportError,
        Method, NetworkSettings, Response,
    };

    const COLLECT: &str = "https://collect.example.com/collect/api";
    const ENGAGE: &str = "https://engage.example.com";
    const WAIT: Duration = Duration::from_secs(5);

    fn object(value: Value) -> JsonObject {
        match value {
            Value::Object(object) => object,
            _ => panic!("expected a JSON object"),
        }
    }

    fn settings() -> NetworkSettings {
        NetworkSettings::new()
            .with_max_retries(2)
            .with_retry_delay(0)
            .with_collect_timeout(40)
            .with_engage_timeout(4)
            .with_config_timeout(9)
    }

    /// Manager whose transport answers every request with `status` and `body`.
    fn manager(
        config: NetworkConfig,
        status: u16,
        body: &'static [u8],
    ) -> (NetworkManager, Arc<Mutex<Vec<Request>>>) {
        let sent = Arc::new(Mutex::new(Vec::new()));
        let recorder = sent.clone();
        let dispatcher = Dispatcher::start(move |request: &Request| {
            recorder.lock().unwrap().push(request.clone());
            Ok::<_, TransportError>(Response::new(status, HeaderMap::new(), Some(body.to_vec())))
        })
        .unwrap();
        (config.to_manager(dispatcher).unwrap(), sent)
    }

    fn config() -> NetworkConfig {
        NetworkConfig::new("project", "dev", COLLECT, ENGAGE).settings(settings())
    }

    #[test]
    fn invalid_base_url_is_rejected() {
        let dispatcher = Dispatcher::start(|_: &Request| {
            Ok::<_, TransportError>(Response::new(200, HeaderMap::new(), None))
        })
        .unwrap();

        let result =
            NetworkConfig::new("project", "dev", "not a url", ENGAGE).to_manager(dispatcher);

        assert!(matches!(result, Err(Error::InvalidBaseUrl(_))));
    }

    #[test]
    fn collect_single_event_targets_environment_path() {
        let (network, _) = manager(config(), 204, b"");

        let request = network
            .collect_request(&object(json!({"eventName": "gameStarted"})))
            .unwrap();

        assert_eq!(request.method(), Method::Post);
        assert_eq!(
            request.url().as_str(),
            "https://collect.example.com/collect/api/project/environments/dev"
        );
        assert_eq!(request.header("Accept"), Some("application/json"));
        assert_eq!(request.connection_timeout(), Duration::from_secs(40));
        assert_eq!(request.max_retries(), 2);
        assert_eq!(
            request.body().unwrap().content(),
            br#"{"eventName":"gameStarted"}"#
        );
        network.shutdown().unwrap();
    }

    #[test]
    fn collect_event_list_targets_bulk_path() {
        let (network, _) = manager(config(), 204, b"");

        let request = network
            .collect_request(&object(json!({"eventList": [{"eventName": "a"}]})))
            .unwrap();

        assert_eq!(
            request.url().as_str(),
            "https://collect.example.com/collect/api/project/environments/dev/bulk"
        );
        network.shutdown().unwrap();
    }

    #[test]
    fn collect_url_is_hashed_over_sent_body() {
        let (network, _) = manager(config().hash_secret("secret"), 204, b"");
        let payload = object(json!({"eventList": []}));

        let request = network.collect_request(&payload).unwrap();

        let body = std::str::from_utf8(request.body().unwrap().content()).unwrap();
        let digest = format!("{:X}", md5::compute(format!("{body}secret")));
        assert_eq!(
            request.url().as_str(),
            format!("{COLLECT}/project/environments/dev/bulk/hash/{digest}")
        );
        network.shutdown().unwrap();
    }

    #[test]
    fn consent_headers_follow_consent_state() {
        let consent = Arc::new(ConsentStore::new());
        consent.set(Consent {
            use_consent: ConsentStatus::Given,
            export_consent: ConsentStatus::NotGiven,
        });
        let (network, _) = manager(config().consent(consent.clone()), 204, b"");
        let payload = object(json!({"eventName": "gameStarted"}));

        let request = network.collect_request(&payload).unwrap();
        assert_eq!(request.header(PIPL_CONSENT_HEADER), Some(""));
        assert!(request.header(PIPL_EXPORT_HEADER).is_none());

        consent.set(Consent {
            use_consent: ConsentStatus::Given,
            export_consent: ConsentStatus::Given,
        });
        let request = network.engage_request(&payload, false).unwrap();
        assert_eq!(request.header(PIPL_CONSENT_HEADER), Some(""));
        assert_eq!(request.header(PIPL_EXPORT_HEADER), Some(""));

        // Plain downloads never carry consent headers.
        let request = network.fetch_request("https://cdn.example.com/image.png").unwrap();
        assert!(request.header(PIPL_CONSENT_HEADER).is_none());
        assert!(request.header(PIPL_EXPORT_HEADER).is_none());
        let request = network.get_request("https://cdn.example.com/config").unwrap();
        assert!(request.header(PIPL_CONSENT_HEADER).is_none());
        network.shutdown().unwrap();
    }

    #[test]
    fn unset_consent_sends_no_headers() {
        let (network, _) = manager(config(), 204, b"");

        let request = network
            .engage_request(&object(json!({"decisionPoint": "gameLoaded"})), false)
            .unwrap();

        assert!(request.header(PIPL_CONSENT_HEADER).is_none());
        assert!(request.header(PIPL_EXPORT_HEADER).is_none());
        network.shutdown().unwrap();
    }

    #[test]
    fn engage_timeout_depends_on_request_kind() {
        let (network, _) = manager(config().hash_secret("secret"), 200, b"{}");
        let payload = object(json!({"decisionPoint": "config"}));

        let engage = network.engage_request(&payload, false).unwrap();
        let config = network.engage_request(&payload, true).unwrap();

        assert_eq!(engage.connection_timeout(), Duration::from_secs(4));
        assert_eq!(config.connection_timeout(), Duration::from_secs(9));
        assert_eq!(engage.max_retries(), 0);
        assert!(engage.url().as_str().starts_with(&format!("{ENGAGE}/hash/")));
        network.shutdown().unwrap();
    }

    #[test]
    fn get_uses_retry_policy_from_settings() {
        let (network, _) = manager(config(), 200, b"{}");

        let request = network.get_request("https://engage.example.com/config").unwrap();

        assert_eq!(request.method(), Method::Get);
        assert_eq!(request.max_retries(), 2);
        assert_eq!(request.retry_delay(), Duration::ZERO);
        assert_eq!(request.url().as_str(), "https://engage.example.com/config");
        network.shutdown().unwrap();
    }

    #[test]
    fn get_with_invalid_url_fails_synchronously() {
        let (network, sent) = manager(config(), 200, b"{}");

        let result = network.get("no scheme", |_: Result<JsonObject>| {});

        assert!(matches!(result, Err(Error::Configuration(_))));
        network.shutdown().unwrap();
        assert!(sent.lock().unwrap().is_empty());
    }

    #[test]
    fn engage_delivers_parsed_parameters() {
        let (network, sent) = manager(config(), 200, br#"{"parameters":{}}"#);
        let (tx, rx) = mpsc::channel();

        network
            .engage(
                &object(json!({"decisionPoint": "gameLoaded"})),
                move |result: Result<JsonObject>| {
                    let _ = tx.send(result);
                },
                false,
            )
            .unwrap();

        let response = rx.recv_timeout(WAIT).unwrap().unwrap();
        assert_eq!(response["parameters"], json!({}));
        network.shutdown().unwrap();
        assert_eq!(sent.lock().unwrap().len(), 1);
    }

    #[test]
    fn collect_reports_completion() {
        let (network, sent) = manager(config(), 204, b"");
        let (tx, rx) = mpsc::channel();

        network
            .collect(
                &object(json!({"eventName": "gameStarted"})),
                move |result: Result<()>| {
                    let _ = tx.send(result.is_ok());
                },
            )
            .unwrap();

        assert!(rx.recv_timeout(WAIT).unwrap());
        network.shutdown().unwrap();
        assert_eq!(sent.lock().unwrap()[0].method(), Method::Post);
    }

    #[test]
    fn fetch_writes_body_to_destination() {
        let dir = tempfile::tempdir().unwrap();
        let destination = dir.path().join("out.bin");
        let (network, sent) = manager(config(), 200, &[0x01, 0x02, 0x03]);
        let (tx, rx) = mpsc::channel();

        network
            .fetch(
                "https://cdn.example.com/image.png",
                &destination,
                move |result: Result<PathBuf>| {
                    let _ = tx.send(result);
                },
            )
            .unwrap();

        let path = rx.recv_timeout(WAIT).unwrap().unwrap();
        assert_eq!(path, destination);
        assert_eq!(std::fs::read(&destination).unwrap(), vec![0x01, 0x02, 0x03]);
        network.shutdown().unwrap();

        let sent = sent.lock().unwrap();
        assert_eq!(sent[0].connection_timeout(), Duration::from_secs(4));
        assert_eq!(sent[0].max_retries(), 0);
    }
}
