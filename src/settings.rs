use serde::Deserialize;

/// Source of HTTP tuning values. Durations are expressed in whole seconds.
///
/// Read concurrently by every in-flight request; the network layer never writes to it.
pub trait Settings: Send + Sync {
    fn http_request_max_retries(&self) -> u32;
    fn http_request_retry_delay(&self) -> u32;
    fn http_request_collect_timeout(&self) -> u32;
    fn http_request_engage_timeout(&self) -> u32;
    fn http_request_config_timeout(&self) -> u32;
}

/// Plain [`Settings`] values.
///
/// Deserializes from the camelCase keys used by the SDK configuration files; missing keys fall
/// back to the defaults.
///
/// ```
/// # use ddna::NetworkSettings;
/// let settings: NetworkSettings =
///     serde_json::from_str(r#"{"httpRequestMaxRetries": 3}"#).unwrap();
/// assert_eq!(settings.http_request_max_retries, 3);
/// assert_eq!(
///     settings.http_request_engage_timeout,
///     NetworkSettings::DEFAULT_ENGAGE_TIMEOUT
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct NetworkSettings {
    pub http_request_max_retries: u32,
    pub http_request_retry_delay: u32,
    pub http_request_collect_timeout: u32,
    pub http_request_engage_timeout: u32,
    pub http_request_config_timeout: u32,
}

impl NetworkSettings {
    pub const DEFAULT_MAX_RETRIES: u32 = 0;
    pub const DEFAULT_RETRY_DELAY: u32 = 2;
    pub const DEFAULT_COLLECT_TIMEOUT: u32 = 55;
    pub const DEFAULT_ENGAGE_TIMEOUT: u32 = 5;
    pub const DEFAULT_CONFIG_TIMEOUT: u32 = 5;

    pub fn new() -> NetworkSettings {
        NetworkSettings::default()
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> NetworkSettings {
        self.http_request_max_retries = max_retries;
        self
    }

    pub fn with_retry_delay(mut self, seconds: u32) -> NetworkSettings {
        self.http_request_retry_delay = seconds;
        self
    }

    pub fn with_collect_timeout(mut self, seconds: u32) -> NetworkSettings {
        self.http_request_collect_timeout = seconds;
        self
    }

    pub fn with_engage_timeout(mut self, seconds: u32) -> NetworkSettings {
        self.http_request_engage_timeout = seconds;
        self
    }

    pub fn with_config_timeout(mut self, seconds: u32) -> NetworkSettings {
        self.http_request_config_timeout = seconds;
        self
    }
}

impl Default for NetworkSettings {
    fn default() -> NetworkSettings {
        NetworkSettings {
            http_request_max_retries: NetworkSettings::DEFAULT_MAX_RETRIES,
            http_request_retry_delay: NetworkSettings::DEFAULT_RETRY_DELAY,
            http_request_collect_timeout: NetworkSettings::DEFAULT_COLLECT_TIMEOUT,
            http_request_engage_timeout: NetworkSettings::DEFAULT_ENGAGE_TIMEOUT,
            http_request_config_timeout: NetworkSettings::DEFAULT_CONFIG_TIMEOUT,
        }
    }
}

impl Settings for NetworkSettings {
    fn http_request_max_retries(&self) -> u32 {
        self.http_request_max_retries
    }

    fn http_request_retry_delay(&self) -> u32 {
        self.http_request_retry_delay
    }

    fn http_request_collect_timeout(&self) -> u32 {
        self.http_request_collect_timeout
    }

    fn http_request_engage_timeout(&self) -> u32 {
        self.http_request_engage_timeout
    }

    fn http_request_config_timeout(&self) -> u32 {
        self.http_request_config_timeout
    }
}
