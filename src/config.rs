use std::sync::Arc;

use crate::{
    consent::{Consent, ConsentState},
    settings::{NetworkSettings, Settings},
    Dispatcher, NetworkManager, Result,
};

/// Configuration for [`NetworkManager`].
///
/// # Examples
/// ```
/// # use ddna::{NetworkConfig, NetworkSettings};
/// let config = NetworkConfig::new(
///     "project-id",
///     "dev",
///     "https://collect.example.com/collect/api",
///     "https://engage.example.com",
/// )
/// .hash_secret("secret")
/// .settings(NetworkSettings::new().with_max_retries(3));
/// ```
pub struct NetworkConfig {
    pub(crate) project_id: String,
    pub(crate) environment: String,
    pub(crate) collect_url: String,
    pub(crate) engage_url: String,
    pub(crate) hash_secret: Option<String>,
    pub(crate) settings: Arc<dyn Settings>,
    pub(crate) consent: Arc<dyn ConsentState>,
}

impl NetworkConfig {
    /// Create a configuration for the given project and environment, with default settings and
    /// no consent given.
    pub fn new(
        project_id: impl Into<String>,
        environment: impl Into<String>,
        collect_url: impl Into<String>,
        engage_url: impl Into<String>,
    ) -> Self {
        NetworkConfig {
            project_id: project_id.into(),
            environment: environment.into(),
            collect_url: collect_url.into(),
            engage_url: engage_url.into(),
            hash_secret: None,
            settings: Arc::new(NetworkSettings::default()),
            consent: Arc::new(Consent::default()),
        }
    }

    /// Secret used to hash collect and engage URLs. An empty secret disables hashing.
    pub fn hash_secret(mut self, hash_secret: impl Into<String>) -> Self {
        self.hash_secret = Some(hash_secret.into());
        self
    }

    /// Source of timeouts and retry policy.
    pub fn settings(mut self, settings: impl Settings + 'static) -> Self {
        self.settings = Arc::new(settings);
        self
    }

    /// Same as [`NetworkConfig::settings`] for settings shared with the rest of the app.
    pub fn shared_settings(mut self, settings: Arc<dyn Settings>) -> Self {
        self.settings = settings;
        self
    }

    /// Source of PIPL consent flags, usually a shared [`ConsentStore`](crate::ConsentStore).
    pub fn consent(mut self, consent: Arc<dyn ConsentState>) -> Self {
        self.consent = consent;
        self
    }

    /// Create a [`NetworkManager`] that sends its requests through `dispatcher`.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidBaseUrl`](crate::Error::InvalidBaseUrl) if the collect or engage URL is
    /// not a valid URL.
    pub fn to_manager(self, dispatcher: Dispatcher) -> Result<NetworkManager> {
        NetworkManager::new(self, dispatcher)
    }
}
