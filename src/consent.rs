//! PIPL consent flags read when collect and engage requests are built.
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

/// State of a single consent question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConsentStatus {
    /// The user has not been asked yet, or consent is not required.
    #[default]
    Unset,
    Given,
    NotGiven,
}

/// Read access to the two consent flags.
///
/// The network layer only reads these values; whoever owns the consent dialog writes them.
pub trait ConsentState: Send + Sync {
    /// Consent to use personal information.
    fn use_consent(&self) -> ConsentStatus;
    /// Consent to export personal information outside the region.
    fn export_consent(&self) -> ConsentStatus;
}

/// A snapshot of both flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Consent {
    pub use_consent: ConsentStatus,
    pub export_consent: ConsentStatus,
}

impl ConsentState for Consent {
    fn use_consent(&self) -> ConsentStatus {
        self.use_consent
    }

    fn export_consent(&self) -> ConsentStatus {
        self.export_consent
    }
}

/// `ConsentStore` provides thread-safe (`Sync`) storage for consent flags that allows concurrent
/// access for readers (request builders) and writers (the application).
#[derive(Debug, Default)]
pub struct ConsentStore {
    consent: RwLock<Consent>,
}

impl ConsentStore {
    pub fn new() -> Self {
        ConsentStore::default()
    }

    pub fn get(&self) -> Consent {
        // A poisoned lock still holds a fully written `Consent` (it is `Copy`), so recover it
        // instead of crashing the app.
        match self.consent.read() {
            Ok(consent) => *consent,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    pub fn set(&self, consent: Consent) {
        match self.consent.write() {
            Ok(mut slot) => *slot = consent,
            Err(poisoned) => *poisoned.into_inner() = consent,
        }
    }
}

impl ConsentState for ConsentStore {
    fn use_consent(&self) -> ConsentStatus {
        self.get().use_consent
    }

    fn export_consent(&self) -> ConsentStatus {
        self.get().export_consent
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn defaults_to_unset() {
        let store = ConsentStore::new();

        assert_eq!(store.use_consent(), ConsentStatus::Unset);
        assert_eq!(store.export_consent(), ConsentStatus::Unset);
    }

    #[test]
    fn can_set_consent_from_another_thread() {
        let store = Arc::new(ConsentStore::new());

        {
            let store = store.clone();
            let _ = std::thread::spawn(move || {
                store.set(Consent {
                    use_consent: ConsentStatus::Given,
                    export_consent: ConsentStatus::NotGiven,
                });
            })
            .join();
        }

        assert_eq!(store.use_consent(), ConsentStatus::Given);
        assert_eq!(store.export_consent(), ConsentStatus::NotGiven);
    }

    #[test]
    fn deserializes_from_camel_case() {
        let consent: Consent =
            serde_json::from_str(r#"{"useConsent":"given","exportConsent":"notGiven"}"#).unwrap();

        assert_eq!(consent.use_consent, ConsentStatus::Given);
        assert_eq!(consent.export_consent, ConsentStatus::NotGiven);
    }
}
