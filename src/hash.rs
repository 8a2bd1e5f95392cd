//! Integrity suffix for collect and engage endpoints.
//!
//! The backend expects `{endpoint}/hash/{HEX(MD5(payload + secret))}`. MD5 is part of that
//! contract and offers no protection against a motivated attacker; the digest is kept behind
//! [`PayloadDigest`] so it can be swapped without touching requests or the dispatcher.
use std::sync::Arc;

/// Digest used to sign payloads.
pub trait PayloadDigest: Send + Sync {
    /// Digest of `message` as raw bytes.
    fn digest(&self, message: &[u8]) -> Vec<u8>;
}

/// The MD5 digest required by the collect and engage services.
#[derive(Debug, Clone, Copy, Default)]
pub struct Md5Digest;

impl PayloadDigest for Md5Digest {
    fn digest(&self, message: &[u8]) -> Vec<u8> {
        md5::compute(message).0.to_vec()
    }
}

/// Appends the hash suffix to endpoints when a secret is configured.
#[derive(Clone)]
pub struct EndpointHasher {
    secret: Option<String>,
    digest: Arc<dyn PayloadDigest>,
}

impl EndpointHasher {
    /// Create a hasher using MD5. An empty secret disables hashing.
    pub fn new(secret: Option<String>) -> EndpointHasher {
        EndpointHasher::with_digest(secret, Md5Digest)
    }

    pub fn with_digest(
        secret: Option<String>,
        digest: impl PayloadDigest + 'static,
    ) -> EndpointHasher {
        EndpointHasher {
            secret: secret.filter(|secret| !secret.is_empty()),
            digest: Arc::new(digest),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.secret.is_some()
    }

    /// Build the endpoint for `payload`, which must be the exact text sent as the request body.
    pub fn hashed_endpoint(&self, endpoint: &str, payload: &str) -> String {
        let Some(secret) = &self.secret else {
            return endpoint.to_owned();
        };

        let mut message = String::with_capacity(payload.len() + secret.len());
        message.push_str(payload);
        message.push_str(secret);
        let digest = self.digest.digest(message.as_bytes());

        let mut url = String::with_capacity(endpoint.len() + 6 + digest.len() * 2);
        url.push_str(endpoint);
        url.push_str("/hash/");
        url.push_str(&hex::encode_upper(digest));
        url
    }
}

impl std::fmt::Debug for EndpointHasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EndpointHasher")
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ENDPOINT: &str = "https://collect.example.com/project/environments/dev";

    #[test]
    fn no_secret_leaves_endpoint_unchanged() {
        let hasher = EndpointHasher::new(None);

        assert_eq!(hasher.hashed_endpoint(ENDPOINT, "{}"), ENDPOINT);
    }

    #[test]
    fn empty_secret_disables_hashing() {
        let hasher = EndpointHasher::new(Some(String::new()));

        assert!(!hasher.is_enabled());
        assert_eq!(hasher.hashed_endpoint(ENDPOINT, "{}"), ENDPOINT);
    }

    #[test]
    fn appends_uppercase_md5_of_payload_and_secret() {
        let hasher = EndpointHasher::new(Some("secret".to_owned()));

        let url = hasher.hashed_endpoint(ENDPOINT, "hello");

        // md5("hellosecret")
        let expected = format!("{:X}", md5::compute(b"hellosecret"));
        assert_eq!(url, format!("{ENDPOINT}/hash/{expected}"));
        let suffix = url.rsplit('/').next().unwrap();
        assert_eq!(suffix.len(), 32);
        assert!(suffix
            .chars()
            .all(|c| c.is_ascii_digit() || ('A'..='F').contains(&c)));
    }

    #[test]
    fn known_digest() {
        let hasher = EndpointHasher::new(Some("o".to_owned()));

        // md5("hello") == 5d41402abc4b2a76b9719d911017c592
        assert_eq!(
            hasher.hashed_endpoint("https://e", "hell"),
            "https://e/hash/5D41402ABC4B2A76B9719D911017C592"
        );
    }

    #[test]
    fn hashing_is_deterministic() {
        let hasher = EndpointHasher::new(Some("secret".to_owned()));

        assert_eq!(
            hasher.hashed_endpoint(ENDPOINT, r#"{"eventName":"a"}"#),
            hasher.hashed_endpoint(ENDPOINT, r#"{"eventName":"a"}"#)
        );
    }

    #[test]
    fn single_character_changes_the_suffix() {
        let hasher = EndpointHasher::new(Some("secret".to_owned()));
        let other_secret = EndpointHasher::new(Some("secreT".to_owned()));

        let base = hasher.hashed_endpoint(ENDPOINT, r#"{"eventName":"a"}"#);
        assert_ne!(base, hasher.hashed_endpoint(ENDPOINT, r#"{"eventName":"b"}"#));
        assert_ne!(
            base,
            other_secret.hashed_endpoint(ENDPOINT, r#"{"eventName":"a"}"#)
        );
    }

    #[test]
    fn digest_is_pluggable() {
        struct Fixed;
        impl PayloadDigest for Fixed {
            fn digest(&self, _message: &[u8]) -> Vec<u8> {
                vec![0x0a, 0xff]
            }
        }

        let hasher = EndpointHasher::with_digest(Some("secret".to_owned()), Fixed);

        assert_eq!(hasher.hashed_endpoint("https://e", "{}"), "https://e/hash/0AFF");
    }
}
