use std::sync::Arc;

use {
    async_trait::async_trait,
    secrecy::{ExposeSecret, Secret},
    serde::{Deserialize, Serialize},
};

use crate::{
    error::{DeliveryError, ProvisionError},
    payload::RelayPayload,
};

/// Credentials of a provisioned endpoint, as persisted in the settings store.
#[derive(Clone, Serialize, Deserialize)]
pub struct EndpointCredentials {
    pub id: String,
    #[serde(serialize_with = "serialize_secret")]
    pub token: Secret<String>,
    pub url: String,
}

impl EndpointCredentials {
    pub fn new(id: impl Into<String>, token: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            token: Secret::new(token.into()),
            url: url.into(),
        }
    }
}

impl std::fmt::Debug for EndpointCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EndpointCredentials")
            .field("id", &self.id)
            .field("token", &"[REDACTED]")
            .field("url", &self.url)
            .finish()
    }
}

fn serialize_secret<S: serde::Serializer>(
    secret: &Secret<String>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(secret.expose_secret())
}

/// A reusable delivery handle posting into one destination channel.
#[async_trait]
pub trait DeliveryEndpoint: Send + Sync {
    /// Platform identifier of the endpoint (e.g. the webhook id).
    fn id(&self) -> &str;

    /// Post a payload. Mentions must be suppressed.
    async fn deliver(&self, payload: &RelayPayload) -> Result<(), DeliveryError>;

    /// Check that the endpoint still exists without posting anything.
    async fn probe(&self) -> Result<(), DeliveryError>;
}

/// Shared endpoint handle as held by the destination registry.
pub type EndpointHandle = Arc<dyn DeliveryEndpoint>;

/// The channel collaborator that creates endpoints and rebuilds handles
/// from stored credentials.
#[async_trait]
pub trait EndpointProvider: Send + Sync {
    /// Create a new endpoint in `channel_id` of `group_id`. Side-effecting.
    async fn provision(
        &self,
        group_id: &str,
        channel_id: &str,
    ) -> Result<EndpointCredentials, ProvisionError>;

    /// Build a handle for previously provisioned credentials. No I/O.
    fn connect(&self, credentials: &EndpointCredentials) -> EndpointHandle;
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_redacts_token() {
        let creds = EndpointCredentials::new("42", "very-secret", "https://hook/42");
        let dbg = format!("{creds:?}");
        assert!(dbg.contains("42"));
        assert!(!dbg.contains("very-secret"));
    }

    #[test]
    fn serializes_token_for_storage() {
        let creds = EndpointCredentials::new("42", "tok", "https://hook/42");
        let json = serde_json::to_value(&creds).unwrap();
        assert_eq!(json["token"], "tok");
    }
}
