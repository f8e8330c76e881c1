use std::{error::Error as StdError, time::Duration};

/// Failure reported by a [`DeliveryEndpoint`](crate::DeliveryEndpoint).
///
/// The relay treats [`NotFound`](Self::NotFound) and
/// [`Unauthorized`](Self::Unauthorized) as proof that the endpoint is gone;
/// everything else is dropped for the current job only.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    /// The endpoint no longer exists on the platform.
    #[error("delivery endpoint not found")]
    NotFound,

    /// The endpoint credentials were revoked.
    #[error("delivery endpoint unauthorized")]
    Unauthorized,

    /// The platform asked us to back off.
    #[error("delivery rate limited")]
    RateLimited { retry_after: Option<Duration> },

    /// Network or server-side failure that may succeed later.
    #[error("transient delivery failure: {message}")]
    Transient { message: String },
}

impl DeliveryError {
    #[must_use]
    pub fn transient(message: impl std::fmt::Display) -> Self {
        Self::Transient {
            message: message.to_string(),
        }
    }

    /// Whether this failure proves the endpoint is permanently unusable.
    pub fn is_endpoint_gone(&self) -> bool {
        matches!(self, Self::NotFound | Self::Unauthorized)
    }
}

/// Endpoint creation failed. Registry state is left untouched by callers.
#[derive(Debug, thiserror::Error)]
pub enum ProvisionError {
    /// The bot lacks the permission to create endpoints in the channel.
    #[error("missing permission to create an endpoint in channel {channel_id}")]
    MissingPermission { channel_id: String },

    /// The platform refused the request.
    #[error("endpoint creation rejected ({status}): {body}")]
    Rejected { status: u16, body: String },

    /// Wrapped source error from the transport.
    #[error("endpoint creation failed: {context}: {source}")]
    External {
        context: String,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },
}

impl ProvisionError {
    #[must_use]
    pub fn missing_permission(channel_id: impl Into<String>) -> Self {
        Self::MissingPermission {
            channel_id: channel_id.into(),
        }
    }

    #[must_use]
    pub fn external(
        context: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self::External {
            context: context.into(),
            source: Box::new(source),
        }
    }
}

/// The content filter could not produce a verdict.
#[derive(Debug, thiserror::Error)]
pub enum FilterError {
    #[error("content filter unavailable: {message}")]
    Unavailable { message: String },

    #[error("content filter failed: {context}: {source}")]
    External {
        context: String,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },
}

impl FilterError {
    #[must_use]
    pub fn unavailable(message: impl std::fmt::Display) -> Self {
        Self::Unavailable {
            message: message.to_string(),
        }
    }

    #[must_use]
    pub fn external(
        context: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self::External {
            context: context.into(),
            source: Box::new(source),
        }
    }
}

#[cfg(test)]
mod tests {
    use {super::*, rstest::rstest};

    #[rstest]
    #[case(DeliveryError::NotFound, true)]
    #[case(DeliveryError::Unauthorized, true)]
    #[case(DeliveryError::RateLimited { retry_after: None }, false)]
    #[case(DeliveryError::transient("connection reset"), false)]
    fn gone_classification(#[case] err: DeliveryError, #[case] gone: bool) {
        assert_eq!(err.is_endpoint_gone(), gone);
    }

    #[test]
    fn provision_error_messages() {
        let err = ProvisionError::missing_permission("c1");
        assert!(err.to_string().contains("c1"));
        let err = ProvisionError::Rejected {
            status: 403,
            body: "Missing Permissions".into(),
        };
        assert!(err.to_string().contains("403"));
    }
}
