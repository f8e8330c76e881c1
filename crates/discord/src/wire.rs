//! Discord REST request/response bodies.

use {
    crosstalk_channels::{DeliveryError, Embed, RelayPayload},
    reqwest::StatusCode,
    serde::{Deserialize, Serialize},
    std::time::Duration,
};

/// Body of `POST /webhooks/{id}/{token}`.
#[derive(Debug, Serialize)]
pub struct ExecuteWebhook<'a> {
    pub content: &'a str,
    pub username: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<&'a str>,
    pub embeds: &'a [Embed],
    pub allowed_mentions: AllowedMentions,
}

impl<'a> From<&'a RelayPayload> for ExecuteWebhook<'a> {
    fn from(payload: &'a RelayPayload) -> Self {
        Self {
            content: &payload.content,
            username: &payload.display_name,
            avatar_url: payload.avatar_url.as_deref(),
            embeds: &payload.embeds,
            allowed_mentions: if payload.suppress_mentions() {
                AllowedMentions::none()
            } else {
                AllowedMentions::default()
            },
        }
    }
}

#[derive(Debug, Default, Serialize)]
pub struct AllowedMentions {
    pub parse: Vec<String>,
}

impl AllowedMentions {
    pub fn none() -> Self {
        Self { parse: Vec::new() }
    }
}

/// Body of `POST /channels/{id}/webhooks`.
#[derive(Debug, Serialize)]
pub struct CreateWebhook<'a> {
    pub name: &'a str,
}

/// Subset of the webhook object returned on creation.
#[derive(Debug, Deserialize)]
pub struct WebhookObject {
    pub id: String,
    pub token: Option<String>,
}

/// Body of a 429 response.
#[derive(Debug, Deserialize)]
struct RateLimitBody {
    retry_after: f64,
}

/// Map a non-success webhook response to a delivery failure.
pub fn delivery_error(status: StatusCode, body: &str) -> DeliveryError {
    match status {
        StatusCode::NOT_FOUND => DeliveryError::NotFound,
        StatusCode::UNAUTHORIZED => DeliveryError::Unauthorized,
        StatusCode::TOO_MANY_REQUESTS => DeliveryError::RateLimited {
            retry_after: serde_json::from_str::<RateLimitBody>(body)
                .ok()
                .and_then(|b| Duration::try_from_secs_f64(b.retry_after).ok()),
        },
        other => DeliveryError::transient(format!("HTTP {other}: {body}")),
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, crosstalk_channels::InboundMessage};

    #[test]
    fn execute_body_suppresses_mentions() {
        let msg = InboundMessage {
            author_id: "1".into(),
            author_name: "Bob".into(),
            guild_name: "G".into(),
            ..InboundMessage::default()
        };
        let payload = RelayPayload::from_inbound(&msg, "@everyone hi");
        let body = serde_json::to_value(ExecuteWebhook::from(&payload)).unwrap();
        assert_eq!(body["username"], "Bob | G");
        assert_eq!(body["content"], "@everyone hi");
        assert_eq!(body["allowed_mentions"]["parse"], serde_json::json!([]));
        assert!(body.get("avatar_url").is_none());
        assert_eq!(body["embeds"][0]["color"], 0x3498db);
    }

    #[test]
    fn maps_statuses() {
        assert!(matches!(
            delivery_error(StatusCode::NOT_FOUND, ""),
            DeliveryError::NotFound
        ));
        assert!(matches!(
            delivery_error(StatusCode::UNAUTHORIZED, ""),
            DeliveryError::Unauthorized
        ));
        assert!(matches!(
            delivery_error(StatusCode::BAD_GATEWAY, "upstream"),
            DeliveryError::Transient { .. }
        ));
    }

    #[test]
    fn parses_retry_after() {
        let err = delivery_error(
            StatusCode::TOO_MANY_REQUESTS,
            r#"{"message":"You are being rate limited.","retry_after":1.5,"global":false}"#,
        );
        match err {
            DeliveryError::RateLimited { retry_after } => {
                assert_eq!(retry_after, Some(Duration::from_millis(1500)));
            },
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn drops_unrepresentable_retry_after() {
        for body in [
            r#"{"retry_after":1e300}"#,
            r#"{"retry_after":-2}"#,
            r#"{"retry_after":"soon"}"#,
        ] {
            match delivery_error(StatusCode::TOO_MANY_REQUESTS, body) {
                DeliveryError::RateLimited { retry_after } => {
                    assert_eq!(retry_after, None, "{body}");
                },
                other => panic!("unexpected {other:?}"),
            }
        }
    }
}
