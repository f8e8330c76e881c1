use {
    async_trait::async_trait,
    crosstalk_channels::{DeliveryEndpoint, DeliveryError, EndpointCredentials, RelayPayload},
    secrecy::ExposeSecret,
    tracing::debug,
};

use crate::wire::{ExecuteWebhook, delivery_error};

/// One Discord webhook, executed with its own token (no bot auth).
pub struct DiscordWebhook {
    http: reqwest::Client,
    credentials: EndpointCredentials,
    execute_url: String,
}

impl DiscordWebhook {
    pub fn new(http: reqwest::Client, api_base: &str, credentials: EndpointCredentials) -> Self {
        let execute_url = format!(
            "{}/webhooks/{}/{}",
            api_base.trim_end_matches('/'),
            credentials.id,
            credentials.token.expose_secret()
        );
        Self {
            http,
            credentials,
            execute_url,
        }
    }

    async fn check(resp: reqwest::Response) -> Result<(), DeliveryError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }
        let body = resp.text().await.unwrap_or_default();
        Err(delivery_error(status, &body))
    }
}

#[async_trait]
impl DeliveryEndpoint for DiscordWebhook {
    fn id(&self) -> &str {
        &self.credentials.id
    }

    async fn deliver(&self, payload: &RelayPayload) -> Result<(), DeliveryError> {
        let resp = self
            .http
            .post(&self.execute_url)
            .json(&ExecuteWebhook::from(payload))
            .send()
            .await
            .map_err(DeliveryError::transient)?;
        debug!(webhook_id = %self.credentials.id, status = %resp.status(), "webhook executed");
        Self::check(resp).await
    }

    async fn probe(&self) -> Result<(), DeliveryError> {
        let resp = self
            .http
            .get(&self.execute_url)
            .send()
            .await
            .map_err(DeliveryError::transient)?;
        Self::check(resp).await
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, crosstalk_channels::InboundMessage, mockito::Matcher};

    fn webhook(server: &mockito::Server) -> DiscordWebhook {
        DiscordWebhook::new(
            reqwest::Client::new(),
            &server.url(),
            EndpointCredentials::new("77", "tok", format!("{}/webhooks/77/tok", server.url())),
        )
    }

    fn payload() -> RelayPayload {
        let msg = InboundMessage {
            author_id: "u1".into(),
            author_name: "Ann".into(),
            guild_name: "Home".into(),
            ..InboundMessage::default()
        };
        RelayPayload::from_inbound(&msg, "hello")
    }

    #[tokio::test]
    async fn deliver_posts_execute_body() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/webhooks/77/tok")
            .match_body(Matcher::PartialJson(serde_json::json!({
                "content": "hello",
                "username": "Ann | Home",
                "allowed_mentions": { "parse": [] }
            })))
            .with_status(204)
            .create_async()
            .await;

        webhook(&server).deliver(&payload()).await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn deliver_reports_unknown_webhook() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/webhooks/77/tok")
            .with_status(404)
            .with_body(r#"{"message":"Unknown Webhook","code":10015}"#)
            .create_async()
            .await;

        let err = webhook(&server).deliver(&payload()).await.unwrap_err();
        assert!(err.is_endpoint_gone());
    }

    #[tokio::test]
    async fn server_error_is_transient() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/webhooks/77/tok")
            .with_status(502)
            .create_async()
            .await;

        let err = webhook(&server).deliver(&payload()).await.unwrap_err();
        assert!(!err.is_endpoint_gone());
    }

    #[tokio::test]
    async fn probe_detects_revoked_token() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/webhooks/77/tok")
            .with_status(401)
            .create_async()
            .await;

        let err = webhook(&server).probe().await.unwrap_err();
        assert!(matches!(err, DeliveryError::Unauthorized));
    }
}
