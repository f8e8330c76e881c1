use std::{sync::Arc, time::Duration};

use {
    async_trait::async_trait,
    crosstalk_channels::{EndpointCredentials, EndpointHandle, EndpointProvider, ProvisionError},
    crosstalk_config::DiscordConfig,
    reqwest::StatusCode,
    secrecy::{ExposeSecret, Secret},
    tracing::info,
};

use crate::{
    webhook::DiscordWebhook,
    wire::{CreateWebhook, WebhookObject},
};

/// Creates relay webhooks with the bot token and rebuilds them from storage.
pub struct DiscordWebhookProvider {
    http: reqwest::Client,
    api_base: String,
    bot_token: Secret<String>,
    webhook_name: String,
}

impl DiscordWebhookProvider {
    pub fn new(config: &DiscordConfig) -> Result<Self, ProvisionError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| ProvisionError::external("build HTTP client", e))?;
        Ok(Self {
            http,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            bot_token: config.bot_token.clone(),
            webhook_name: config.webhook_name.clone(),
        })
    }
}

#[async_trait]
impl EndpointProvider for DiscordWebhookProvider {
    async fn provision(
        &self,
        group_id: &str,
        channel_id: &str,
    ) -> Result<EndpointCredentials, ProvisionError> {
        let url = format!("{}/channels/{channel_id}/webhooks", self.api_base);
        let resp = self
            .http
            .post(url)
            .header(
                reqwest::header::AUTHORIZATION,
                format!("Bot {}", self.bot_token.expose_secret()),
            )
            .header("X-Audit-Log-Reason", "Global Chat System")
            .json(&CreateWebhook {
                name: &self.webhook_name,
            })
            .send()
            .await
            .map_err(|e| ProvisionError::external("create webhook", e))?;

        let status = resp.status();
        if status == StatusCode::FORBIDDEN {
            return Err(ProvisionError::missing_permission(channel_id));
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ProvisionError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let webhook: WebhookObject = resp
            .json()
            .await
            .map_err(|e| ProvisionError::external("decode webhook", e))?;
        let Some(token) = webhook.token else {
            return Err(ProvisionError::Rejected {
                status: status.as_u16(),
                body: "webhook created without a token".into(),
            });
        };

        info!(group_id, channel_id, webhook_id = %webhook.id, "created relay webhook");
        let url = format!("{}/webhooks/{}/{token}", self.api_base, webhook.id);
        Ok(EndpointCredentials::new(webhook.id, token, url))
    }

    fn connect(&self, credentials: &EndpointCredentials) -> EndpointHandle {
        Arc::new(DiscordWebhook::new(
            self.http.clone(),
            &self.api_base,
            credentials.clone(),
        ))
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, mockito::Matcher};

    fn provider(server: &mockito::Server) -> DiscordWebhookProvider {
        let config = DiscordConfig {
            bot_token: Secret::new("bot-secret".into()),
            api_base: server.url(),
            ..DiscordConfig::default()
        };
        DiscordWebhookProvider::new(&config).unwrap()
    }

    #[tokio::test]
    async fn provision_creates_webhook() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/channels/c9/webhooks")
            .match_header("authorization", "Bot bot-secret")
            .match_body(Matcher::PartialJson(serde_json::json!({"name": "Global Chat"})))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"id":"501","token":"wh-token","type":1}"#)
            .create_async()
            .await;

        let creds = provider(&server).provision("g1", "c9").await.unwrap();
        assert_eq!(creds.id, "501");
        assert_eq!(creds.token.expose_secret(), "wh-token");
        assert_eq!(creds.url, format!("{}/webhooks/501/wh-token", server.url()));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn forbidden_is_missing_permission() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/channels/c9/webhooks")
            .with_status(403)
            .with_body(r#"{"message":"Missing Permissions","code":50013}"#)
            .create_async()
            .await;

        let err = provider(&server).provision("g1", "c9").await.unwrap_err();
        assert!(matches!(err, ProvisionError::MissingPermission { .. }));
    }

    #[tokio::test]
    async fn connected_handle_targets_stored_webhook() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/webhooks/501/wh-token")
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;

        let provider = provider(&server);
        let handle = provider.connect(&EndpointCredentials::new("501", "wh-token", ""));
        assert_eq!(handle.id(), "501");
        handle.probe().await.unwrap();
        mock.assert_async().await;
    }
}
