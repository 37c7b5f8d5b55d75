//! Telegram Bot API HTTP client.

use std::time::Duration;

use anyhow::{Context, bail};
use reqwest::Client;

use crate::types::{ApiResponse, BotInfo, GetUpdatesParams, SendMessageParams, TgMessage, Update};

/// HTTP client for the Telegram Bot API.
pub struct TelegramApi {
    client: Client,
    base_url: String,
}

impl TelegramApi {
    /// Create a new API client with the given bot token.
    pub fn new(bot_token: &str) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .expect("failed to build reqwest client");
        Self {
            client,
            base_url: format!("https://api.telegram.org/bot{bot_token}"),
        }
    }

    /// Verify the bot token by calling `getMe`.
    pub async fn get_me(&self) -> anyhow::Result<BotInfo> {
        let resp: ApiResponse<BotInfo> = self
            .client
            .get(format!("{}/getMe", self.base_url))
            .send()
            .await
            .context("getMe request failed")?
            .json()
            .await
            .context("getMe response parse failed")?;

        if !resp.ok {
            bail!(
                "getMe failed: {}",
                resp.description.unwrap_or_else(|| "unknown error".into())
            );
        }
        resp.result.context("getMe returned no result")
    }

    /// Long-poll for updates.
    pub async fn get_updates(&self, params: &GetUpdatesParams) -> anyhow::Result<Vec<Update>> {
        let resp: ApiResponse<Vec<Update>> = self
            .client
            .post(format!("{}/getUpdates", self.base_url))
            .json(params)
            .send()
            .await
            .context("getUpdates request failed")?
            .json()
            .await
            .context("getUpdates response parse failed")?;

        if !resp.ok {
            bail!(
                "getUpdates failed: {}",
                resp.description.unwrap_or_else(|| "unknown error".into())
            );
        }
        Ok(resp.result.unwrap_or_default())
    }

    /// Send a text message.
    pub async fn send_message(&self, params: &SendMessageParams) -> anyhow::Result<()> {
        let resp: ApiResponse<TgMessage> = self
            .client
            .post(format!("{}/sendMessage", self.base_url))
            .json(params)
            .send()
            .await
            .context("sendMessage request failed")?
            .json()
            .await
            .context("sendMessage response parse failed")?;

        if !resp.ok {
            bail!(
                "sendMessage failed: {}",
                resp.description.unwrap_or_else(|| "unknown error".into())
            );
        }
        Ok(())
    }
}
