//! Long-polling loop for operator commands.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use cronbot_engine::Scheduler;

use crate::api::TelegramApi;
use crate::commands;
use crate::types::{GetUpdatesParams, SendMessageParams};

const POLL_TIMEOUT_SECS: u64 = 30;

/// Receive operator commands from Telegram and dispatch them.
///
/// Only the allow-listed chat may issue commands; anyone else gets a
/// rejection reply. Runs until cancelled.
pub async fn run_command_loop(
    api: Arc<TelegramApi>,
    chat_id: i64,
    scheduler: Arc<Scheduler>,
    cancel: CancellationToken,
) {
    let mut offset: i64 = 0;

    loop {
        let params = GetUpdatesParams {
            offset: Some(offset),
            timeout: Some(POLL_TIMEOUT_SECS),
        };

        let updates = tokio::select! {
            _ = cancel.cancelled() => break,
            result = api.get_updates(&params) => match result {
                Ok(updates) => updates,
                Err(e) => {
                    warn!("getUpdates failed: {e}");
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    continue;
                }
            },
        };

        for update in updates {
            offset = offset.max(update.update_id + 1);

            let Some(message) = update.message else {
                continue;
            };
            let Some(text) = message.text else { continue };
            if !text.starts_with('/') {
                continue;
            }

            if message.chat.id != chat_id {
                debug!(chat = message.chat.id, "Command from unauthorized chat");
                reply(
                    &api,
                    message.chat.id,
                    "Whoops! You are not authorized to use this bot",
                )
                .await;
                continue;
            }

            debug!(command = %text, "Dispatching operator command");
            let response = commands::dispatch(&scheduler, &text).await;
            reply(&api, chat_id, &response).await;
        }
    }

    debug!("Command loop stopped");
}

/// Try Markdown first, fall back to plain text when the markup is rejected.
async fn reply(api: &TelegramApi, chat_id: i64, text: &str) {
    let markdown = api
        .send_message(&SendMessageParams {
            chat_id,
            text: text.to_string(),
            parse_mode: Some("Markdown".into()),
        })
        .await;

    if markdown.is_err() {
        if let Err(e) = api
            .send_message(&SendMessageParams {
                chat_id,
                text: text.to_string(),
                parse_mode: None,
            })
            .await
        {
            warn!("sendMessage failed: {e}");
        }
    }
}
