//! Telegram transport for cronbot.
//!
//! Uses the Telegram Bot API with long-polling (no webhook required). The
//! crate provides two halves: the command loop that receives operator
//! commands from the single allow-listed chat, and a `Notifier`
//! implementation the scheduler pushes status messages through.
//!
//! # Configuration
//!
//! ```json5
//! telegram: {
//!     bot_token: "123456:ABC-DEF...",
//!     chat_id: -1001234567890,
//! }
//! ```

pub mod api;
pub mod commands;
pub mod polling;
pub mod types;

use std::sync::Arc;

use async_trait::async_trait;

use cronbot_engine::{MessageFormat, Notifier};

use api::TelegramApi;
use types::SendMessageParams;

/// `Notifier` that delivers scheduler reports to the allow-listed chat.
pub struct TelegramNotifier {
    api: Arc<TelegramApi>,
    chat_id: i64,
}

impl TelegramNotifier {
    pub fn new(api: Arc<TelegramApi>, chat_id: i64) -> Self {
        Self { api, chat_id }
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn notify(&self, text: &str, format: MessageFormat) -> anyhow::Result<()> {
        if format == MessageFormat::Markdown {
            // Job output frequently breaks Markdown parsing; fall back to
            // plain text rather than dropping the message.
            let markdown = self
                .api
                .send_message(&SendMessageParams {
                    chat_id: self.chat_id,
                    text: text.to_string(),
                    parse_mode: Some("Markdown".into()),
                })
                .await;
            if markdown.is_ok() {
                return Ok(());
            }
        }

        self.api
            .send_message(&SendMessageParams {
                chat_id: self.chat_id,
                text: text.to_string(),
                parse_mode: None,
            })
            .await
    }
}
