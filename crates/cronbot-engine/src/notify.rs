//! Notifier boundary — the sink for operator-facing status messages.

use async_trait::async_trait;

/// Rendering hint for outbound text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageFormat {
    Plain,
    Markdown,
}

/// Abstract message sink implemented by the chat transport.
///
/// Delivery is best-effort: the scheduler logs and moves on when a send
/// fails, so a transport outage never fails a task execution or a
/// reschedule.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, text: &str, format: MessageFormat) -> anyhow::Result<()>;
}
