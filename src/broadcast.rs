use std::collections::HashSet;

use anyhow::Result;
use async_trait::async_trait;
use teloxide::types::ChatId;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::tips::Tips;

/// Chats the bot has seen since startup. Not persisted.
#[derive(Debug, Default)]
pub struct ChatRegistry {
    chats: RwLock<HashSet<ChatId>>,
}

impl ChatRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if the chat was not known before.
    pub async fn register(&self, chat_id: ChatId) -> bool {
        self.chats.write().await.insert(chat_id)
    }

    /// Snapshot ordered by id, so a broadcast iterates a stable list.
    pub async fn snapshot(&self) -> Vec<ChatId> {
        let mut chats: Vec<ChatId> = self.chats.read().await.iter().copied().collect();
        chats.sort_by_key(|c| c.0);
        chats
    }

    pub async fn len(&self) -> usize {
        self.chats.read().await.len()
    }
}

/// Delivers one Markdown message to one chat.
#[async_trait]
pub trait TipSender: Send + Sync {
    async fn send_tip(&self, chat_id: ChatId, text: &str) -> Result<()>;
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub failed: Vec<ChatId>,
}

pub fn daily_tip_text(tip: &str) -> String {
    format!("⏰ *Daily Security Tip:*\n\n{}", tip)
}

/// Sends `text` to each recipient in order. A failed send is logged and
/// recorded; it never stops the remaining sends. No retry.
pub async fn deliver_to_all(
    sender: &dyn TipSender,
    recipients: &[ChatId],
    text: &str,
) -> BroadcastReport {
    let mut report = BroadcastReport::default();
    for &chat_id in recipients {
        match sender.send_tip(chat_id, text).await {
            Ok(()) => report.delivered += 1,
            Err(e) => {
                warn!("Failed to send to {}: {:#}", chat_id, e);
                report.failed.push(chat_id);
            }
        }
    }
    report
}

/// The scheduled job body: pick the tip for `day_of_month` and send it to
/// every registered chat.
pub async fn broadcast_daily_tip(
    sender: &dyn TipSender,
    registry: &ChatRegistry,
    tips: &Tips,
    day_of_month: u32,
) -> BroadcastReport {
    let tip = tips.select_daily_tip(day_of_month);
    let recipients = registry.snapshot().await;
    info!(
        "Broadcasting daily tip (day {}) to {} chat(s)",
        day_of_month,
        recipients.len()
    );

    let report = deliver_to_all(sender, &recipients, &daily_tip_text(tip)).await;
    info!(
        "Daily tip broadcast finished: {} delivered, {} failed",
        report.delivered,
        report.failed.len()
    );
    report
}
