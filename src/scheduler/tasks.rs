use std::sync::Arc;

use chrono::{Datelike, Utc};
use tracing::info;

use crate::broadcast::{self, ChatRegistry, TipSender};
use crate::config::BroadcastConfig;
use crate::scheduler::Scheduler;
use crate::tips::Tips;

/// Register the daily tip broadcast, unless disabled in config.
pub async fn register_daily_tip(
    scheduler: &Scheduler,
    config: &BroadcastConfig,
    sender: Arc<dyn TipSender>,
    registry: Arc<ChatRegistry>,
    tips: Tips,
) -> anyhow::Result<()> {
    if !config.enabled {
        info!("Daily tip broadcast disabled");
        return Ok(());
    }

    let tips = Arc::new(tips);
    scheduler
        .add_cron_job(&config.cron, "daily_tip", move || {
            let sender = Arc::clone(&sender);
            let registry = Arc::clone(&registry);
            let tips = Arc::clone(&tips);
            Box::pin(async move {
                let day = Utc::now().day();
                broadcast::broadcast_daily_tip(sender.as_ref(), &registry, &tips, day).await;
            })
        })
        .await
}
