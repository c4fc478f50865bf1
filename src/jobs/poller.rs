//! Background job: long-poll the Telegram Bot API for operator updates.
//!
//! Each update is handled on its own task so a slow transfer for one address
//! never delays commands for another.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time;

use crate::notification::telegram::{TelegramBot, POLL_TIMEOUT_SECS};
use crate::notification::DeliveryError;
use crate::router::CommandRouter;

const RETRY_DELAY_SECS: u64 = 5;

/// Spawn the polling loop. Call this once at startup.
pub fn spawn(bot: TelegramBot, router: Arc<CommandRouter>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut offset = 0;
        loop {
            match poll_once(&bot, &router, offset, POLL_TIMEOUT_SECS).await {
                Ok((next, _handlers)) => offset = next,
                Err(e) => {
                    tracing::warn!(error = %e, "getUpdates failed, retrying in {}s", RETRY_DELAY_SECS);
                    time::sleep(Duration::from_secs(RETRY_DELAY_SECS)).await;
                }
            }
        }
    })
}

/// Fetch one batch of updates and dispatch each to the router.
///
/// Returns the offset for the next call (one past the highest update id
/// seen) and the handles of the spawned handler tasks.
pub async fn poll_once(
    bot: &TelegramBot,
    router: &Arc<CommandRouter>,
    offset: i64,
    timeout_secs: u64,
) -> Result<(i64, Vec<JoinHandle<()>>), DeliveryError> {
    let updates = bot.get_updates(offset, timeout_secs).await?;

    let mut next = offset;
    let mut handles = Vec::with_capacity(updates.len());
    for update in updates {
        next = next.max(update.update_id + 1);
        let update_id = update.update_id;
        let Some(event) = update.into_event() else {
            continue;
        };

        let router = router.clone();
        handles.push(tokio::spawn(async move {
            if let Err(e) = router.handle_event(event).await {
                tracing::error!(update_id, error = %e, "failed to deliver reply");
            }
        }));
    }
    Ok((next, handles))
}
