//! Background loops — the minute-aligned dispatcher and the update router.
//!
//! Both run as tokio tasks and share nothing but the task store.

use std::sync::Arc;

use remindclaw_core::types::InboundUpdate;
use tokio::task::JoinHandle;
use tokio_stream::{Stream, StreamExt};

use crate::dispatch::{Dispatcher, until_next_minute};
use crate::router::UpdateRouter;
use crate::tasks::truncate_to_minute;

/// Spawn the dispatcher loop: sleep to the next minute boundary, tick, repeat.
///
/// The wait is recomputed from the clock every round, so a slow tick delays
/// the next one but never shifts the schedule off second 0.
pub fn spawn_dispatcher(dispatcher: Arc<Dispatcher>) -> JoinHandle<()> {
    tokio::spawn(async move {
        tracing::info!(
            "⏰ Dispatcher started (every minute at :00, policy {:?})",
            dispatcher.policy()
        );
        loop {
            let now = dispatcher.now();
            let target = truncate_to_minute(now) + chrono::Duration::minutes(1);
            tokio::time::sleep(until_next_minute(now)).await;

            // Timers may fire a hair before the wall clock turns over.
            let now = dispatcher.now();
            let minute = if now < target { target } else { truncate_to_minute(now) };
            dispatcher.tick_at(minute).await;
        }
    })
}

/// Spawn the router loop over a stream of update batches. Ends when the
/// stream ends.
pub fn spawn_router<S>(router: Arc<UpdateRouter>, mut batches: S) -> JoinHandle<()>
where
    S: Stream<Item = Vec<InboundUpdate>> + Send + Unpin + 'static,
{
    tokio::spawn(async move {
        tracing::info!("📨 Update router listening");
        while let Some(batch) = batches.next().await {
            router.handle_batch(batch).await;
        }
        tracing::info!("Update stream closed, router stopped");
    })
}
