use std::{sync::Arc, time::Duration};

use tokio::{task::JoinHandle, time::MissedTickBehavior};
use tracing::debug;

use crate::{notifications::Notification, NotesStore};

/// Keeps the periodic notification check alive; stops it when dropped.
pub struct PollerHandle {
    task: JoinHandle<()>,
}

impl PollerHandle {
    pub fn stop(self) {
        self.task.abort();
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}

impl Drop for PollerHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Checks once right away, then every `interval`. `on_new` only sees non-empty batches.
pub fn spawn_poller<F>(store: Arc<NotesStore>, interval: Duration, on_new: F) -> PollerHandle
where
    F: Fn(Vec<Notification>) + Send + 'static,
{
    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;

            let added = store.check_notifications().await;
            debug!(added = added.len(), "notification check finished");
            if !added.is_empty() {
                on_new(added);
            }
        }
    });

    PollerHandle { task }
}
