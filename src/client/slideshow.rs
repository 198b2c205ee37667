use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::consumer::{ConsumerHandle, ConsumerView};
use crate::media::MediaItem;
use crate::playlist::Direction;

/// Forward distance from `index` to the first item whose scheduling window
/// admits `now`, looking at most one lap ahead. `Some(0)` means the item at
/// `index` itself is showable.
pub fn scheduled_offset(items: &[MediaItem], index: usize, now: DateTime<Utc>) -> Option<usize> {
    let len = items.len();
    (0..len).find(|offset| items[(index + offset) % len].is_scheduled_at(now))
}

/// Identity of what is on screen; a change restarts the slide timer
fn slide_key(view: &ConsumerView) -> (u64, usize, usize, u32) {
    (view.version, view.index, view.media.len(), view.reloads)
}

/// Auto-advance the consumer's local cursor until cancelled
pub async fn run_slideshow(consumer: ConsumerHandle, default_duration: Duration, cancel: CancellationToken) {
    let mut views = consumer.subscribe();

    loop {
        let view = views.borrow_and_update().clone();
        let key = slide_key(&view);

        let wait = match scheduled_offset(&view.media, view.index, Utc::now()) {
            Some(0) => {
                let item = &view.media[view.index];
                let duration = item.display_duration(default_duration);
                info!(
                    "Showing {} ({}/{}) for {:?}",
                    item.name,
                    view.index + 1,
                    view.total(),
                    duration
                );
                Some(duration)
            }
            Some(offset) => {
                debug!("Skipping {} unscheduled items", offset);
                for _ in 0..offset {
                    if consumer.navigate(Direction::Next).await.is_err() {
                        return;
                    }
                }
                continue;
            }
            None if view.media.is_empty() => None,
            None => {
                debug!("No item is scheduled right now");
                Some(default_duration)
            }
        };

        let advance = async {
            match wait {
                Some(duration) => tokio::time::sleep(duration).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            _ = cancel.cancelled() => return,
            open = async { views.wait_for(|v| slide_key(v) != key).await.is_ok() } => {
                if !open {
                    return;
                }
            }
            _ = advance => {
                if !view.media.is_empty() && consumer.navigate(Direction::Next).await.is_err() {
                    return;
                }
            }
        }
    }
}
