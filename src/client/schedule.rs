use anyhow::Result;
use chrono::{Local, NaiveTime, Timelike};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::consumer::ConsumerHandle;
use crate::config::client::ScheduleConfig;
use crate::config::validation::ConfigValidator;

const SECONDS_PER_DAY: u32 = 24 * 60 * 60;

/// Daily wall-clock window during which the display keeps its push channel
/// open. The window may cross midnight; equal bounds mean always active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActiveWindow {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl ActiveWindow {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        Self { start, end }
    }

    /// `None` when no schedule is configured
    pub fn from_config(config: &ScheduleConfig) -> Result<Option<Self>> {
        match (&config.start, &config.end) {
            (Some(start), Some(end)) => Ok(Some(Self::new(
                ConfigValidator::parse_clock(start)?,
                ConfigValidator::parse_clock(end)?,
            ))),
            _ => Ok(None),
        }
    }

    pub fn contains(&self, time: NaiveTime) -> bool {
        if self.start == self.end {
            true
        } else if self.start < self.end {
            time >= self.start && time < self.end
        } else {
            time >= self.start || time < self.end
        }
    }

    /// Time from `now` until the window next opens or closes
    pub fn until_next_change(&self, now: NaiveTime) -> Duration {
        let boundary = if self.contains(now) { self.end } else { self.start };
        let now_secs = now.num_seconds_from_midnight();
        let boundary_secs = boundary.num_seconds_from_midnight();
        let secs = (boundary_secs + SECONDS_PER_DAY - now_secs) % SECONDS_PER_DAY;
        let secs = if secs == 0 { SECONDS_PER_DAY } else { secs };
        Duration::from_secs(u64::from(secs))
    }
}

/// Drive the consumer's activity gate from the local clock until cancelled.
/// Without a window the gate stays open and this returns immediately.
pub async fn run_schedule_gate(window: Option<ActiveWindow>, consumer: ConsumerHandle, cancel: CancellationToken) {
    let Some(window) = window else {
        debug!("No active window configured");
        return;
    };
    if window.start == window.end {
        debug!("Active window covers the whole day");
        return;
    }

    loop {
        let now = Local::now().time();
        let active = window.contains(now);
        info!(
            "Display {} ({}-{})",
            if active { "active" } else { "idle" },
            window.start.format("%H:%M"),
            window.end.format("%H:%M")
        );
        if consumer.set_active(active).await.is_err() {
            warn!("Consumer stopped, schedule gate exiting");
            return;
        }

        let wait = window.until_next_change(now);
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(wait) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn test_daytime_window() {
        let window = ActiveWindow::new(at(8, 0), at(18, 0));
        assert!(window.contains(at(8, 0)));
        assert!(window.contains(at(12, 30)));
        assert!(!window.contains(at(18, 0)));
        assert!(!window.contains(at(3, 0)));
    }

    #[test]
    fn test_window_crossing_midnight() {
        let window = ActiveWindow::new(at(22, 0), at(6, 0));
        assert!(window.contains(at(23, 0)));
        assert!(window.contains(at(1, 0)));
        assert!(!window.contains(at(12, 0)));
    }

    #[test]
    fn test_equal_bounds_always_active() {
        let window = ActiveWindow::new(at(7, 0), at(7, 0));
        assert!(window.contains(at(0, 0)));
        assert!(window.contains(at(7, 0)));
    }

    #[test]
    fn test_until_next_change() {
        let window = ActiveWindow::new(at(8, 0), at(18, 0));
        assert_eq!(window.until_next_change(at(7, 0)), Duration::from_secs(3600));
        assert_eq!(window.until_next_change(at(17, 30)), Duration::from_secs(1800));
        assert_eq!(window.until_next_change(at(20, 0)), Duration::from_secs(12 * 3600));
    }

    #[test]
    fn test_from_config() {
        assert_eq!(ActiveWindow::from_config(&ScheduleConfig::default()).unwrap(), None);

        let config = ScheduleConfig {
            start: Some("22:00".to_string()),
            end: Some("06:30".to_string()),
        };
        let window = ActiveWindow::from_config(&config).unwrap().unwrap();
        assert_eq!(window, ActiveWindow::new(at(22, 0), at(6, 30)));

        let bad = ScheduleConfig {
            start: Some("25:00".to_string()),
            end: Some("06:30".to_string()),
        };
        assert!(ActiveWindow::from_config(&bad).is_err());
    }
}
