// src/pipeline/scheduler.rs
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Days, NaiveTime, Utc};
use tokio::task::JoinHandle;

use crate::config::ScheduleTime;
use crate::pipeline::Pipeline;

/// Time from `now` until the next `HH:MM` UTC. A slot equal to `now` is
/// tomorrow's.
pub fn duration_until_next(now: DateTime<Utc>, at: ScheduleTime) -> Duration {
    let Some(slot) = NaiveTime::from_hms_opt(at.hour, at.minute, 0) else {
        return Duration::from_secs(24 * 3600);
    };
    let today = now.date_naive().and_time(slot).and_utc();
    let next = if today > now {
        today
    } else {
        now.date_naive()
            .checked_add_days(Days::new(1))
            .map(|d| d.and_time(slot).and_utc())
            .unwrap_or(today)
    };
    (next - now).to_std().unwrap_or(Duration::ZERO)
}

/// Daily run loop. A run still in flight when the slot comes round is skipped.
pub fn spawn_daily_scheduler(
    pipeline: Arc<Pipeline>,
    at: ScheduleTime,
    run_on_startup: bool,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        if run_on_startup {
            trigger(&pipeline).await;
        }
        loop {
            let wait = duration_until_next(Utc::now(), at);
            tracing::info!(
                target: "pipeline",
                next_in_secs = wait.as_secs(),
                at = %format!("{:02}:{:02}", at.hour, at.minute),
                "scheduler armed"
            );
            tokio::time::sleep(wait).await;
            trigger(&pipeline).await;
        }
    })
}

async fn trigger(pipeline: &Arc<Pipeline>) {
    if let Err(e) = pipeline.run_once().await {
        tracing::warn!(target: "pipeline", error = %e, "scheduled run skipped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32, minute: u32) -> ScheduleTime {
        ScheduleTime { hour, minute }
    }

    #[test]
    fn later_today() {
        let now = Utc.with_ymd_and_hms(2025, 1, 5, 4, 30, 0).unwrap();
        assert_eq!(duration_until_next(now, at(6, 0)), Duration::from_secs(90 * 60));
    }

    #[test]
    fn already_passed_rolls_to_tomorrow() {
        let now = Utc.with_ymd_and_hms(2025, 1, 5, 6, 0, 0).unwrap();
        assert_eq!(duration_until_next(now, at(6, 0)), Duration::from_secs(24 * 3600));

        let now = Utc.with_ymd_and_hms(2025, 12, 31, 23, 0, 0).unwrap();
        assert_eq!(duration_until_next(now, at(0, 15)), Duration::from_secs(75 * 60));
    }
}
