//! Periodic job scheduling
//!
//! A schedule is a background task that sleeps until the next fire time and
//! then starts the job on a task of its own. The timer never waits for the
//! job: a pass that hangs keeps its guard, and the triggers that follow are
//! skipped by the job itself.
//!
//! Cron expressions use the standard 5-field form (`0 * * * *`) or the
//! 6-field form with seconds, evaluated in an IANA timezone.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use cron::Schedule;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::types::WatchError;
use crate::Result;

/// Job fired by a schedule
#[async_trait]
pub trait ScheduledJob: Send + Sync + 'static {
    /// Name used in logs
    fn name(&self) -> &'static str;

    /// Run the job once; errors are the job's own concern
    async fn trigger(&self);
}

/// When a schedule fires
#[derive(Debug, Clone)]
pub enum Cadence {
    Cron {
        expression: String,
        schedule: Box<Schedule>,
        timezone: Tz,
    },
    /// Fixed period, first fire one period after registration
    Every(Duration),
}

impl Cadence {
    /// Parse a cron expression and an IANA timezone name
    pub fn cron(expression: &str, timezone: &str) -> Result<Self> {
        let normalized = normalize_expression(expression)?;
        let schedule = Schedule::from_str(&normalized).map_err(|e| {
            WatchError::Config(format!("invalid cron expression '{}': {}", expression, e))
        })?;
        let timezone = timezone
            .parse::<Tz>()
            .map_err(|e| WatchError::Config(format!("unknown timezone '{}': {}", timezone, e)))?;

        Ok(Self::Cron {
            expression: expression.trim().to_string(),
            schedule: Box::new(schedule),
            timezone,
        })
    }

    pub fn every(period: Duration) -> Self {
        Self::Every(period)
    }

    /// Next fire time strictly after `now`
    pub fn next_after(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Self::Cron {
                schedule, timezone, ..
            } => schedule
                .after(&now.with_timezone(timezone))
                .next()
                .map(|at| at.with_timezone(&Utc)),
            Self::Every(period) => chrono::Duration::from_std(*period)
                .ok()
                .and_then(|period| now.checked_add_signed(period)),
        }
    }

    /// Fire time following one that just happened
    ///
    /// Counted from whichever is later of the previous fire time and `now`.
    /// The timer sleeps on a monotonic clock, so the wall clock can still
    /// read just before `fired` when it wakes; the same instant is never
    /// scheduled twice.
    pub fn following(&self, fired: DateTime<Utc>, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.next_after(fired.max(now))
    }

    fn describe(&self) -> String {
        match self {
            Self::Cron {
                expression,
                timezone,
                ..
            } => format!("cron '{}' ({})", expression, timezone),
            Self::Every(period) => format!("every {:?}", period),
        }
    }
}

/// Time to sleep from `now` until `at`, zero when already due
fn delay_until(at: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    (at - now).to_std().unwrap_or(Duration::ZERO)
}

/// Prefix 5-field expressions with a zero seconds field
fn normalize_expression(expression: &str) -> Result<String> {
    let fields = expression.split_whitespace().count();
    match fields {
        5 => Ok(format!("0 {}", expression.trim())),
        6 | 7 => Ok(expression.trim().to_string()),
        _ => Err(WatchError::Config(format!(
            "invalid cron expression '{}': expected 5 or 6 fields, got {}",
            expression, fields
        ))),
    }
}

/// Handle to a running schedule
///
/// Dropping the handle also stops the schedule.
#[derive(Debug)]
pub struct ScheduleHandle {
    job: &'static str,
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl ScheduleHandle {
    pub fn job(&self) -> &'static str {
        self.job
    }

    /// Stop firing; a pass already running finishes on its own
    pub fn stop(&self) {
        if self.stop_tx.send(true).is_ok() {
            info!(job = self.job, "Stopping schedule");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stop the schedule and wait for the timer task to exit
    pub async fn stopped(self) {
        let ScheduleHandle { job, stop_tx, task } = self;
        drop(stop_tx);
        if let Err(e) = task.await {
            warn!(job = job, "Schedule task ended abnormally: {}", e);
        }
    }
}

/// Start firing `job` on `cadence`
pub fn spawn_schedule<J: ScheduledJob>(job: Arc<J>, cadence: Cadence) -> ScheduleHandle {
    let (stop_tx, mut stop_rx) = watch::channel(false);
    let name = job.name();

    info!(job = name, cadence = %cadence.describe(), "Schedule registered");

    let task = tokio::spawn(async move {
        let mut next = cadence.next_after(Utc::now());
        loop {
            let Some(fire_at) = next else {
                warn!(job = name, "Schedule has no upcoming fire time");
                break;
            };
            let delay = delay_until(fire_at, Utc::now());
            debug!(
                job = name,
                fire_at = %fire_at.to_rfc3339(),
                delay_secs = delay.as_secs(),
                "Waiting for next fire"
            );

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = stop_rx.changed() => break,
            }
            if *stop_rx.borrow() {
                break;
            }

            let job = Arc::clone(&job);
            tokio::spawn(async move {
                job.trigger().await;
            });
            next = cadence.following(fire_at, Utc::now());
        }
        info!(job = name, "Schedule stopped");
    });

    ScheduleHandle {
        job: name,
        stop_tx,
        task,
    }
}
