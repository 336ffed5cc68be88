// src/jobs.rs
// Background job scheduler: independently-cadenced repeating tasks plus a
// self-rescheduling adaptive job. Owned by main, no global registry. Job
// bodies log-and-continue; one bad cycle never kills a schedule.

use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Timelike, Utc};
use tokio::task::JoinHandle;

struct Job {
    name: &'static str,
    schedule: String,
    handle: JoinHandle<()>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct JobInfo {
    pub name: &'static str,
    pub schedule: String,
    pub running: bool,
}

pub struct JobScheduler {
    jobs: Mutex<Vec<Job>>,
}

impl JobScheduler {
    pub fn new() -> Self {
        Self {
            jobs: Mutex::new(Vec::new()),
        }
    }

    /// Fixed-period repeating job. The first run fires immediately.
    pub fn spawn_repeating<F, Fut>(&self, name: &'static str, every: Duration, mut job: F)
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send,
    {
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Err(e) = job().await {
                    tracing::warn!(error = ?e, job = name, "job run failed");
                }
            }
        });
        self.register(name, format!("every {}s", every.as_secs()), handle);
    }

    /// Self-rescheduling job: after each run, `next_delay` decides the sleep
    /// before the next one.
    pub fn spawn_adaptive<F, Fut, D>(
        &self,
        name: &'static str,
        initial: Duration,
        mut job: F,
        next_delay: D,
    ) where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send,
        D: Fn() -> Duration + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            let mut delay = initial;
            loop {
                tokio::time::sleep(delay).await;
                if let Err(e) = job().await {
                    tracing::warn!(error = ?e, job = name, "job run failed");
                }
                delay = next_delay();
                tracing::debug!(job = name, next_secs = delay.as_secs(), "rescheduled");
            }
        });
        self.register(name, "adaptive".to_string(), handle);
    }

    fn register(&self, name: &'static str, schedule: String, handle: JoinHandle<()>) {
        self.jobs.lock().expect("poisoned job registry").push(Job {
            name,
            schedule,
            handle,
        });
    }

    pub fn list(&self) -> Vec<JobInfo> {
        self.jobs
            .lock()
            .expect("poisoned job registry")
            .iter()
            .map(|job| JobInfo {
                name: job.name,
                schedule: job.schedule.clone(),
                running: !job.handle.is_finished(),
            })
            .collect()
    }

    /// Cancel every job as a group and await termination. Idempotent.
    pub async fn shutdown(&self) {
        let jobs: Vec<Job> = std::mem::take(&mut *self.jobs.lock().expect("poisoned job registry"));
        for job in jobs {
            job.handle.abort();
            match job.handle.await {
                Err(e) if !e.is_cancelled() => {
                    tracing::warn!(job = job.name, error = ?e, "job ended abnormally");
                }
                _ => {}
            }
        }
        tracing::info!("job scheduler stopped");
    }
}

impl Default for JobScheduler {
    fn default() -> Self {
        Self::new()
    }
}

// ------------------------------------------------------------
// Adaptive cadence for the market-data feed
// ------------------------------------------------------------

/// Polling interval from the US/Eastern hour: tight during market hours,
/// looser pre/post market, slow overnight. Pure so it is unit-testable.
pub fn finnhub_poll_interval(et_hour: u32) -> Duration {
    match et_hour {
        9..=15 => Duration::from_secs(5 * 60),
        7..=8 | 16..=19 => Duration::from_secs(10 * 60),
        _ => Duration::from_secs(30 * 60),
    }
}

/// Approximate ET as fixed UTC-5. DST skews this by an hour, which the wide
/// interval bands absorb.
pub fn eastern_hour(now: DateTime<Utc>) -> u32 {
    (now.hour() + 24 - 5) % 24
}

pub fn current_finnhub_interval() -> Duration {
    finnhub_poll_interval(eastern_hour(Utc::now()))
}
