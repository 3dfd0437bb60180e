//! Fire-and-collect: busy-poll workers run simulated jobs and report back.
//!
//! Completions are recorded on the owner loop in the order they arrive,
//! which with several workers is not the submission order.

use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, trace, warn};

use super::reply::{millis, thread_label};
use crate::app::{Handle, LoopBuilder, LoopConfig, LoopCounts, LoopMode, LoopThread, Looper};
use crate::domain::LoopError;
use crate::ports::{Dispatch, Message};

/// Tag of a completion report.
pub const COMPLETED: i32 = 1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectConfig {
    pub owner: LoopConfig,
    /// Template for every worker; worker `i` is named `{name}-{i}`.
    pub worker: LoopConfig,
    /// Simulated latency of each job, in submission order.
    pub delays: Vec<Duration>,
    pub workers: usize,
}

impl Default for CollectConfig {
    fn default() -> Self {
        Self {
            owner: LoopConfig::new("collector"),
            worker: LoopConfig::new("busy-worker").with_mode(LoopMode::BusyPoll),
            delays: vec![
                Duration::from_secs(2),
                Duration::from_secs(2),
                Duration::from_secs(4),
            ],
            workers: 1,
        }
    }
}

impl CollectConfig {
    fn validate(&self) -> Result<(), LoopError> {
        if self.workers == 0 {
            return Err(LoopError::InvalidConfig(
                "at least one worker is required".to_string(),
            ));
        }
        self.worker.validate()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Completion {
    pub label: String,
    /// Worker thread the job ran on.
    pub worker: String,
    pub finished_at: DateTime<Utc>,
    /// Time from submission of the first job.
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CollectReport {
    /// Job labels in submission order.
    pub submitted: Vec<String>,
    /// Completions in arrival order.
    pub completions: Vec<Completion>,
    pub owner_counts: LoopCounts,
    pub worker_counts: Vec<LoopCounts>,
}

impl CollectReport {
    pub fn arrival_order(&self) -> Vec<&str> {
        self.completions.iter().map(|c| c.label.as_str()).collect()
    }
}

struct CollectDispatch {
    owner: Looper,
    expected: usize,
    completions: Arc<Mutex<Vec<Completion>>>,
}

impl Dispatch for CollectDispatch {
    type Payload = Completion;

    fn dispatch(&self, message: Message<Completion>) {
        match message.tag {
            COMPLETED => {
                let completion = message.payload;
                info!(
                    label = %completion.label,
                    worker = %completion.worker,
                    elapsed_ms = completion.elapsed_ms,
                    "job completed"
                );
                let mut completions = self
                    .completions
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner);
                completions.push(completion);
                if completions.len() >= self.expected {
                    self.owner.quit();
                }
            }
            other => trace!(tag = other, "unregistered tag ignored"),
        }
    }
}

/// Spread the jobs over busy-poll workers round-robin and collect their
/// completions on a loop owned by the calling thread.
///
/// Returns once every job has reported back.
pub fn fire_and_collect(config: CollectConfig) -> Result<CollectReport, LoopError> {
    config.validate()?;
    let owner = LoopBuilder::from_config(config.owner).prepare()?;

    let workers = (0..config.workers)
        .map(|i| {
            let mut worker = config.worker.clone();
            worker.name = format!("{}-{i}", worker.name);
            let worker = LoopThread::spawn(worker)?;
            worker.wait_ready()?;
            Ok(worker)
        })
        .collect::<Result<Vec<_>, LoopError>>()?;
    let handles = workers
        .iter()
        .map(LoopThread::handle)
        .collect::<Result<Vec<_>, _>>()?;

    let completions = Arc::new(Mutex::new(Vec::new()));
    let to_owner = Handle::with_dispatcher(
        owner.looper(),
        CollectDispatch {
            owner: owner.looper().clone(),
            expected: config.delays.len(),
            completions: Arc::clone(&completions),
        },
    )?;

    let started = Instant::now();
    let mut submitted = Vec::with_capacity(config.delays.len());
    for (i, delay) in config.delays.iter().copied().enumerate() {
        let label = format!("job-{i}");
        let to_owner = to_owner.clone();
        let job_label = label.clone();
        handles[i % handles.len()].post(move || {
            thread::sleep(delay);
            let completion = Completion {
                label: job_label,
                worker: thread_label(),
                finished_at: Utc::now(),
                elapsed_ms: millis(started.elapsed()),
            };
            if let Err(err) = to_owner.send(COMPLETED, completion) {
                warn!("completion not delivered: {err}");
            }
        })?;
        debug!(%label, ?delay, "job submitted");
        submitted.push(label);
    }
    drop(to_owner);

    if submitted.is_empty() {
        owner.looper().quit();
    }
    let owner_counts = owner.run();

    for worker in &workers {
        worker.quit();
    }
    let worker_counts = workers
        .into_iter()
        .map(LoopThread::join)
        .collect::<Result<Vec<_>, _>>()?;

    let completions = std::mem::take(
        &mut *completions
            .lock()
            .unwrap_or_else(PoisonError::into_inner),
    );
    Ok(CollectReport {
        submitted,
        completions,
        owner_counts,
        worker_counts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(delays_ms: &[u64], workers: usize) -> CollectConfig {
        CollectConfig {
            delays: delays_ms.iter().copied().map(Duration::from_millis).collect(),
            workers,
            ..CollectConfig::default()
        }
    }

    fn run_in_thread(config: CollectConfig) -> Result<CollectReport, LoopError> {
        thread::spawn(move || fire_and_collect(config)).join().unwrap()
    }

    #[test]
    fn single_worker_completes_every_job_in_elapsed_order() {
        let report = run_in_thread(config(&[80, 80, 160], 1)).unwrap();

        assert_eq!(report.submitted, vec!["job-0", "job-1", "job-2"]);
        assert_eq!(report.arrival_order(), vec!["job-0", "job-1", "job-2"]);
        let elapsed: Vec<_> = report.completions.iter().map(|c| c.elapsed_ms).collect();
        assert!(elapsed[0] >= 80);
        assert!(elapsed[1] >= 160);
        assert!(elapsed[2] >= 320);
        assert!(report.completions.iter().all(|c| c.worker == "busy-worker-0"));
        assert_eq!(report.owner_counts.executed, 3);
        assert_eq!(report.worker_counts[0].executed, 3);
    }

    #[test]
    fn parallel_workers_report_in_completion_order_not_submission_order() {
        let report = run_in_thread(config(&[300, 10], 2)).unwrap();

        assert_eq!(report.submitted, vec!["job-0", "job-1"]);
        assert_eq!(report.arrival_order(), vec!["job-1", "job-0"]);
        assert_eq!(report.completions[0].worker, "busy-worker-1");
        assert_eq!(report.completions[1].worker, "busy-worker-0");
        assert_eq!(report.worker_counts.len(), 2);
    }

    #[test]
    fn jobs_are_spread_round_robin() {
        let report = run_in_thread(config(&[5, 5, 5, 5], 2)).unwrap();

        let mut by_label: Vec<_> = report
            .completions
            .iter()
            .map(|c| (c.label.as_str(), c.worker.as_str()))
            .collect();
        by_label.sort();
        assert_eq!(
            by_label,
            vec![
                ("job-0", "busy-worker-0"),
                ("job-1", "busy-worker-1"),
                ("job-2", "busy-worker-0"),
                ("job-3", "busy-worker-1"),
            ]
        );
    }

    #[test]
    fn no_jobs_returns_empty_report() {
        let report = run_in_thread(config(&[], 1)).unwrap();
        assert!(report.completions.is_empty());
        assert_eq!(report.owner_counts.executed, 0);
    }

    #[test]
    fn zero_workers_is_invalid() {
        let err = run_in_thread(config(&[10], 0)).unwrap_err();
        assert!(matches!(err, LoopError::InvalidConfig(_)));
    }
}
