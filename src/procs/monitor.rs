// Copyright 2019-2020 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::SupervisorOptions;
use crate::console::Console;
use crate::control::Shutdown;
use crate::procs::job::Job;
use crate::procs::status::ProcessStatus;

/// Aggregate result of a monitored run
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verdict {
    /// Every job exited with 0
    Passed,
    Failed,
}

impl Verdict {
    pub fn code(self) -> i32 {
        match self {
            Verdict::Passed => 0,
            Verdict::Failed => -1,
        }
    }
}

/// Everything the monitor owned, handed back once it stops
#[derive(Debug)]
pub struct MonitorOutcome {
    pub verdict: Verdict,
    pub jobs: Vec<Job>,
    pub interrupted: bool,
}

/// Polls every job on a fixed period and enforces kill-on-failure
///
/// Rules:
///   - the only component that signals processes
///   - evaluates jobs in plan order, once per tick
///   - stops once every job is terminal, or on shutdown after killing everything
#[derive(Debug)]
pub struct StatusMonitor {
    jobs: Vec<Job>,
    kill_on_failure: bool,
    period: Duration,
    kill_grace: Duration,
    console: Arc<dyn Console>,
    failed: bool,
}

impl StatusMonitor {
    pub fn new(jobs: Vec<Job>, options: &SupervisorOptions, console: Arc<dyn Console>) -> Self {
        Self {
            jobs,
            kill_on_failure: options.kill_on_failure,
            period: options.period,
            kill_grace: options.kill_grace,
            console,
            failed: false,
        }
    }

    pub fn jobs(&self) -> &[Job] {
        &self.jobs
    }

    /// True once any job has failed or been killed
    pub fn has_failed(&self) -> bool {
        self.failed
    }

    pub async fn run(mut self, shutdown: Shutdown) -> MonitorOutcome {
        info!("Starting status monitor for {} jobs", self.jobs.len());

        // first poll after one full period, the processes were only just started
        let mut ticker = time::interval_at(Instant::now() + self.period, self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.cancelled() => {
                    self.abort_all().await;
                    return self.finish(true);
                }
            }

            if self.tick() {
                return self.finish(false);
            }
        }
    }

    /// One poll of every job, returns true when all of them are terminal
    pub fn tick(&mut self) -> bool {
        let mut all_terminal = true;

        for job in self.jobs.iter_mut() {
            let status = job.poll();
            self.console
                .line(&format!("Process '{}': {}", job.name(), status));

            if status.trips_cascade() && !self.failed {
                self.failed = true;
                if self.kill_on_failure {
                    self.console.line(&format!(
                        "Process {} has failed, killing other processes",
                        job.name()
                    ));
                }
            }

            all_terminal &= status.is_terminal();
        }

        if self.failed && self.kill_on_failure {
            for job in self.jobs.iter_mut() {
                if job.status() == ProcessStatus::Running {
                    if let Err(err) = job.kill() {
                        warn!("failed to kill {}: {}", job.name(), err);
                    }
                }
            }
        }

        all_terminal
    }

    /// Kill every job, tracer included, reap them and close all logs
    pub async fn abort_all(&mut self) {
        self.console
            .line("User requested termination. Shutting down safely...");

        for job in self.jobs.iter_mut() {
            if let Err(err) = job.kill() {
                warn!("failed to kill {}: {}", job.name(), err);
            }
        }

        for job in self.jobs.iter_mut() {
            let status = job.abort(self.kill_grace).await;
            debug!("{} aborted: {}", job.name(), status);
        }
    }

    fn verdict(&self) -> Verdict {
        if self
            .jobs
            .iter()
            .all(|job| job.status() == ProcessStatus::Success)
        {
            Verdict::Passed
        } else {
            Verdict::Failed
        }
    }

    fn finish(self, interrupted: bool) -> MonitorOutcome {
        let verdict = if interrupted {
            Verdict::Failed
        } else {
            self.verdict()
        };

        MonitorOutcome {
            verdict,
            jobs: self.jobs,
            interrupted,
        }
    }
}
