// Copyright 2019-2020 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::fs::File;
use tokio::io::AsyncReadExt;
use tokio::sync::watch;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{info, warn};

use crate::console::Console;
use crate::control::Shutdown;
use crate::procs::job::Job;
use crate::procs::status::{ProcessStatus, TERMINATED};

/// Read-only view of the tracer job: where its output lands and how its status evolves
#[derive(Debug)]
pub struct TracerFeed {
    log_path: PathBuf,
    status: watch::Receiver<ProcessStatus>,
}

impl TracerFeed {
    pub fn new(job: &Job) -> Self {
        Self {
            log_path: job.log_path().to_path_buf(),
            status: job.subscribe(),
        }
    }
}

/// Echo lines of the tracer's captured output while it runs
///
/// Rules:
///   - never signals the tracer, the `StatusMonitor` decides its lifecycle
///   - inert when no tracer was configured
#[derive(Debug)]
pub struct TracerStreamer {
    feed: Option<TracerFeed>,
    period: Duration,
    console: Arc<dyn Console>,
}

impl TracerStreamer {
    pub fn new(feed: Option<TracerFeed>, period: Duration, console: Arc<dyn Console>) -> Self {
        Self {
            feed,
            period,
            console,
        }
    }

    /// Streams until the tracer is terminal or shutdown, returns the last status seen
    pub async fn run(self, shutdown: Shutdown) -> Option<ProcessStatus> {
        let TracerStreamer {
            feed,
            period,
            console,
        } = self;
        let TracerFeed {
            log_path,
            mut status,
        } = feed?;

        info!("Starting tracer logger");
        let mut tail = LineTail::new(log_path);

        let mut ticker = time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.cancelled() => {
                    tail.drain(console.as_ref(), true).await;
                    return Some(*status.borrow());
                }
            }

            let current = *status.borrow_and_update();
            // a dropped sender means the monitor is gone, nothing will change anymore
            let closed = status.has_changed().is_err();

            if current.is_terminal() || closed {
                tail.drain(console.as_ref(), true).await;
                console.line(&summary(current));
                return Some(current);
            }

            tail.drain(console.as_ref(), false).await;
        }
    }
}

fn summary(status: ProcessStatus) -> String {
    match status {
        ProcessStatus::Success => "Tracer Completed Successfully".to_string(),
        ProcessStatus::Terminated => format!("Tracer Terminated ({})", TERMINATED),
        ProcessStatus::Failed(code) => format!("Tracer Failed ({})", code),
        ProcessStatus::Running | ProcessStatus::Unknown => {
            "Tracer Failed with Unknown return code".to_string()
        }
    }
}

/// Follows a growing file, yielding complete lines
#[derive(Debug)]
struct LineTail {
    path: PathBuf,
    file: Option<File>,
    pending: Vec<u8>,
}

impl LineTail {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            file: None,
            pending: Vec::new(),
        }
    }

    /// Echo whatever complete lines are available, `flush` also emits a trailing partial line
    async fn drain(&mut self, console: &dyn Console, flush: bool) {
        if let Err(err) = self.read_available().await {
            warn!("failed to read {}: {}", self.path.display(), err);
        }

        while let Some(end) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=end).collect();
            echo(console, &line);
        }

        if flush && !self.pending.is_empty() {
            let line = std::mem::take(&mut self.pending);
            echo(console, &line);
        }
    }

    async fn read_available(&mut self) -> io::Result<()> {
        if self.file.is_none() {
            self.file = Some(File::open(&self.path).await?);
        }

        if let Some(file) = self.file.as_mut() {
            file.read_to_end(&mut self.pending).await?;
        }
        Ok(())
    }
}

fn echo(console: &dyn Console, line: &[u8]) {
    let line = String::from_utf8_lossy(line);
    let line = line.trim();
    if !line.is_empty() {
        console.line(line);
    }
}
