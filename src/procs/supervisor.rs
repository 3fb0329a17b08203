// Copyright 2019-2020 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use std::sync::Arc;

use futures::future;
use tracing::{info, warn};

use crate::config::SupervisorOptions;
use crate::console::Console;
use crate::control::Shutdown;
use crate::error::ErrorKind;
use crate::procs::launcher::Fleet;
use crate::procs::monitor::{StatusMonitor, Verdict};
use crate::procs::reporter::{Report, Reporter};
use crate::procs::tracer::{TracerFeed, TracerStreamer};
use crate::Error;

/// The result of a federation that ran to completion
#[derive(Debug)]
pub struct Outcome {
    pub verdict: Verdict,
    pub report: Report,
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        self.verdict == Verdict::Passed && !self.report.errored
    }
}

/// Launch and monitor processes
///
/// Rules:
///   - runs the `StatusMonitor` and `TracerStreamer` side by side over one fleet
///   - never restarts a failed process, the first failure ends the whole run
///   - on shutdown every job is killed and every log closed before returning
#[derive(Debug)]
pub struct Supervisor {
    options: SupervisorOptions,
    console: Arc<dyn Console>,
    shutdown: Shutdown,
}

impl Supervisor {
    pub fn new(options: SupervisorOptions, console: Arc<dyn Console>, shutdown: Shutdown) -> Self {
        Self {
            options,
            console,
            shutdown,
        }
    }

    /// Supervises the fleet until every job is terminal
    ///
    /// Returns `Interrupted` if shutdown was requested, the jobs have been killed by then.
    pub async fn run(&self, fleet: Fleet) -> Result<Outcome, Error> {
        let Fleet { federates, tracer } = fleet;

        let feed = tracer.as_ref().map(TracerFeed::new);
        let mut jobs = federates;
        jobs.extend(tracer);

        let streamer = TracerStreamer::new(feed, self.options.period, Arc::clone(&self.console));
        let monitor = StatusMonitor::new(jobs, &self.options, Arc::clone(&self.console));

        self.console.line(&format!(
            "Waiting for {} processes to finish",
            monitor.jobs().len()
        ));

        // a panicking task drops the jobs it owns, which kills them and closes their logs
        let monitor = tokio::spawn(monitor.run(self.shutdown.clone()));
        let streamer = tokio::spawn(streamer.run(self.shutdown.clone()));

        let (monitored, streamed) = future::join(monitor, streamer).await;
        let monitored = match monitored {
            Ok(monitored) => monitored,
            Err(err) => {
                // stop the streamer had it not noticed yet
                self.shutdown.cancel();
                return Err(err.into());
            }
        };

        match streamed {
            Ok(Some(status)) => info!("tracer finished: {}", status),
            Ok(None) => (),
            Err(err) => warn!("tracer streamer failed: {}", err),
        }

        if monitored.interrupted {
            return Err(ErrorKind::Interrupted.into());
        }

        let report = Reporter::new(Arc::clone(&self.console))
            .report(&monitored.jobs)
            .await;

        Ok(Outcome {
            verdict: monitored.verdict,
            report,
        })
    }
}
