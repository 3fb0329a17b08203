// Copyright 2019-2020 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use std::collections::VecDeque;
use std::io;
use std::path::Path;
use std::sync::Arc;

use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::console::Console;
use crate::procs::job::{Job, Role};
use crate::procs::status::ProcessStatus;

pub const TAIL_LINES: usize = 10;

/// A federate that ended in error
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Failure {
    pub name: String,
    pub status: ProcessStatus,
    /// Up to the last `TAIL_LINES` lines of its log, `None` if the log could not be read
    pub tail: Option<Vec<String>>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Report {
    pub errored: bool,
    pub failures: Vec<Failure>,
    pub tracer: Option<ProcessStatus>,
}

/// Final verdict and diagnostics for a finished federation
#[derive(Debug)]
pub struct Reporter {
    console: Arc<dyn Console>,
}

impl Reporter {
    pub fn new(console: Arc<dyn Console>) -> Self {
        Self { console }
    }

    pub async fn report(&self, jobs: &[Job]) -> Report {
        let mut failures = Vec::new();
        let mut tracer = None;

        for job in jobs {
            match job.role() {
                Role::Tracer => tracer = Some(job.status()),
                Role::Federate if job.status().is_error() => {
                    failures.push(self.failure(job).await);
                }
                Role::Federate => (),
            }
        }

        let mut errored = !failures.is_empty();
        if let Some(status) = tracer {
            if status != ProcessStatus::Success {
                errored = true;
                self.console.line(&format!(
                    "Tracer failed with return code {}",
                    display_code(status)
                ));
            }
        }

        Report {
            errored,
            failures,
            tracer,
        }
    }

    async fn failure(&self, job: &Job) -> Failure {
        let status = job.status();
        self.console.line(&format!(
            "Process {} exited with return code {}",
            job.name(),
            display_code(status)
        ));

        let tail = match tail(job.log_path(), TAIL_LINES).await {
            Ok(lines) => {
                self.console
                    .line(&format!("Last {} lines of {}.log", TAIL_LINES, job.name()));
                self.console.line("...");
                for line in &lines {
                    self.console.line(line);
                }
                self.console.line("...");
                Some(lines)
            }
            Err(err) => {
                self.console.line(&format!(
                    "Log file {} could not be read: {}",
                    job.log_path().display(),
                    err
                ));
                None
            }
        };

        Failure {
            name: job.name().to_string(),
            status,
            tail,
        }
    }
}

fn display_code(status: ProcessStatus) -> String {
    match status.exit_code() {
        Some(code) => code.to_string(),
        None => status.to_string(),
    }
}

/// The last `count` lines of a file, fewer if it is shorter
///
/// Streams the file, only `count` lines are held at any time.
pub async fn tail(path: &Path, count: usize) -> io::Result<Vec<String>> {
    let mut reader = BufReader::new(File::open(path).await?);
    let mut lines = VecDeque::with_capacity(count + 1);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf).await? == 0 {
            break;
        }

        let line = String::from_utf8_lossy(&buf);
        lines.push_back(line.trim_end_matches(['\n', '\r']).to_string());
        if lines.len() > count {
            lines.pop_front();
        }
    }

    Ok(lines.into())
}
