// Copyright 2019-2020 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use std::fmt;
use std::os::unix::process::ExitStatusExt;
use std::process::ExitStatus;

use nix::sys::signal::Signal;

/// Exit code reported for a process killed by the supervisor
///
/// Signal deaths are reported as the negated signal number.
pub const TERMINATED: i32 = -(Signal::SIGKILL as i32);

/// What a single non-blocking poll of a process handle saw
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Liveness {
    Running,
    /// The handle reports the process has exited, `None` if no exit code is available
    Exited(Option<i32>),
}

impl Liveness {
    pub fn from_exit_status(status: Option<ExitStatus>) -> Self {
        match status {
            None => Liveness::Running,
            Some(status) => Liveness::Exited(exit_code(status)),
        }
    }
}

/// Normal exits keep their code, signal deaths become `-signo`
pub fn exit_code(status: ExitStatus) -> Option<i32> {
    status.code().or_else(|| status.signal().map(|signo| -signo))
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProcessStatus {
    Running,
    Success,
    Failed(i32),
    Terminated,
    Unknown,
}

impl ProcessStatus {
    pub fn classify(liveness: Liveness) -> Self {
        match liveness {
            Liveness::Running => ProcessStatus::Running,
            Liveness::Exited(Some(0)) => ProcessStatus::Success,
            Liveness::Exited(Some(TERMINATED)) => ProcessStatus::Terminated,
            Liveness::Exited(Some(code)) => ProcessStatus::Failed(code),
            Liveness::Exited(None) => ProcessStatus::Unknown,
        }
    }

    pub fn is_terminal(self) -> bool {
        self != ProcessStatus::Running
    }

    /// A failed or killed job trips the kill cascade
    pub fn trips_cascade(self) -> bool {
        matches!(self, ProcessStatus::Failed(_) | ProcessStatus::Terminated)
    }

    /// Success and kills are not independent errors, everything else that finished is
    pub fn is_error(self) -> bool {
        !matches!(self, ProcessStatus::Success | ProcessStatus::Terminated)
    }

    pub fn exit_code(self) -> Option<i32> {
        match self {
            ProcessStatus::Success => Some(0),
            ProcessStatus::Failed(code) => Some(code),
            ProcessStatus::Terminated => Some(TERMINATED),
            ProcessStatus::Running | ProcessStatus::Unknown => None,
        }
    }
}

impl fmt::Display for ProcessStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessStatus::Running => f.write_str("running"),
            ProcessStatus::Success => f.write_str("success"),
            ProcessStatus::Failed(code) => write!(f, "failed ({})", code),
            ProcessStatus::Terminated => f.write_str("terminated"),
            ProcessStatus::Unknown => f.write_str("unknown"),
        }
    }
}
