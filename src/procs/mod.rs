// Copyright 2019 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! The supervision core: launching a federation, watching it, and reporting on it.

mod job;
mod launcher;
mod monitor;
mod reporter;
mod status;
mod supervisor;
mod tracer;

#[cfg(test)]
pub(crate) mod testing;

pub use job::{ChildHandle, Job, LogFile, ProcessHandle, Role};
pub use launcher::{Fleet, Launcher};
pub use monitor::{MonitorOutcome, StatusMonitor, Verdict};
pub use reporter::{tail, Failure, Report, Reporter, TAIL_LINES};
pub use status::{exit_code, Liveness, ProcessStatus, TERMINATED};
pub use supervisor::{Outcome, Supervisor};
pub use tracer::{TracerFeed, TracerStreamer};
