// Copyright 2019-2020 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Operator facing output.
//!
//! Everything the operator is meant to read (status lines, tracer echo, the final report) goes
//! through a `Console` handed to each component, internal diagnostics go through `tracing`.

use std::fmt::Debug;
use std::io::Write;
use std::sync::{Arc, Mutex};

/// A sink for lines shown to the operator
pub trait Console: Debug + Send + Sync {
    fn line(&self, line: &str);
}

/// Writes every line to stdout, flushing so tracer output shows up live
#[derive(Clone, Copy, Debug, Default)]
pub struct Stdout;

impl Console for Stdout {
    fn line(&self, line: &str) {
        let stdout = std::io::stdout();
        let mut out = stdout.lock();
        // a closed stdout is not a reason to stop supervising
        writeln!(out, "{}", line).and_then(|_| out.flush()).ok();
    }
}

/// Records lines in memory, clones share the same buffer
#[derive(Clone, Debug, Default)]
pub struct Captured {
    lines: Arc<Mutex<Vec<String>>>,
}

impl Captured {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .map(|lines| lines.clone())
            .unwrap_or_default()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.lines().iter().any(|line| line.contains(needle))
    }
}

impl Console for Captured {
    fn line(&self, line: &str) {
        if let Ok(mut lines) = self.lines.lock() {
            lines.push(line.to_string());
        }
    }
}
