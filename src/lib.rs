// Copyright 2019-2020 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Common library functions for federc
//!
//! A run goes `Plan`, `Launcher`, then `StatusMonitor` and `TracerStreamer` side by side, then
//! `Reporter`. The `Supervisor` coordinates everything after launch.

pub mod config;
pub mod console;
pub mod control;
mod error;
pub mod plan;
pub mod procs;
pub mod resolve;

pub use error::{Error, ErrorKind};
