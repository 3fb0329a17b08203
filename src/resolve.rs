// Copyright 2019-2020 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use std::ffi::OsString;
use std::fmt::Debug;
use std::path::{Path, PathBuf};

/// Turns the first token of an exec string into an executable path
pub trait Resolve: Debug + Send + Sync {
    /// `search_path` is the `PATH` the job will run with, `cwd` its working directory
    fn resolve(&self, command: &str, search_path: Option<OsString>, cwd: &Path) -> Option<PathBuf>;
}

/// Looks commands up the way a shell would
#[derive(Clone, Copy, Debug, Default)]
pub struct SearchPath;

impl Resolve for SearchPath {
    fn resolve(&self, command: &str, search_path: Option<OsString>, cwd: &Path) -> Option<PathBuf> {
        let search_path = search_path.or_else(|| std::env::var_os("PATH"));
        which::which_in(command, search_path, cwd).ok()
    }
}
