// Copyright 2019-2020 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use std::fmt;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ErrorKind {
    #[error("io error: {0}")]
    IoError(#[from] io::Error),
    #[error("invalid plan file: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("supervision task failed: {0}")]
    JoinError(#[from] tokio::task::JoinError),
    #[error("Unable to find file '{}'", .0.display())]
    PlanNotFound(PathBuf),
    #[error("Repeated names found in federates: {}", DisplayCounts(.0))]
    DuplicateNames(Vec<(String, usize)>),
    #[error("name '{0}' cannot be used as a log file name")]
    InvalidName(String),
    #[error("exec string for '{name}' could not be parsed: {exec}")]
    InvalidExec { name: String, exec: String },
    #[error("Command '{0}' specified in exec string is not recognized.")]
    CommandNotFound(String),
    #[error("failed to start '{name}': {source}")]
    Spawn {
        name: String,
        #[source]
        source: io::Error,
    },
    #[error("User requested termination")]
    Interrupted,
}

struct DisplayCounts<'a>(&'a [(String, usize)]);

impl fmt::Display for DisplayCounts<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (name, count)) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "found name '{}' {} times", name, count)?;
        }
        Ok(())
    }
}

#[derive(Error, Debug)]
#[error(transparent)]
pub struct Error(ErrorKind);

impl Error {
    fn from_kind(kind: ErrorKind) -> Self {
        Self(kind)
    }

    pub fn kind(&self) -> &ErrorKind {
        &self.0
    }
}

impl<E> From<E> for Error
where
    E: Into<ErrorKind>,
{
    fn from(err: E) -> Self {
        Self::from_kind(err.into())
    }
}
