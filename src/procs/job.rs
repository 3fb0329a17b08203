// Copyright 2019-2020 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use std::fmt::Debug;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::procs::status::{Liveness, ProcessStatus};

/// Control over one launched process
///
/// Only the `StatusMonitor` holds these; everyone else observes status through `Job::subscribe`.
#[async_trait]
pub trait ProcessHandle: Debug + Send {
    fn id(&self) -> Option<u32>;

    /// Never blocks
    fn try_poll(&mut self) -> io::Result<Liveness>;

    /// Sends the termination signal, a no-op once the process has exited
    fn kill(&mut self) -> io::Result<()>;

    /// Waits for the exit and returns its code
    async fn wait(&mut self) -> io::Result<Option<i32>>;
}

/// A real child process
#[derive(Debug)]
pub struct ChildHandle {
    child: tokio::process::Child,
}

impl ChildHandle {
    /// The child should have been spawned with `kill_on_drop(true)`
    pub fn new(child: tokio::process::Child) -> Self {
        Self { child }
    }
}

#[async_trait]
impl ProcessHandle for ChildHandle {
    fn id(&self) -> Option<u32> {
        self.child.id()
    }

    fn try_poll(&mut self) -> io::Result<Liveness> {
        Ok(Liveness::from_exit_status(self.child.try_wait()?))
    }

    fn kill(&mut self) -> io::Result<()> {
        // not yet reaped means the pid still belongs to our child
        if let Liveness::Exited(_) = self.try_poll()? {
            return Ok(());
        }

        let pid = match self.child.id() {
            Some(pid) => pid,
            None => return Ok(()),
        };

        match kill(Pid::from_raw(pid as i32), Signal::SIGKILL) {
            Ok(()) | Err(Errno::ESRCH) => Ok(()),
            Err(errno) => Err(errno.into()),
        }
    }

    async fn wait(&mut self) -> io::Result<Option<i32>> {
        let status = self.child.wait().await?;
        Ok(crate::procs::status::exit_code(status))
    }
}

/// The per-job log file, truncated at launch and closed at most once
#[derive(Debug)]
pub struct LogFile {
    path: PathBuf,
    file: Option<File>,
}

impl LogFile {
    pub fn create(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        let file = File::create(&path)?;

        Ok(Self {
            path,
            file: Some(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A fresh handle to the same file, for a child's stdout or stderr
    pub fn try_clone(&self) -> io::Result<File> {
        match &self.file {
            Some(file) => file.try_clone(),
            None => Err(io::Error::new(
                io::ErrorKind::Other,
                format!("log file {} is closed", self.path.display()),
            )),
        }
    }

    pub fn is_open(&self) -> bool {
        self.file.is_some()
    }

    pub fn close(&mut self) {
        if self.file.take().is_some() {
            debug!("closed log file {}", self.path.display());
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    /// Declared federates and the broker
    Federate,
    Tracer,
}

/// A launched process, its log, and the last status observed for it
#[derive(Debug)]
pub struct Job {
    name: String,
    role: Role,
    handle: Box<dyn ProcessHandle>,
    log: LogFile,
    status: ProcessStatus,
    status_tx: watch::Sender<ProcessStatus>,
}

impl Job {
    pub fn new(
        name: impl Into<String>,
        role: Role,
        handle: Box<dyn ProcessHandle>,
        log: LogFile,
    ) -> Self {
        let (status_tx, _) = watch::channel(ProcessStatus::Running);

        Self {
            name: name.into(),
            role,
            handle,
            log,
            status: ProcessStatus::Running,
            status_tx,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn status(&self) -> ProcessStatus {
        self.status
    }

    pub fn log_path(&self) -> &Path {
        self.log.path()
    }

    pub fn log_is_open(&self) -> bool {
        self.log.is_open()
    }

    /// Observe status changes without any control over the process
    pub fn subscribe(&self) -> watch::Receiver<ProcessStatus> {
        self.status_tx.subscribe()
    }

    /// Polls the process once, terminal states are sticky
    pub fn poll(&mut self) -> ProcessStatus {
        if self.status.is_terminal() {
            return self.status;
        }

        let status = match self.handle.try_poll() {
            Ok(liveness) => ProcessStatus::classify(liveness),
            Err(err) => {
                warn!("failed to poll {}: {}", self.name, err);
                ProcessStatus::Unknown
            }
        };

        self.record(status);
        status
    }

    /// Signal the process if it is still running, never changes a recorded terminal status
    pub fn kill(&mut self) -> io::Result<()> {
        if self.status.is_terminal() {
            return Ok(());
        }

        debug!("killing {} ({:?})", self.name, self.handle.id());
        self.handle.kill()
    }

    /// Kills and reaps, leaving the job terminal with its log closed
    pub async fn abort(&mut self, grace: std::time::Duration) -> ProcessStatus {
        if let Err(err) = self.kill() {
            warn!("failed to kill {}: {}", self.name, err);
        }

        if !self.status.is_terminal() {
            let status = match tokio::time::timeout(grace, self.handle.wait()).await {
                Ok(Ok(code)) => ProcessStatus::classify(Liveness::Exited(code)),
                Ok(Err(err)) => {
                    warn!("failed to reap {}: {}", self.name, err);
                    ProcessStatus::Unknown
                }
                Err(_) => {
                    warn!("{} did not exit within {:?}", self.name, grace);
                    ProcessStatus::Unknown
                }
            };
            self.record(status);
        }

        self.log.close();
        self.status
    }

    fn record(&mut self, status: ProcessStatus) {
        if status == self.status {
            return;
        }

        self.status = status;
        if status.is_terminal() {
            debug!("{} reached {}", self.name, status);
            self.log.close();
        }
        self.status_tx.send_replace(status);
    }
}
