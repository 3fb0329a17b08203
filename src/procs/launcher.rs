// Copyright 2019-2020 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;

use tokio::process::Command;
use tracing::{debug, warn};

use crate::console::Console;
use crate::error::ErrorKind;
use crate::plan::Plan;
use crate::procs::job::{ChildHandle, Job, LogFile, Role};
use crate::resolve::Resolve;
use crate::Error;

/// Every job of a launched federation
#[derive(Debug)]
pub struct Fleet {
    /// In plan order, the broker last
    pub federates: Vec<Job>,
    pub tracer: Option<Job>,
}

impl Fleet {
    pub fn len(&self) -> usize {
        self.federates.len() + usize::from(self.tracer.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Kill and close everything, for when the fleet never reaches supervision
    pub fn abandon(self) {
        for mut job in self.federates.into_iter().chain(self.tracer) {
            if let Err(err) = job.kill() {
                warn!("failed to kill {}: {}", job.name(), err);
            }
            // dropping the job closes its log, kill_on_drop covers failed kills
        }
    }
}

/// Launch programs
///
/// Rules:
/// - starts every process of a plan, never waits on any of them
/// - stdout and stderr of each process go to `<logging_path>/<name>.log`
/// - all or nothing: a failure part way through kills what was already started
#[derive(Debug)]
pub struct Launcher {
    resolver: Box<dyn Resolve>,
    console: Arc<dyn Console>,
}

impl Launcher {
    pub fn new(resolver: impl Resolve + 'static, console: Arc<dyn Console>) -> Self {
        Self {
            resolver: Box::new(resolver),
            console,
        }
    }

    /// Starts the federates, the broker and the tracer, in that order
    ///
    /// Blocks on file system work. Needs an entered tokio runtime but no async context.
    pub fn launch(&self, plan: &Plan) -> Result<Fleet, Error> {
        std::fs::create_dir_all(plan.logging_path())?;

        let mut fleet = Fleet {
            federates: Vec::with_capacity(plan.federates().len()),
            tracer: None,
        };

        for spec in plan.federates() {
            self.console.line(&format!(
                "Running federate {} as a background process",
                spec.name()
            ));

            let job = self.spawn(
                spec.name(),
                Role::Federate,
                spec.argv(),
                spec.exec(),
                spec.directory(),
                spec.env(),
                &plan.log_path_for(spec.name()),
            );

            match job {
                Ok(job) => fleet.federates.push(job),
                Err(err) => {
                    fleet.abandon();
                    return Err(err);
                }
            }
        }

        if let Some(tracer) = plan.tracer() {
            self.console.line(&format!(
                "Running tracer '{}' as a background process",
                tracer.name()
            ));

            let log_path = plan.log_path_for(tracer.name());
            let argv = tracer.argv(&log_path);
            let exec = argv.join(" ");

            match self.spawn(
                tracer.name(),
                Role::Tracer,
                &argv,
                &exec,
                tracer.directory(),
                tracer.env(),
                &log_path,
            ) {
                Ok(job) => fleet.tracer = Some(job),
                Err(err) => {
                    fleet.abandon();
                    return Err(err);
                }
            }
        }

        Ok(fleet)
    }

    #[allow(clippy::too_many_arguments)]
    fn spawn(
        &self,
        name: &str,
        role: Role,
        argv: &[String],
        exec: &str,
        directory: &Path,
        env: &BTreeMap<String, String>,
        log_path: &Path,
    ) -> Result<Job, Error> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| ErrorKind::CommandNotFound(exec.to_string()))?;

        let search_path = env.get("PATH").map(OsString::from);
        let program = self
            .resolver
            .resolve(program, search_path, directory)
            .ok_or_else(|| ErrorKind::CommandNotFound(exec.to_string()))?;

        let log = LogFile::create(log_path)?;

        let child = Command::new(&program)
            .args(args)
            .current_dir(directory)
            .envs(env)
            .stdin(Stdio::null())
            .stdout(log.try_clone()?)
            .stderr(log.try_clone()?)
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ErrorKind::Spawn {
                name: name.to_string(),
                source,
            })?;

        debug!(
            "started {} ({:?}): {} in {}",
            name,
            child.id(),
            program.display(),
            directory.display()
        );

        Ok(Job::new(name, role, Box::new(ChildHandle::new(child)), log))
    }
}
