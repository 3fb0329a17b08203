// Copyright 2019-2020 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Scripted process handles for exercising supervision without real processes.

use std::io;
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::procs::job::{Job, LogFile, ProcessHandle, Role};
use crate::procs::status::{Liveness, TERMINATED};

#[derive(Debug, Default)]
struct State {
    /// Exit with this code once `polls` reaches the count
    exit_after: Option<(u32, i32)>,
    polls: u32,
    exited: Option<i32>,
    kills: u32,
}

/// Shared view of a scripted process, clones observe the same state
#[derive(Clone, Debug, Default)]
pub(crate) struct Script {
    state: Arc<Mutex<State>>,
}

impl Script {
    pub(crate) fn running() -> Self {
        Self::default()
    }

    /// Reports `code` on the `polls`-th poll
    pub(crate) fn exits_after(polls: u32, code: i32) -> Self {
        let script = Self::default();
        script.state.lock().unwrap().exit_after = Some((polls, code));
        script
    }

    pub(crate) fn kills(&self) -> u32 {
        self.state.lock().unwrap().kills
    }

    pub(crate) fn handle(&self) -> Box<dyn ProcessHandle> {
        Box::new(ScriptedHandle {
            script: self.clone(),
        })
    }

    pub(crate) fn job(&self, name: &str, role: Role, dir: &Path) -> Job {
        let log = LogFile::create(dir.join(format!("{}.log", name))).unwrap();
        Job::new(name, role, self.handle(), log)
    }
}

#[derive(Debug)]
struct ScriptedHandle {
    script: Script,
}

#[async_trait]
impl ProcessHandle for ScriptedHandle {
    fn id(&self) -> Option<u32> {
        None
    }

    fn try_poll(&mut self) -> io::Result<Liveness> {
        let mut state = self.script.state.lock().unwrap();
        state.polls += 1;

        if state.exited.is_none() {
            if let Some((after, code)) = state.exit_after {
                if state.polls >= after {
                    state.exited = Some(code);
                }
            }
        }

        Ok(match state.exited {
            Some(code) => Liveness::Exited(Some(code)),
            None => Liveness::Running,
        })
    }

    fn kill(&mut self) -> io::Result<()> {
        let mut state = self.script.state.lock().unwrap();
        state.kills += 1;
        if state.exited.is_none() {
            state.exited = Some(TERMINATED);
        }
        Ok(())
    }

    async fn wait(&mut self) -> io::Result<Option<i32>> {
        let exited = self.script.state.lock().unwrap().exited;
        match exited {
            Some(code) => Ok(Some(code)),
            None => std::future::pending().await,
        }
    }
}
