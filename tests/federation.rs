// Copyright 2019-2020 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! End to end runs with real processes, the HELICS programs replaced by shell scripts.

use std::ffi::OsString;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use federc::config::{PlanConfig, SupervisorOptions};
use federc::console::Captured;
use federc::control::Shutdown;
use federc::plan::{Plan, BROKER_PROGRAM, TRACER_PROGRAM};
use federc::procs::{Launcher, ProcessStatus, Supervisor};
use federc::resolve::{Resolve, SearchPath};
use federc::ErrorKind;
use tempfile::TempDir;

/// Stands in for the HELICS install: broker and tracer resolve to scripts in `bin`
#[derive(Debug)]
struct FakeHelics {
    bin: PathBuf,
}

impl Resolve for FakeHelics {
    fn resolve(&self, command: &str, search_path: Option<OsString>, cwd: &Path) -> Option<PathBuf> {
        match command {
            BROKER_PROGRAM | TRACER_PROGRAM => Some(self.bin.join(command)),
            _ => SearchPath.resolve(command, search_path, cwd),
        }
    }
}

struct Deploy {
    dir: TempDir,
}

impl Deploy {
    fn new(broker: &str, tracer: &str) -> Self {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("bin")).unwrap();

        let deploy = Self { dir };
        deploy.script(BROKER_PROGRAM, broker);
        deploy.script(TRACER_PROGRAM, tracer);
        deploy
    }

    fn script(&self, name: &str, body: &str) {
        let path = self.dir.path().join("bin").join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    }

    fn plan(&self, json: &str) -> Plan {
        Plan::from_config(PlanConfig::from_json(json).unwrap(), self.dir.path()).unwrap()
    }

    fn launcher(&self, console: &Captured) -> Launcher {
        Launcher::new(
            FakeHelics {
                bin: self.dir.path().join("bin"),
            },
            Arc::new(console.clone()),
        )
    }

    fn log(&self, name: &str) -> String {
        std::fs::read_to_string(self.dir.path().join("logs").join(format!("{}.log", name)))
            .unwrap_or_default()
    }
}

fn options() -> SupervisorOptions {
    SupervisorOptions {
        period: Duration::from_millis(100),
        ..SupervisorOptions::default()
    }
}

#[tokio::test]
async fn successful_federation() {
    let deploy = Deploy::new(
        "echo \"broker $@\"",
        "echo 'time 0: value 1'\necho 'time 1: value 2'\nsleep 0.3",
    );
    let plan = deploy.plan(
        r#"{"name": "cosim", "logging_path": "logs", "tracer": {},
            "federates": [
                {"name": "gpk_fed", "exec": "sh -c 'echo solving; sleep 0.2'"},
                {"name": "gld_fed", "exec": "sh -c 'echo feeder ready'"}
            ]}"#,
    );

    let console = Captured::new();
    let fleet = deploy.launcher(&console).launch(&plan).expect("launch");
    let outcome = Supervisor::new(options(), Arc::new(console.clone()), Shutdown::new())
        .run(fleet)
        .await
        .expect("run");

    assert!(outcome.is_success(), "{:?}", console.lines());
    assert_eq!(outcome.verdict.code(), 0);
    assert!(outcome.report.failures.is_empty());

    assert!(deploy.log("gpk_fed").contains("solving"));
    assert!(deploy.log("gld_fed").contains("feeder ready"));
    assert!(deploy
        .log("broker")
        .contains("broker --federates=2 --localport=23500"));

    // the tracer's output is echoed live as well as logged
    assert!(console.contains("time 0: value 1"));
    assert!(console.contains("time 1: value 2"));
    assert!(console.contains("Tracer Completed Successfully"));
    assert!(deploy.log("tracer").contains("time 1: value 2"));
    assert!(!console.contains("exited with return code"));
}

#[tokio::test]
async fn first_failure_kills_the_federation() {
    let deploy = Deploy::new("exec sleep 30", "exec sleep 30");
    let plan = deploy.plan(
        r#"{"name": "cosim", "logging_path": "logs", "tracer": {},
            "federates": [
                {"name": "gpk_fed", "exec": "sleep 30"},
                {"name": "gld_fed", "exec": "sh -c 'echo loading; echo diverged >&2; exit 3'"}
            ]}"#,
    );

    let console = Captured::new();
    let started = Instant::now();
    let fleet = deploy.launcher(&console).launch(&plan).expect("launch");
    let outcome = Supervisor::new(options(), Arc::new(console.clone()), Shutdown::new())
        .run(fleet)
        .await
        .expect("run");

    assert!(started.elapsed() < Duration::from_secs(20));
    assert!(!outcome.is_success());
    assert_eq!(outcome.verdict.code(), -1);
    assert_eq!(outcome.report.tracer, Some(ProcessStatus::Terminated));

    assert_eq!(outcome.report.failures.len(), 1);
    let failure = &outcome.report.failures[0];
    assert_eq!(failure.name, "gld_fed");
    assert_eq!(failure.status, ProcessStatus::Failed(3));
    assert_eq!(
        failure.tail.as_deref(),
        Some(&["loading".to_string(), "diverged".to_string()][..])
    );

    assert!(console.contains("Process gld_fed has failed, killing other processes"));
    assert!(console.contains("Process 'gpk_fed': terminated"));
    assert!(console.contains("Process 'broker': terminated"));
    assert!(console.contains("Tracer Terminated (-9)"));
}

#[tokio::test]
async fn interrupt_tears_everything_down() {
    let deploy = Deploy::new("exec sleep 30", "exec sleep 30");
    let plan = deploy.plan(
        r#"{"name": "cosim", "logging_path": "logs", "tracer": {},
            "federates": [{"name": "gpk_fed", "exec": "sleep 30"}]}"#,
    );

    let console = Captured::new();
    let shutdown = Shutdown::new();
    let fleet = deploy.launcher(&console).launch(&plan).expect("launch");

    let interrupt = shutdown.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        interrupt.cancel();
    });

    let started = Instant::now();
    let err = Supervisor::new(options(), Arc::new(console.clone()), shutdown)
        .run(fleet)
        .await
        .unwrap_err();

    assert!(matches!(err.kind(), ErrorKind::Interrupted));
    assert!(started.elapsed() < Duration::from_secs(20));
    assert!(console.contains("User requested termination"));
}

#[tokio::test]
async fn unknown_command_fails_before_supervision() {
    let deploy = Deploy::new("exec sleep 30", "exec sleep 30");
    let plan = deploy.plan(
        r#"{"name": "cosim", "logging_path": "logs",
            "federates": [
                {"name": "gpk_fed", "exec": "sleep 30"},
                {"name": "gld_fed", "exec": "no-such-federate-3c9a --model x"}
            ]}"#,
    );

    let err = deploy
        .launcher(&Captured::new())
        .launch(&plan)
        .unwrap_err();

    match err.kind() {
        ErrorKind::CommandNotFound(exec) => assert_eq!(exec, "no-such-federate-3c9a --model x"),
        other => panic!("unexpected error: {:?}", other),
    }
}

#[test]
fn plan_file_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("runnable_cosim.json");
    std::fs::write(
        &path,
        r#"{"name": "cosim", "federates": [{"name": "a", "exec": "a", "directory": "fed_a"}]}"#,
    )
    .unwrap();

    let plan = Plan::load(&path).expect("load");
    assert_eq!(plan.name(), "cosim");
    assert_eq!(plan.root(), dir.path());
    assert_eq!(plan.logging_path(), dir.path());
    assert_eq!(plan.federates()[0].directory(), dir.path().join("fed_a"));
    assert_eq!(plan.federates().len(), 2);

    let missing = Plan::load(&dir.path().join("missing.json")).unwrap_err();
    assert!(matches!(missing.kind(), ErrorKind::PlanNotFound(_)));
}
