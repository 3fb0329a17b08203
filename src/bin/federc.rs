// Copyright 2019 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::runtime;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use federc::config::SupervisorOptions;
use federc::console::{Console, Stdout};
use federc::control::Shutdown;
use federc::plan::Plan;
use federc::procs::{Launcher, Supervisor};
use federc::resolve::SearchPath;

const FEDERATION_FAILED: u8 = 1;
const SETUP_FAILED: u8 = 2;

#[derive(Debug, Parser)]
#[command(version, author, about)]
struct Args {
    /// JSON plan describing the federation
    #[arg(value_name = "PLAN")]
    plan: PathBuf,

    /// Leave the other processes running when one fails
    #[arg(long)]
    no_kill_on_failure: bool,

    /// Seconds between status polls
    #[arg(long, value_name = "SECS", default_value = "1.0", value_parser = parse_period)]
    period: Duration,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn parse_period(secs: &str) -> Result<Duration, String> {
    let secs: f64 = secs
        .parse()
        .map_err(|_| format!("'{}' is not a number of seconds", secs))?;
    if !(secs.is_finite() && secs > 0.0) {
        return Err("period must be positive".to_string());
    }

    Ok(Duration::from_secs_f64(secs))
}

fn main() -> ExitCode {
    let args = Args::parse();
    setup_logging(args.verbose);

    let runtime = match runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("Failed to initialize Tokio Runtime: {}", err);
            return ExitCode::from(SETUP_FAILED);
        }
    };

    let console: Arc<dyn Console> = Arc::new(Stdout);

    let plan = match Plan::load(&args.plan) {
        Ok(plan) => plan,
        Err(err) => {
            console.line(&format!("Error: {}", err));
            return ExitCode::from(SETUP_FAILED);
        }
    };
    console.line(&format!("Running Federation: {}", plan.name()));

    // spawning needs the runtime's reactor, the launch itself is blocking work on this thread
    let _guard = runtime.enter();

    // installed before launching, so an early Ctrl-C still tears the fleet down
    let shutdown = Shutdown::new();
    let interrupt = shutdown.clone();
    runtime.spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            debug!("interrupt received");
            interrupt.cancel();
        }
    });

    let fleet = match Launcher::new(SearchPath, Arc::clone(&console)).launch(&plan) {
        Ok(fleet) => fleet,
        Err(err) => {
            console.line(&format!("Error: {}", err));
            return ExitCode::from(SETUP_FAILED);
        }
    };

    let options = SupervisorOptions {
        kill_on_failure: !args.no_kill_on_failure,
        period: args.period,
        ..SupervisorOptions::default()
    };
    let supervisor = Supervisor::new(options, Arc::clone(&console), shutdown);

    match runtime.block_on(supervisor.run(fleet)) {
        Ok(outcome) if outcome.is_success() => {
            console.line("Done.");
            ExitCode::SUCCESS
        }
        Ok(outcome) => {
            console.line(&format!(
                "Federation '{}' failed ({} failed processes)",
                plan.name(),
                outcome.report.failures.len()
            ));
            ExitCode::from(FEDERATION_FAILED)
        }
        Err(err) => {
            console.line(&format!("Error: {}", err));
            console.line("Terminating...");
            ExitCode::from(FEDERATION_FAILED)
        }
    }
}

fn setup_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("federc=debug,warn")
    } else {
        EnvFilter::new("federc=info,warn")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
