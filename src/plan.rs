// Copyright 2019-2020 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! The validated, immutable description of a federation run.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::config::{
    BrokerConfig, FederateConfig, PlanConfig, TracerConfig, DEFAULT_TRACER_CONFIG,
    DEFAULT_TRACER_NAME,
};
use crate::error::ErrorKind;
use crate::Error;

pub const BROKER_NAME: &str = "broker";
pub const BROKER_PROGRAM: &str = "helics_broker";
pub const TRACER_PROGRAM: &str = "helics_app";

/// One process of the federation, the broker included
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FederateSpec {
    name: String,
    exec: String,
    argv: Vec<String>,
    directory: PathBuf,
    env: BTreeMap<String, String>,
    host: String,
}

impl FederateSpec {
    /// Builds a spec, `directory` is resolved against `root`
    pub fn new(
        name: impl Into<String>,
        exec: impl Into<String>,
        directory: &Path,
        root: &Path,
        env: BTreeMap<String, String>,
        host: impl Into<String>,
    ) -> Result<Self, Error> {
        let name = name.into();
        let exec = exec.into();
        let argv = split_exec(&name, &exec)?;

        Ok(Self {
            name,
            exec,
            argv,
            directory: resolve_dir(root, directory),
            env,
            host: host.into(),
        })
    }

    fn from_config(config: FederateConfig, root: &Path) -> Result<Self, Error> {
        let FederateConfig {
            name,
            exec,
            directory,
            host,
            env,
        } = config;

        Self::new(name, exec, &directory, root, env, host)
    }

    /// The broker is supervised like any other federate
    fn broker(config: &BrokerConfig, federate_count: usize, root: &Path) -> Result<Self, Error> {
        let mut exec = format!(
            "{} --federates={} --localport={}",
            BROKER_PROGRAM, federate_count, config.port
        );
        if let Some(core_type) = &config.core_type {
            exec.push_str(&format!(" --coretype={}", core_type));
        }
        if let Some(init_string) = &config.init_string {
            exec.push(' ');
            exec.push_str(init_string);
        }

        Self::new(
            BROKER_NAME,
            exec,
            Path::new("."),
            root,
            BTreeMap::new(),
            "localhost",
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The command line as written in the plan
    pub fn exec(&self) -> &str {
        &self.exec
    }

    /// The command line split into program and arguments, never empty
    pub fn argv(&self) -> &[String] {
        &self.argv
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn env(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    /// Informational only, every process runs on this host
    pub fn host(&self) -> &str {
        &self.host
    }
}

/// The optional tracer, its command line is derived from its log and config paths
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TracerSpec {
    name: String,
    directory: PathBuf,
    config_path: PathBuf,
    env: BTreeMap<String, String>,
}

impl TracerSpec {
    fn from_config(config: TracerConfig, root: &Path, logging_path: &Path) -> Self {
        let TracerConfig {
            name,
            directory,
            config,
            env,
        } = config;

        let config = config.unwrap_or_else(|| PathBuf::from(DEFAULT_TRACER_CONFIG));

        Self {
            name: name.unwrap_or_else(|| DEFAULT_TRACER_NAME.to_string()),
            directory: directory
                .map(|dir| resolve_dir(root, &dir))
                .unwrap_or_else(|| root.to_path_buf()),
            config_path: logging_path.join(config),
            env,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn env(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    /// The tracer records into the same file its output is captured in
    pub fn argv(&self, log_path: &Path) -> Vec<String> {
        vec![
            TRACER_PROGRAM.to_string(),
            "tracer".to_string(),
            "-o".to_string(),
            log_path.display().to_string(),
            "--config-file".to_string(),
            self.config_path.display().to_string(),
        ]
    }
}

#[derive(Clone, Debug)]
pub struct Plan {
    name: String,
    root: PathBuf,
    federates: Vec<FederateSpec>,
    tracer: Option<TracerSpec>,
    logging_path: PathBuf,
}

impl Plan {
    /// Loads the plan file, its directory becomes the plan root
    pub fn load(path: &Path) -> Result<Self, Error> {
        let path = if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()?.join(path)
        };

        let config = PlanConfig::load(&path)?;
        let root = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("/"));

        Self::from_config(config, &root)
    }

    /// Validates the config and synthesizes the broker
    ///
    /// The broker is appended after every declared federate, so its `--federates` count is the
    ///   number of declared federates.
    pub fn from_config(config: PlanConfig, root: &Path) -> Result<Self, Error> {
        let PlanConfig {
            name,
            federates,
            broker,
            tracer,
            logging_path,
        } = config;

        let declared = federates.len();
        let mut federates = federates
            .into_iter()
            .map(|fed| FederateSpec::from_config(fed, root))
            .collect::<Result<Vec<_>, _>>()?;
        federates.push(FederateSpec::broker(&broker, declared, root)?);

        let logging_path = match logging_path {
            Some(path) if !path.as_os_str().is_empty() => resolve_dir(root, &path),
            _ => root.to_path_buf(),
        };

        let tracer = tracer.map(|tracer| TracerSpec::from_config(tracer, root, &logging_path));

        // every job name is also a log file name under logging_path
        let names = || {
            federates
                .iter()
                .map(FederateSpec::name)
                .chain(tracer.iter().map(TracerSpec::name))
        };
        if let Some(name) = names().find(|name| !is_valid_name(name)) {
            return Err(ErrorKind::InvalidName(name.to_string()).into());
        }

        let duplicates = find_duplicates(names());
        if !duplicates.is_empty() {
            return Err(ErrorKind::DuplicateNames(duplicates).into());
        }

        Ok(Self {
            name,
            root: root.to_path_buf(),
            federates,
            tracer,
            logging_path,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Declared federates in order, followed by the broker
    pub fn federates(&self) -> &[FederateSpec] {
        &self.federates
    }

    pub fn tracer(&self) -> Option<&TracerSpec> {
        self.tracer.as_ref()
    }

    pub fn logging_path(&self) -> &Path {
        &self.logging_path
    }

    /// `<logging_path>/<name>.log`
    pub fn log_path_for(&self, name: &str) -> PathBuf {
        self.logging_path.join(format!("{}.log", name))
    }
}

/// Every name seen more than once with its count, in order of first appearance
pub fn find_duplicates<'a>(names: impl IntoIterator<Item = &'a str>) -> Vec<(String, usize)> {
    let mut counts: Vec<(String, usize)> = Vec::new();
    for name in names {
        match counts.iter_mut().find(|(seen, _)| seen == name) {
            Some((_, count)) => *count += 1,
            None => counts.push((name.to_string(), 1)),
        }
    }

    counts.retain(|(_, count)| *count > 1);
    counts
}

/// A single path component that is not `.` or `..`
fn is_valid_name(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".." && !name.contains(['/', '\\', '\0'])
}

fn split_exec(name: &str, exec: &str) -> Result<Vec<String>, Error> {
    match shlex::split(exec) {
        Some(argv) if !argv.is_empty() => Ok(argv),
        _ => Err(ErrorKind::InvalidExec {
            name: name.to_string(),
            exec: exec.to_string(),
        }
        .into()),
    }
}

fn resolve_dir(root: &Path, dir: &Path) -> PathBuf {
    let dir = expand_home(dir);
    // an absolute `dir` replaces root entirely
    root.join(dir)
}

fn expand_home(path: &Path) -> PathBuf {
    let home = match dirs::home_dir() {
        Some(home) => home,
        None => return path.to_path_buf(),
    };

    if path == Path::new("~") {
        home
    } else if let Ok(rest) = path.strip_prefix("~") {
        home.join(rest)
    } else {
        path.to_path_buf()
    }
}
