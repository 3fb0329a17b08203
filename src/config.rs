// Copyright 2019-2020 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! On-disk shape of a federation plan and the supervisor's tunables.
//!
//! These types mirror the JSON document one to one, defaults are applied here and nowhere else.
//!   Validation (unique names, exec parsing, path resolution) happens when a `Plan` is built from
//!   a `PlanConfig`, see `crate::plan`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::ErrorKind;
use crate::Error;

pub const DEFAULT_BROKER_PORT: u16 = 23500;
pub const DEFAULT_TRACER_NAME: &str = "tracer";
pub const DEFAULT_TRACER_CONFIG: &str = "tracer_config.json";

/// The plan document as written by the operator (or generated by a deploy step)
#[derive(Clone, Debug, Deserialize)]
pub struct PlanConfig {
    pub name: String,
    #[serde(default)]
    pub federates: Vec<FederateConfig>,
    #[serde(default)]
    pub broker: BrokerConfig,
    #[serde(default)]
    pub tracer: Option<TracerConfig>,
    /// Missing or empty means the directory holding the plan file
    #[serde(default)]
    pub logging_path: Option<PathBuf>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct FederateConfig {
    pub name: String,
    pub exec: String,
    #[serde(default = "default_directory")]
    pub directory: PathBuf,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct BrokerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    /// Passed to the broker as `--coretype=<core_type>`
    #[serde(default)]
    pub core_type: Option<String>,
    /// Extra broker arguments, appended after the generated ones
    #[serde(default)]
    pub init_string: Option<String>,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_BROKER_PORT,
            core_type: None,
            init_string: None,
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct TracerConfig {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub directory: Option<PathBuf>,
    /// Relative to the logging path, defaults to `tracer_config.json`
    #[serde(default)]
    pub config: Option<PathBuf>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

fn default_directory() -> PathBuf {
    PathBuf::from(".")
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    DEFAULT_BROKER_PORT
}

impl PlanConfig {
    /// Reads and parses a plan file
    pub fn load(path: &Path) -> Result<Self, Error> {
        if !path.exists() {
            return Err(ErrorKind::PlanNotFound(path.to_path_buf()).into());
        }

        let contents = std::fs::read_to_string(path)?;
        Self::from_json(&contents)
    }

    pub fn from_json(json: &str) -> Result<Self, Error> {
        Ok(serde_json::from_str(json)?)
    }
}

/// How the federation is watched once it is running
#[derive(Clone, Debug)]
pub struct SupervisorOptions {
    /// Kill every still running job as soon as one job fails
    pub kill_on_failure: bool,
    /// Interval between status polls, for both the monitor and the tracer echo
    pub period: Duration,
    /// How long interrupt cleanup waits for each killed process to be reaped
    pub kill_grace: Duration,
}

impl Default for SupervisorOptions {
    fn default() -> Self {
        Self {
            kill_on_failure: true,
            period: Duration::from_secs(1),
            kill_grace: Duration::from_secs(5),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_missing_fields() {
        let config = PlanConfig::from_json(
            r#"{
                "name": "cosim",
                "federates": [{"name": "gld", "exec": "gridlabd model.glm"}]
            }"#,
        )
        .expect("valid plan");

        assert_eq!(config.broker.port, DEFAULT_BROKER_PORT);
        assert!(config.tracer.is_none());
        assert!(config.logging_path.is_none());

        let fed = &config.federates[0];
        assert_eq!(fed.directory, PathBuf::from("."));
        assert_eq!(fed.host, "localhost");
        assert!(fed.env.is_empty());
    }

    #[test]
    fn broker_and_tracer_sections() {
        let config = PlanConfig::from_json(
            r#"{
                "name": "cosim",
                "federates": [],
                "broker": {"port": 24000, "core_type": "zmq"},
                "tracer": {"name": "trace", "env": {"HELICS_LOG": "debug"}},
                "logging_path": "logs"
            }"#,
        )
        .expect("valid plan");

        assert_eq!(config.broker.port, 24000);
        assert_eq!(config.broker.core_type.as_deref(), Some("zmq"));

        let tracer = config.tracer.expect("tracer");
        assert_eq!(tracer.name.as_deref(), Some("trace"));
        assert_eq!(tracer.env.get("HELICS_LOG").map(String::as_str), Some("debug"));
        assert_eq!(config.logging_path, Some(PathBuf::from("logs")));
    }

    #[test]
    fn missing_plan_file() {
        let err = PlanConfig::load(Path::new("/nonexistent/plan.json")).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::PlanNotFound(_)));
    }

    #[test]
    fn malformed_json() {
        let err = PlanConfig::from_json("{\"federates\": []}").unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::JsonError(_)));
    }
}
